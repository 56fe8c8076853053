use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Embedder-provided UI side effects.
///
/// The client never renders anything itself. Whatever embeds it (desktop
/// shell, TUI, kiosk, test harness) implements this trait to show toasts,
/// perform navigation and own the small amount of local key/value state the
/// legacy front end left behind.
///
/// # Example
///
/// ```rust,ignore
/// struct Shell { window: WindowHandle }
///
/// impl Host for Shell {
///     fn toast_error(&self, message: &str) {
///         self.window.toast(message);
///     }
///     fn navigate(&self, route: &str) {
///         // full reload: every in-memory view model is discarded
///         self.window.reload_at(route);
///     }
///     fn remove_local_item(&self, key: &str) {
///         self.window.local_storage().remove(key);
///     }
///     fn expire_cookie(&self, name: &str) {
///         self.window.cookies().expire(name);
///     }
/// }
/// ```
pub trait Host: Send + Sync + 'static {
    /// Show a user-visible error toast.
    fn toast_error(&self, message: &str);

    /// Full navigation to `route`, discarding all in-memory UI state.
    fn navigate(&self, route: &str);

    /// Remove a legacy local storage entry. Missing keys are not an error.
    fn remove_local_item(&self, key: &str);

    /// Expire a script-visible cookie (third-party integrations).
    fn expire_cookie(&self, name: &str);
}

/// Host for headless use: side effects are logged and local state lives in
/// memory.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    storage: Mutex<HashMap<String, String>>,
    cookies: Mutex<HashSet<String>>,
}

impl HeadlessHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a local storage entry.
    pub fn set_local_item(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut storage) = self.storage.lock() {
            storage.insert(key.into(), value.into());
        }
    }

    /// Read a local storage entry.
    #[must_use]
    pub fn local_item(&self, key: &str) -> Option<String> {
        self.storage.lock().ok()?.get(key).cloned()
    }

    /// Seed a script-visible cookie.
    pub fn set_cookie(&self, name: impl Into<String>) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.insert(name.into());
        }
    }

    /// Whether the cookie is still set.
    #[must_use]
    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.lock().is_ok_and(|c| c.contains(name))
    }
}

impl Host for HeadlessHost {
    fn toast_error(&self, message: &str) {
        tracing::warn!(message = %message, "toast");
    }

    fn navigate(&self, route: &str) {
        tracing::info!(route = %route, "navigation requested");
    }

    fn remove_local_item(&self, key: &str) {
        if let Ok(mut storage) = self.storage.lock() {
            storage.remove(key);
        }
    }

    fn expire_cookie(&self, name: &str) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_host_removes_items_and_cookies() {
        let host = HeadlessHost::new();
        host.set_local_item("authToken", "stale");
        host.set_cookie("_ga");

        host.remove_local_item("authToken");
        host.remove_local_item("never-set");
        host.expire_cookie("_ga");

        assert_eq!(host.local_item("authToken"), None);
        assert!(!host.has_cookie("_ga"));
    }
}
