//! Cleanup of client-side auth remnants.
//!
//! The authoritative session lives server-side in an HTTP-only cookie. The
//! only client-visible auth state is what older front-end builds left in local
//! storage, plus cookies set by unrelated integrations. This module only ever
//! removes them.

use crate::config::ClientConfig;
use crate::traits::Host;

/// Remove legacy local storage keys (`authToken` and friends).
pub(crate) fn purge_legacy(host: &dyn Host, config: &ClientConfig) {
    for key in &config.legacy_storage_keys {
        host.remove_local_item(key);
    }
}

/// Remove legacy keys and expire configured third-party cookies.
pub(crate) fn purge_all(host: &dyn Host, config: &ClientConfig) {
    purge_legacy(host, config);
    for name in &config.integration_cookies {
        host.expire_cookie(name);
    }
    tracing::debug!(
        keys = config.legacy_storage_keys.len(),
        cookies = config.integration_cookies.len(),
        "Local auth artifacts cleared"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::HeadlessHost;

    #[test]
    fn purge_legacy_keeps_integration_cookies() {
        let host = HeadlessHost::new();
        host.set_local_item("authToken", "abc");
        host.set_cookie("crm_session");
        let config = ClientConfig::default().with_integration_cookies(vec!["crm_session".into()]);

        purge_legacy(&host, &config);

        assert_eq!(host.local_item("authToken"), None);
        assert!(host.has_cookie("crm_session"));
    }

    #[test]
    fn purge_all_expires_integration_cookies() {
        let host = HeadlessHost::new();
        host.set_local_item("authToken", "abc");
        host.set_local_item("theme", "dark");
        host.set_cookie("crm_session");
        let config = ClientConfig::default().with_integration_cookies(vec!["crm_session".into()]);

        purge_all(&host, &config);

        assert_eq!(host.local_item("authToken"), None);
        assert_eq!(host.local_item("theme").as_deref(), Some("dark"));
        assert!(!host.has_cookie("crm_session"));
    }
}
