use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Local development API used when `APNA_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:5003/api";

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";
pub(crate) const PROFILE_PATH: &str = "/users/profile";

/// Client configuration.
///
/// The API base is the only required value; everything else has a default that
/// matches the production front end. Override with `with_*` methods, or use
/// [`from_env()`](ClientConfig::from_env).
///
/// ```rust,ignore
/// use apnamanager_client::ClientConfig;
///
/// let config = ClientConfig::new("https://api.example.com/api".parse()?)
///     .with_toast_window(std::time::Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_url: Url,
    pub(crate) login_route: String,
    pub(crate) expiry_message: String,
    pub(crate) toast_window: Duration,
    pub(crate) expiry_exempt_paths: Vec<String>,
    pub(crate) legacy_storage_keys: Vec<String>,
    pub(crate) integration_cookies: Vec<String>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) reconnect_attempts: u32,
    pub(crate) reconnect_delay: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            login_route: "/login".into(),
            expiry_message: "Session expired. Please log in again.".into(),
            toast_window: Duration::from_secs(3),
            expiry_exempt_paths: vec![LOGIN_PATH.into(), LOGOUT_PATH.into(), PROFILE_PATH.into()],
            legacy_storage_keys: vec!["authToken".into()],
            integration_cookies: Vec::new(),
            request_timeout: None,
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `APNA_API_URL`: API base URL (default [`DEFAULT_API_URL`])
    /// - `APNA_REQUEST_TIMEOUT_SECS`: per-request timeout in seconds
    /// - `APNA_INTEGRATION_COOKIES`: comma-separated third-party cookie names
    ///   cleared on logout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, Error> {
        let api_url: Url = std::env::var("APNA_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("APNA_API_URL: {e}")))?;

        let mut config = Self::new(api_url);

        if let Ok(secs) = std::env::var("APNA_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("APNA_REQUEST_TIMEOUT_SECS: {e}")))?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Ok(names) = std::env::var("APNA_INTEGRATION_COOKIES") {
            config = config.with_integration_cookies(
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        Ok(config)
    }

    /// Client-side route the user is sent to when the session expires.
    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Override the toast shown on expiry.
    #[must_use]
    pub fn with_expiry_message(mut self, message: impl Into<String>) -> Self {
        self.expiry_message = message.into();
        self
    }

    /// Window during which repeated expiry toasts are suppressed (default 3s).
    #[must_use]
    pub fn with_toast_window(mut self, window: Duration) -> Self {
        self.toast_window = window;
        self
    }

    /// Paths whose 401 is a normal outcome rather than session expiry.
    #[must_use]
    pub fn with_expiry_exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.expiry_exempt_paths = paths;
        self
    }

    /// Legacy local storage keys purged on login, logout and expiry.
    #[must_use]
    pub fn with_legacy_storage_keys(mut self, keys: Vec<String>) -> Self {
        self.legacy_storage_keys = keys;
        self
    }

    /// Third-party cookies to expire on logout.
    #[must_use]
    pub fn with_integration_cookies(mut self, names: Vec<String>) -> Self {
        self.integration_cookies = names;
        self
    }

    /// Timeout applied to every request.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Realtime retry budget and delay.
    #[must_use]
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Base URL of the REST API.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Route the host navigates to on expiry.
    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Window within which repeated expiry toasts are suppressed.
    #[must_use]
    pub fn toast_window(&self) -> Duration {
        self.toast_window
    }

    /// Paths whose 401 is not treated as expiry.
    #[must_use]
    pub fn expiry_exempt_paths(&self) -> &[String] {
        &self.expiry_exempt_paths
    }

    /// Realtime retries after the first failed connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Fixed wait between realtime retries.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Absolute URL for an API path such as `/users/profile`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Socket.IO websocket address derived from the API base.
    ///
    /// A trailing `/api` segment is stripped and the scheme switched to
    /// `ws`/`wss`: `http://host:5003/api` becomes
    /// `ws://host:5003/socket.io/?EIO=4&transport=websocket`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API base is not an http(s) URL.
    pub fn realtime_url(&self) -> Result<Url, Error> {
        let mut url = self.api_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::Config(format!(
                    "cannot derive realtime address from scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::Config(format!("cannot switch scheme to {scheme}")))?;

        let path = url.path().trim_end_matches('/').to_string();
        let base = path.strip_suffix("/api").unwrap_or(&path);
        url.set_path(&format!("{base}/socket.io/"));
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);
        Ok(url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL.parse().expect("valid default URL"))
    }
}
