//! Shared HTTP client with global response interception.
//!
//! Every API call goes through [`Transport`]. It resolves paths against the
//! configured API base, carries the server-set auth cookie on every request,
//! and inspects every inbound response:
//!
//! - `401` on a path outside the exempt set is a session expiry: one toast per
//!   window, legacy artifacts purged, full navigation to the login route and a
//!   [`TransportEvent::SessionExpired`] broadcast.
//! - `5xx` is logged for operators and otherwise left to the caller.

mod cancel;
mod gate;

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

pub use cancel::CancelToken;
use gate::ToastGate;

use crate::artifacts;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::traits::Host;
use crate::types::Envelope;

/// Cross-cutting events raised by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// A non-exempt request came back `401`.
    SessionExpired { path: String },
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the request with [`Error::Canceled`] once `token` fires.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Override the client-wide timeout for this request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A 2xx response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    path: String,
    body: String,
}

impl ApiResponse {
    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// API path the request was sent to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw response body.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_str(&self.body).map_err(Into::into)
    }

    /// Decode the `data` field of the standard envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not an envelope around `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.json::<Envelope<T>>().map(|envelope| envelope.data)
    }
}

/// Cookie-authenticated HTTP client shared by every component.
pub struct Transport {
    config: ClientConfig,
    http: reqwest::Client,
    jar: Arc<Jar>,
    host: Arc<dyn Host>,
    toast_gate: ToastGate,
    events: broadcast::Sender<TransportEvent>,
}

impl Transport {
    /// Build the transport with a fresh cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig, host: Arc<dyn Host>) -> Result<Self, Error> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .default_headers(headers);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            toast_gate: ToastGate::new(config.toast_window),
            config,
            http,
            jar,
            host,
            events,
        })
    }

    /// Configuration this transport was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Host receiving toasts and navigations.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Cookie jar shared by every request. The realtime channel reads it to
    /// present the same credential.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Subscribe to interceptor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Send a request and read the full response.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] if no response arrived.
    /// - [`Error::Http`] for any non-2xx status.
    /// - [`Error::Canceled`] if `options` carried a token that fired first.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let mut builder = self.http.request(method.clone(), self.config.endpoint(path));
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, Error>((status, text))
        };

        let (status, text) = match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::debug!(method = %method, path = %path, "Request canceled");
                        return Err(Error::Canceled);
                    }
                    result = exchange => result?,
                }
            }
            None => exchange.await?,
        };

        self.intercept(path, status, &text);

        if status.is_success() {
            Ok(ApiResponse {
                status,
                path: path.to_string(),
                body: text,
            })
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::GET, path, None, RequestOptions::default())
            .await
    }

    /// # Errors
    ///
    /// See [`request`](Self::request); [`Error::Decode`] if `body` fails to
    /// serialize.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post_empty(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::POST, path, None, RequestOptions::default())
            .await
    }

    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put_empty(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::PUT, path, None, RequestOptions::default())
            .await
    }

    /// Runs for every inbound response, success or failure.
    fn intercept(&self, path: &str, status: StatusCode, body: &str) {
        if status == StatusCode::UNAUTHORIZED && !self.is_expiry_exempt(path) {
            self.handle_expiry(path);
        }

        if status.is_server_error() {
            tracing::error!(status = %status, path = %path, body = %body, "Server error");
        }
    }

    fn is_expiry_exempt(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.config
            .expiry_exempt_paths
            .iter()
            .any(|exempt| strip_query(exempt) == path)
    }

    fn handle_expiry(&self, path: &str) {
        artifacts::purge_legacy(self.host.as_ref(), &self.config);

        // Every qualifying 401 reaches the session store, even inside the
        // toast window. No receivers just means nothing is bound yet.
        let _ = self.events.send(TransportEvent::SessionExpired {
            path: path.to_string(),
        });

        if !self.toast_gate.try_acquire() {
            tracing::debug!(path = %path, "Session expiry already reported");
            return;
        }

        tracing::warn!(path = %path, "Session expired");
        self.host.toast_error(&self.config.expiry_message);
        self.host.navigate(&self.config.login_route);
    }
}

fn strip_query(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
