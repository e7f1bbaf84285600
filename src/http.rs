use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::notify::Notifier;
use crate::types::ErrorResponse;

pub use reqwest::Method;

// User-facing messages for failed requests.
const MSG_DEFAULT: &str = "Something went wrong. Please try again.";
const MSG_CONNECTION: &str = "Connection error. Check your network and try again.";
const MSG_UNAUTHORIZED: &str = "You are not authorized to access this resource.";
const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
const MSG_NOT_FOUND: &str = "The requested resource is not available.";
const MSG_SERVER_ERROR: &str = "Server error. Please try again later.";
const MSG_VALIDATION: &str = "The provided data is not valid.";
const MSG_TOO_MANY_REQUESTS: &str = "Too many requests. Please wait a moment and try again.";

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send + 'a>>;

/// An outgoing API request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: Vec::new(), params: Vec::new(), body: None }
    }

    /// Adds a header, replacing any existing value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets (or replaces) the `Authorization: Bearer` header.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", &format!("Bearer {token}"))
    }

    /// First header value with the given name, if any.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A completed response, success or not. Transport errors (no response at
/// all) surface as [`Error::Connection`] instead.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Message the server attached to an error response, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<String> {
        serde_json::from_slice::<ErrorResponse>(&self.body)
            .ok()
            .filter(|e| !e.message.is_empty())
            .map(|e| e.message)
    }
}

/// The one seam every outgoing request goes through.
///
/// [`ReqwestTransport`] is the production implementation;
/// [`AuthenticatedTransport`](crate::AuthenticatedTransport) wraps any
/// transport with bearer injection and 401 handling, and tests substitute
/// a scripted implementation.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// Use a custom client (for connection pool reuse or proxies).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut builder = self.client.request(request.method, request.url);
            if !request.params.is_empty() {
                builder = builder.query(&request.params);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response =
                builder.send().await.map_err(|e| Error::Connection(e.to_string()))?;
            let status = response.status().as_u16();
            let body =
                response.bytes().await.map_err(|e| Error::Connection(e.to_string()))?.to_vec();
            Ok(HttpResponse { status, body })
        })
    }
}

/// Per-request options: extra headers, query params, and whether a failure
/// should raise the generic error notification.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Show the mapped error message through the notification sink.
    /// Defaults to `true`; flows that present their own errors turn it off.
    pub notify_errors: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { headers: Vec::new(), params: Vec::new(), notify_errors: true }
    }
}

impl RequestOptions {
    /// Options with the error notification suppressed.
    #[must_use]
    pub fn silent() -> Self {
        Self { notify_errors: false, ..Self::default() }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", &format!("Bearer {token}"))
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_owned(), value.to_string()));
        self
    }
}

/// Typed request methods over a transport, with centralized
/// error-to-message mapping.
///
/// Every failed request is turned into a user-presentable message and
/// (unless suppressed) pushed through the notification sink; the error is
/// still returned so callers can react.
#[derive(Clone)]
pub struct HttpService {
    transport: Arc<dyn HttpTransport>,
    notifier: Arc<dyn Notifier>,
}

impl HttpService {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self { transport, notifier }
    }

    /// # Errors
    ///
    /// Returns [`Error::Api`] for non-success statuses, [`Error::Connection`]
    /// when no response arrived, [`Error::Decode`] for an unreadable body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.dispatch(Method::GET, url, None, options).await
    }

    /// # Errors
    ///
    /// See [`HttpService::get`].
    pub async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.dispatch(Method::POST, url, body, options).await
    }

    /// # Errors
    ///
    /// See [`HttpService::get`].
    pub async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.dispatch(Method::PUT, url, body, options).await
    }

    /// # Errors
    ///
    /// See [`HttpService::get`].
    pub async fn patch<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.dispatch(Method::PATCH, url, body, options).await
    }

    /// # Errors
    ///
    /// See [`HttpService::get`].
    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: Url,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.dispatch(Method::DELETE, url, None, options).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, Error> {
        let mut request = HttpRequest::new(method, url);
        request.headers = options.headers;
        request.params = options.params;
        request.body = body;

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "request failed before a response arrived");
                if options.notify_errors {
                    self.notifier.error(transport_message(&error), None);
                }
                return Err(error);
            }
        };

        if response.is_success() {
            return response.json::<T>();
        }

        let message = map_status_message(response.status, response.server_message());
        debug!(status = response.status, "request declined: {message}");
        if options.notify_errors {
            self.notifier.error(&message, None);
        }
        Err(Error::Api { status: response.status, message })
    }
}

fn transport_message(error: &Error) -> &'static str {
    match error {
        Error::SessionExpired => MSG_SESSION_EXPIRED,
        _ => MSG_CONNECTION,
    }
}

fn map_status_message(status: u16, server_message: Option<String>) -> String {
    match status {
        400 => server_message.unwrap_or_else(|| MSG_VALIDATION.to_owned()),
        401 => MSG_UNAUTHORIZED.to_owned(),
        404 => MSG_NOT_FOUND.to_owned(),
        429 => MSG_TOO_MANY_REQUESTS.to_owned(),
        500 => MSG_SERVER_ERROR.to_owned(),
        _ => server_message.unwrap_or_else(|| MSG_DEFAULT.to_owned()),
    }
}
