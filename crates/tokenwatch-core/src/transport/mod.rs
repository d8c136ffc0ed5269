//! Network call surfaces
//!
//! Two call styles are modelled, matching how applications talk to AI
//! providers:
//!
//! - [`Transport`]: call-and-await. One future resolves to the response.
//! - [`EventRequest`]: configure-then-fire. `open` sets the target, `send`
//!   fires the call, listeners observe completion.
//!
//! Both have reqwest-backed implementations in [`client`]; the interceptor
//! decorates either without changing what the caller observes.

pub mod client;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

pub use client::{ReqwestEventRequest, ReqwestTransport};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Failed to read response body: {0}")]
    Body(String),
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with a JSON body and `content-type: application/json`
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, TransportError> {
        let json =
            serde_json::to_vec(body).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let mut request = Self::new(Method::POST, url);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(Bytes::from(json));
        Ok(request)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

pub(crate) fn parse_header(
    name: &str,
    value: &str,
) -> Result<(HeaderName, HeaderValue), TransportError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::InvalidRequest(format!("header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidRequest(format!("header value for '{name}': {e}")))?;
    Ok((name, value))
}

/// What a call is made against: a bare URL or a full request.
#[derive(Debug, Clone)]
pub enum Resource {
    Url(String),
    Request(HttpRequest),
}

impl Resource {
    /// Target URL regardless of form.
    pub fn url(&self) -> &str {
        match self {
            Resource::Url(url) => url,
            Resource::Request(request) => &request.url,
        }
    }

    /// A bare URL becomes a GET without body.
    pub fn into_request(self) -> HttpRequest {
        match self {
            Resource::Url(url) => HttpRequest::get(url),
            Resource::Request(request) => request,
        }
    }
}

impl From<&str> for Resource {
    fn from(url: &str) -> Self {
        Resource::Url(url.to_string())
    }
}

impl From<String> for Resource {
    fn from(url: String) -> Self {
        Resource::Url(url)
    }
}

impl From<HttpRequest> for Resource {
    fn from(request: HttpRequest) -> Self {
        Resource::Request(request)
    }
}

/// A fully buffered response. Cloning shares the body, and reading the body
/// never consumes it, so a duplicate can be inspected without affecting the
/// original holder.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: String,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            headers,
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Call-and-await surface.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, resource: Resource) -> Result<HttpResponse, TransportError>;

    /// Whether this transport already records usage for the calls it makes.
    fn is_capturing(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, resource: Resource) -> Result<HttpResponse, TransportError> {
        (**self).fetch(resource).await
    }

    fn is_capturing(&self) -> bool {
        (**self).is_capturing()
    }
}

/// Delivered to load listeners when a response completes, whatever its status.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub status: u16,
    pub response_text: String,
}

impl LoadEvent {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub type LoadListener = Box<dyn FnMut(&LoadEvent) + Send + 'static>;
pub type ErrorListener = Box<dyn FnMut(&TransportError) + Send + 'static>;

/// Configure-then-fire surface.
///
/// `open` must precede `send`; listeners registered before `send` observe
/// that call's completion.
pub trait EventRequest: Send {
    fn open(&mut self, method: Method, url: &str);

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    fn add_load_listener(&mut self, listener: LoadListener);

    fn add_error_listener(&mut self, listener: ErrorListener);

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError>;

    fn is_capturing(&self) -> bool {
        false
    }
}
