//! reqwest-backed implementations of both call surfaces

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use reqwest::Client;
use tokio::runtime::Handle;

use super::{
    parse_header, ErrorListener, EventRequest, HttpResponse, LoadEvent, LoadListener, Resource,
    Transport, TransportError,
};
use crate::http_client;

/// Call-and-await surface over reqwest. The body is read in full before
/// the response is returned.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Uses the shared client from [`http_client::get`].
    pub fn new() -> Self {
        Self::with_client(http_client::get())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, resource: Resource) -> Result<HttpResponse, TransportError> {
        let request = resource.into_request();
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, headers, url, body))
    }
}

/// Configure-then-fire surface over reqwest.
///
/// `send` spawns the call on the current tokio runtime and returns
/// immediately; listeners run on that task when the call settles. Each
/// `open` starts a fresh call and may be followed by exactly one `send`.
/// A `send` that returns an error drops the listeners registered for it.
pub struct ReqwestEventRequest {
    client: Client,
    target: Option<(Method, String)>,
    headers: HeaderMap,
    load_listeners: Vec<LoadListener>,
    error_listeners: Vec<ErrorListener>,
    sent: bool,
}

impl ReqwestEventRequest {
    pub fn new() -> Self {
        Self::with_client(http_client::get())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            target: None,
            headers: HeaderMap::new(),
            load_listeners: Vec::new(),
            error_listeners: Vec::new(),
            sent: false,
        }
    }
}

impl Default for ReqwestEventRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRequest for ReqwestEventRequest {
    fn open(&mut self, method: Method, url: &str) {
        self.target = Some((method, url.to_string()));
        self.headers.clear();
        self.sent = false;
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.target.is_none() || self.sent {
            return Err(TransportError::InvalidState(
                "set_request_header requires an opened, unsent request",
            ));
        }
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    fn add_load_listener(&mut self, listener: LoadListener) {
        self.load_listeners.push(listener);
    }

    fn add_error_listener(&mut self, listener: ErrorListener) {
        self.error_listeners.push(listener);
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        let result = self.dispatch(body);
        if result.is_err() {
            self.load_listeners.clear();
            self.error_listeners.clear();
        }
        result
    }
}

impl ReqwestEventRequest {
    fn dispatch(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        let Some((method, url)) = self.target.clone() else {
            return Err(TransportError::InvalidState("send called before open"));
        };
        if self.sent {
            return Err(TransportError::InvalidState("request already sent"));
        }
        let runtime = Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, &url)
            .headers(std::mem::take(&mut self.headers));
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let mut load_listeners = std::mem::take(&mut self.load_listeners);
        let mut error_listeners = std::mem::take(&mut self.error_listeners);
        self.sent = true;

        runtime.spawn(async move {
            let outcome = async {
                let response = builder.send().await?;
                let status = response.status().as_u16();
                let response_text = response.text().await?;
                Ok::<_, TransportError>(LoadEvent {
                    status,
                    response_text,
                })
            }
            .await;

            match outcome {
                Ok(event) => {
                    for listener in load_listeners.iter_mut() {
                        listener(&event);
                    }
                }
                Err(e) => {
                    log::debug!("[EventRequest] {} failed: {e}", http_client::mask_url(&url));
                    for listener in error_listeners.iter_mut() {
                        listener(&e);
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_open_is_invalid_state() {
        let mut request = ReqwestEventRequest::with_client(Client::new());
        let result = request.send(None);
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }

    #[test]
    fn test_header_before_open_is_invalid_state() {
        let mut request = ReqwestEventRequest::with_client(Client::new());
        let result = request.set_request_header("x-api-key", "k");
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }

    #[test]
    fn test_send_outside_runtime_fails_without_panicking() {
        let mut request = ReqwestEventRequest::with_client(Client::new());
        request.open(Method::GET, "http://127.0.0.1:9/");
        let result = request.send(None);
        assert!(matches!(result, Err(TransportError::NoRuntime(_))));
    }

    #[test]
    fn test_failed_send_drops_its_listeners() {
        let mut request = ReqwestEventRequest::with_client(Client::new());
        request.open(Method::GET, "http://127.0.0.1:9/");
        request.add_load_listener(Box::new(|_: &LoadEvent| {}));
        request.add_error_listener(Box::new(|_: &TransportError| {}));
        assert!(request.send(None).is_err());
        assert!(request.load_listeners.is_empty());
        assert!(request.error_listeners.is_empty());

        request.sent = true;
        request.add_load_listener(Box::new(|_: &LoadEvent| {}));
        assert!(matches!(
            request.send(None),
            Err(TransportError::InvalidState(_))
        ));
        assert!(request.load_listeners.is_empty());
    }
}
