use bytes::Bytes;
use http::Method;
use std::sync::Arc;

use super::CaptureContext;
use crate::provider::classify;
use crate::transport::{ErrorListener, EventRequest, LoadEvent, LoadListener, TransportError};

/// Configure-then-fire decorator.
///
/// Remembers the URL given to `open`; on `send` to a known provider it
/// registers one extra load listener that copies 2xx responses to a capture
/// task. Everything else is delegated unchanged.
pub struct CapturingEventRequest<R> {
    inner: R,
    context: Option<Arc<CaptureContext>>,
    url: Option<String>,
}

impl<R: EventRequest> CapturingEventRequest<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            context: None,
            url: None,
        }
    }

    pub fn with_context(inner: R, context: Arc<CaptureContext>) -> Self {
        Self {
            inner,
            context: Some(context),
            url: None,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn capture_listener(&self) -> Option<LoadListener> {
        if self.inner.is_capturing() {
            return None;
        }
        let url = self.url.clone()?;
        let provider = classify(&url);
        if !provider.is_known() {
            return None;
        }
        let context = self.context.clone().or_else(super::installed)?;

        Some(Box::new(move |event: &LoadEvent| {
            if !event.is_success() {
                return;
            }
            context.spawn_capture(
                provider,
                url.clone(),
                event.status,
                Bytes::from(event.response_text.clone()),
            );
        }))
    }
}

impl<R: EventRequest> EventRequest for CapturingEventRequest<R> {
    fn open(&mut self, method: Method, url: &str) {
        self.url = Some(url.to_string());
        self.inner.open(method, url);
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.inner.set_request_header(name, value)
    }

    fn add_load_listener(&mut self, listener: LoadListener) {
        self.inner.add_load_listener(listener);
    }

    fn add_error_listener(&mut self, listener: ErrorListener) {
        self.inner.add_error_listener(listener);
    }

    fn send(&mut self, body: Option<Bytes>) -> Result<(), TransportError> {
        if let Some(listener) = self.capture_listener() {
            self.inner.add_load_listener(listener);
        }
        self.inner.send(body)
    }

    fn is_capturing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::test_support::MemorySink;
    use crate::notify::UsageNotifier;
    use crate::provider::ProviderTag;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Completes synchronously inside `send` with a canned status and body.
    struct CannedRequest {
        status: u16,
        body: String,
        opened: Option<String>,
        load_listeners: Vec<LoadListener>,
    }

    impl CannedRequest {
        fn new(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                opened: None,
                load_listeners: Vec::new(),
            }
        }
    }

    impl EventRequest for CannedRequest {
        fn open(&mut self, _method: Method, url: &str) {
            self.opened = Some(url.to_string());
        }

        fn set_request_header(&mut self, _name: &str, _value: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn add_load_listener(&mut self, listener: LoadListener) {
            self.load_listeners.push(listener);
        }

        fn add_error_listener(&mut self, _listener: ErrorListener) {}

        fn send(&mut self, _body: Option<Bytes>) -> Result<(), TransportError> {
            if self.opened.is_none() {
                return Err(TransportError::InvalidState("send called before open"));
            }
            let event = LoadEvent {
                status: self.status,
                response_text: self.body.clone(),
            };
            for listener in self.load_listeners.iter_mut() {
                listener(&event);
            }
            Ok(())
        }
    }

    fn usage_body() -> serde_json::Value {
        json!({
            "model": "claude-3",
            "usage": {"input_tokens": 7, "output_tokens": 3}
        })
    }

    fn context(sink: Arc<MemorySink>, notifier: UsageNotifier) -> Arc<CaptureContext> {
        Arc::new(CaptureContext::current(sink, notifier))
    }

    #[tokio::test]
    async fn test_success_is_captured_and_caller_listener_still_fires() {
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let mut request = CapturingEventRequest::with_context(
            CannedRequest::new(200, usage_body()),
            context(sink.clone(), notifier),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_listener = Arc::clone(&seen);
        request.open(Method::POST, "https://api.anthropic.com/v1/messages");
        request.set_request_header("x-api-key", "k").unwrap();
        request.add_load_listener(Box::new(move |event: &LoadEvent| {
            seen_by_listener.lock().unwrap().push(event.response_text.clone());
        }));
        request.send(Some(Bytes::from_static(b"{}"))).unwrap();

        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.provider, ProviderTag::Anthropic);
        assert_eq!(record.model, "claude-3");
        assert_eq!(record.total_tokens, 10);
        assert_eq!(record.endpoint, "https://api.anthropic.com/v1/messages");
        assert_eq!(seen.lock().unwrap().as_slice(), [usage_body().to_string()]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_captured() {
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let mut request = CapturingEventRequest::with_context(
            CannedRequest::new(500, usage_body()),
            context(sink.clone(), notifier),
        );

        request.open(Method::POST, "https://api.anthropic.com/v1/messages");
        request.send(None).unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err());
        assert_eq!(sink.len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_url_registers_no_listener() {
        let sink = Arc::new(MemorySink::default());
        let mut request = CapturingEventRequest::with_context(
            CannedRequest::new(200, usage_body()),
            context(sink, UsageNotifier::default()),
        );

        request.open(Method::GET, "https://example.com/api");
        request.send(None).unwrap();
        assert!(request.inner().load_listeners.is_empty());
    }

    #[tokio::test]
    async fn test_send_before_open_error_is_propagated() {
        let sink = Arc::new(MemorySink::default());
        let mut request = CapturingEventRequest::with_context(
            CannedRequest::new(200, usage_body()),
            context(sink, UsageNotifier::default()),
        );
        assert!(matches!(
            request.send(None),
            Err(TransportError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_double_wrap_registers_one_capture_listener() {
        let sink = Arc::new(MemorySink::default());
        let ctx = context(sink, UsageNotifier::default());
        let inner = CapturingEventRequest::with_context(
            CannedRequest::new(200, usage_body()),
            Arc::clone(&ctx),
        );
        let mut outer = CapturingEventRequest::with_context(inner, ctx);

        outer.open(Method::POST, "https://api.openai.com/v1/chat/completions");
        outer.send(None).unwrap();
        assert_eq!(outer.inner().inner().load_listeners.len(), 1);
    }
}
