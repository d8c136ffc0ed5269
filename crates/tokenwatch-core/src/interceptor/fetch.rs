use async_trait::async_trait;
use std::sync::Arc;

use super::CaptureContext;
use crate::provider::classify;
use crate::transport::{HttpResponse, Resource, Transport, TransportError};

/// Call-and-await decorator.
///
/// Responses from known providers are copied to a capture task whatever
/// their status; the caller gets the response, or the error, unchanged.
pub struct CapturingTransport<T> {
    inner: T,
    context: Option<Arc<CaptureContext>>,
}

impl<T: Transport> CapturingTransport<T> {
    /// Captures through the process-wide context once [`install`](super::install)
    /// has run.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            context: None,
        }
    }

    /// Captures through `context` regardless of the global install.
    pub fn with_context(inner: T, context: Arc<CaptureContext>) -> Self {
        Self {
            inner,
            context: Some(context),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn context(&self) -> Option<Arc<CaptureContext>> {
        self.context.clone().or_else(super::installed)
    }
}

#[async_trait]
impl<T: Transport> Transport for CapturingTransport<T> {
    async fn fetch(&self, resource: Resource) -> Result<HttpResponse, TransportError> {
        let url = resource.url().to_string();
        let provider = classify(&url);

        let context = match self.context() {
            Some(context) if provider.is_known() && !self.inner.is_capturing() => context,
            _ => return self.inner.fetch(resource).await,
        };

        let response = self.inner.fetch(resource).await?;
        context.spawn_capture(
            provider,
            url,
            response.status().as_u16(),
            response.bytes().clone(),
        );
        Ok(response)
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
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a canned response and remembers the URLs it saw.
    struct CannedTransport {
        status: StatusCode,
        body: String,
        seen: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new(status: StatusCode, body: serde_json::Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn fetch(&self, resource: Resource) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(resource.url().to_string());
            Ok(HttpResponse::new(
                self.status,
                HeaderMap::new(),
                resource.url(),
                self.body.clone(),
            ))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn fetch(&self, _resource: Resource) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("connection refused".to_string()))
        }
    }

    fn context(sink: Arc<MemorySink>, notifier: UsageNotifier) -> Arc<CaptureContext> {
        Arc::new(CaptureContext::current(sink, notifier))
    }

    #[tokio::test]
    async fn test_known_provider_is_captured_and_response_untouched() {
        let body = json!({
            "model": "gpt-4",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let transport = CapturingTransport::with_context(
            CannedTransport::new(StatusCode::OK, body.clone()),
            context(sink.clone(), notifier),
        );

        let url = "https://api.openai.com/v1/chat/completions";
        let response = transport.fetch(url.into()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>().unwrap(), body);

        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.provider, ProviderTag::OpenAi);
        assert_eq!(record.model, "gpt-4");
        assert_eq!(record.request_tokens, 10);
        assert_eq!(record.response_tokens, 5);
        assert_eq!(record.total_tokens, 15);
        assert_eq!(record.endpoint, url);
        assert_eq!(record.status_code, 200);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_with_usage_is_still_captured() {
        let body = json!({
            "model": "claude-3",
            "usage": {"input_tokens": 3, "output_tokens": 0}
        });
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let transport = CapturingTransport::with_context(
            CannedTransport::new(StatusCode::TOO_MANY_REQUESTS, body),
            context(sink, notifier),
        );

        let response = transport
            .fetch("https://api.anthropic.com/v1/messages".into())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status_code, 429);
        assert_eq!(record.total_tokens, 3);
    }

    #[tokio::test]
    async fn test_unknown_url_passes_through() {
        let sink = Arc::new(MemorySink::default());
        let transport = CapturingTransport::with_context(
            CannedTransport::new(
                StatusCode::OK,
                json!({"usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}}),
            ),
            context(sink.clone(), UsageNotifier::default()),
        );

        let response = transport
            .fetch("https://example.com/data".into())
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(
            transport.inner().seen.lock().unwrap().as_slice(),
            ["https://example.com/data"]
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.len(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_returned_unchanged() {
        let sink = Arc::new(MemorySink::default());
        let transport = CapturingTransport::with_context(
            FailingTransport,
            context(sink.clone(), UsageNotifier::default()),
        );

        let err = transport
            .fetch("https://api.openai.com/v1/chat/completions".into())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(ref m) if m == "connection refused"));
        assert_eq!(sink.len(), 0);
    }

    #[tokio::test]
    async fn test_double_wrap_captures_once() {
        let body = json!({
            "model": "gpt-4",
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        });
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let ctx = context(sink.clone(), notifier);
        let inner = CapturingTransport::with_context(
            CannedTransport::new(StatusCode::OK, body),
            Arc::clone(&ctx),
        );
        let outer = CapturingTransport::with_context(inner, ctx);

        outer
            .fetch("https://api.openai.com/v1/chat/completions".into())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.len(), 1);
    }
}
