//! Usage-capture interceptor
//!
//! Decorators over the two call surfaces ([`CapturingTransport`] and
//! [`CapturingEventRequest`]) watch calls to known AI provider endpoints,
//! hand a copy of each response to a detached capture task, and otherwise
//! stay out of the way: the caller sees exactly what the undecorated surface
//! would have returned.
//!
//! Capture is enabled process-wide by [`install`], once. A decorator built
//! with [`CapturingTransport::new`] or [`CapturingEventRequest::new`] passes
//! calls straight through until then.
//!
//! Capture tasks are fire-and-forget: there is no backpressure, no
//! cancellation, no timeout and no completion signal besides the
//! notification for records that were actually stored.

mod event;
mod fetch;

pub use event::CapturingEventRequest;
pub use fetch::CapturingTransport;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::database::UsageSink;
use crate::notify::UsageNotifier;
use crate::provider::ProviderTag;
use crate::usage::{parse_body, UsageRecord};

static INSTALLED: OnceCell<Arc<CaptureContext>> = OnceCell::new();

/// Install usage capture for the whole process.
///
/// Returns `true` for the one call that installs. Every later call is a
/// no-op returning `false`, as is a call made outside a tokio runtime (no
/// capture task could ever run there, so nothing is installed and a later
/// call from inside a runtime may still succeed). There is no uninstall.
pub fn install(sink: Arc<dyn UsageSink>, notifier: UsageNotifier) -> bool {
    if INSTALLED.get().is_some() {
        return false;
    }
    let runtime = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            log::debug!("[Interceptor] No tokio runtime, skipping install");
            return false;
        }
    };

    let context = Arc::new(CaptureContext::new(sink, notifier, runtime));
    if INSTALLED.set(context).is_err() {
        return false;
    }
    log::info!("[Interceptor] AI API request interceptor installed");
    true
}

pub fn is_installed() -> bool {
    INSTALLED.get().is_some()
}

/// The process-wide capture context, if [`install`] has succeeded.
pub fn installed() -> Option<Arc<CaptureContext>> {
    INSTALLED.get().cloned()
}

/// Everything the capture path needs: where records go and who hears
/// about them.
pub struct CaptureContext {
    sink: Arc<dyn UsageSink>,
    notifier: UsageNotifier,
    runtime: Handle,
}

impl CaptureContext {
    pub fn new(sink: Arc<dyn UsageSink>, notifier: UsageNotifier, runtime: Handle) -> Self {
        Self {
            sink,
            notifier,
            runtime,
        }
    }

    /// Context bound to the current tokio runtime.
    ///
    /// # Panics
    /// When called outside a runtime.
    pub fn current(sink: Arc<dyn UsageSink>, notifier: UsageNotifier) -> Self {
        Self::new(sink, notifier, Handle::current())
    }

    pub fn notifier(&self) -> &UsageNotifier {
        &self.notifier
    }

    /// Parse, extract, build, persist and announce one captured response.
    ///
    /// Returns the stored record, or `None` when nothing was stored. Never
    /// fails: every problem is logged and dropped here.
    pub fn capture(
        &self,
        provider: ProviderTag,
        endpoint: &str,
        status_code: u16,
        body: &[u8],
    ) -> Option<UsageRecord> {
        let parsed = parse_body(body)?;
        let record = UsageRecord::from_response(provider, endpoint, status_code, &parsed)?;

        if let Err(e) = self.sink.save_usage_record(&record) {
            log::warn!("[Interceptor] Failed to save usage record {}: {e}", record.id);
            return None;
        }
        log::debug!(
            "[Interceptor] Captured {} {} tokens={} status={}",
            record.provider,
            record.model,
            record.total_tokens,
            record.status_code
        );
        self.notifier.notify(&record);
        Some(record)
    }

    /// Run [`capture`](Self::capture) on a detached blocking task.
    ///
    /// The returned handle may be dropped; the task keeps running. Prefers
    /// the runtime the caller is on, falling back to the one bound at
    /// construction.
    pub fn spawn_capture(
        self: &Arc<Self>,
        provider: ProviderTag,
        endpoint: String,
        status_code: u16,
        body: Bytes,
    ) -> JoinHandle<Option<UsageRecord>> {
        let context = Arc::clone(self);
        let runtime = Handle::try_current().unwrap_or_else(|_| self.runtime.clone());
        runtime.spawn_blocking(move || context.capture(provider, &endpoint, status_code, &body))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemorySink;
    use super::*;
    use serde_json::json;

    fn openai_body(total: u64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "model": "gpt-4",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": total}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_persists_and_notifies() {
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let context = CaptureContext::current(sink.clone(), notifier);

        let record = context
            .capture(
                ProviderTag::OpenAi,
                "https://api.openai.com/v1/chat/completions",
                200,
                &openai_body(15),
            )
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(rx.recv().await.unwrap(), record);
        assert_eq!(record.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_capture_zero_total_stores_nothing() {
        let sink = Arc::new(MemorySink::default());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let context = CaptureContext::current(sink.clone(), notifier);

        assert!(context
            .capture(ProviderTag::OpenAi, "u", 200, &openai_body(0))
            .is_none());
        assert_eq!(sink.len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_capture_swallows_invalid_json() {
        let sink = Arc::new(MemorySink::default());
        let context = CaptureContext::current(sink.clone(), UsageNotifier::default());
        assert!(context
            .capture(ProviderTag::Anthropic, "u", 200, b"upstream timeout")
            .is_none());
        assert_eq!(sink.len(), 0);
    }

    #[tokio::test]
    async fn test_capture_swallows_store_failure_without_notifying() {
        let sink = Arc::new(MemorySink::failing());
        let notifier = UsageNotifier::default();
        let mut rx = notifier.subscribe();
        let context = CaptureContext::current(sink, notifier);

        assert!(context
            .capture(ProviderTag::OpenAi, "u", 200, &openai_body(15))
            .is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_capture_runs_detached() {
        let sink = Arc::new(MemorySink::default());
        let context = Arc::new(CaptureContext::current(sink.clone(), UsageNotifier::default()));

        let handle = context.spawn_capture(
            ProviderTag::OpenAi,
            "https://api.openai.com/v1/chat/completions".to_string(),
            200,
            Bytes::from(openai_body(15)),
        );
        let record = handle.await.unwrap().unwrap();
        assert_eq!(record.request_tokens, 10);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_install_outside_runtime_is_noop() {
        let installed = install(
            Arc::new(MemorySink::default()),
            UsageNotifier::default(),
        );
        assert!(!installed);
    }
}
