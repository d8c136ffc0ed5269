//! In-process broadcast of newly captured usage records

use tokio::sync::broadcast;

use crate::usage::UsageRecord;

/// Event name used when bridging the channel to other event systems.
pub const USAGE_RECORD_ADDED: &str = "usage-record-added";

pub const DEFAULT_CAPACITY: usize = 64;

/// Cloneable sender side of the "new record" channel.
///
/// Delivery is best effort: only receivers subscribed at broadcast time see
/// a record, and a receiver that lags more than the channel capacity skips
/// the oldest records.
#[derive(Debug, Clone)]
pub struct UsageNotifier {
    tx: broadcast::Sender<UsageRecord>,
}

impl UsageNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UsageRecord> {
        self.tx.subscribe()
    }

    /// Broadcast a record. Returns how many listeners received it.
    pub fn notify(&self, record: &UsageRecord) -> usize {
        match self.tx.send(record.clone()) {
            Ok(count) => count,
            Err(_) => {
                log::trace!("[Notify] {USAGE_RECORD_ADDED}: no listeners for {}", record.id);
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UsageNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
