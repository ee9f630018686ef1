//! Event subscription.

use async_trait::async_trait;

use cipherledger_core::LedgerEvent;

/// Receives every committed event, in log order.
///
/// Sinks run after the commit but before the guarded call returns, so a
/// sink that calls back into `create` or `apply_delta` on the same task is
/// rejected with [`Reentrancy`](crate::LedgerError::Reentrancy). A sink
/// must not wait on a guarded call issued from another task; that call
/// queues behind the one notifying the sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: &LedgerEvent);
}

/// Sink that buffers events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<LedgerEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn on_event(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
