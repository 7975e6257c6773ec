use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::metrics::record_realtime_event;

/// One named event pushed to every connected realtime client. Clients may see
/// the same logical update twice (immediate path and subscription path) and
/// must treat delivery idempotently.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub event: String,
    pub payload: Value,
}

/// Fan-out hub for the realtime channel. Constructed once at startup and
/// injected as an explicit dependency; there is no process-wide singleton.
#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Best-effort broadcast. Delivery failure never propagates to the
    /// request that triggered it.
    pub fn emit(&self, event: &str, payload: Value) {
        record_realtime_event(event);
        match self.tx.send(RealtimeEvent {
            event: event.to_string(),
            payload,
        }) {
            Ok(receivers) => {
                tracing::debug!(event, receivers, "realtime event emitted");
            }
            Err(_) => {
                // No connected clients; nothing to deliver.
                tracing::trace!(event, "realtime event dropped, no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let hub = RealtimeHub::new(8);
        let mut rx = hub.subscribe();

        hub.emit("lineItemRowUpdate", json!({ "remaining_balance": 300.0 }));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "lineItemRowUpdate");
        assert_eq!(event.payload["remaining_balance"], 300.0);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_a_noop() {
        let hub = RealtimeHub::new(8);
        hub.emit("lineItemUpdated", json!({}));
        assert_eq!(hub.client_count(), 0);
    }
}
