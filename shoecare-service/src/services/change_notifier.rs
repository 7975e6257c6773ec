//! Durable change-notification layer.
//!
//! One long-lived task per watched collection opens a resumable change stream
//! and republishes every mutation to connected realtime clients. The resume
//! position is persisted after each delivered event, so a reopened stream
//! picks up where the last acknowledged event left off. Errors here never
//! surface to API callers; the task backs off and reconnects.

use futures::StreamExt;
use mongodb::bson::{doc, to_bson, DateTime, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType, ResumeToken};
use mongodb::change_stream::ChangeStream;
use mongodb::options::{ChangeStreamOptions, FullDocumentType, UpdateOptions};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::RealtimeConfig;
use crate::services::broadcaster::RealtimeHub;

/// A watched collection and the realtime event it republishes under.
pub struct WatchSpec {
    pub collection: &'static str,
    pub event: &'static str,
    /// Line items additionally get a slimmed `lineItemDelta` event so clients
    /// can patch local state cheaply.
    pub emit_delta: bool,
}

pub const WATCHED_COLLECTIONS: &[WatchSpec] = &[
    WatchSpec {
        collection: "line_items",
        event: "lineItemUpdated",
        emit_delta: true,
    },
    WatchSpec {
        collection: "appointments",
        event: "appointmentUpdated",
        emit_delta: false,
    },
    WatchSpec {
        collection: "unavailability",
        event: "unavailabilityUpdated",
        emit_delta: false,
    },
];

#[derive(Debug, Serialize, Deserialize)]
struct StreamCursor {
    #[serde(rename = "_id")]
    collection: String,
    token: ResumeToken,
    updated_at: DateTime,
}

pub struct ChangeNotifier {
    db: Database,
    hub: RealtimeHub,
    cursors: Collection<StreamCursor>,
    backoff_floor: Duration,
    backoff_cap: Duration,
}

impl ChangeNotifier {
    pub fn new(db: Database, hub: RealtimeHub, config: &RealtimeConfig) -> Self {
        let cursors = db.collection("stream_cursors");
        Self {
            db,
            hub,
            cursors,
            backoff_floor: Duration::from_millis(config.backoff_floor_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// Spawn one watcher task per watched collection. Tasks run until process
    /// shutdown; there is no per-subscriber cancellation.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        WATCHED_COLLECTIONS
            .iter()
            .map(|spec| {
                let notifier = Arc::clone(self);
                tokio::spawn(async move { notifier.watch_collection(spec).await })
            })
            .collect()
    }

    async fn watch_collection(&self, spec: &'static WatchSpec) {
        let mut backoff = self.backoff_floor;
        loop {
            let resume = match self.load_cursor(spec.collection).await {
                Ok(token) => token,
                Err(err) => {
                    tracing::warn!(collection = spec.collection, %err, "cursor load failed");
                    None
                }
            };
            let had_resume = resume.is_some();

            match self.open_stream(spec.collection, resume).await {
                Ok(stream) => {
                    tracing::info!(
                        collection = spec.collection,
                        resumed = had_resume,
                        "change stream open"
                    );
                    self.pump_stream(spec, stream, &mut backoff).await;
                }
                Err(err) => {
                    tracing::warn!(collection = spec.collection, %err, "change stream open failed");
                    if had_resume {
                        // The stored position may have been invalidated by a
                        // datastore disconnect; next attempt starts fresh.
                        tracing::warn!(
                            collection = spec.collection,
                            "discarding stored resume position"
                        );
                        if let Err(err) = self.clear_cursor(spec.collection).await {
                            tracing::warn!(collection = spec.collection, %err, "cursor clear failed");
                        }
                    }
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, self.backoff_cap);
        }
    }

    async fn open_stream(
        &self,
        collection: &str,
        resume: Option<ResumeToken>,
    ) -> Result<ChangeStream<ChangeStreamEvent<Document>>, AppError> {
        let mut options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .build();
        options.resume_after = resume;
        let stream = self
            .db
            .collection::<Document>(collection)
            .watch([], options)
            .await?;
        Ok(stream)
    }

    /// Drain events until the stream errors or closes. Backoff resets to its
    /// floor on every successful delivery.
    async fn pump_stream(
        &self,
        spec: &'static WatchSpec,
        mut stream: ChangeStream<ChangeStreamEvent<Document>>,
        backoff: &mut Duration,
    ) {
        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    self.deliver(spec, event).await;
                    if let Some(token) = stream.resume_token() {
                        if let Err(err) = self.save_cursor(spec.collection, token).await {
                            tracing::warn!(collection = spec.collection, %err, "cursor save failed");
                        }
                    }
                    *backoff = self.backoff_floor;
                }
                Some(Err(err)) => {
                    tracing::warn!(collection = spec.collection, %err, "change stream error");
                    return;
                }
                None => {
                    tracing::warn!(collection = spec.collection, "change stream closed");
                    return;
                }
            }
        }
    }

    async fn deliver(&self, spec: &'static WatchSpec, event: ChangeStreamEvent<Document>) {
        let operation = operation_label(&event.operation_type);
        let document = match (&event.full_document, &event.operation_type) {
            (Some(doc), _) => Some(doc.clone()),
            (None, OperationType::Delete) => event.document_key.clone(),
            // Best-effort post-image lookup when update_lookup came up empty.
            (None, _) => match &event.document_key {
                Some(key) => self
                    .db
                    .collection::<Document>(spec.collection)
                    .find_one(key.clone(), None)
                    .await
                    .ok()
                    .flatten()
                    .or_else(|| event.document_key.clone()),
                None => None,
            },
        };

        let Some(document) = document else {
            tracing::debug!(collection = spec.collection, operation, "event without document");
            return;
        };

        let payload = json!({
            "operation": operation,
            "document": document,
        });
        self.hub.emit(spec.event, payload);

        if spec.emit_delta && event.operation_type != OperationType::Delete {
            let mut changed: Vec<String> = Vec::new();
            if let Some(update) = &event.update_description {
                changed.extend(update.updated_fields.keys().cloned());
                changed.extend(update.removed_fields.iter().cloned());
            }
            let delta = json!({
                "line_item_id": document.get_str("_id").unwrap_or_default(),
                "current_status": document.get_str("current_status").unwrap_or_default(),
                "shoe_description": document.get_str("shoe_description").unwrap_or_default(),
                "priority": document.get_str("priority").unwrap_or_default(),
                "transaction_id": document.get_str("transaction_id").unwrap_or_default(),
                "changed": changed,
                "at": chrono::Utc::now().to_rfc3339(),
            });
            self.hub.emit("lineItemDelta", delta);
        }
    }

    async fn load_cursor(&self, collection: &str) -> Result<Option<ResumeToken>, AppError> {
        let cursor = self
            .cursors
            .find_one(doc! { "_id": collection }, None)
            .await?;
        Ok(cursor.map(|c| c.token))
    }

    async fn save_cursor(&self, collection: &str, token: ResumeToken) -> Result<(), AppError> {
        let update = doc! {
            "$set": { "token": to_bson(&token).map_err(|e| AppError::InternalError(e.into()))?,
                      "updated_at": DateTime::now() }
        };
        let options = UpdateOptions::builder().upsert(true).build();
        self.cursors
            .update_one(doc! { "_id": collection }, update, options)
            .await?;
        Ok(())
    }

    async fn clear_cursor(&self, collection: &str) -> Result<(), AppError> {
        self.cursors
            .delete_one(doc! { "_id": collection }, None)
            .await?;
        Ok(())
    }
}

pub(crate) fn next_backoff(last: Duration, cap: Duration) -> Duration {
    (last * 2).min(cap)
}

fn operation_label(operation: &OperationType) -> &'static str {
    match operation {
        OperationType::Insert => "insert",
        OperationType::Update => "update",
        OperationType::Replace => "replace",
        OperationType::Delete => "delete",
        OperationType::Invalidate => "invalidate",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let cap = Duration::from_secs(30);
        let mut backoff = Duration::from_secs(1);
        let mut schedule = Vec::new();
        for _ in 0..7 {
            schedule.push(backoff.as_secs());
            backoff = next_backoff(backoff, cap);
        }
        assert_eq!(schedule, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn watched_set_covers_realtime_events() {
        let events: Vec<_> = WATCHED_COLLECTIONS.iter().map(|s| s.event).collect();
        assert_eq!(
            events,
            vec!["lineItemUpdated", "appointmentUpdated", "unavailabilityUpdated"]
        );
        assert!(WATCHED_COLLECTIONS
            .iter()
            .any(|s| s.collection == "line_items" && s.emit_delta));
    }
}
