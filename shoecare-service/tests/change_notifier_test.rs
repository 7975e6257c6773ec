//! Change-notification layer integration tests.
//!
//! Need a MongoDB replica set (change streams); run with
//! `cargo test -- --ignored`.

mod common;

use common::TestApp;
use mongodb::bson::doc;
use shoecare_service::config::RealtimeConfig;
use shoecare_service::services::broadcaster::{RealtimeEvent, RealtimeHub};
use shoecare_service::services::ChangeNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

async fn next_event_named(rx: &mut Receiver<RealtimeEvent>, name: &str) -> RealtimeEvent {
    timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("hub closed");
            if event.event == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

#[tokio::test]
#[ignore]
async fn line_item_writes_reach_subscribers_with_delta() {
    let app = TestApp::spawn().await;
    let mut rx = app.hub.subscribe();

    app.db
        .collection::<mongodb::bson::Document>("line_items")
        .insert_one(
            doc! {
                "_id": "2025-01-00001-001-VAL",
                "transaction_id": "2025-01-00001-VAL",
                "current_status": "Queued",
                "shoe_description": "White AF1",
                "priority": "Normal",
            },
            None,
        )
        .await
        .unwrap();

    let updated = next_event_named(&mut rx, "lineItemUpdated").await;
    assert_eq!(updated.payload["operation"], "insert");
    assert_eq!(updated.payload["document"]["_id"], "2025-01-00001-001-VAL");

    let delta = next_event_named(&mut rx, "lineItemDelta").await;
    assert_eq!(delta.payload["line_item_id"], "2025-01-00001-001-VAL");
    assert_eq!(delta.payload["current_status"], "Queued");
    assert_eq!(delta.payload["transaction_id"], "2025-01-00001-VAL");

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn appointment_writes_reach_subscribers() {
    let app = TestApp::spawn().await;
    let mut rx = app.hub.subscribe();

    app.db
        .collection::<mongodb::bson::Document>("appointments")
        .insert_one(doc! { "_id": "appt-1", "slot": "2025-01-10T09:00:00Z" }, None)
        .await
        .unwrap();

    let event = next_event_named(&mut rx, "appointmentUpdated").await;
    assert_eq!(event.payload["operation"], "insert");
    assert_eq!(event.payload["document"]["_id"], "appt-1");

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn deletes_carry_the_document_key() {
    let app = TestApp::spawn().await;

    let collection = app
        .db
        .collection::<mongodb::bson::Document>("unavailability");
    collection
        .insert_one(doc! { "_id": "block-1", "reason": "holiday" }, None)
        .await
        .unwrap();

    let mut rx = app.hub.subscribe();
    collection
        .delete_one(doc! { "_id": "block-1" }, None)
        .await
        .unwrap();

    let event = next_event_named(&mut rx, "unavailabilityUpdated").await;
    assert_eq!(event.payload["operation"], "delete");
    assert_eq!(event.payload["document"]["_id"], "block-1");

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn invalid_resume_position_is_discarded_and_delivery_recovers() {
    common::init_tracing();
    let uri = std::env::var("TEST_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = mongodb::Client::with_uri_str(uri)
        .await
        .expect("Failed to connect test mongo client");
    let db = client.database(&format!("shoecare_test_{}", uuid::Uuid::new_v4().simple()));

    // A stored position the server will reject, as after a datastore reset.
    let cursors = db.collection::<mongodb::bson::Document>("stream_cursors");
    cursors
        .insert_one(
            doc! {
                "_id": "line_items",
                "token": { "_data": "826500000000000000012B022C0100296E5A1004" },
                "updated_at": mongodb::bson::DateTime::now(),
            },
            None,
        )
        .await
        .unwrap();

    let config = RealtimeConfig {
        channel_capacity: 16,
        backoff_floor_ms: 50,
        backoff_cap_ms: 500,
    };
    let hub = RealtimeHub::new(16);
    let mut rx = hub.subscribe();
    let notifier = Arc::new(ChangeNotifier::new(db.clone(), hub, &config));
    let _watchers = notifier.spawn();

    // The failed open discards the stored position.
    timeout(Duration::from_secs(10), async {
        while cursors
            .find_one(doc! { "_id": "line_items" }, None)
            .await
            .unwrap()
            .is_some()
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("stored resume position never discarded");

    // Give the fresh reconnect time to open before writing.
    tokio::time::sleep(Duration::from_secs(2)).await;

    db.collection::<mongodb::bson::Document>("line_items")
        .insert_one(
            doc! { "_id": "item-after-reset", "current_status": "Queued" },
            None,
        )
        .await
        .unwrap();

    let event = next_event_named(&mut rx, "lineItemUpdated").await;
    assert_eq!(event.payload["document"]["_id"], "item-after-reset");

    db.drop(None).await.ok();
}

#[tokio::test]
#[ignore]
async fn acknowledged_events_are_not_redelivered_after_restart() {
    let app = TestApp::spawn().await;
    let mut rx = app.hub.subscribe();
    let collection = app.db.collection::<mongodb::bson::Document>("line_items");

    collection
        .insert_one(doc! { "_id": "item-a", "current_status": "Queued" }, None)
        .await
        .unwrap();
    next_event_named(&mut rx, "lineItemUpdated").await;

    // The delivery above persisted a resume position.
    let stored = timeout(Duration::from_secs(10), async {
        loop {
            let found = app
                .db
                .collection::<mongodb::bson::Document>("stream_cursors")
                .find_one(doc! { "_id": "line_items" }, None)
                .await
                .unwrap();
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("resume position never persisted");
    assert!(stored.unwrap().contains_key("token"));

    // A second notifier on the same database stands in for a restarted
    // process: it resumes past item-a and only sees what comes next.
    let hub = RealtimeHub::new(16);
    let mut fresh_rx = hub.subscribe();
    let notifier = Arc::new(ChangeNotifier::new(
        app.db.clone(),
        hub,
        &app.realtime_config,
    ));
    let _watchers = notifier.spawn();

    collection
        .insert_one(doc! { "_id": "item-b", "current_status": "Queued" }, None)
        .await
        .unwrap();

    let event = next_event_named(&mut fresh_rx, "lineItemUpdated").await;
    assert_eq!(event.payload["document"]["_id"], "item-b");

    app.cleanup().await;
}
