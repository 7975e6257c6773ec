//! Identifier allocation under concurrency.
//!
//! Need a MongoDB instance; run with `cargo test -- --ignored`.

mod common;

use shoecare_service::services::SequenceAllocator;
use std::collections::HashSet;

async fn test_db() -> (mongodb::Database, String) {
    let uri = std::env::var("TEST_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = mongodb::Client::with_uri_str(uri)
        .await
        .expect("Failed to connect test mongo client");
    let db_name = format!("shoecare_test_{}", uuid::Uuid::new_v4().simple());
    (client.database(&db_name), db_name)
}

#[tokio::test]
#[ignore]
async fn concurrent_transaction_ids_are_distinct() {
    common::init_tracing();
    let (db, _) = test_db().await;
    let sequences = SequenceAllocator::new(&db);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sequences = sequences.clone();
        handles.push(tokio::spawn(async move {
            sequences.next_transaction_id("VAL").await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let id = handle.await.unwrap();
        assert!(seen.insert(id.clone()), "duplicate id allocated: {id}");
    }
    assert_eq!(seen.len(), 16);

    db.drop(None).await.ok();
}

#[tokio::test]
#[ignore]
async fn sequences_are_scoped_per_branch() {
    common::init_tracing();
    let (db, _) = test_db().await;
    let sequences = SequenceAllocator::new(&db);

    let val = sequences.next_payment_id("VAL").await.unwrap();
    let ncr = sequences.next_payment_id("NCR").await.unwrap();
    let val_again = sequences.next_payment_id("VAL").await.unwrap();

    assert_eq!(val, "PAY-1-VAL");
    // A different branch starts its own counter.
    assert_eq!(ncr, "PAY-1-NCR");
    assert_eq!(val_again, "PAY-2-VAL");

    let cust = sequences.next_customer_id(2).await.unwrap();
    assert_eq!(cust, "CUST-2-1");

    db.drop(None).await.ok();
}
