//! Common test utilities for shoecare-service integration tests.
//!
//! These tests need a MongoDB replica set (transactions and change streams);
//! point TEST_MONGODB_URI at one and run with `cargo test -- --ignored`.

use async_trait::async_trait;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::error::AppError;
use shoecare_service::config::{
    AuthConfig, CatalogConfig, Config, DatabaseConfig, PushConfig, RealtimeConfig, ServerConfig,
};
use shoecare_service::services::broadcaster::RealtimeHub;
use shoecare_service::services::catalog::{Branch, CatalogApi};
use shoecare_service::services::push::PushApi;
use shoecare_service::startup::Application;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,shoecare_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory catalog: two branches and a small service menu.
pub struct StubCatalog;

pub const BRANCH_VAL: &str = "branch-val";
pub const BRANCH_NCR: &str = "branch-ncr";

#[async_trait]
impl CatalogApi for StubCatalog {
    async fn verify_services(&self, service_ids: &[String]) -> Result<Vec<String>, AppError> {
        let known = ["svc-basic", "svc-deep", "svc-reglue"];
        Ok(service_ids
            .iter()
            .filter(|id| !known.contains(&id.as_str()))
            .cloned()
            .collect())
    }

    async fn branch(&self, branch_id: &str) -> Result<Option<Branch>, AppError> {
        let branch = match branch_id {
            BRANCH_VAL => Some(Branch {
                branch_id: BRANCH_VAL.to_string(),
                branch_code: "VAL".to_string(),
                branch_number: 2,
            }),
            BRANCH_NCR => Some(Branch {
                branch_id: BRANCH_NCR.to_string(),
                branch_code: "NCR".to_string(),
                branch_number: 1,
            }),
            _ => None,
        };
        Ok(branch)
    }
}

/// Records every push instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingPush {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl PushApi for RecordingPush {
    async fn notify(&self, recipient: &str, title: &str, _body: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), title.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub db: mongodb::Database,
    pub db_name: String,
    pub hub: RealtimeHub,
    pub push: RecordingPush,
    pub realtime_config: RealtimeConfig,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_tracing();

        let db_name = format!("shoecare_test_{}", uuid::Uuid::new_v4().simple());
        let mongo_uri = std::env::var("TEST_MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let realtime_config = RealtimeConfig {
            channel_capacity: 64,
            backoff_floor_ms: 50,
            backoff_cap_ms: 500,
        };
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new(mongo_uri),
                db_name: db_name.clone(),
            },
            catalog: CatalogConfig {
                base_url: "http://unused.invalid".to_string(),
                timeout_secs: 1,
            },
            push: PushConfig { base_url: None },
            auth: AuthConfig {
                enabled: false,
                verify_url: None,
            },
            realtime: realtime_config.clone(),
            service_name: "shoecare-service-test".to_string(),
        };

        let push = RecordingPush::default();
        let app = Application::build_with(config, Arc::new(StubCatalog), Arc::new(push.clone()))
            .await
            .expect("Failed to build application");

        let port = app.port();
        let hub = app.hub();
        let client = mongodb::Client::with_uri_str(
            std::env::var("TEST_MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
        )
        .await
        .expect("Failed to connect test mongo client");
        let db = client.database(&db_name);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections.
        let address = format!("http://127.0.0.1:{port}");
        let http = reqwest::Client::new();
        for _ in 0..20 {
            if http.get(format!("{address}/health")).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        Self {
            address,
            db,
            db_name,
            hub,
            push,
            realtime_config,
        }
    }

    /// A standard two-pair order body against the VAL branch.
    pub fn order_body(first_name: &str, amount_paid: f64) -> Value {
        json!({
            "first_name": first_name,
            "last_name": "Reyes",
            "birthdate": "1993-06-15",
            "contact_number": "09170000001",
            "branch_id": BRANCH_VAL,
            "received_by": "staff-01",
            "total_amount": 500.0,
            "discount_amount": 0.0,
            "amount_paid": amount_paid,
            "payment_status": if amount_paid > 0.0 { "PARTIAL" } else { "NP" },
            "payment_mode": "Cash",
            "line_items": [
                {
                    "priority": "Normal",
                    "shoe_description": "White AF1",
                    "services": [ { "service_id": "svc-basic", "quantity": 1 } ]
                },
                {
                    "priority": "Rush",
                    "shoe_description": "Suede loafers",
                    "services": [ { "service_id": "svc-deep", "quantity": 1 } ]
                }
            ]
        })
    }

    pub async fn create_order(&self, client: &reqwest::Client, body: &Value) -> Value {
        let response = client
            .post(format!("{}/service-request", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "order creation failed");
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn count(&self, collection: &str) -> u64 {
        self.db
            .collection::<mongodb::bson::Document>(collection)
            .count_documents(None, None)
            .await
            .expect("count failed")
    }

    pub async fn cleanup(self) {
        self.db.drop(None).await.ok();
    }
}
