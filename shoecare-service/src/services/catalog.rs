//! Catalog collaborator client.
//!
//! The catalog service owns branches and the service menu. Order intake only
//! needs two things from it: batch existence checks for service ids and
//! branch-code lookups.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;

use crate::config::CatalogConfig;

/// A branch as the catalog describes it. `branch_code` feeds transaction and
/// payment id templates, `branch_number` feeds customer ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: String,
    pub branch_code: String,
    pub branch_number: u32,
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Batch existence check. Returns the subset of `service_ids` the catalog
    /// does not know; empty means all valid.
    async fn verify_services(&self, service_ids: &[String]) -> Result<Vec<String>, AppError>;

    /// Resolve a branch by id. `None` when the branch does not exist.
    async fn branch(&self, branch_id: &str) -> Result<Option<Branch>, AppError>;
}

#[derive(Debug, Serialize)]
struct VerifyServicesRequest<'a> {
    service_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct VerifyServicesResponse {
    invalid_ids: Vec<String>,
}

/// HTTP client for the catalog service.
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build catalog HTTP client");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn verify_services(&self, service_ids: &[String]) -> Result<Vec<String>, AppError> {
        let url = format!("{}/services/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifyServicesRequest { service_ids })
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("catalog unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "catalog returned {} for service verification",
                response.status()
            )));
        }

        let body: VerifyServicesResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("catalog response malformed: {e}")))?;
        Ok(body.invalid_ids)
    }

    async fn branch(&self, branch_id: &str) -> Result<Option<Branch>, AppError> {
        let url = format!("{}/branches/{}", self.base_url, branch_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("catalog unreachable: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "catalog returned {} for branch lookup",
                response.status()
            )));
        }

        let branch: Branch = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("catalog response malformed: {e}")))?;
        Ok(Some(branch))
    }
}
