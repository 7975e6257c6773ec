//! Session-token verification against the auth collaborator.
//!
//! Auth itself lives outside this service; we only check the presented
//! bearer token with the configured verify endpoint. Disabled by default so
//! local development and tests run without an auth service.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::Client;
use service_core::error::AppError;
use std::time::Duration;

use crate::config::AuthConfig;
use crate::AppState;

const EXCLUDED_PATHS: &[&str] = &["/health", "/metrics", "/realtime"];

#[derive(Clone)]
pub struct SessionVerifier {
    client: Client,
    enabled: bool,
    verify_url: Option<String>,
}

impl SessionVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build auth HTTP client"),
            enabled: config.enabled,
            verify_url: config.verify_url.clone(),
        }
    }

    async fn verify(&self, token: &str) -> Result<(), AppError> {
        let Some(url) = &self.verify_url else {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "auth enabled but no verify endpoint configured"
            )));
        };
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("auth service unreachable: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(anyhow::anyhow!(
                "session token rejected"
            )))
        }
    }
}

pub async fn session_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let verifier = &state.verifier;
    if !verifier.enabled || EXCLUDED_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return AppError::Unauthorized(anyhow::anyhow!("missing bearer token")).into_response();
    };

    match verifier.verify(token).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}
