use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub push: PushConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PushConfig {
    /// Notification collaborator endpoint. Push delivery is disabled when unset.
    pub base_url: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    pub enabled: bool,
    pub verify_url: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RealtimeConfig {
    pub channel_capacity: usize,
    pub backoff_floor_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("SHOECARE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SHOECARE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("SHOECARE_DATABASE_URL").expect("SHOECARE_DATABASE_URL must be set");
        let db_name =
            env::var("SHOECARE_DATABASE_NAME").unwrap_or_else(|_| "shoecare_db".to_string());

        let catalog_base_url = env::var("SHOECARE_CATALOG_URL")
            .unwrap_or_else(|_| "http://localhost:3020".to_string());
        let catalog_timeout_secs = env::var("SHOECARE_CATALOG_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let push_base_url = env::var("SHOECARE_PUSH_URL").ok();

        let auth_enabled = env::var("SHOECARE_AUTH_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let auth_verify_url = env::var("SHOECARE_AUTH_VERIFY_URL").ok();

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            catalog: CatalogConfig {
                base_url: catalog_base_url,
                timeout_secs: catalog_timeout_secs,
            },
            push: PushConfig {
                base_url: push_base_url,
            },
            auth: AuthConfig {
                enabled: auth_enabled,
                verify_url: auth_verify_url,
            },
            realtime: RealtimeConfig {
                channel_capacity: 256,
                backoff_floor_ms: 1_000,
                backoff_cap_ms: 30_000,
            },
            service_name: "shoecare-service".to_string(),
        })
    }
}
