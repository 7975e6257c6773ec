//! Application startup and lifecycle management.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post, put},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::middleware::{session_middleware, SessionVerifier};
use crate::services::{
    init_metrics, CatalogApi, ChangeNotifier, HttpCatalog, HttpPush, LedgerRepository,
    OrderIntake, PaymentLedger, PushApi, RealtimeHub, SequenceAllocator,
};
use crate::AppState;

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    notifier: Arc<ChangeNotifier>,
    hub: RealtimeHub,
}

impl Application {
    /// Build with the production collaborator clients.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let catalog: Arc<dyn CatalogApi> = Arc::new(HttpCatalog::new(&config.catalog));
        let push: Arc<dyn PushApi> = Arc::new(HttpPush::new(&config.push));
        Self::build_with(config, catalog, push).await
    }

    /// Build with injected collaborators (tests swap in in-memory ones).
    pub async fn build_with(
        config: Config,
        catalog: Arc<dyn CatalogApi>,
        push: Arc<dyn PushApi>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.database.db_name);

        let repository = LedgerRepository::new(&client, &db);
        repository.init_indexes().await?;

        let sequences = SequenceAllocator::new(&db);
        let hub = RealtimeHub::new(config.realtime.channel_capacity);
        let intake = OrderIntake::new(
            repository.clone(),
            sequences.clone(),
            catalog.clone(),
            hub.clone(),
        );
        let ledger = PaymentLedger::new(repository.clone(), sequences, hub.clone());
        let verifier = SessionVerifier::new(&config.auth);
        let notifier = Arc::new(ChangeNotifier::new(db.clone(), hub.clone(), &config.realtime));

        let state = AppState {
            config: config.clone(),
            repository,
            intake,
            ledger,
            hub: hub.clone(),
            push,
            verifier,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route("/realtime", get(handlers::ws::realtime_ws))
            .route(
                "/service-request",
                post(handlers::service_request::create_service_request),
            )
            .route(
                "/transactions/:transaction_id",
                get(handlers::transactions::get_transaction)
                    .put(handlers::transactions::update_transaction)
                    .delete(handlers::transactions::delete_transaction),
            )
            .route(
                "/transactions/:transaction_id/apply-payment",
                post(handlers::transactions::apply_payment),
            )
            .route(
                "/transactions/:transaction_id/payments",
                get(handlers::transactions::list_payments),
            )
            .route("/line-items", get(handlers::line_items::list_line_items))
            .route(
                "/line-items/:line_item_id",
                put(handlers::line_items::update_line_item),
            )
            .layer(from_fn_with_state(state.clone(), session_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
            .layer(CorsLayer::permissive())
            .with_state(state);

        // Bind here so tests can ask for port 0 and read the real port back.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            notifier,
            hub,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle to the realtime hub, mainly so tests can subscribe without a
    /// websocket client.
    pub fn hub(&self) -> RealtimeHub {
        self.hub.clone()
    }

    /// Start the change-notifier subscriptions and serve until shutdown.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let _watchers = self.notifier.spawn();
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}
