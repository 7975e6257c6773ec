pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use services::{
    broadcaster::RealtimeHub, intake::OrderIntake, ledger::PaymentLedger, push::PushApi,
    repository::LedgerRepository,
};
use std::sync::Arc;

use config::Config;
use middleware::session::SessionVerifier;

/// Shared application state. The realtime hub is an explicit dependency of
/// intake and ledger, never a process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: LedgerRepository,
    pub intake: OrderIntake,
    pub ledger: PaymentLedger,
    pub hub: RealtimeHub,
    pub push: Arc<dyn PushApi>,
    pub verifier: SessionVerifier,
}
