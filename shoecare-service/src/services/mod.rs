pub mod broadcaster;
pub mod catalog;
pub mod change_notifier;
pub mod intake;
pub mod ledger;
pub mod metrics;
pub mod push;
pub mod repository;
pub mod sequence;

pub use broadcaster::{RealtimeEvent, RealtimeHub};
pub use catalog::{Branch, CatalogApi, HttpCatalog};
pub use change_notifier::ChangeNotifier;
pub use intake::OrderIntake;
pub use ledger::PaymentLedger;
pub use metrics::{get_metrics, init_metrics};
pub use push::{HttpPush, PushApi};
pub use repository::LedgerRepository;
pub use sequence::SequenceAllocator;
