use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// Status label a line item lands in once collected; items in this state are
/// excluded from active-queue listings and never revert through normal flow.
pub const STATUS_PICKED_UP: &str = "Picked Up";
/// Initial workflow status assigned at order intake.
pub const STATUS_QUEUED: &str = "Queued";
/// Status transition that stamps `pick_up_notice` and triggers a push alert.
pub const STATUS_READY_FOR_PICKUP: &str = "Ready for Pickup";

/// One pair of shoes within a transaction, with its own service list and
/// free-form workflow status.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LineItem {
    /// Format `<year>-<month>-<transaction_seq>-<item_seq>-<branch_code>`,
    /// derived from the parent transaction id.
    #[serde(rename = "_id")]
    pub line_item_id: String,
    pub transaction_id: String,
    pub cust_id: String,
    pub branch_id: String,
    pub shoe_description: String,
    pub services: Vec<ServiceLine>,
    pub priority: Priority,
    /// Accumulates via increment operations, never replaced wholesale.
    pub storage_fee: f64,
    pub current_location: Location,
    pub current_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime>,
    /// Refreshed on every status or location mutation.
    pub latest_update: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_img: Option<String>,
    /// Set when the status first transitions to "Ready for Pickup".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick_up_notice: Option<DateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceLine {
    pub service_id: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Rush,
    Normal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Hub,
    Branch,
}
