use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Customer, LineItem, Location, Payment, PaymentMode, PaymentStatus, Priority, Transaction,
};

/// Body of `POST /service-request`: customer identity, monetary totals, and a
/// non-empty ordered list of line-item specs.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub birthdate: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub branch_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub received_by: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub total_amount: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub discount_amount: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub amount_paid: f64,
    pub payment_status: PaymentStatus,
    /// Mode of the initial payment; required when `amount_paid > 0`.
    #[serde(default)]
    pub payment_mode: Option<PaymentMode>,
    #[validate(length(min = 1, message = "at least one line item is required"))]
    #[validate(nested)]
    pub line_items: Vec<LineItemSpec>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LineItemSpec {
    pub priority: Priority,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub shoe_description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "at least one service line is required"))]
    #[validate(nested)]
    pub services: Vec<ServiceLineSpec>,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub storage_fee: Option<f64>,
    /// Defaults to Branch when omitted.
    #[serde(default)]
    pub current_location: Option<Location>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ServiceLineSpec {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub service_id: String,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequestResponse {
    pub customer: Customer,
    pub line_items: Vec<LineItem>,
    pub transaction: Transaction,
}

/// Body of `POST /transactions/:transaction_id/apply-payment`. Field names
/// follow the wire contract the POS frontend already speaks.
#[derive(Debug, Deserialize)]
pub struct ApplyPaymentRequest {
    #[serde(rename = "dueNow")]
    pub due_now: f64,
    #[serde(rename = "customerPaid")]
    pub customer_paid: f64,
    #[serde(rename = "modeOfPayment", default)]
    pub mode_of_payment: Option<PaymentMode>,
    #[serde(rename = "lineItemId", default)]
    pub line_item_id: Option<String>,
    #[serde(rename = "markPickedUp", default)]
    pub mark_picked_up: bool,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub provided_payment_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyPaymentResponse {
    pub success: bool,
    pub transaction: Transaction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetailResponse {
    pub transaction: Transaction,
    pub customer: Option<Customer>,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemListQuery {
    pub branch_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemListResponse {
    pub line_items: Vec<LineItem>,
}
