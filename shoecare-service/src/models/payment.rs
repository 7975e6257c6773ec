use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One discrete money-received event against a transaction. Immutable once
/// created; the transaction's `amount_paid` reconciles with the sum of its
/// payment records by construction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    /// Format `PAY-<branch-scoped-sequence>-<branch_code>`, e.g. `PAY-1-NCR`.
    #[serde(rename = "_id")]
    pub payment_id: String,
    pub transaction_id: String,
    pub payment_amount: f64,
    pub payment_mode: PaymentMode,
    pub payment_date: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    Cash,
    GCash,
    Bank,
    Other,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::GCash => "GCash",
            PaymentMode::Bank => "Bank",
            PaymentMode::Other => "Other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serializes_as_label() {
        assert_eq!(serde_json::to_string(&PaymentMode::GCash).unwrap(), "\"GCash\"");
        assert_eq!(serde_json::to_string(&PaymentMode::Cash).unwrap(), "\"Cash\"");
    }
}
