use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One shop visit, grouping line items and payments by id reference.
///
/// Invariants: `0 <= amount_paid <= total_amount`; `payments` only references
/// existing Payment records; `date_out` stays null until every pair is
/// released.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    /// Format `<year>-<month>-<sequence>-<branch_code>`, e.g. `2025-03-00001-VAL`.
    #[serde(rename = "_id")]
    pub transaction_id: String,
    pub line_item_ids: Vec<String>,
    pub cust_id: String,
    pub branch_id: String,
    pub received_by: String,
    pub no_pairs: i64,
    pub no_released: i64,
    pub total_amount: f64,
    pub discount_amount: f64,
    pub amount_paid: f64,
    pub payment_status: PaymentStatus,
    /// Ordered payment ids, append-only.
    pub payments: Vec<String>,
    /// Comma-accumulated set of payment modes used, e.g. "Cash, GCash".
    pub payment_mode: String,
    pub date_in: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_out: Option<DateTime>,
    /// Optimistic-concurrency counter bumped on every ledger write.
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Np,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Np => "NP",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
        }
    }
}

/// Append `mode` to the comma-joined set unless already present
/// (case-sensitive exact match).
pub fn append_payment_mode(existing: &str, mode: &str) -> String {
    if existing.is_empty() {
        return mode.to_string();
    }
    let present = existing.split(',').map(str::trim).any(|m| m == mode);
    if present {
        existing.to_string()
    } else {
        format!("{existing}, {mode}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_mode_to_empty() {
        assert_eq!(append_payment_mode("", "Cash"), "Cash");
    }

    #[test]
    fn append_new_mode() {
        assert_eq!(append_payment_mode("Cash", "GCash"), "Cash, GCash");
    }

    #[test]
    fn append_existing_mode_is_noop() {
        assert_eq!(append_payment_mode("Cash, GCash", "GCash"), "Cash, GCash");
    }

    #[test]
    fn mode_match_is_case_sensitive() {
        assert_eq!(append_payment_mode("Cash", "cash"), "Cash, cash");
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&PaymentStatus::Partial).unwrap();
        assert_eq!(json, "\"PARTIAL\"");
        let back: PaymentStatus = serde_json::from_str("\"NP\"").unwrap();
        assert_eq!(back, PaymentStatus::Np);
    }
}
