use chrono::{Datelike, Utc};
use mongodb::bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// One counter document per scope key, bumped atomically. This replaces
/// scan-max-then-increment allocation, so two concurrent allocations in the
/// same scope cannot observe the same value. The entity `_id` unique index
/// stays in place as the backstop; a collision still fails the request with a
/// Conflict and no automatic retry.
#[derive(Clone)]
pub struct SequenceAllocator {
    counters: Collection<Counter>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    #[serde(rename = "_id")]
    key: String,
    seq: i64,
}

impl SequenceAllocator {
    pub fn new(db: &Database) -> Self {
        Self {
            counters: db.collection("counters"),
        }
    }

    async fn next(&self, key: &str) -> Result<i64, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": key }, doc! { "$inc": { "seq": 1_i64 } }, options)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("counter upsert returned no document"))
            })?;
        Ok(counter.seq)
    }

    /// `CUST-<branch_number>-<n>`, scoped per branch.
    pub async fn next_customer_id(&self, branch_number: u32) -> Result<String, AppError> {
        let n = self.next(&format!("customer:{branch_number}")).await?;
        Ok(format!("CUST-{branch_number}-{n}"))
    }

    /// `<YYYY>-<MM>-<00001-padded>-<branch_code>`, scoped per branch and
    /// calendar month.
    pub async fn next_transaction_id(&self, branch_code: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let (year, month) = (now.year(), now.month());
        let n = self
            .next(&format!("transaction:{year:04}-{month:02}-{branch_code}"))
            .await?;
        Ok(format_transaction_id(year, month, n, branch_code))
    }

    /// `PAY-<n>-<branch_code>`, scoped per branch.
    pub async fn next_payment_id(&self, branch_code: &str) -> Result<String, AppError> {
        let n = self.next(&format!("payment:{branch_code}")).await?;
        Ok(format!("PAY-{n}-{branch_code}"))
    }
}

pub fn format_transaction_id(year: i32, month: u32, seq: i64, branch_code: &str) -> String {
    format!("{year:04}-{month:02}-{seq:05}-{branch_code}")
}

/// Line-item ids are never independently allocated: they derive from the
/// parent transaction id by splicing a 3-digit 1-based item index before the
/// branch code.
pub fn derive_line_item_id(transaction_id: &str, index: usize) -> Result<String, AppError> {
    let (prefix, branch_code) = transaction_id.rsplit_once('-').ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "malformed transaction id: {transaction_id}"
        ))
    })?;
    Ok(format!("{prefix}-{:03}-{branch_code}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_format_is_stable() {
        assert_eq!(format_transaction_id(2025, 3, 1, "VAL"), "2025-03-00001-VAL");
        assert_eq!(
            format_transaction_id(2025, 12, 123, "NCR"),
            "2025-12-00123-NCR"
        );
    }

    #[test]
    fn line_item_id_derives_from_parent() {
        assert_eq!(
            derive_line_item_id("2025-03-00001-VAL", 0).unwrap(),
            "2025-03-00001-001-VAL"
        );
        assert_eq!(
            derive_line_item_id("2025-03-00001-VAL", 11).unwrap(),
            "2025-03-00001-012-VAL"
        );
    }

    #[test]
    fn malformed_parent_id_is_rejected() {
        assert!(derive_line_item_id("nodashes", 0).is_err());
    }
}
