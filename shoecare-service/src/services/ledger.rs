//! Payment ledger: applies an incremental payment against a transaction,
//! optionally releasing a line item, as one atomic unit.
//!
//! Concurrent applications against the same transaction are serialized with
//! optimistic concurrency: every write is filtered on the version read, and a
//! miss (or a transient transaction error) retries the whole attempt.

use mongodb::bson::{doc, to_bson, DateTime};
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use serde_json::json;
use service_core::error::AppError;

use crate::dtos::ApplyPaymentRequest;
use crate::models::{
    append_payment_mode, line_item::STATUS_PICKED_UP, LineItem, Payment, PaymentMode, Transaction,
};
use crate::services::broadcaster::RealtimeHub;
use crate::services::metrics::record_payment_applied;
use crate::services::repository::LedgerRepository;
use crate::services::sequence::SequenceAllocator;

const MAX_APPLY_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct PaymentLedger {
    repository: LedgerRepository,
    sequences: SequenceAllocator,
    hub: RealtimeHub,
}

struct AppliedPayment {
    transaction: Transaction,
    released_item: Option<LineItem>,
    remaining_balance: f64,
}

impl PaymentLedger {
    pub fn new(
        repository: LedgerRepository,
        sequences: SequenceAllocator,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            repository,
            sequences,
            hub,
        }
    }

    pub async fn apply_payment(
        &self,
        transaction_id: &str,
        request: &ApplyPaymentRequest,
    ) -> Result<Transaction, AppError> {
        if request.due_now < 0.0 || request.customer_paid < 0.0 {
            return Err(AppError::Validation(vec![
                "dueNow and customerPaid must not be negative".to_string(),
            ]));
        }

        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            match self.try_apply(transaction_id, request).await {
                Ok(Some(applied)) => {
                    let mode = request
                        .mode_of_payment
                        .map(|m| m.as_str())
                        .unwrap_or("None");
                    record_payment_applied(mode);
                    tracing::info!(
                        transaction_id,
                        due_now = request.due_now,
                        amount_paid = applied.transaction.amount_paid,
                        released = applied.released_item.is_some(),
                        "payment applied"
                    );

                    // Best-effort fast path; failure never fails the request.
                    if let Some(item) = &applied.released_item {
                        self.hub.emit(
                            "lineItemRowUpdate",
                            json!({
                                "lineItem": item,
                                "transaction_id": applied.transaction.transaction_id,
                                "amount_paid": applied.transaction.amount_paid,
                                "payment_status": applied.transaction.payment_status,
                                "remaining_balance": applied.remaining_balance,
                            }),
                        );
                    }
                    return Ok(applied.transaction);
                }
                Ok(None) => {
                    tracing::debug!(transaction_id, attempt, "version conflict, retrying");
                }
                Err(err) if is_transient(&err) => {
                    tracing::debug!(transaction_id, attempt, "transient abort, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Conflict(anyhow::anyhow!(
            "concurrent payment updates on {transaction_id} exhausted {MAX_APPLY_ATTEMPTS} attempts"
        )))
    }

    async fn try_apply(
        &self,
        transaction_id: &str,
        request: &ApplyPaymentRequest,
    ) -> Result<Option<AppliedPayment>, AppError> {
        let mut session = self.repository.start_txn_session().await?;
        match self
            .apply_in_session(&mut session, transaction_id, request)
            .await
        {
            Ok(Some(applied)) => {
                LedgerRepository::commit_with_retry(&mut session).await?;
                Ok(Some(applied))
            }
            Ok(None) => {
                session.abort_transaction().await.ok();
                Ok(None)
            }
            Err(err) => {
                session.abort_transaction().await.ok();
                Err(err)
            }
        }
    }

    async fn apply_in_session(
        &self,
        session: &mut mongodb::ClientSession,
        transaction_id: &str,
        request: &ApplyPaymentRequest,
    ) -> Result<Option<AppliedPayment>, AppError> {
        let transaction = self
            .repository
            .find_transaction_in_session(session, transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("transaction not found: {transaction_id}"))
            })?;

        // Resolve the item to release before any write, so an unknown id
        // fails the request with nothing persisted.
        let release_item = match (&request.line_item_id, request.mark_picked_up) {
            (Some(id), true) => Some(
                self.repository
                    .find_line_item_in_session(session, id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("line item not found: {id}"))
                    })?,
            ),
            _ => None,
        };

        let now = DateTime::now();
        let new_paid = clamp_amount_paid(
            transaction.total_amount,
            transaction.amount_paid,
            request.due_now,
        );
        let new_released = next_release_count(
            transaction.no_released,
            transaction.no_pairs,
            request.mark_picked_up,
        );
        // Trust boundary: a supplied status is stored as-is, never recomputed
        // from the paid/total ratio.
        let payment_status = request.payment_status.unwrap_or(transaction.payment_status);

        let mut payment_mode = transaction.payment_mode.clone();
        if let Some(mode) = request.mode_of_payment {
            payment_mode = append_payment_mode(&payment_mode, mode.as_str());
        }

        let mut payments = transaction.payments.clone();
        match &request.provided_payment_id {
            Some(provided) => {
                if !payments.contains(provided) {
                    payments.push(provided.clone());
                }
            }
            None if request.due_now > 0.0 => {
                let branch_code = branch_code_of(&transaction.transaction_id)?;
                let payment_id = self.sequences.next_payment_id(branch_code).await?;
                let payment = Payment {
                    payment_id: payment_id.clone(),
                    transaction_id: transaction.transaction_id.clone(),
                    payment_amount: request.due_now,
                    payment_mode: request.mode_of_payment.unwrap_or(PaymentMode::Other),
                    payment_date: now,
                };
                self.repository.insert_payment(session, &payment).await?;
                payments.push(payment_id);
            }
            None => {}
        }

        let mut set = doc! {
            "amount_paid": new_paid,
            "no_released": new_released,
            "payment_status": payment_status.as_str(),
            "payment_mode": &payment_mode,
            "payments": to_bson(&payments).map_err(|e| AppError::InternalError(e.into()))?,
        };
        let fully_released = request.mark_picked_up && new_released == transaction.no_pairs;
        if fully_released {
            // Re-set is fine; the condition holding twice stamps it again.
            set.insert("date_out", now);
        }

        let matched = self
            .repository
            .update_transaction_versioned(session, transaction_id, transaction.version, set)
            .await?;
        if !matched {
            return Ok(None);
        }

        let released_item = if let Some(item) = release_item {
            self.repository
                .mark_line_item_picked_up(session, &item.line_item_id, now)
                .await?;
            self.repository
                .bump_customer_totals(session, &transaction.cust_id, transaction.total_amount)
                .await?;
            Some(LineItem {
                current_status: STATUS_PICKED_UP.to_string(),
                latest_update: now,
                ..item
            })
        } else {
            None
        };

        let updated = Transaction {
            amount_paid: new_paid,
            no_released: new_released,
            payment_status,
            payment_mode,
            payments,
            date_out: if fully_released {
                Some(now)
            } else {
                transaction.date_out
            },
            version: transaction.version + 1,
            ..transaction
        };
        let remaining_balance = updated.total_amount - updated.amount_paid;

        Ok(Some(AppliedPayment {
            transaction: updated,
            released_item,
            remaining_balance,
        }))
    }
}

/// `amount_paid` is monotonically non-decreasing and clamped to the total;
/// overpayment is silently absorbed, never carried forward.
pub(crate) fn clamp_amount_paid(total_amount: f64, amount_paid: f64, due_now: f64) -> f64 {
    (amount_paid + due_now).min(total_amount)
}

/// `no_released` advances by one per pickup action and never exceeds
/// `no_pairs`.
pub(crate) fn next_release_count(no_released: i64, no_pairs: i64, mark_picked_up: bool) -> i64 {
    if mark_picked_up {
        (no_released + 1).min(no_pairs)
    } else {
        no_released
    }
}

fn branch_code_of(transaction_id: &str) -> Result<&str, AppError> {
    transaction_id
        .rsplit_once('-')
        .map(|(_, code)| code)
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "malformed transaction id: {transaction_id}"
            ))
        })
}

fn is_transient(err: &AppError) -> bool {
    let inner = match err {
        AppError::DatabaseError(e) | AppError::Conflict(e) => e,
        _ => return false,
    };
    inner
        .downcast_ref::<mongodb::error::Error>()
        .is_some_and(|e| e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overpayment_is_clamped_to_total() {
        assert_eq!(clamp_amount_paid(1000.0, 0.0, 1500.0), 1000.0);
    }

    #[test]
    fn exact_payment_reaches_total() {
        assert_eq!(clamp_amount_paid(500.0, 200.0, 300.0), 500.0);
    }

    #[test]
    fn partial_payment_accumulates() {
        assert_eq!(clamp_amount_paid(500.0, 100.0, 150.0), 250.0);
    }

    #[test]
    fn zero_due_leaves_paid_unchanged() {
        assert_eq!(clamp_amount_paid(500.0, 200.0, 0.0), 200.0);
    }

    #[test]
    fn release_count_never_exceeds_pairs() {
        assert_eq!(next_release_count(1, 2, true), 2);
        assert_eq!(next_release_count(2, 2, true), 2);
        assert_eq!(next_release_count(1, 2, false), 1);
    }

    #[test]
    fn branch_code_is_trailing_segment() {
        assert_eq!(branch_code_of("2025-03-00001-VAL").unwrap(), "VAL");
    }
}
