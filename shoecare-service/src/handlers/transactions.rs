use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

use super::patch_document;
use crate::dtos::{
    ApplyPaymentRequest, ApplyPaymentResponse, PaymentListResponse, TransactionDetailResponse,
};
use crate::AppState;

/// Fields a `PUT /transactions/:id` patch may never overwrite.
const RESTRICTED_FIELDS: &[&str] = &[
    "_id",
    "transaction_id",
    "line_item_ids",
    "cust_id",
    "branch_id",
    "payments",
    "date_in",
    "version",
];

/// `POST /transactions/:transaction_id/apply-payment`
pub async fn apply_payment(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(payload): Json<ApplyPaymentRequest>,
) -> Result<Json<ApplyPaymentResponse>, AppError> {
    let transaction = state.ledger.apply_payment(&transaction_id, &payload).await?;
    Ok(Json(ApplyPaymentResponse {
        success: true,
        transaction,
    }))
}

/// `GET /transactions/:transaction_id`: the transaction with its customer and
/// line items.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionDetailResponse>, AppError> {
    let transaction = state
        .repository
        .find_transaction(&transaction_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("transaction not found: {transaction_id}"))
        })?;
    let customer = state.repository.find_customer(&transaction.cust_id).await?;
    let line_items = state
        .repository
        .line_items_for_transaction(&transaction_id)
        .await?;
    Ok(Json(TransactionDetailResponse {
        transaction,
        customer,
        line_items,
    }))
}

/// `PUT /transactions/:transaction_id`: direct field patch with
/// restricted-field filtering.
pub async fn update_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(body): Json<serde_json::Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let set = patch_document(body, RESTRICTED_FIELDS)?;
    let transaction = state
        .repository
        .patch_transaction(&transaction_id, set)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("transaction not found: {transaction_id}"))
        })?;
    Ok(Json(json!({ "success": true, "transaction": transaction })))
}

/// `DELETE /transactions/:transaction_id`: hard delete, admin use.
pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state.repository.delete_transaction(&transaction_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "transaction not found: {transaction_id}"
        )));
    }
    Ok(Json(json!({ "success": true })))
}

/// `GET /transactions/:transaction_id/payments`: the ordered payment ledger
/// rows for reconciliation.
pub async fn list_payments(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentListResponse>, AppError> {
    if state
        .repository
        .find_transaction(&transaction_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "transaction not found: {transaction_id}"
        )));
    }
    let payments = state
        .repository
        .payments_for_transaction(&transaction_id)
        .await?;
    Ok(Json(PaymentListResponse { payments }))
}
