use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

use super::patch_document;
use crate::dtos::{LineItemListQuery, LineItemListResponse};
use crate::models::line_item::{STATUS_PICKED_UP, STATUS_READY_FOR_PICKUP};
use crate::AppState;

const RESTRICTED_FIELDS: &[&str] = &[
    "_id",
    "line_item_id",
    "transaction_id",
    "cust_id",
    "branch_id",
    "latest_update",
    "pick_up_notice",
];

/// `GET /line-items?branch_id=`: the branch's active queue. Picked-up items
/// are excluded.
pub async fn list_line_items(
    State(state): State<AppState>,
    Query(query): Query<LineItemListQuery>,
) -> Result<Json<LineItemListResponse>, AppError> {
    let line_items = state.repository.active_line_items(&query.branch_id).await?;
    Ok(Json(LineItemListResponse { line_items }))
}

/// `PUT /line-items/:line_item_id`: workflow patch. Refreshes
/// `latest_update`; a transition to "Ready for Pickup" stamps
/// `pick_up_notice` and fires a best-effort push alert. `storage_fee`
/// accumulates via increment, never replaced.
pub async fn update_line_item(
    State(state): State<AppState>,
    Path(line_item_id): Path<String>,
    Json(mut body): Json<serde_json::Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let existing = state
        .repository
        .find_line_item(&line_item_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("line item not found: {line_item_id}"))
        })?;

    let new_status = body
        .get("current_status")
        .and_then(Value::as_str)
        .map(str::to_string);

    // Picked-up items never revert through the normal flow.
    if existing.current_status == STATUS_PICKED_UP
        && new_status.as_deref().is_some_and(|s| s != STATUS_PICKED_UP)
    {
        return Err(AppError::Validation(vec![
            "current_status: picked-up items cannot be reverted".to_string(),
        ]));
    }

    let inc_storage_fee = body
        .remove("storage_fee")
        .and_then(|v| v.as_f64())
        .filter(|fee| *fee != 0.0);

    let mut set = patch_document(body, RESTRICTED_FIELDS)?;

    let newly_ready = new_status.as_deref() == Some(STATUS_READY_FOR_PICKUP)
        && existing.current_status != STATUS_READY_FOR_PICKUP;
    if newly_ready {
        set.insert("pick_up_notice", mongodb::bson::DateTime::now());
    }

    let updated = state
        .repository
        .patch_line_item(&line_item_id, set, inc_storage_fee)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("line item not found: {line_item_id}"))
        })?;

    if newly_ready {
        let push = state.push.clone();
        let recipient = updated.cust_id.clone();
        let description = updated.shoe_description.clone();
        tokio::spawn(async move {
            if let Err(err) = push
                .notify(
                    &recipient,
                    "Ready for Pickup",
                    &format!("Your pair \"{description}\" is ready for pickup."),
                )
                .await
            {
                tracing::warn!(%recipient, %err, "pickup push delivery failed");
            }
        });
    }

    Ok(Json(json!({ "success": true, "lineItem": updated })))
}
