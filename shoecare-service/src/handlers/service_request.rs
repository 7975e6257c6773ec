use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{CreateServiceRequest, ServiceRequestResponse};
use crate::AppState;

/// `POST /service-request`: create a complete order as one atomic unit.
pub async fn create_service_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ServiceRequestResponse>), AppError> {
    let order = state.intake.create_order(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ServiceRequestResponse {
            customer: order.customer,
            line_items: order.line_items,
            transaction: order.transaction,
        }),
    ))
}
