pub mod line_items;
pub mod service_request;
pub mod transactions;
pub mod ws;

use axum::{http::StatusCode, response::IntoResponse, Json};
use mongodb::bson::{Bson, Document};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::services::get_metrics;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "shoecare-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Turn a JSON patch body into a `$set` document, silently dropping
/// restricted fields. Identifier and audit fields are never overwritable.
pub(crate) fn patch_document(
    body: serde_json::Map<String, Value>,
    restricted: &[&str],
) -> Result<Document, AppError> {
    let mut set = Document::new();
    for (key, value) in body {
        if restricted.contains(&key.as_str()) {
            continue;
        }
        let bson = Bson::try_from(value).map_err(|e| {
            AppError::Validation(vec![format!("{key}: not representable: {e}")])
        })?;
        set.insert(key, bson);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restricted_fields_are_dropped() {
        let body = json!({
            "_id": "2025-03-00001-VAL",
            "transaction_id": "2025-03-00001-VAL",
            "discount_amount": 50.0,
        });
        let Value::Object(map) = body else { unreachable!() };
        let doc = patch_document(map, &["_id", "transaction_id"]).unwrap();
        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("transaction_id"));
        assert_eq!(doc.get_f64("discount_amount").unwrap(), 50.0);
    }

    #[test]
    fn empty_patch_yields_empty_document() {
        let doc = patch_document(serde_json::Map::new(), &["_id"]).unwrap();
        assert!(doc.is_empty());
    }
}
