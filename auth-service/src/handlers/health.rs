use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if let Some(db) = &state.database {
        db.health_check().await?;
    }
    Ok(Json(json!({ "status": "ok" })))
}
