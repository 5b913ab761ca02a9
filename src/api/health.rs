//! Liveness endpoint: confirms the database answers and reports how many
//! sale records have been imported.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;
use crate::db::store::SaleReader;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sale_records: i64,
}

pub async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let sale_records = state.store.count().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        sale_records,
    }))
}
