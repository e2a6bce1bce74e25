use crate::{
    api::{error::ApiError, response::ApiResponse},
    state::AppState,
    validation::validate_address,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

// POST /transactions request body
#[derive(Debug, Deserialize)]
pub struct TransactionsRequest {
    pub address: String,
    #[serde(default)]
    pub options: Value,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/transactions", post(get_transactions))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// POST /transactions handler
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransactionsRequest>,
) -> Result<Response, ApiError> {
    validate_address(&request.address)?;

    info!("Fetching transactions for address: {}", request.address);

    let page = state.cache.fetch(&request.address, &request.options).await?;

    Ok(ApiResponse::ok(format!("Transactions of {}", request.address), page.transactions)
        .with_options(page.options)
        .into_response())
}

// GET /health, also checks the store is reachable
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    sqlx::query("SELECT 1").execute(&state.db_pool).await?;
    Ok(Json(json!({ "success": true })))
}
