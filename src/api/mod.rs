//! HTTP surface over [`ApprovalService`].
//!
//! - `GET /health`
//! - `POST /get_approvals?get_token_price=<bool>` with a JSON array of owner
//!   addresses. All addresses are validated before any scan starts.

pub mod dto;

use crate::codec::{InvalidAddress, validate_address};
use crate::price::{PriceService, PriceSource};
use crate::service::{ApprovalService, ScanError};
use crate::source::LogSource;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dto::{ApprovalsResponse, to_response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub struct AppState<S, P> {
    pub service: Arc<ApprovalService<S>>,
    pub prices: Arc<PriceService<P>>,
}

impl<S, P> Clone for AppState<S, P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            prices: Arc::clone(&self.prices),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApprovalsQuery {
    #[serde(default = "default_get_token_price")]
    pub get_token_price: bool,
}

const fn default_get_token_price() -> bool {
    true
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upstream(String),
}

impl From<InvalidAddress> for ApiError {
    fn from(e: InvalidAddress) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::InvalidAddress(e) => e.into(),
            ScanError::Provider(e) => ApiError::Upstream(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Upstream(message) => (StatusCode::BAD_GATEWAY, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router<S, P>(state: AppState<S, P>) -> Router
where
    S: LogSource + 'static,
    P: PriceSource + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/get_approvals", post(get_approvals::<S, P>))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Scans every owner, then prices the union of their tokens. The request
/// fails as a whole if any owner's scan failed.
async fn get_approvals<S, P>(
    State(state): State<AppState<S, P>>,
    Query(query): Query<ApprovalsQuery>,
    Json(addresses): Json<Vec<String>>,
) -> Result<Json<ApprovalsResponse>, ApiError>
where
    S: LogSource + 'static,
    P: PriceSource + 'static,
{
    let owners = addresses
        .iter()
        .map(|address| validate_address(address))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Received approval request for {} address(es)", owners.len());

    let collections = state
        .service
        .fetch_many(&owners)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|e| error!("Approval request failed: {}", e))?;

    let prices = if query.get_token_price {
        let tokens: Vec<String> = collections
            .iter()
            .flat_map(|collection| collection.events.iter())
            .map(|event| event.token_address.clone())
            .collect();
        Some(state.prices.fetch_prices(&tokens).await)
    } else {
        None
    };

    Ok(Json(to_response(&collections, prices.as_ref())))
}
