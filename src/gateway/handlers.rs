//! HTTP request handlers.
//!
//! A search request passes, in order: readiness, admission, validation,
//! engine call. The first stage that fails decides the response.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use crate::validate::RegionCode;

const INVALID_ESTADO: &str = "invalid estado, use 2 letters (e.g. SP)";

#[derive(Debug, Default)]
pub struct SearchParams {
    pub estado: Option<String>,
}

impl SearchParams {
    /// The first `estado` wins; repeats are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let estado = pairs
            .into_iter()
            .find(|(key, _)| key == "estado")
            .map(|(_, value)| value);
        Self { estado }
    }
}

/// Raw query pairs. A malformed query string is kept as a rejection so it can
/// be reported after the readiness and admission checks.
pub type SearchQuery = Result<Query<Vec<(String, String)>>, QueryRejection>;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
}

/// Reports readiness only. Touches neither the limiter nor the pipe.
pub async fn health(State(state): State<AppState>) -> Response {
    if state.engine.state.is_ready() {
        let body = HealthResponse {
            status: "up".to_string(),
            engine: "ready".to_string(),
        };
        (StatusCode::OK, Json(body)).into_response()
    } else {
        let body = HealthResponse {
            status: "down".to_string(),
            engine: "initializing_or_failed".to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Forwards the engine's reply line verbatim as the JSON body.
pub async fn search(
    State(state): State<AppState>,
    query: SearchQuery,
) -> Result<Response, ApiError> {
    if !state.engine.state.is_ready() {
        return Err(ApiError::NotReady);
    }

    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited);
    }

    let params = match query {
        Ok(Query(pairs)) => SearchParams::from_pairs(pairs),
        Err(rejection) => {
            debug!("unparseable query string: {}", rejection);
            SearchParams::default()
        }
    };
    let code = params
        .estado
        .as_deref()
        .and_then(RegionCode::parse)
        .ok_or_else(|| ApiError::InvalidInput(INVALID_ESTADO.to_string()))?;

    debug!(estado = %code, "querying engine");
    let reply = state.engine.pipe.query(&code).await?;

    Ok(([(header::CONTENT_TYPE, "application/json")], reply).into_response())
}
