//! Request failures and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::engine::pipe::IpcError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("engine is not ready")]
    NotReady,
    #[error("too many requests, try again shortly")]
    RateLimited,
    #[error("{0}")]
    InvalidInput(String),
    #[error("failed to read response from search engine")]
    Engine(#[from] IpcError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Engine(cause) = &self {
            error!("engine call failed: {}", cause);
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
