//! HTTP surface for the callable completion endpoints.
//!
//! Requests use the callable envelope `{"data": {...}}` (a bare payload
//! object is accepted too). Successes answer `{"result": receipt}`, failures
//! `{"error": {"status": code, "message": text}}`.

pub mod handlers;
pub mod identity;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::error::CompletionError;
use crate::progress::service::CompletionService;
use identity::IdentityProvider;

/// Shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CompletionService>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/completeModule", post(handlers::complete_module))
        .route("/completeActivity", post(handlers::complete_activity))
        .route("/health", get(handlers::health))
        .with_state(state)
}

impl CompletionError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            CompletionError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CompletionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CompletionError::AlreadyCompleted(_) => StatusCode::CONFLICT,
            CompletionError::NotFound(_) => StatusCode::NOT_FOUND,
            CompletionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CompletionError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "status": self.code(),
                "message": self.message(),
            }
        });
        (self.http_status(), Json(body)).into_response()
    }
}
