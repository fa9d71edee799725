use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;

use super::AppState;
use crate::error::CompletionError;
use crate::logger::{TraceId, request_span};
use crate::progress::model::{CompletionKind, CompletionRequest};

/// Caller payload. Only identifiers are read; anything else the client
/// sends (point values included) is dropped here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionPayload {
    course_id: Option<String>,
    module_id: Option<String>,
    activity_id: Option<String>,
    answer: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { data: CompletionPayload },
    Bare(CompletionPayload),
}

/// POST /completeModule
pub async fn complete_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, CompletionKind::Module, headers, body)
        .instrument(request_span("completeModule", &TraceId::generate()))
        .await
}

/// POST /completeActivity
pub async fn complete_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, CompletionKind::Activity, headers, body)
        .instrument(request_span("completeActivity", &TraceId::generate()))
        .await
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    "OK"
}

async fn handle(state: AppState, kind: CompletionKind, headers: HeaderMap, body: Bytes) -> Response {
    // Identity is resolved before the body is looked at, so an anonymous
    // caller always gets `unauthenticated`, whatever they sent.
    let caller = state.identity.identify(&headers);

    let request = match (parse_payload(kind, &body), &caller) {
        (Ok(request), _) => request,
        (Err(e), Some(_)) => return e.into_response(),
        (Err(_), None) => CompletionRequest::new(kind),
    };

    match state.service.complete(caller.as_ref(), request).await {
        Ok(receipt) => Json(json!({ "result": receipt })).into_response(),
        Err(e) => e.into_response(),
    }
}

fn parse_payload(kind: CompletionKind, body: &[u8]) -> Result<CompletionRequest, CompletionError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        CompletionPayload::default()
    } else {
        match serde_json::from_slice::<Envelope>(body) {
            Ok(Envelope::Wrapped { data }) => data,
            Ok(Envelope::Bare(payload)) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed payload");
                return Err(CompletionError::InvalidArgument(
                    "Request payload is malformed.".to_string(),
                ));
            }
        }
    };

    Ok(CompletionRequest {
        kind,
        course_id: payload.course_id,
        module_id: payload.module_id,
        activity_id: payload.activity_id,
        answer: payload.answer,
    })
}
