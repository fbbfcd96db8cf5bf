//! Client-facing protocol endpoint handlers: one per wire format (spec
//! §6.3), plus the ambient `GET /v1/models` listing surfaced for each.
//! Every handler does the same thing — pick the first enabled endpoint
//! whose policy accepts this client format, dispatch, and on a retryable
//! failure try the next one — so they're all thin wrappers around
//! [`crate::scheduler`].

use axum::{
    Json,
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{scheduler, state::AppState};

pub async fn openai_chat(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "openai:chat", body.0).await
}

pub async fn openai_cli(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "openai:cli", body.0).await
}

pub async fn claude_chat(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "claude:chat", body.0).await
}

pub async fn claude_cli(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "claude:cli", body.0).await
}

pub async fn gemini_chat(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "gemini:chat", body.0).await
}

pub async fn gemini_cli(State(state): State<AppState>, body: Json<Value>) -> Response {
    handle(state, "gemini:cli", body.0).await
}

async fn handle(state: AppState, client_format: &str, body: Value) -> Response {
    let candidates = scheduler::candidates(&state, client_format);
    if candidates.is_empty() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no endpoint accepts this format");
    }

    let requested_model = body.get("model").and_then(Value::as_str).unwrap_or("").to_string();
    let client_is_stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let mut last_error = None;
    for candidate in &candidates {
        if client_is_stream {
            let mut out = Vec::new();
            let result = scheduler::dispatch_stream(&state, candidate, client_format, &requested_model, body.clone(), &mut |chunk| {
                out.extend_from_slice(&chunk);
            })
            .await;

            match result {
                Ok(()) => {
                    return Response::builder()
                        .status(StatusCode::OK)
                        .header("content-type", "text/event-stream")
                        .body(Body::from(out))
                        .expect("static headers always build a valid response");
                }
                Err(err) if err.is_retryable() => {
                    last_error = Some(err);
                    continue;
                }
                Err(err) => return error_from_upstream(err),
            }
        } else {
            match scheduler::dispatch_sync(&state, candidate, client_format, &requested_model, body.clone()).await {
                Ok(converted) => return Json(converted).into_response(),
                Err(err) if err.is_retryable() => {
                    last_error = Some(err);
                    continue;
                }
                Err(err) => return error_from_upstream(err),
            }
        }
    }

    match last_error {
        Some(err) => error_from_upstream(err),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "no endpoint available"),
    }
}

fn error_from_upstream(err: upstream::UpstreamError) -> Response {
    let status = match &err {
        upstream::UpstreamError::HttpStatus { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        upstream::UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        upstream::UpstreamError::ClientDisconnected => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

/// `GET /v1/models`: lists the format-appropriate subset of configured
/// endpoint names as model ids. Real catalogue metadata (context windows,
/// capabilities) lives with the provider; this gateway only knows endpoint
/// names, so that's what it reports.
async fn list_models(state: AppState, client_format: &'static str) -> Json<Value> {
    let ids: Vec<Value> = scheduler::candidates(&state, client_format)
        .into_iter()
        .map(|candidate| json!({"id": candidate.name, "object": "model"}))
        .collect();

    Json(json!({"object": "list", "data": ids}))
}

pub async fn list_openai_models(State(state): State<AppState>) -> Json<Value> {
    list_models(state, "openai:chat").await
}

pub async fn list_claude_models(State(state): State<AppState>) -> Json<Value> {
    list_models(state, "claude:chat").await
}

pub async fn list_gemini_models(State(state): State<AppState>) -> Json<Value> {
    list_models(state, "gemini:chat").await
}
