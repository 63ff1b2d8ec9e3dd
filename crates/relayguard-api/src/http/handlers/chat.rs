//! Chat endpoints: send a message, clear history, render the transcript.
//!
//! `POST /api/v1/chat/message` streams the pipeline's paced fragments
//! back as a plain-text body. The response body is produced lazily; if
//! the client disconnects mid-delivery, axum drops the stream and
//! emission stops cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;

use relayguard_core::pipeline::ChatOutcome;

use crate::http::error::AppError;
use crate::http::extractors::session::SessionIdentity;
use crate::state::AppState;

/// Request body for the message endpoint.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub prompt: String,
}

/// POST /api/v1/chat/message — run the pipeline and stream the reply.
///
/// An empty prompt returns `{"status":"empty"}` without touching the
/// session; otherwise the body is a `text/plain` stream of fragments.
pub async fn send_message(
    State(state): State<AppState>,
    session: SessionIdentity,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<Response, AppError> {
    let caller = caller_identity(&headers, peer);
    tracing::info!(session = %session.id, caller = %caller, "chat message received");

    let outcome = state.pipeline.handle(session.id, &body.prompt).await;

    let mut response = match outcome {
        ChatOutcome::Empty => Json(serde_json::json!({ "status": "empty" })).into_response(),
        ChatOutcome::Reply(fragments) => {
            let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));
            Response::builder()
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body)
                .map_err(|e| AppError::Internal(e.to_string()))?
        }
    };

    apply_session_cookie(&session, &mut response);
    Ok(response)
}

/// POST /api/v1/chat/clear — clear this session's history only.
pub async fn clear_chat(
    State(state): State<AppState>,
    session: SessionIdentity,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.store.clear(&session.id);

    let caller = caller_identity(&headers, peer);
    tracing::info!(session = %session.id, caller = %caller, "chat history cleared");

    let mut response = Json(serde_json::json!({ "status": "cleared" })).into_response();
    apply_session_cookie(&session, &mut response);
    Ok(response)
}

/// GET /api/v1/chat/transcript — the session's turns in order.
pub async fn transcript(
    State(state): State<AppState>,
    session: SessionIdentity,
) -> Result<Response, AppError> {
    let turns = state.store.transcript(&session.id).await;
    let mut response = Json(turns).into_response();
    apply_session_cookie(&session, &mut response);
    Ok(response)
}

fn apply_session_cookie(session: &SessionIdentity, response: &mut Response) {
    if let Some(cookie) = session.set_cookie() {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
}

/// Caller identity for logs: `X-Forwarded-For` when present (proxy
/// deployments), otherwise the socket peer address.
fn caller_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}
