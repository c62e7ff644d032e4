//! REST helper for the chat history endpoint.
//!
//! ERROR HANDLING
//! ==============
//! `fetch_history` never fails: any transport, status, or body problem is
//! logged and degrades to an empty history so the chat view can still open.
//! `try_fetch_history` exposes the underlying error for callers that care.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use frames::ChatMessage;
use serde::Deserialize;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("history request failed: HTTP {0}")]
    Status(u16),
    #[error("invalid history body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("history endpoint reported failure")]
    NotOk,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    data: Option<Vec<ChatMessage>>,
}

/// Fetch recent messages, oldest first. Returns an empty list on any failure.
pub async fn fetch_history(http: &reqwest::Client, config: &ClientConfig) -> Vec<ChatMessage> {
    match try_fetch_history(http, config).await {
        Ok(messages) => {
            tracing::debug!(count = messages.len(), "chat history loaded");
            messages
        }
        Err(e) => {
            tracing::warn!(error = %e, "chat history unavailable; starting empty");
            Vec::new()
        }
    }
}

/// Fetch recent messages from `GET {api_base}/api/chat/messages/?limit=N`.
///
/// # Errors
///
/// Returns [`ApiError`] for transport failures, non-success statuses,
/// unparseable bodies, and bodies with `ok: false`.
pub async fn try_fetch_history(http: &reqwest::Client, config: &ClientConfig) -> Result<Vec<ChatMessage>, ApiError> {
    let resp = http.get(config.history_url()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::Status(status.as_u16()));
    }
    let body = resp.bytes().await?;
    decode_history(&body)
}

/// Decode the `{ ok, data }` history body.
fn decode_history(body: &[u8]) -> Result<Vec<ChatMessage>, ApiError> {
    let parsed: HistoryResponse = serde_json::from_slice(body)?;
    if !parsed.ok {
        return Err(ApiError::NotOk);
    }
    Ok(parsed.data.unwrap_or_default())
}
