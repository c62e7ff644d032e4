//! Endpoint configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/chat/";
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;

/// Where the chat client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Origin of the REST API used for the history fetch.
    pub api_base: String,
    /// Live-channel WebSocket endpoint.
    pub ws_url: String,
    /// Number of messages requested from the history endpoint.
    pub history_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables, falling back to localhost.
    /// Unset, empty and whitespace-only values all take the default.
    ///
    /// Optional:
    /// - `API_BASE`: history origin, default `http://localhost:8000`
    /// - `WS_URL`: live channel, default `ws://localhost:8000/ws/chat/`
    /// - `CHAT_HISTORY_LIMIT`: default 200
    #[must_use]
    pub fn from_env() -> Self {
        let api_base = env_non_empty("API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned());
        let ws_url = env_non_empty("WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_owned());
        let history_limit = env_parse_u32("CHAT_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT);

        Self::default()
            .with_api_base(api_base)
            .with_ws_url(ws_url)
            .with_history_limit(history_limit)
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    /// Full URL of the chat history endpoint.
    #[must_use]
    pub fn history_url(&self) -> String {
        format!("{}/api/chat/messages/?limit={}", self.api_base, self.history_limit)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_owned()),
        _ => None,
    }
}

fn env_parse_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .map_or(default, |v| v.trim().parse::<u32>().unwrap_or(default))
}
