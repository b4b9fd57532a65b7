use std::time::Duration;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use crate::errors::PilotError;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub model: String,
}

/// HTTP client with the request timeout the providers enforce on themselves.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a non-success HTTP status to the matching error variant.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> PilotError {
    let detail = body.chars().take(300).collect::<String>();
    match status.as_u16() {
        401 | 403 => PilotError::Authentication(format!("{} rejected the API key", provider)),
        429 => PilotError::RateLimit(format!("{} rate limit exceeded", provider)),
        408 | 504 => PilotError::Timeout(format!("{} timed out: {}", provider, detail)),
        _ => PilotError::LLMApi(format!("{} returned {}: {}", provider, status, detail)),
    }
}

/// Map a transport error, keeping timeouts distinguishable.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> PilotError {
    if e.is_timeout() {
        PilotError::Timeout(format!("{} request timed out", provider))
    } else {
        PilotError::Network(format!("{} request failed: {}", provider, e))
    }
}
