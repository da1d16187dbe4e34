use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::retry_token::gen_retry_token;

/// Per-request state threaded through a login attempt.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Caller-supplied idempotency token; one is generated when absent.
    pub retry_token: Option<String>,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { request_id: uuid::Uuid::new_v4().to_string(), retry_token: None, cancel: CancellationToken::new(), deadline: None }
    }
}

impl RequestContext {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_retry_token(mut self, token: Option<String>) -> Self {
        self.retry_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token for this logical attempt: the caller's if supplied, else a fresh one.
    pub fn effective_retry_token(&self) -> String {
        self.retry_token.clone().unwrap_or_else(gen_retry_token)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}
