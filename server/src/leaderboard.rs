//! Client for the remote score service.
//!
//! Requests run off the frame path. Transient failures (connection trouble,
//! timeouts, 5xx, 408, 429) are retried with exponential backoff through an
//! explicit `RetryState` machine; validation problems and other 4xx replies
//! fail immediately.

use serde::de::DeserializeOwned;
use skull_shared::protocol::{LeaderboardEntry, ScoreAccepted, ScoreSubmission};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Longest accepted player name, in characters
pub const MAX_NAME_CHARS: usize = 16;

/// Largest top-N the client asks for
pub const MAX_TOP_LIMIT: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("invalid submission: {0}")]
    Validation(String),
    #[error("leaderboard rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("leaderboard unreachable: {0}")]
    Transient(String),
    #[error("malformed leaderboard response: {0}")]
    Decode(String),
}

impl LeaderboardError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LeaderboardError::Transient(_) => true,
            LeaderboardError::Rejected { status, .. } => is_retryable_status(*status),
            LeaderboardError::Validation(_) | LeaderboardError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for LeaderboardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LeaderboardError::Decode(e.to_string())
        } else if e.is_builder() {
            LeaderboardError::Validation(e.to_string())
        } else if let Some(status) = e.status() {
            LeaderboardError::Rejected {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            // connect, timeout, body and redirect trouble
            LeaderboardError::Transient(e.to_string())
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Backoff schedule: `initial_delay * multiplier^(n-1)` before retry `n`,
/// capped at `max_delay`, at most `max_attempts` requests in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(8),
            max_attempts: 4,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be > 0".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("retry multiplier must be >= 1".to_string());
        }
        if self.initial_delay > self.max_delay {
            return Err("retry initial_delay must be <= max_delay".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    /// `attempt` requests have failed so far; sleep `next_delay` then retry
    Retrying { attempt: u32, next_delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

impl RetryState {
    /// Fold the outcome of one request into the machine.
    pub fn advance<T>(self, policy: &RetryPolicy, result: &Result<T, LeaderboardError>) -> Self {
        let attempts = match self {
            RetryState::Idle => 1,
            RetryState::Retrying { attempt, .. } => attempt + 1,
            // Terminal states absorb further results
            done @ (RetryState::Succeeded { .. } | RetryState::Failed { .. }) => return done,
        };
        match result {
            Ok(_) => RetryState::Succeeded { attempts },
            Err(e) if e.is_retryable() && attempts < policy.max_attempts => RetryState::Retrying {
                attempt: attempts,
                next_delay: policy.delay_for(attempts),
            },
            Err(_) => RetryState::Failed { attempts },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Failed { .. }
        )
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, LeaderboardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LeaderboardError>>,
{
    let mut state = RetryState::Idle;
    loop {
        let result = op().await;
        state = state.advance(policy, &result);
        match state {
            RetryState::Retrying { attempt, next_delay } => {
                if let Err(e) = &result {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt,
                        policy.max_attempts,
                        e,
                        next_delay
                    );
                }
                tokio::time::sleep(next_delay).await;
            }
            RetryState::Failed { attempts } => {
                if let Err(e) = &result {
                    tracing::error!("{} failed after {} attempt(s): {}", what, attempts, e);
                }
                return result;
            }
            _ => return result,
        }
    }
}

/// Trim and check a player name.
pub fn validate_name(name: &str) -> Result<String, LeaderboardError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LeaderboardError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(LeaderboardError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(LeaderboardError::Validation(
            "name must not contain control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone)]
pub struct LeaderboardClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl LeaderboardClient {
    pub fn new(base_url: &str, policy: RetryPolicy) -> Result<Self, LeaderboardError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `/api/scores`.
    pub async fn submit_score(
        &self,
        name: &str,
        score: u32,
    ) -> Result<ScoreAccepted, LeaderboardError> {
        let submission = ScoreSubmission {
            name: validate_name(name)?,
            score,
        };
        let url = join_url(&self.base_url, "/api/scores");
        let (http, url, body) = (&self.http, &url, &submission);
        with_retry(&self.policy, "score submission", || async move {
            let response = http.post(url).json(body).send().await?;
            parse_response(response).await
        })
        .await
    }

    /// GET `/api/scores?limit=N`, best first.
    pub async fn top_scores(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let limit = limit.clamp(1, MAX_TOP_LIMIT);
        let url = join_url(&self.base_url, &format!("/api/scores?limit={}", limit));
        let (http, url) = (&self.http, &url);
        with_retry(&self.policy, "leaderboard fetch", || async move {
            let response = http.get(url).send().await?;
            parse_response(response).await
        })
        .await
    }
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T, LeaderboardError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| LeaderboardError::Decode(e.to_string()))
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable>".to_string());
        Err(LeaderboardError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
