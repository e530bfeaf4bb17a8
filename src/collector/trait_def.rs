use crate::models::{Event, Website};
use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("request failed with status {0}")]
    Status(StatusCode),
    #[error("request to collector failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to decode collector response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type CollectorResult<T> = Result<T, CollectorError>;

/// Remote analytics service the feeder talks to.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Exchange username/password for a bearer token
    async fn authenticate(&self, username: &str, password: &str) -> CollectorResult<String>;

    /// List known websites, optionally scoped to a team
    async fn list_websites(
        &self,
        token: &str,
        team_id: Option<&str>,
    ) -> CollectorResult<Vec<Website>>;

    /// Create a website named after `domain`
    async fn create_website(
        &self,
        token: &str,
        domain: &str,
        team_id: Option<&str>,
    ) -> CollectorResult<Website>;

    /// Submit one event together with its forwarded headers.
    /// `event.website` must already be resolved.
    async fn send_event(&self, token: Option<&str>, event: &Event) -> CollectorResult<()>;
}
