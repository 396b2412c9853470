//! Client for the external discovery worker service.
//!
//! The control plane never fetches websites itself. All crawling goes
//! through a worker speaking a small HTTP contract: `POST /discover?url=`
//! for generic discovery and `POST /profiles/{key}` for site-specific
//! profiles. Every failure mode collapses into [`WorkerError`] so run
//! finalization has a single shape to record.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

const WORKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Result payload returned by the worker for a discovery call.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryResponse {
    /// Where the links came from: 'feed', 'html', or 'sitemap'.
    pub source: String,
    #[serde(default)]
    pub links: Option<Vec<String>>,
    #[serde(default)]
    pub feeds: Option<Vec<String>>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub diagnostics: Option<Value>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker returned status {status_code}")]
    Status { status_code: u16, body: String },
    #[error("worker request timed out")]
    Timeout,
    #[error("worker request failed: {0}")]
    Transport(String),
    #[error("worker returned an unparseable body: {0}")]
    InvalidBody(String),
}

impl WorkerError {
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            WorkerError::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            WorkerError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Renders the failure as a diagnostics document for the run record.
    #[must_use]
    pub fn diagnostics(&self) -> Value {
        match self {
            WorkerError::Status { status_code, body } => json!({
                "error": self.to_string(),
                "status_code": status_code,
                "worker_response": body,
            }),
            WorkerError::Timeout => json!({
                "error": self.to_string(),
                "timeout": true,
            }),
            _ => json!({
                "error": self.to_string(),
            }),
        }
    }
}

/// The discovery seam. Handlers and the run orchestrator depend on this
/// trait, not on HTTP, so tests can substitute a stub.
#[async_trait]
pub trait DiscoveryGateway: Send + Sync {
    /// Generic link discovery for an arbitrary URL.
    async fn discover(&self, url: &str) -> Result<DiscoveryResponse, WorkerError>;

    /// Runs a named site profile on the worker.
    async fn run_profile(&self, profile_key: &str) -> Result<DiscoveryResponse, WorkerError>;
}

/// HTTP implementation of [`DiscoveryGateway`].
pub struct WorkerClient {
    base_url: String,
    client: reqwest::Client,
}

impl WorkerClient {
    pub fn new(base_url: &str) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(WORKER_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post(&self, url: String, query: &[(&str, &str)]) -> Result<DiscoveryResponse, WorkerError> {
        let response = self
            .client
            .post(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WorkerError::Timeout
                } else {
                    WorkerError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Status {
                status_code: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| WorkerError::InvalidBody(e.to_string()))
    }
}

#[async_trait]
impl DiscoveryGateway for WorkerClient {
    async fn discover(&self, url: &str) -> Result<DiscoveryResponse, WorkerError> {
        self.post(format!("{}/discover", self.base_url), &[("url", url)])
            .await
    }

    async fn run_profile(&self, profile_key: &str) -> Result<DiscoveryResponse, WorkerError> {
        self.post(format!("{}/profiles/{}", self.base_url, profile_key), &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_with_optional_fields() {
        let resp: DiscoveryResponse =
            serde_json::from_str(r#"{"source": "feed", "links": ["https://a/1"], "count": 1}"#)
                .unwrap();
        assert_eq!(resp.source, "feed");
        assert_eq!(resp.links.as_deref(), Some(&["https://a/1".to_string()][..]));
        assert!(resp.feeds.is_none());
        assert!(resp.diagnostics.is_none());
    }

    #[test]
    fn test_status_error_diagnostics() {
        let err = WorkerError::Status {
            status_code: 503,
            body: "overloaded".to_string(),
        };
        let diag = err.diagnostics();
        assert_eq!(diag["status_code"], 503);
        assert_eq!(diag["worker_response"], "overloaded");
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.raw_response(), Some("overloaded"));
    }

    #[test]
    fn test_timeout_diagnostics() {
        let diag = WorkerError::Timeout.diagnostics();
        assert_eq!(diag["timeout"], true);
        assert!(WorkerError::Timeout.status_code().is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = WorkerClient::new("http://worker:8080/").unwrap();
        assert_eq!(client.base_url, "http://worker:8080");
    }
}
