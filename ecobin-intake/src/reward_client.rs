//! HTTP client for the reward server's mint endpoint.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use ecobin_common::models::{IssuedReward, MaterialKind};

use crate::config::RetryPolicy;
use crate::error::{IntakeError, MintError};

pub const API_KEY_HEADER: &str = "X-API-KEY";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardClient: Send + Sync {
    /// Requests one reward token for `material`. Retries only where the
    /// server provably did not mint.
    async fn mint(&self, material: MaterialKind) -> Result<IssuedReward, MintError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpRewardClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    retry: RetryPolicy,
}

impl HttpRewardClient {
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>, retry: RetryPolicy) -> Result<Self, IntakeError> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(IntakeError::Config("api token must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_token,
            retry,
        })
    }

    async fn mint_once(&self, material: MaterialKind) -> Result<IssuedReward, MintError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_token)
            .json(&json!({ "material": material }))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if status.is_success() {
            // The server has minted by now; an unreadable body must not trigger a retry.
            return resp
                .json::<IssuedReward>()
                .await
                .map_err(|e| MintError::Indeterminate(format!("unreadable mint response: {}", e)));
        }

        let message = match resp.text().await {
            Ok(body) => serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body),
            Err(e) => e.to_string(),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED => MintError::Unauthorized,
            StatusCode::BAD_REQUEST => MintError::InvalidMaterial(message),
            s if s.is_server_error() => MintError::Unavailable(format!("{}: {}", s, message)),
            s => MintError::Rejected(s.as_u16(), message),
        })
    }

    async fn mint_with_retry(&self, material: MaterialKind) -> Result<IssuedReward, MintError> {
        let mut attempt = 1;
        loop {
            match self.mint_once(material).await {
                Ok(issued) => {
                    debug!("Minted {} after {} attempt(s)", issued.token, attempt);
                    return Ok(issued);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!("Mint attempt {}/{} failed: {}; retrying in {:?}", attempt, self.retry.max_attempts, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Connection failures happen before the request reaches the server.
/// Anything else might have been processed.
fn classify_transport_error(e: reqwest::Error) -> MintError {
    if e.is_connect() {
        MintError::Unavailable(e.to_string())
    } else if e.is_timeout() {
        MintError::Indeterminate(format!("request timed out: {}", e))
    } else {
        MintError::Indeterminate(e.to_string())
    }
}

#[async_trait]
impl RewardClient for HttpRewardClient {
    async fn mint(&self, material: MaterialKind) -> Result<IssuedReward, MintError> {
        let budget = self.retry.total_budget();
        info!("Requesting {} reward from {}", material, self.endpoint);
        match tokio::time::timeout(budget, self.mint_with_retry(material)).await {
            Ok(result) => result,
            Err(_) => Err(MintError::Indeterminate(format!("mint did not finish within {:?}", budget))),
        }
    }
}
