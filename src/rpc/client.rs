//! HTTP JSON-RPC client with bounded retry

use super::types::{RpcRequest, RpcResponse};
use super::{ChannelError, ControlChannel, Result};
use crate::config::RpcConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry and timeout knobs for [`RpcClient`]
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&RpcConfig> for RpcSettings {
    fn from(config: &RpcConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

/// Outcome of a single attempt that did not yield a result
enum AttemptError {
    /// Transport failure, timeout or non-2xx status
    Retryable(String),
    /// The engine answered; asking again will not help
    Fatal(ChannelError),
}

/// Control channel over HTTP POST to the engine's `/jsonrpc` endpoint
pub struct RpcClient {
    client: Client,
    endpoint: String,
    settings: RpcSettings,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>, settings: RpcSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ChannelError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            settings,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call_once(&self, request: &RpcRequest) -> std::result::Result<Value, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Retryable("request timed out".to_string())
                } else {
                    AttemptError::Retryable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Retryable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Retryable("response body timed out".to_string())
            } else {
                AttemptError::Fatal(ChannelError::MalformedResponse {
                    method: request.method.clone(),
                    reason: e.to_string(),
                })
            }
        })?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(AttemptError::Fatal(ChannelError::Remote {
                method: request.method.clone(),
                code: error.code,
                message: error.message,
            })),
            (Some(result), None) => Ok(result),
            (None, None) => Err(AttemptError::Fatal(ChannelError::MalformedResponse {
                method: request.method.clone(),
                reason: "response carries neither result nor error".to_string(),
            })),
        }
    }
}

#[async_trait]
impl ControlChannel for RpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = RpcRequest::new(method, params);
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(method, attempt = attempts, id = %request.id, "RPC call");

            match self.call_once(&request).await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!(method, attempts, "RPC call succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(AttemptError::Fatal(error)) => {
                    debug!(method, error = %error, "RPC call rejected");
                    return Err(error);
                }
                Err(AttemptError::Retryable(last_error)) => {
                    if attempts >= self.settings.max_attempts {
                        warn!(
                            method,
                            attempts,
                            error = %last_error,
                            "RPC call failed after retries"
                        );
                        return Err(ChannelError::Unreachable {
                            method: method.to_string(),
                            attempts,
                            last_error,
                        });
                    }

                    debug!(method, attempts, error = %last_error, "RPC call failed, retrying");
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
            }
        }
    }
}
