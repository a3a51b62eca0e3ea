//! Plasma JSON-RPC ledger client
//!
//! Calls `plasma_unspent` with an empty address filter and a color, which
//! returns every unspent output of that color.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{LedgerClient, Unspent};
use crate::error::{LeaderboardError, Result};

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    /// Node JSON-RPC endpoint
    pub rpc_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for RpcLedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://testnet-node.leapdao.org".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct RpcLedgerClient {
    config: RpcLedgerConfig,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(config: RpcLedgerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LeaderboardError::Ledger(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let body: RpcResponse<T> = response.json().await?;
        decode_response(method, body)
    }
}

fn decode_response<T>(method: &str, body: RpcResponse<T>) -> Result<T> {
    if let Some(error) = body.error {
        return Err(LeaderboardError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    body.result
        .ok_or_else(|| LeaderboardError::Ledger(format!("{} returned no result", method)))
}

#[async_trait::async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn unspent(&self, color: u64) -> Result<Vec<Unspent>> {
        let unspent: Vec<Unspent> = self
            .call("plasma_unspent", serde_json::json!(["", color]))
            .await?;
        debug!(color, outputs = unspent.len(), "Fetched unspent outputs");
        Ok(unspent)
    }
}
