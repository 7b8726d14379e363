//! Ledger RPC client
//!
//! JSON-RPC 2.0 over HTTP against a Solana-compatible endpoint. The client
//! retries transient failures with bounded exponential backoff, backs off
//! longer on rate limits, and never lets one malformed transaction poison a
//! batch: `get_transaction` degrades to `Ok(None)` for that signature.
//!
//! Retry state lives inside a single call - there are no shared counters
//! across invocations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{LedgerTransaction, SignatureInfo, LAMPORTS_PER_SOL, USDC_MINT};
use crate::types::{Result, VigilError};

/// Hard cap the external API enforces on signature pages.
const MAX_SIGNATURE_PAGE: usize = 1000;

/// Ledger operations the engine depends on.
///
/// The engine is generic over this trait so tests can substitute a fake
/// ledger with canned transactions.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Signatures touching `address`, in the upstream's native order
    /// (newest first). The client does not reorder or dedupe.
    async fn list_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>>;

    /// Fetch one transaction. `Ok(None)` covers both "unknown signature"
    /// and "response too malformed to classify".
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>>;

    /// Native balance in SOL.
    async fn get_balance(&self, address: &str) -> Result<f64>;

    /// The wallet's USDC token account, if one exists. USDC deposits land
    /// here rather than on the owner wallet, so savings checks list this
    /// address's signatures too.
    async fn usdc_token_account(&self, owner: &str) -> Result<Option<String>>;

    /// USDC balance of the wallet's token account.
    async fn usdc_balance(&self, owner: &str) -> Result<f64>;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Attempts per call before giving up (default: 3).
    pub max_attempts: u32,
    /// Base backoff after an HTTP 429, multiplied by the attempt number.
    pub rate_limit_backoff: Duration,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            rate_limit_backoff: Duration::from_millis(1000),
        }
    }
}

/// Retrying JSON-RPC ledger client
pub struct LedgerClient {
    config: LedgerClientConfig,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

impl LedgerClient {
    pub fn new(config: LedgerClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("vigil/0.1")
            .build()
            .unwrap_or_default();

        Self {
            config,
            http_client,
        }
    }

    pub fn with_defaults(rpc_url: String) -> Self {
        Self::new(LedgerClientConfig {
            rpc_url,
            ..Default::default()
        })
    }

    /// One JSON-RPC call with retry. Transient network failures and 5xx
    /// responses back off exponentially (100ms base, doubling); 429 backs
    /// off on the longer rate-limit schedule. A 2xx body that is not valid
    /// JSON-RPC surfaces as `Malformed` without further retries.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;

            let outcome = self
                .http_client
                .post(&self.config.rpc_url)
                .json(&request)
                .send()
                .await;

            let retry_err = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: RpcResponse = response.json().await.map_err(|e| {
                            VigilError::Malformed(format!("{method}: invalid JSON body: {e}"))
                        })?;

                        if let Some(err) = body.error {
                            return Err(VigilError::Malformed(format!(
                                "{method}: RPC error: {err}"
                            )));
                        }

                        return Ok(body.result.unwrap_or(Value::Null));
                    }

                    if status.as_u16() == 429 {
                        VigilError::RateLimited(format!("{method}: HTTP 429"))
                    } else {
                        VigilError::Unreachable(format!("{method}: HTTP {status}"))
                    }
                }
                Err(e) => VigilError::Unreachable(format!("{method}: {e}")),
            };

            if attempts >= self.config.max_attempts {
                return Err(retry_err);
            }

            let delay = match &retry_err {
                VigilError::RateLimited(_) => self.config.rate_limit_backoff * attempts,
                _ => Duration::from_millis(100 * 2u64.pow(attempts - 1)),
            };

            debug!(
                method = method,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %retry_err,
                "Retrying ledger RPC call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn require_address(address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(VigilError::Config("ledger address must be non-empty".into()));
        }
        Ok(())
    }

    /// First USDC token account entry for `owner`, as raw JSON.
    async fn usdc_account_entry(&self, owner: &str) -> Result<Option<Value>> {
        Self::require_address(owner)?;

        let result = self
            .rpc_call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": USDC_MINT }, { "encoding": "jsonParsed" }]),
            )
            .await?;

        Ok(result
            .get("value")
            .and_then(Value::as_array)
            .and_then(|accounts| accounts.first())
            .cloned())
    }
}

#[async_trait]
impl LedgerApi for LedgerClient {
    async fn list_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
        Self::require_address(address)?;
        let limit = limit.min(MAX_SIGNATURE_PAGE);

        let result = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit }]),
            )
            .await?;

        let entries = result.as_array().ok_or_else(|| {
            VigilError::Malformed("getSignaturesForAddress: result is not an array".into())
        })?;

        let mut signatures = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<SignatureInfo>(entry.clone()) {
                Ok(info) => signatures.push(info),
                Err(e) => {
                    // One bad entry must not sink the page.
                    warn!(address = %address, error = %e, "Skipping malformed signature entry");
                }
            }
        }

        debug!(
            address = %address,
            count = signatures.len(),
            "Listed ledger signatures"
        );

        Ok(signatures)
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>> {
        if signature.trim().is_empty() {
            return Ok(None);
        }

        let result = match self
            .rpc_call(
                "getTransaction",
                json!([
                    signature,
                    { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
                ]),
            )
            .await
        {
            Ok(result) => result,
            Err(VigilError::Malformed(e)) => {
                // Malformed detail for a single signature is not-found, not
                // a batch failure.
                warn!(signature = %signature, error = %e, "Discarding malformed transaction");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if result.is_null() {
            return Ok(None);
        }

        match LedgerTransaction::from_rpc(signature, &result) {
            Some(tx) => Ok(Some(tx)),
            None => {
                warn!(signature = %signature, "Transaction response missing message; discarding");
                Ok(None)
            }
        }
    }

    async fn get_balance(&self, address: &str) -> Result<f64> {
        Self::require_address(address)?;

        let result = self.rpc_call("getBalance", json!([address])).await?;
        let lamports = result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| VigilError::Malformed("getBalance: missing value".into()))?;

        Ok(lamports as f64 / LAMPORTS_PER_SOL)
    }

    async fn usdc_token_account(&self, owner: &str) -> Result<Option<String>> {
        let entry = self.usdc_account_entry(owner).await?;
        Ok(entry
            .as_ref()
            .and_then(|account| account.get("pubkey"))
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn usdc_balance(&self, owner: &str) -> Result<f64> {
        let entry = self.usdc_account_entry(owner).await?;
        let amount = entry
            .as_ref()
            .and_then(|account| {
                account.pointer("/account/data/parsed/info/tokenAmount/uiAmount")
            })
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerClientConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.rpc_url.starts_with("https://"));
    }

    #[test]
    fn test_empty_address_is_rejected() {
        assert!(LedgerClient::require_address("  ").is_err());
        assert!(LedgerClient::require_address("SomeWallet").is_ok());
    }

    #[tokio::test]
    async fn test_empty_signature_short_circuits() {
        let client = LedgerClient::with_defaults("http://127.0.0.1:1".to_string());
        let tx = client.get_transaction("").await.expect("no network call");
        assert!(tx.is_none());
    }
}
