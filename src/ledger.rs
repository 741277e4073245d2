//! 📡 Solana JSON-RPC client for the two calls the watcher needs
//!
//! - `getSignaturesForAddress` - newest signatures touching an address
//! - `getTransaction` - `jsonParsed` body of one signature
//!
//! Every failure (transport, HTTP status, RPC error object, bad body) is
//! logged and turned into an empty/absent result. The watcher keeps polling
//! through transient node trouble, so nothing here returns an error.

use crate::transaction::TransactionRecord;
use crate::types::{Address, SignatureRef};
use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Largest page `getSignaturesForAddress` accepts
pub const MAX_SIGNATURE_LIMIT: usize = 1000;

/// Read side of the ledger as seen by a watcher
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Newest first. Empty on any failure.
    async fn list_recent_signatures(
        &self,
        address: &Address,
        before: Option<&SignatureRef>,
        limit: usize,
    ) -> Vec<SignatureRef>;

    /// `None` on any failure or when the node does not know the signature.
    async fn fetch_transaction(&self, signature: &SignatureRef) -> Option<TransactionRecord>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response has neither result nor error")]
    MissingResult,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Keeps an explicit `null` result apart from a missing one
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
}

/// HTTP JSON-RPC ledger client
pub struct LedgerClient {
    client: Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl LedgerClient {
    /// `timeout` of `None` keeps the transport default (no timeout)
    pub fn new(rpc_url: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, rpc_url))
    }

    pub fn with_client(client: Client, rpc_url: impl Into<String>) -> Self {
        Self {
            client,
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Single JSON-RPC round trip. `Ok(None)` is a `null` result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.rpc_url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::HttpStatus(status));
        }

        let body = response.bytes().await?;
        let rpc: RpcResponse = serde_json::from_slice(&body)?;

        if let Some(err) = rpc.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        match rpc.result {
            Some(Value::Null) => Ok(None),
            Some(result) => Ok(Some(serde_json::from_value(result)?)),
            None => Err(LedgerError::MissingResult),
        }
    }

    async fn try_list_signatures(
        &self,
        address: &Address,
        before: Option<&SignatureRef>,
        limit: usize,
    ) -> Result<Vec<SignatureRef>, LedgerError> {
        let limit = limit.clamp(1, MAX_SIGNATURE_LIMIT);
        let params = json!([
            address.to_string(),
            { "limit": limit, "before": before.map(SignatureRef::as_str) }
        ]);

        let infos: Option<Vec<SignatureInfo>> = self.call("getSignaturesForAddress", params).await?;
        Ok(infos
            .unwrap_or_default()
            .into_iter()
            .map(|info| SignatureRef::new(info.signature))
            .collect())
    }

    async fn try_fetch_transaction(
        &self,
        signature: &SignatureRef,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let params = json!([
            signature.as_str(),
            { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
        ]);
        self.call("getTransaction", params).await
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn list_recent_signatures(
        &self,
        address: &Address,
        before: Option<&SignatureRef>,
        limit: usize,
    ) -> Vec<SignatureRef> {
        match self.try_list_signatures(address, before, limit).await {
            Ok(signatures) => {
                debug!("🔍 {} signatures for {}", signatures.len(), address.short());
                signatures
            }
            Err(e) => {
                warn!("⚠️  Error fetching signatures for {}: {}", address.short(), e);
                Vec::new()
            }
        }
    }

    async fn fetch_transaction(&self, signature: &SignatureRef) -> Option<TransactionRecord> {
        match self.try_fetch_transaction(signature).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                debug!("Transaction {} not found", signature.short());
                None
            }
            Err(e) => {
                warn!("⚠️  Error fetching transaction info {}: {}", signature.short(), e);
                None
            }
        }
    }
}
