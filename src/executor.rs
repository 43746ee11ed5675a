//! Transaction submission paths.
//!
//! Two ways out: plain JSON-RPC `sendTransaction` against the configured
//! RPC, or a Jito block-engine bundle with a tip transfer. Both are
//! hand-rolled JSON-RPC over a shared keep-alive client so the hot path
//! never waits on connection setup.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use base64::{engine::general_purpose, Engine as _};
use rand::{seq::SliceRandom, thread_rng};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::{pubkey, pubkey::Pubkey, transaction::VersionedTransaction};

use crate::{config::Config, info_async};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Known Jito tip accounts; one is chosen at random per bundle.
pub const JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// The relay rejects bundles with this message when no leader slot is
/// close; treated as transient, not retried within the same attempt.
const NO_LEADER_MARKER: &str = "no connected leader up soon";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubmitPath {
    StandardRpc,
    JitoBundle,
}

impl SubmitPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitPath::StandardRpc => "StandardRpc",
            SubmitPath::JitoBundle => "JitoBundle",
        }
    }
}

impl fmt::Display for SubmitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("Standard RPC URL missing")]
    MissingRpcUrl,
    #[error("Jito endpoint missing")]
    MissingJitoEndpoint,
    #[error("{path} returned HTTP error {status:?}: {body}")]
    HttpResponse {
        path: SubmitPath,
        status: Option<reqwest::StatusCode>,
        body: String,
    },
    #[error("relay rejected bundle: {message}")]
    BundleRejected { message: String },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ExecutionError {
    /// Transient relay conditions; the attempt fails but nothing is wrong
    /// with the transaction itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::BundleRejected { message } if message.contains(NO_LEADER_MARKER))
    }
}

#[derive(Clone)]
pub struct ExecutionPipeline {
    client: Client,
    config: Arc<Config>,
}

impl ExecutionPipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: build_http_client(),
            config,
        }
    }

    pub fn random_jito_tip_address() -> Pubkey {
        random_tip_from(&JITO_TIP_ACCOUNTS)
    }

    pub fn encode_base64(tx: &VersionedTransaction) -> Result<String, ExecutionError> {
        let bytes =
            bincode::serialize(tx).map_err(|err| ExecutionError::Serialization(err.to_string()))?;
        Ok(general_purpose::STANDARD.encode(bytes))
    }

    pub fn encode_base58(tx: &VersionedTransaction) -> Result<String, ExecutionError> {
        let bytes =
            bincode::serialize(tx).map_err(|err| ExecutionError::Serialization(err.to_string()))?;
        Ok(bs58::encode(bytes).into_string())
    }

    /// Submit one signed transaction over the chosen path.
    pub async fn submit(
        &self,
        path: SubmitPath,
        tx: &VersionedTransaction,
    ) -> Result<(), ExecutionError> {
        match path {
            SubmitPath::StandardRpc => self.send_rpc(&Self::encode_base64(tx)?).await,
            SubmitPath::JitoBundle => {
                let bundle_id = self.send_bundle(vec![Self::encode_base58(tx)?]).await?;
                info_async!("Bundle accepted by relay, id {}", bundle_id);
                Ok(())
            }
        }
    }

    async fn send_rpc(&self, encoded_tx: &str) -> Result<(), ExecutionError> {
        let url = self.config.rpc_url.as_str().trim();
        if url.is_empty() {
            return Err(ExecutionError::MissingRpcUrl);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": next_request_id(),
            "method": "sendTransaction",
            "params": [
                encoded_tx,
                {
                    "encoding": "base64",
                    "skipPreflight": true,
                    "maxRetries": 0
                }
            ]
        });

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ExecutionError::Request)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ExecutionError::HttpResponse {
                path: SubmitPath::StandardRpc,
                status: Some(status),
                body: text,
            });
        }

        info_async!(
            "StandardRpc sendTransaction response {} body {}",
            status.as_u16(),
            text
        );
        Ok(())
    }

    /// Submit one or more signed transactions as an atomic bundle.
    /// Returns the relay's bundle identifier.
    pub async fn send_bundle(
        &self,
        encoded_txs: Vec<String>,
    ) -> Result<String, ExecutionError> {
        let endpoint = self.config.jito_endpoint.trim();
        if endpoint.is_empty() {
            return Err(ExecutionError::MissingJitoEndpoint);
        }
        let url = format!("{}/api/v1/bundles", endpoint.trim_end_matches('/'));

        let body = json!({
            "jsonrpc": "2.0",
            "id": next_request_id(),
            "method": "sendBundle",
            "params": [encoded_txs]
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ExecutionError::Request)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ExecutionError::HttpResponse {
                path: SubmitPath::JitoBundle,
                status: Some(status),
                body: text,
            });
        }

        let parsed: SendBundleResponse = serde_json::from_str(&text)
            .map_err(|err| ExecutionError::Serialization(err.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(ExecutionError::BundleRejected {
                message: error.message,
            });
        }

        parsed.result.ok_or(ExecutionError::BundleRejected {
            message: "no bundle id in relay response".to_string(),
        })
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .tcp_nodelay(true)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct SendBundleResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    #[allow(dead_code)]
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn random_tip_from(tips: &[Pubkey]) -> Pubkey {
    let mut rng = thread_rng();
    *tips
        .choose(&mut rng)
        .expect("tip account list should not be empty")
}

fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}
