//! Reference-price and token-safety lookups.
//!
//! Token flags come from the Helius token-metadata endpoint; the SOL/USD
//! reference price from CoinGecko. Both calls carry short timeouts and the
//! gate fails closed when either is unavailable.

use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

const METADATA_ENDPOINT: &str = "https://api.helius.xyz/v0/tokens/metadata";
const PRICE_ENDPOINT: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Mutability flags that make a token unsafe to snipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSafety {
    pub freezable: bool,
    pub mutable_metadata: bool,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HELIUS_API_KEY is not configured")]
    MissingApiKey,
    #[error("no metadata returned for mint {0}")]
    MetadataUnavailable(Pubkey),
    #[error("reference price missing from response")]
    MissingPrice,
    #[error("oracle returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub struct OracleClient {
    client: Client,
    helius_api_key: String,
}

impl OracleClient {
    pub fn new(helius_api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            helius_api_key,
        }
    }

    /// Fetch freeze/mutability flags for a mint.
    pub async fn token_safety(&self, mint: &Pubkey) -> Result<TokenSafety, OracleError> {
        if self.helius_api_key.trim().is_empty() {
            return Err(OracleError::MissingApiKey);
        }

        let url = format!("{}?api-key={}", METADATA_ENDPOINT, self.helius_api_key);
        let body = json!({ "mintAccounts": [mint.to_string()] });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status));
        }

        let entries: Vec<MetadataEntry> = response.json().await?;
        let safety =
            safety_from_entries(&entries).ok_or(OracleError::MetadataUnavailable(*mint))?;

        debug!(
            "Token {} | freezable={} mutable={}",
            mint, safety.freezable, safety.mutable_metadata
        );
        Ok(safety)
    }

    /// Current SOL/USD reference price.
    pub async fn sol_price_usd(&self) -> Result<f64, OracleError> {
        let response = self.client.get(PRICE_ENDPOINT).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status));
        }

        let body: Value = response.json().await?;
        let price = body["solana"]["usd"]
            .as_f64()
            .ok_or(OracleError::MissingPrice)?;

        debug!("SOL reference price: ${:.2}", price);
        Ok(price)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(default, rename = "onChainAccountInfo")]
    on_chain_account_info: Option<OnChainAccountInfo>,
    #[serde(default, rename = "onChainMetadata")]
    on_chain_metadata: Option<OnChainMetadata>,
}

#[derive(Debug, Deserialize)]
struct OnChainAccountInfo {
    #[serde(default, rename = "accountInfo")]
    account_info: Option<AccountInfo>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    data: Option<AccountData>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    #[serde(default)]
    parsed: Option<ParsedData>,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    #[serde(default)]
    info: Option<MintInfo>,
}

#[derive(Debug, Deserialize)]
struct MintInfo {
    #[serde(default, rename = "freezeAuthority")]
    freeze_authority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnChainMetadata {
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default, rename = "isMutable")]
    is_mutable: bool,
}

fn safety_from_entries(entries: &[MetadataEntry]) -> Option<TokenSafety> {
    let entry = entries.first()?;

    let freezable = entry
        .on_chain_account_info
        .as_ref()
        .and_then(|info| info.account_info.as_ref())
        .and_then(|account| account.data.as_ref())
        .and_then(|data| data.parsed.as_ref())
        .and_then(|parsed| parsed.info.as_ref())
        .map(|info| info.freeze_authority.is_some())?;

    let mutable_metadata = entry
        .on_chain_metadata
        .as_ref()
        .and_then(|meta| meta.metadata.as_ref())
        .map(|meta| meta.is_mutable)?;

    Some(TokenSafety {
        freezable,
        mutable_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Vec<MetadataEntry> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn flags_extracted_from_metadata_payload() {
        let entries = parse(
            r#"[{
                "onChainAccountInfo": {
                    "accountInfo": {
                        "data": { "parsed": { "info": { "freezeAuthority": "8sD..." } } }
                    }
                },
                "onChainMetadata": { "metadata": { "isMutable": true } }
            }]"#,
        );
        let safety = safety_from_entries(&entries).unwrap();
        assert!(safety.freezable);
        assert!(safety.mutable_metadata);
    }

    #[test]
    fn absent_freeze_authority_is_not_freezable() {
        let entries = parse(
            r#"[{
                "onChainAccountInfo": {
                    "accountInfo": {
                        "data": { "parsed": { "info": { "freezeAuthority": null } } }
                    }
                },
                "onChainMetadata": { "metadata": { "isMutable": false } }
            }]"#,
        );
        let safety = safety_from_entries(&entries).unwrap();
        assert!(!safety.freezable);
        assert!(!safety.mutable_metadata);
    }

    #[test]
    fn incomplete_payload_yields_none() {
        assert!(safety_from_entries(&parse("[]")).is_none());
        assert!(safety_from_entries(&parse(r#"[{}]"#)).is_none());
        // Metadata present but account info missing still fails closed.
        let entries = parse(r#"[{ "onChainMetadata": { "metadata": { "isMutable": false } } }]"#);
        assert!(safety_from_entries(&entries).is_none());
    }
}
