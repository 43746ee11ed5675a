use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{engine::general_purpose, Engine as _};
use dotenvy::Error as DotenvError;
use serde::Deserialize;
use solana_sdk::{
    native_token::sol_to_lamports,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_JITO_ENDPOINT: &str = "https://mainnet.block-engine.jito.wtf";
const DEFAULT_MIN_LIQUIDITY_USD: f64 = 1_000.0;
const DEFAULT_SELL_DELAY_SECS: u64 = 20;
const DEFAULT_SELL_RETRY_INTERVAL_SECS: u64 = 10;
const DEFAULT_SELL_MAX_ATTEMPTS: u32 = 25;

#[derive(Clone)]
pub struct Config {
    pub env_path: PathBuf,
    pub operator: Arc<Keypair>,
    pub port: u16,
    pub rpc_url: String,
    pub jito_endpoint: String,
    pub helius_api_key: String,
    pub buy_amount_sol: f64,
    pub buy_slippage_pct: f64,
    pub sell_slippage_pct: f64,
    pub buy_priority_fees: f64,
    pub sell_priority_fees: f64,
    pub buy_tx_tip_sol: f64,
    pub sell_tx_tip_sol: f64,
    pub min_liquidity_usd: f64,
    pub sell_delay_secs: u64,
    pub sell_retry_interval_secs: u64,
    /// 0 keeps the legacy unbounded retry loop.
    pub sell_max_attempts: u32,
    pub use_jito_bundle: bool,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let env_path = env::current_dir()
            .map_err(|e| ConfigError::Io("current_dir".into(), e))?
            .join(".env");

        match dotenvy::from_path(&env_path) {
            Ok(_) => {}
            Err(DotenvError::LineParse(_, _)) | Err(DotenvError::Io(_)) if env_path.exists() => {
                return Err(ConfigError::Dotenv)
            }
            Err(_) => {
                return Err(ConfigError::MissingEnv(env_path));
            }
        }

        let raw = RawConfig::gather()?;

        let operator = Arc::new(parse_keypair(&raw.private_key)?);

        Ok(Self {
            env_path,
            operator,
            port: raw.port.unwrap_or(DEFAULT_PORT),
            rpc_url: raw.rpc_url,
            jito_endpoint: raw
                .jito_endpoint
                .unwrap_or_else(|| DEFAULT_JITO_ENDPOINT.to_string()),
            helius_api_key: raw.helius_api_key.unwrap_or_default(),
            buy_amount_sol: raw.buy_amount_sol,
            buy_slippage_pct: raw.buy_slippage_pct,
            sell_slippage_pct: raw.sell_slippage_pct,
            buy_priority_fees: raw.buy_priority_fees,
            sell_priority_fees: raw.sell_priority_fees,
            buy_tx_tip_sol: raw.buy_tx_tip.unwrap_or(0.0),
            sell_tx_tip_sol: raw.sell_tx_tip.unwrap_or(0.0),
            min_liquidity_usd: raw.min_liquidity_usd.unwrap_or(DEFAULT_MIN_LIQUIDITY_USD),
            sell_delay_secs: raw.sell_delay_secs.unwrap_or(DEFAULT_SELL_DELAY_SECS),
            sell_retry_interval_secs: raw
                .sell_retry_interval_secs
                .unwrap_or(DEFAULT_SELL_RETRY_INTERVAL_SECS),
            sell_max_attempts: raw.sell_max_attempts.unwrap_or(DEFAULT_SELL_MAX_ATTEMPTS),
            use_jito_bundle: raw.use_jito_bundle.unwrap_or(false),
        })
    }

    pub fn operator_pubkey(&self) -> Pubkey {
        self.operator.pubkey()
    }

    pub fn operator_keypair(&self) -> Arc<Keypair> {
        Arc::clone(&self.operator)
    }

    pub fn buy_amount_lamports(&self) -> u64 {
        sol_to_lamports(self.buy_amount_sol.max(0.0))
    }

    pub fn buy_tx_tip_lamports(&self) -> u64 {
        sol_to_lamports(self.buy_tx_tip_sol.max(0.0))
    }

    pub fn sell_tx_tip_lamports(&self) -> u64 {
        sol_to_lamports(self.sell_tx_tip_sol.max(0.0))
    }

    pub fn buy_slippage_bps(&self) -> u64 {
        pct_to_bps(self.buy_slippage_pct)
    }

    pub fn sell_slippage_bps(&self) -> u64 {
        pct_to_bps(self.sell_slippage_pct)
    }

    pub fn buy_compute_unit_price_microlamports(&self, cu_limit: u32) -> u64 {
        compute_unit_price_for_fee(self.buy_priority_fees, cu_limit)
    }

    pub fn sell_compute_unit_price_microlamports(&self, cu_limit: u32) -> u64 {
        compute_unit_price_for_fee(self.sell_priority_fees, cu_limit)
    }
}

fn pct_to_bps(pct: f64) -> u64 {
    (pct.clamp(0.0, 100.0) * 100.0).round() as u64
}

fn compute_unit_price_for_fee(fee: f64, cu_limit: u32) -> u64 {
    if cu_limit == 0 {
        return 0;
    }
    let micro_total = fee.max(0.0) * 1_000_000_000_000_000.0; // 1e15 microlamports
    (micro_total / cu_limit as f64)
        .max(0.0)
        .min(u64::MAX as f64) as u64
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "PRIVATE_KEY")]
    private_key: String,
    #[serde(rename = "RPC_URL")]
    rpc_url: String,
    #[serde(rename = "PORT", default, deserialize_with = "de_optional_u16")]
    port: Option<u16>,
    #[serde(
        rename = "JITO_ENDPOINT",
        default,
        deserialize_with = "de_optional_string"
    )]
    jito_endpoint: Option<String>,
    #[serde(
        rename = "HELIUS_API_KEY",
        default,
        deserialize_with = "de_optional_string"
    )]
    helius_api_key: Option<String>,
    #[serde(rename = "BUY_AMOUNT_SOL", deserialize_with = "de_f64")]
    buy_amount_sol: f64,
    #[serde(rename = "BUY_SLIPPAGE_PCT", deserialize_with = "de_f64")]
    buy_slippage_pct: f64,
    #[serde(rename = "SELL_SLIPPAGE_PCT", deserialize_with = "de_f64")]
    sell_slippage_pct: f64,
    #[serde(rename = "BUY_PRIORITY_FEES", deserialize_with = "de_f64")]
    buy_priority_fees: f64,
    #[serde(rename = "SELL_PRIORITY_FEES", deserialize_with = "de_f64")]
    sell_priority_fees: f64,
    #[serde(rename = "BUY_TX_TIP", default, deserialize_with = "de_optional_f64")]
    buy_tx_tip: Option<f64>,
    #[serde(rename = "SELL_TX_TIP", default, deserialize_with = "de_optional_f64")]
    sell_tx_tip: Option<f64>,
    #[serde(
        rename = "MIN_LIQUIDITY_USD",
        default,
        deserialize_with = "de_optional_f64"
    )]
    min_liquidity_usd: Option<f64>,
    #[serde(
        rename = "SELL_DELAY_SECS",
        default,
        deserialize_with = "de_optional_u64"
    )]
    sell_delay_secs: Option<u64>,
    #[serde(
        rename = "SELL_RETRY_INTERVAL_SECS",
        default,
        deserialize_with = "de_optional_u64"
    )]
    sell_retry_interval_secs: Option<u64>,
    #[serde(
        rename = "SELL_MAX_ATTEMPTS",
        default,
        deserialize_with = "de_optional_u32"
    )]
    sell_max_attempts: Option<u32>,
    #[serde(
        rename = "USE_JITO_BUNDLE",
        default,
        deserialize_with = "de_optional_bool"
    )]
    use_jito_bundle: Option<bool>,
}

impl RawConfig {
    fn gather() -> Result<Self, ConfigError> {
        let mut data = std::collections::BTreeMap::new();
        for (key, value) in env::vars() {
            data.insert(key, value);
        }
        let json = serde_json::to_value(&data).map_err(|e| ConfigError::Serde(e.to_string()))?;
        serde_json::from_value(json).map_err(|e| ConfigError::Serde(e.to_string()))
    }
}

fn parse_keypair(encoded: &str) -> Result<Keypair, ConfigError> {
    let trimmed = encoded.trim();

    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if let Ok(kp) = Keypair::try_from(bytes.as_slice()) {
            return Ok(kp);
        }
    }

    if let Ok(bytes) = general_purpose::STANDARD.decode(trimmed.as_bytes()) {
        if let Ok(kp) = Keypair::try_from(bytes.as_slice()) {
            return Ok(kp);
        }
    }

    if trimmed.starts_with('[') {
        if let Ok(vec) = serde_json::from_str::<Vec<u8>>(trimmed) {
            if let Ok(kp) = Keypair::try_from(vec.as_slice()) {
                return Ok(kp);
            }
        }
    }

    Err(ConfigError::InvalidPrivateKey)
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| serde::de::Error::custom("expected number"))
}

fn de_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }))
}

fn de_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_optional_parsed(deserializer)
}

fn de_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_optional_parsed(deserializer)
}

fn de_optional_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_optional_parsed(deserializer)
}

fn de_optional_u16<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_optional_parsed(deserializer)
}

fn de_optional_parsed<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(serde::de::Error::custom("expected number"));
        }
        trimmed
            .parse::<T>()
            .map_err(|_| serde::de::Error::custom("expected number"))
    })
    .transpose()
}

fn de_optional_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean, got {other}"
        ))),
    })
    .transpose()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine working directory for {0}")]
    Io(String, #[source] std::io::Error),
    #[error("missing .env at {0}")]
    MissingEnv(PathBuf),
    #[error("failed to parse .env file")]
    Dotenv,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("serialization error: {0}")]
    Serde(String),
}

impl ConfigError {
    pub fn missing_env_path(&self) -> Option<&Path> {
        match self {
            ConfigError::MissingEnv(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            env_path: PathBuf::new(),
            operator: Arc::new(Keypair::new()),
            port: DEFAULT_PORT,
            rpc_url: String::new(),
            jito_endpoint: DEFAULT_JITO_ENDPOINT.to_string(),
            helius_api_key: String::new(),
            buy_amount_sol: 0.01,
            buy_slippage_pct: 10.0,
            sell_slippage_pct: 5.0,
            buy_priority_fees: 0.003,
            sell_priority_fees: 0.004,
            buy_tx_tip_sol: 0.005,
            sell_tx_tip_sol: 0.006,
            min_liquidity_usd: DEFAULT_MIN_LIQUIDITY_USD,
            sell_delay_secs: DEFAULT_SELL_DELAY_SECS,
            sell_retry_interval_secs: DEFAULT_SELL_RETRY_INTERVAL_SECS,
            sell_max_attempts: DEFAULT_SELL_MAX_ATTEMPTS,
            use_jito_bundle: false,
        }
    }

    #[test]
    fn per_side_fee_helpers() {
        let config = sample_config();
        assert_eq!(
            config.buy_compute_unit_price_microlamports(100_000),
            super::compute_unit_price_for_fee(0.003, 100_000)
        );
        assert_eq!(
            config.sell_compute_unit_price_microlamports(200_000),
            super::compute_unit_price_for_fee(0.004, 200_000)
        );
        assert_eq!(config.buy_tx_tip_lamports(), sol_to_lamports(0.005));
        assert_eq!(config.sell_tx_tip_lamports(), sol_to_lamports(0.006));
    }

    #[test]
    fn slippage_percent_to_basis_points() {
        let config = sample_config();
        assert_eq!(config.buy_slippage_bps(), 1_000);
        assert_eq!(config.sell_slippage_bps(), 500);
        assert_eq!(super::pct_to_bps(0.25), 25);
        // Out-of-range values are clamped rather than rejected.
        assert_eq!(super::pct_to_bps(150.0), 10_000);
        assert_eq!(super::pct_to_bps(-1.0), 0);
    }

    #[test]
    fn zero_cu_limit_yields_zero_price() {
        assert_eq!(super::compute_unit_price_for_fee(0.01, 0), 0);
    }
}
