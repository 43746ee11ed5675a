//! Pool safety and liquidity policy.
//!
//! Rules run in a fixed order and the first match wins: empty reserves,
//! unsafe token mutability, then the USD liquidity floor. Reserves are
//! fetched fresh for every event; nothing here is cached.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::{
    oracle::{OracleClient, OracleError, TokenSafety},
    pool::PoolKeys,
    rpc::{LedgerClient, RpcError},
};

/// Live reserve amounts, oriented like the pool keys (base = sniped token).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub base: u64,
    pub quote: u64,
}

/// Policy rejection reasons, in evaluation order.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SafetyRejection {
    #[error("pool has insufficient liquidity for swapping")]
    InsufficientLiquidity,
    #[error("token is unsafe (freezable={freezable}, mutable metadata={mutable_metadata})")]
    UnsafeToken {
        freezable: bool,
        mutable_metadata: bool,
    },
    #[error("quote-side liquidity ${value_usd:.2} below floor ${floor_usd:.2}")]
    LiquidityTooLow { value_usd: f64, floor_usd: f64 },
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("{0}")]
    Rejected(SafetyRejection),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
}

pub struct SafetyGate {
    ledger: Arc<LedgerClient>,
    oracle: Arc<OracleClient>,
    min_liquidity_usd: f64,
}

impl SafetyGate {
    pub fn new(
        ledger: Arc<LedgerClient>,
        oracle: Arc<OracleClient>,
        min_liquidity_usd: f64,
    ) -> Self {
        Self {
            ledger,
            oracle,
            min_liquidity_usd,
        }
    }

    /// Run all policy rules against fresh on-chain and oracle state.
    /// Returns the reserves so the quote is computed from the same
    /// snapshot the gate approved.
    pub async fn check(&self, pool: &PoolKeys) -> Result<PoolReserves, GateError> {
        let reserves = PoolReserves {
            base: self.ledger.get_token_balance(&pool.base_vault).await?,
            quote: self.ledger.get_token_balance(&pool.quote_vault).await?,
        };
        // Short-circuit before any oracle traffic.
        reject_if_empty(&reserves).map_err(GateError::Rejected)?;

        // Metadata unavailable means the flags cannot be verified; treat
        // the token as unsafe rather than guessing.
        let safety = match self.oracle.token_safety(&pool.base_mint).await {
            Ok(safety) => safety,
            Err(OracleError::MetadataUnavailable(_)) => TokenSafety {
                freezable: true,
                mutable_metadata: true,
            },
            Err(err) => return Err(GateError::Oracle(err)),
        };

        let sol_price_usd = self.oracle.sol_price_usd().await?;
        evaluate(
            &reserves,
            safety,
            pool.quote_decimals,
            sol_price_usd,
            self.min_liquidity_usd,
        )
        .map_err(GateError::Rejected)?;

        info!(
            "Pool {} passed safety gate | reserves base={} quote={}",
            pool.id, reserves.base, reserves.quote
        );
        Ok(reserves)
    }
}

/// All rules in policy order, for callers that already hold the inputs.
pub fn evaluate(
    reserves: &PoolReserves,
    safety: TokenSafety,
    quote_decimals: u8,
    sol_price_usd: f64,
    floor_usd: f64,
) -> Result<(), SafetyRejection> {
    reject_if_empty(reserves)?;
    reject_if_unsafe(safety)?;
    reject_if_below_floor(reserves.quote, quote_decimals, sol_price_usd, floor_usd)
}

fn reject_if_empty(reserves: &PoolReserves) -> Result<(), SafetyRejection> {
    if reserves.base == 0 || reserves.quote == 0 {
        return Err(SafetyRejection::InsufficientLiquidity);
    }
    Ok(())
}

fn reject_if_unsafe(safety: TokenSafety) -> Result<(), SafetyRejection> {
    if safety.freezable || safety.mutable_metadata {
        return Err(SafetyRejection::UnsafeToken {
            freezable: safety.freezable,
            mutable_metadata: safety.mutable_metadata,
        });
    }
    Ok(())
}

fn reject_if_below_floor(
    quote_reserve: u64,
    quote_decimals: u8,
    sol_price_usd: f64,
    floor_usd: f64,
) -> Result<(), SafetyRejection> {
    let quote_ui = quote_reserve as f64 / 10f64.powi(quote_decimals as i32);
    let value_usd = quote_ui * sol_price_usd;
    if value_usd < floor_usd {
        return Err(SafetyRejection::LiquidityTooLow {
            value_usd,
            floor_usd,
        });
    }
    Ok(())
}
