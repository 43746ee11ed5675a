//! HTTP ingress for pool-creation notifications.
//!
//! Payloads arrive as a JSON array holding one event envelope. The
//! envelope is validated strictly here - unknown shapes are rejected, not
//! partially processed - and well-formed events are shaped into
//! `PoolEvent`s for the coordinator. Handlers acknowledge immediately;
//! the single-flight decision belongs to the coordinator, not this layer.

use std::str::FromStr;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use log::{error, info, warn};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::engine::{EngineMessage, PoolEvent};

const RAYDIUM_SOURCE: &str = "RAYDIUM";
const WSOL_MINT_STR: &str = "So11111111111111111111111111111111111111112";

/// Rent funded into the fresh pool account at creation; the account delta
/// carrying exactly this change is the pool id.
const POOL_CREATION_RENT_LAMPORTS: i64 = 6_124_800;

const LAMPORTS_PER_SOL_F64: f64 = 1_000_000_000.0;

#[derive(Clone)]
pub struct WebhookState {
    events: mpsc::Sender<EngineMessage>,
}

pub fn router(events: mpsc::Sender<EngineMessage>) -> Router {
    Router::new()
        .route("/", post(handle_ping))
        .route("/ray", post(handle_ray))
        .route("/pumpkins", post(handle_pumpkins))
        .with_state(WebhookState { events })
}

/// One notification envelope as delivered by the indexer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    pub account_data: Vec<AccountDelta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub mint: String,
    #[serde(default)]
    pub token_amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    #[serde(default)]
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDelta {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub native_balance_change: i64,
}

/// Malformed envelopes; answered with a client error and no state change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event has no token transfers")]
    NoTokenTransfers,
    #[error("no non-native mint among token transfers")]
    NoTradableMint,
    #[error("invalid pubkey in payload: {0}")]
    InvalidPubkey(String),
}

/// Well-formed envelopes that are acknowledged but not traded.
#[derive(Debug, PartialEq, Eq)]
pub enum Shaped {
    Actionable(PoolEvent),
    /// Source tag is not a known pool-creation event.
    NotPoolCreation,
    /// No account delta matched the pool-creation rent constant.
    MissingPoolAccount,
}

/// Shape a validated envelope into a pool event.
///
/// The traded mint is the first transfer's mint unless that is wrapped
/// SOL, in which case the second transfer's mint is taken.
pub fn shape_pool_event(event: &WebhookEvent) -> Result<Shaped, EventError> {
    if event.source != RAYDIUM_SOURCE {
        return Ok(Shaped::NotPoolCreation);
    }
    if event.token_transfers.is_empty() {
        return Err(EventError::NoTokenTransfers);
    }

    let mut mint_str = event.token_transfers[0].mint.as_str();
    if mint_str == WSOL_MINT_STR {
        mint_str = event
            .token_transfers
            .get(1)
            .map(|transfer| transfer.mint.as_str())
            .filter(|mint| *mint != WSOL_MINT_STR)
            .ok_or(EventError::NoTradableMint)?;
    }
    let mint =
        Pubkey::from_str(mint_str).map_err(|_| EventError::InvalidPubkey(mint_str.to_string()))?;

    let Some(delta) = event
        .account_data
        .iter()
        .find(|delta| delta.native_balance_change == POOL_CREATION_RENT_LAMPORTS)
    else {
        return Ok(Shaped::MissingPoolAccount);
    };
    let pool_id = Pubkey::from_str(&delta.account)
        .map_err(|_| EventError::InvalidPubkey(delta.account.clone()))?;

    Ok(Shaped::Actionable(PoolEvent { mint, pool_id }))
}

async fn handle_ping() -> (StatusCode, &'static str) {
    info!("Webhook test ping");
    (StatusCode::OK, "Received")
}

async fn handle_ray(
    State(state): State<WebhookState>,
    payload: Result<Json<Vec<WebhookEvent>>, JsonRejection>,
) -> (StatusCode, &'static str) {
    let Ok(Json(events)) = payload else {
        return (StatusCode::BAD_REQUEST, "Malformed");
    };
    let Some(event) = events.first() else {
        return (StatusCode::BAD_REQUEST, "Malformed");
    };

    match shape_pool_event(event) {
        Ok(Shaped::Actionable(pool_event)) => {
            info!(
                "RAYDIUM LIQUIDITY POOL CREATED | pool {} | mint {}",
                pool_event.pool_id, pool_event.mint
            );
            if state
                .events
                .send(EngineMessage::PoolCreated(pool_event))
                .await
                .is_err()
            {
                error!("Trade coordinator channel closed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error");
            }
            (StatusCode::OK, "Received")
        }
        Ok(Shaped::NotPoolCreation) => (StatusCode::OK, "Received"),
        Ok(Shaped::MissingPoolAccount) => {
            warn!("Pool creation event without a matching rent delta; dropping");
            (StatusCode::OK, "Received")
        }
        Err(err) => {
            warn!("Malformed /ray payload: {err}");
            (StatusCode::BAD_REQUEST, "Malformed")
        }
    }
}

/// Pump.fun pool creations are observed and logged, not traded.
async fn handle_pumpkins(
    payload: Result<Json<Vec<WebhookEvent>>, JsonRejection>,
) -> (StatusCode, &'static str) {
    let Ok(Json(events)) = payload else {
        return (StatusCode::BAD_REQUEST, "Malformed");
    };
    let Some(event) = events.first() else {
        return (StatusCode::BAD_REQUEST, "Malformed");
    };
    let Some(first_transfer) = event.token_transfers.first() else {
        return (StatusCode::BAD_REQUEST, "Malformed");
    };

    let initial_sol = event
        .native_transfers
        .iter()
        .map(|transfer| transfer.amount)
        .max()
        .unwrap_or(0) as f64
        / LAMPORTS_PER_SOL_F64;
    let initial_tokens = event
        .token_transfers
        .iter()
        .map(|transfer| transfer.token_amount)
        .fold(0.0f64, f64::max);

    info!(
        "PUMP FUN POOL CREATED | mint {} | initial SOL {:.4} | initial tokens {}",
        first_transfer.mint, initial_sol, initial_tokens
    );

    (StatusCode::OK, "Received")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raydium_event(mints: &[&str], deltas: &[(&str, i64)]) -> WebhookEvent {
        WebhookEvent {
            source: RAYDIUM_SOURCE.to_string(),
            token_transfers: mints
                .iter()
                .map(|mint| TokenTransfer {
                    mint: mint.to_string(),
                    token_amount: 1.0,
                })
                .collect(),
            native_transfers: vec![],
            account_data: deltas
                .iter()
                .map(|(account, change)| AccountDelta {
                    account: account.to_string(),
                    native_balance_change: *change,
                })
                .collect(),
        }
    }

    #[test]
    fn selects_first_mint_when_not_native() {
        let mint = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let event = raydium_event(
            &[&mint.to_string(), WSOL_MINT_STR],
            &[(&pool.to_string(), POOL_CREATION_RENT_LAMPORTS)],
        );
        assert_eq!(
            shape_pool_event(&event).unwrap(),
            Shaped::Actionable(PoolEvent { mint, pool_id: pool })
        );
    }

    #[test]
    fn skips_wrapped_sol_in_first_position() {
        let mint = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let event = raydium_event(
            &[WSOL_MINT_STR, &mint.to_string()],
            &[(&pool.to_string(), POOL_CREATION_RENT_LAMPORTS)],
        );
        assert_eq!(
            shape_pool_event(&event).unwrap(),
            Shaped::Actionable(PoolEvent { mint, pool_id: pool })
        );
    }

    #[test]
    fn all_native_transfers_are_malformed() {
        let event = raydium_event(
            &[WSOL_MINT_STR, WSOL_MINT_STR],
            &[("x", POOL_CREATION_RENT_LAMPORTS)],
        );
        assert_eq!(shape_pool_event(&event), Err(EventError::NoTradableMint));
    }

    #[test]
    fn unknown_source_is_acknowledged_not_traded() {
        let mut event = raydium_event(&["anything"], &[]);
        event.source = "ORCA".to_string();
        assert_eq!(shape_pool_event(&event).unwrap(), Shaped::NotPoolCreation);
    }

    #[test]
    fn empty_transfer_list_is_malformed() {
        let event = raydium_event(&[], &[]);
        assert_eq!(shape_pool_event(&event), Err(EventError::NoTokenTransfers));
    }

    #[test]
    fn missing_rent_delta_is_dropped_not_traded() {
        let mint = Pubkey::new_unique();
        let event = raydium_event(
            &[&mint.to_string()],
            &[("some-account", POOL_CREATION_RENT_LAMPORTS - 1)],
        );
        assert_eq!(
            shape_pool_event(&event).unwrap(),
            Shaped::MissingPoolAccount
        );
    }

    #[test]
    fn garbage_pubkey_is_malformed() {
        let event = raydium_event(
            &["not-a-pubkey"],
            &[("also-bad", POOL_CREATION_RENT_LAMPORTS)],
        );
        assert!(matches!(
            shape_pool_event(&event),
            Err(EventError::InvalidPubkey(_))
        ));
    }

    #[test]
    fn envelope_deserializes_from_indexer_json() {
        let mint = Pubkey::new_unique();
        let pool = Pubkey::new_unique();
        let body = format!(
            r#"[{{
                "source": "RAYDIUM",
                "tokenTransfers": [{{"mint": "{mint}", "tokenAmount": 1000000.5}}],
                "nativeTransfers": [{{"amount": 5000000000}}],
                "accountData": [
                    {{"account": "{pool}", "nativeBalanceChange": 6124800}},
                    {{"account": "{mint}", "nativeBalanceChange": 0}}
                ]
            }}]"#
        );
        let events: Vec<WebhookEvent> = serde_json::from_str(&body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            shape_pool_event(&events[0]).unwrap(),
            Shaped::Actionable(PoolEvent { mint, pool_id: pool })
        );
    }
}
