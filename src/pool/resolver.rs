//! Resolves a pool account address into the complete key set needed to
//! build a swap against it: decoded liquidity state, decoded market state,
//! and the two program-derived authorities. Derivations are pure functions
//! of (program id, seeds) and never touch the network.

use std::sync::Arc;

use log::debug;
use solana_sdk::pubkey::Pubkey;

use super::{
    layout::{LiquidityStateV4, MarketStateV3},
    PoolResolveError, PoolResult, RAYDIUM_AMM_V4_PROGRAM_ID, WSOL_MINT,
};
use crate::rpc::LedgerClient;

/// Seed for the Raydium V4 pool authority PDA.
const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";

/// Complete key set for one Raydium V4 pool, oriented so the sniped token
/// is the base side and wrapped SOL the quote side.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolKeys {
    pub id: Pubkey,
    /// The sniped token.
    pub base_mint: Pubkey,
    /// Always wrapped SOL for pools discovered through this pipeline.
    pub quote_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Vault holding the sniped token.
    pub base_vault: Pubkey,
    /// Vault holding wrapped SOL.
    pub quote_vault: Pubkey,
    /// Vaults in the program's own stored order; instruction account metas
    /// must use these, not the oriented pair above.
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    pub lp_mint: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub program_id: Pubkey,
    pub market_program_id: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
}

/// Derive the pool authority for a Raydium V4 program id.
pub fn amm_authority(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[AMM_AUTHORITY_SEED], program_id).0
}

/// Derive the market vault signer from the market's stored nonce.
///
/// Seeds are the market id followed by the nonce as little-endian u64,
/// matching the address the market program created at listing time.
pub fn market_vault_signer(
    market_program_id: &Pubkey,
    market_id: &Pubkey,
    nonce: u64,
) -> PoolResult<Pubkey> {
    Pubkey::create_program_address(
        &[market_id.as_ref(), &nonce.to_le_bytes()],
        market_program_id,
    )
    .map_err(|_| PoolResolveError::AuthorityDerivation { nonce })
}

pub struct PoolResolver {
    ledger: Arc<LedgerClient>,
}

impl PoolResolver {
    pub fn new(ledger: Arc<LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Fetch and decode the pool and its market, derive both authorities,
    /// and assemble the oriented key set.
    ///
    /// `token_mint` is the mint announced by the webhook event; the pool
    /// must trade it against wrapped SOL or resolution fails.
    pub async fn resolve(&self, pool_id: Pubkey, token_mint: Pubkey) -> PoolResult<PoolKeys> {
        let pool_data = self.ledger.get_account_data(&pool_id).await?;
        let state = LiquidityStateV4::decode(&pool_data)?;

        let (market_owner, market_data) = self
            .ledger
            .get_account_owner_and_data(&state.market_id)
            .await?;
        let market = MarketStateV3::decode(&market_data)?;

        let authority = amm_authority(&RAYDIUM_AMM_V4_PROGRAM_ID);
        let market_authority =
            market_vault_signer(&market_owner, &state.market_id, market.vault_signer_nonce)?;

        // Orient the descriptor: the sniped token is the base side.
        let token_is_onchain_base = if state.quote_mint == WSOL_MINT {
            true
        } else if state.base_mint == WSOL_MINT {
            false
        } else {
            return Err(PoolResolveError::QuoteNotWrappedSol {
                base: state.base_mint,
                quote: state.quote_mint,
            });
        };

        let (base_mint, base_vault, base_decimals, quote_vault, quote_decimals) =
            if token_is_onchain_base {
                (
                    state.base_mint,
                    state.base_vault,
                    state.base_decimal,
                    state.quote_vault,
                    state.quote_decimal,
                )
            } else {
                (
                    state.quote_mint,
                    state.quote_vault,
                    state.quote_decimal,
                    state.base_vault,
                    state.base_decimal,
                )
            };

        if base_mint != token_mint {
            return Err(PoolResolveError::TokenMintMismatch {
                expected: token_mint,
                found: base_mint,
            });
        }

        debug!(
            "Resolved pool {} | token {} | market {} (program {}) | lp mint {} | lp vault {} | withdraw queue {}",
            pool_id,
            base_mint,
            state.market_id,
            market_owner,
            state.lp_mint,
            state.lp_vault,
            state.withdraw_queue
        );

        Ok(PoolKeys {
            id: pool_id,
            base_mint,
            quote_mint: WSOL_MINT,
            base_decimals: decimals_u8(base_decimals)?,
            quote_decimals: decimals_u8(quote_decimals)?,
            base_vault,
            quote_vault,
            coin_vault: state.base_vault,
            pc_vault: state.quote_vault,
            lp_mint: state.lp_mint,
            authority,
            open_orders: state.open_orders,
            target_orders: state.target_orders,
            withdraw_queue: state.withdraw_queue,
            lp_vault: state.lp_vault,
            swap_fee_numerator: state.swap_fee_numerator,
            swap_fee_denominator: state.swap_fee_denominator,
            program_id: RAYDIUM_AMM_V4_PROGRAM_ID,
            market_program_id: market_owner,
            market_id: state.market_id,
            market_authority,
            market_base_vault: market.base_vault,
            market_quote_vault: market.quote_vault,
            market_bids: market.bids,
            market_asks: market.asks,
            market_event_queue: market.event_queue,
        })
    }
}

fn decimals_u8(raw: u64) -> PoolResult<u8> {
    if raw > u8::MAX as u64 {
        return Err(PoolResolveError::DecimalOutOfRange(raw));
    }
    Ok(raw as u8)
}
