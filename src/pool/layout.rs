//! Fixed-offset decoders for the on-chain account layouts this pipeline
//! touches: the Raydium liquidity state (V4) and the OpenBook/Serum market
//! state (V3). Buffer length is validated before any field read; a short
//! buffer fails the whole decode.

use solana_sdk::pubkey::Pubkey;

use super::{read_pubkey, read_u64_le, PoolResolveError, PoolResult};

/// Span of the Raydium V4 liquidity state account.
pub const LIQUIDITY_STATE_V4_LEN: usize = 752;

/// Span of the Serum/OpenBook market state V3 account.
pub const MARKET_STATE_V3_LEN: usize = 388;

// Raydium V4 liquidity state: 32 leading u64 fields, three u128/u64
// swap accumulators, then the pubkey table.
const LP_STATUS: usize = 0;
const LP_NONCE: usize = 8;
const LP_BASE_DECIMAL: usize = 32;
const LP_QUOTE_DECIMAL: usize = 40;
const LP_SWAP_FEE_NUMERATOR: usize = 176;
const LP_SWAP_FEE_DENOMINATOR: usize = 184;
const LP_BASE_VAULT: usize = 336;
const LP_QUOTE_VAULT: usize = 368;
const LP_BASE_MINT: usize = 400;
const LP_QUOTE_MINT: usize = 432;
const LP_LP_MINT: usize = 464;
const LP_OPEN_ORDERS: usize = 496;
const LP_MARKET_ID: usize = 528;
const LP_MARKET_PROGRAM_ID: usize = 560;
const LP_TARGET_ORDERS: usize = 592;
const LP_WITHDRAW_QUEUE: usize = 624;
const LP_LP_VAULT: usize = 656;

// Serum market state V3: 5-byte "serum" padding, account flags u64,
// then fields. Offsets include the padding.
const MKT_OWN_ADDRESS: usize = 13;
const MKT_VAULT_SIGNER_NONCE: usize = 45;
const MKT_BASE_VAULT: usize = 117;
const MKT_QUOTE_VAULT: usize = 165;
const MKT_REQUEST_QUEUE: usize = 221;
const MKT_EVENT_QUEUE: usize = 253;
const MKT_BIDS: usize = 285;
const MKT_ASKS: usize = 317;

/// Decoded Raydium V4 liquidity state, restricted to the fields the
/// resolver needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityStateV4 {
    pub status: u64,
    pub nonce: u64,
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
}

impl LiquidityStateV4 {
    pub fn decode(data: &[u8]) -> PoolResult<Self> {
        if data.len() < LIQUIDITY_STATE_V4_LEN {
            return Err(PoolResolveError::DataTooShort {
                len: data.len(),
                expected: LIQUIDITY_STATE_V4_LEN,
            });
        }

        // Length was checked above; per-field reads cannot fail.
        let u64_at = |offset| read_u64_le(data, offset).unwrap_or_default();
        let key_at = |offset| read_pubkey(data, offset).unwrap_or_default();

        Ok(Self {
            status: u64_at(LP_STATUS),
            nonce: u64_at(LP_NONCE),
            base_decimal: u64_at(LP_BASE_DECIMAL),
            quote_decimal: u64_at(LP_QUOTE_DECIMAL),
            swap_fee_numerator: u64_at(LP_SWAP_FEE_NUMERATOR),
            swap_fee_denominator: u64_at(LP_SWAP_FEE_DENOMINATOR),
            base_vault: key_at(LP_BASE_VAULT),
            quote_vault: key_at(LP_QUOTE_VAULT),
            base_mint: key_at(LP_BASE_MINT),
            quote_mint: key_at(LP_QUOTE_MINT),
            lp_mint: key_at(LP_LP_MINT),
            open_orders: key_at(LP_OPEN_ORDERS),
            market_id: key_at(LP_MARKET_ID),
            market_program_id: key_at(LP_MARKET_PROGRAM_ID),
            target_orders: key_at(LP_TARGET_ORDERS),
            withdraw_queue: key_at(LP_WITHDRAW_QUEUE),
            lp_vault: key_at(LP_LP_VAULT),
        })
    }
}

/// Decoded Serum/OpenBook market state V3.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketStateV3 {
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

impl MarketStateV3 {
    pub fn decode(data: &[u8]) -> PoolResult<Self> {
        if data.len() < MARKET_STATE_V3_LEN {
            return Err(PoolResolveError::DataTooShort {
                len: data.len(),
                expected: MARKET_STATE_V3_LEN,
            });
        }

        let u64_at = |offset| read_u64_le(data, offset).unwrap_or_default();
        let key_at = |offset| read_pubkey(data, offset).unwrap_or_default();

        Ok(Self {
            own_address: key_at(MKT_OWN_ADDRESS),
            vault_signer_nonce: u64_at(MKT_VAULT_SIGNER_NONCE),
            base_vault: key_at(MKT_BASE_VAULT),
            quote_vault: key_at(MKT_QUOTE_VAULT),
            request_queue: key_at(MKT_REQUEST_QUEUE),
            event_queue: key_at(MKT_EVENT_QUEUE),
            bids: key_at(MKT_BIDS),
            asks: key_at(MKT_ASKS),
        })
    }
}
