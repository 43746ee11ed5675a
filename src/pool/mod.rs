use solana_sdk::{pubkey, pubkey::Pubkey};
use thiserror::Error;

pub mod layout;
pub mod resolver;

pub use resolver::{PoolKeys, PoolResolver};

use crate::rpc::RpcError;

/// Raydium liquidity pool V4 program.
pub const RAYDIUM_AMM_V4_PROGRAM_ID: Pubkey =
    pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");

/// Wrapped SOL mint - the quote side of every pool this pipeline trades.
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// Result type for pool resolution operations
pub type PoolResult<T> = Result<T, PoolResolveError>;

/// Error types for pool account decoding and key derivation.
///
/// Any of these aborts the event; a partial descriptor is never
/// handed downstream.
#[derive(Debug, Error)]
pub enum PoolResolveError {
    #[error("account data too short: {len} bytes, expected {expected}")]
    DataTooShort { len: usize, expected: usize },

    #[error("pool quote side is not wrapped SOL (base {base}, quote {quote})")]
    QuoteNotWrappedSol { base: Pubkey, quote: Pubkey },

    #[error("pool trades {found}, event announced {expected}")]
    TokenMintMismatch { expected: Pubkey, found: Pubkey },

    #[error("market authority derivation failed for nonce {nonce}")]
    AuthorityDerivation { nonce: u64 },

    #[error("decimal count {0} out of range")]
    DecimalOutOfRange(u64),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
}

/// Read a u64 from a byte slice at the given offset (little-endian).
/// Returns None if there aren't enough bytes.
#[inline]
pub fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    if data.len() < offset + 8 {
        return None;
    }
    let bytes: [u8; 8] = data[offset..offset + 8].try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Read a Pubkey (32 bytes) from a byte slice at the given offset.
/// Returns None if there aren't enough bytes.
#[inline]
pub fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    if data.len() < offset + 32 {
        return None;
    }
    let bytes: [u8; 32] = data[offset..offset + 32].try_into().ok()?;
    Some(Pubkey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_helpers_respect_bounds() {
        let data = vec![0u8; 40];
        assert!(read_u64_le(&data, 32).is_some());
        assert!(read_u64_le(&data, 33).is_none());
        assert!(read_pubkey(&data, 8).is_some());
        assert!(read_pubkey(&data, 9).is_none());
    }

    #[test]
    fn read_u64_is_little_endian() {
        let mut data = vec![0u8; 16];
        data[8] = 1;
        data[9] = 2;
        assert_eq!(read_u64_le(&data, 8), Some(0x0201));
    }
}
