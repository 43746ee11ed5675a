//! Thin async boundary to the ledger: raw account reads, vault balances,
//! blockhash, and bounded confirmation polling. Submission goes through
//! the execution pipeline, not this client.

use std::time::Duration;

use log::debug;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_program_pack::Pack;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
};
use spl_token::state::Account as TokenAccount;
use thiserror::Error;
use tokio::time::{sleep, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of waiting for a submitted transaction to settle.
///
/// `TimedOut` is ambiguous: the transaction may still land. Callers must
/// re-check state before any retry instead of assuming either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    /// The transaction landed but the program rejected it.
    ConfirmedWithProgramError(String),
    TimedOut,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("token account {0} could not be unpacked")]
    InvalidTokenAccount(Pubkey),
    #[error("rpc client error: {0}")]
    Client(#[from] solana_client::client_error::ClientError),
}

pub struct LedgerClient {
    rpc: RpcClient,
}

impl LedgerClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                REQUEST_TIMEOUT,
                CommitmentConfig::confirmed(),
            ),
        }
    }

    pub async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, RpcError> {
        let (_, data) = self.get_account_owner_and_data(address).await?;
        Ok(data)
    }

    pub async fn get_account_owner_and_data(
        &self,
        address: &Pubkey,
    ) -> Result<(Pubkey, Vec<u8>), RpcError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        let account = response
            .value
            .ok_or(RpcError::AccountNotFound(*address))?;
        Ok((account.owner, account.data))
    }

    /// Current balance of an SPL token account, in the token's smallest unit.
    pub async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64, RpcError> {
        let data = self.get_account_data(token_account).await?;
        let unpacked = TokenAccount::unpack(&data)
            .map_err(|_| RpcError::InvalidTokenAccount(*token_account))?;
        Ok(unpacked.amount)
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        Ok(self.rpc.get_latest_blockhash().await?)
    }

    /// Poll the signature status until it settles or `timeout` elapses.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<ConfirmationOutcome, RpcError> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self
                .rpc
                .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
                .await?;

            match status {
                Some(Ok(())) => return Ok(ConfirmationOutcome::Confirmed),
                Some(Err(err)) => {
                    return Ok(ConfirmationOutcome::ConfirmedWithProgramError(
                        err.to_string(),
                    ))
                }
                None => {
                    if Instant::now() >= deadline {
                        debug!("Confirmation window elapsed for {}", signature);
                        return Ok(ConfirmationOutcome::TimedOut);
                    }
                    sleep(CONFIRMATION_POLL_INTERVAL).await;
                }
            }
        }
    }
}
