//! The trade coordinator.
//!
//! One task owns all trade state. Webhook handlers, the buy pipeline, and
//! the sell retry loop communicate with it exclusively through
//! `EngineMessage`, so the single-flight gate is read and flipped by a
//! single owner and no check-then-act race exists.
//!
//! Lifecycle per mint: Evaluating -> Buying -> Bought -> Selling -> Closed,
//! with a side exit to Failed from any non-terminal state. The gate closes
//! when an event is accepted and reopens exactly once on the terminal
//! transition out of Evaluating/Buying; the sell leg runs detached and may
//! overlap the next mint's cycle.

use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{info, warn};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer, SignerError},
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;
use tokio::{sync::mpsc, time::sleep};

use crate::{
    config::Config,
    executor::{ExecutionError, ExecutionPipeline, SubmitPath},
    info_async,
    pool::{PoolKeys, PoolResolver},
    rpc::{ConfirmationOutcome, LedgerClient, RpcError},
    safety::{GateError, SafetyGate, SafetyRejection},
    swap::{
        math::{self, QuoteError},
        raydium::{PreambleParams, RaydiumBuilderError, RaydiumTxBuilder},
    },
    warn_async,
};

const RAYDIUM_SWAP_CU_LIMIT: u32 = 160_000;
const BUY_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);
const SELL_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Short re-poll of a timed-out sell before building a fresh attempt.
const SELL_RECHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A validated pool-creation event, as shaped by the webhook ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    pub mint: Pubkey,
    pub pool_id: Pubkey,
}

pub enum EngineMessage {
    PoolCreated(PoolEvent),
    BuySubmitted { mint: Pubkey, signature: Signature },
    BuyFinished { mint: Pubkey, outcome: BuyOutcome },
    SellFinished { mint: Pubkey, outcome: Result<Signature, SellFailure> },
}

/// Terminal result of one buy pipeline run.
pub enum BuyOutcome {
    Bought {
        signature: Signature,
        pool: Box<PoolKeys>,
    },
    Rejected(SafetyRejection),
    ResolutionFailed(String),
    SubmissionFailed(String),
    /// Landed on chain but the swap program returned an error.
    OnChainRejected(String),
    /// Ambiguous: never assumed successful, never blindly re-bought.
    ConfirmationTimeout,
}

impl BuyOutcome {
    fn describe(&self) -> String {
        match self {
            BuyOutcome::Bought { signature, .. } => format!("confirmed buy {signature}"),
            BuyOutcome::Rejected(reason) => format!("rejected: {reason}"),
            BuyOutcome::ResolutionFailed(err) => format!("pool resolution failed: {err}"),
            BuyOutcome::SubmissionFailed(err) => format!("submission failed: {err}"),
            BuyOutcome::OnChainRejected(err) => format!("on-chain rejection: {err}"),
            BuyOutcome::ConfirmationTimeout => "confirmation timed out".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellFailure {
    /// Retry budget spent with the position still held.
    Exhausted { attempts: u32 },
    /// No balance left to sell and no landed sell to credit.
    NothingToSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    Evaluating,
    Buying,
    Bought,
    Selling,
    Closed,
    Failed,
}

impl TradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Closed | TradeState::Failed)
    }
}

/// One lifecycle per detected mint, owned exclusively by the coordinator.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub mint: Pubkey,
    pub pool_id: Pubkey,
    pub state: TradeState,
    pub buy_signature: Option<Signature>,
    pub sell_signature: Option<Signature>,
    pub failure: Option<String>,
}

/// What the coordinator should do after a buy settles.
#[derive(Debug, PartialEq, Eq)]
pub enum SettleAction {
    ScheduleSell,
    None,
}

/// All trade state behind the coordinator: per-mint intents plus the
/// single-flight gate.
pub struct TradeLedger {
    intents: HashMap<Pubkey, TradeIntent>,
    accepting: bool,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self {
            intents: HashMap::new(),
            accepting: true,
        }
    }

    pub fn accepting(&self) -> bool {
        self.accepting
    }

    pub fn intent(&self, mint: &Pubkey) -> Option<&TradeIntent> {
        self.intents.get(mint)
    }

    /// Accept an event if the gate is open and the mint has no live
    /// lifecycle. Closes the gate on success.
    pub fn try_accept(&mut self, event: &PoolEvent) -> bool {
        if !self.accepting {
            return false;
        }
        if let Some(existing) = self.intents.get(&event.mint) {
            if !existing.state.is_terminal() {
                return false;
            }
        }

        self.intents.insert(
            event.mint,
            TradeIntent {
                mint: event.mint,
                pool_id: event.pool_id,
                state: TradeState::Evaluating,
                buy_signature: None,
                sell_signature: None,
                failure: None,
            },
        );
        self.accepting = false;
        true
    }

    /// Evaluating -> Buying, once the quote has passed the gate and the
    /// transaction is signed.
    pub fn mark_buying(&mut self, mint: &Pubkey, signature: Signature) {
        if let Some(intent) = self.intents.get_mut(mint) {
            if intent.state == TradeState::Evaluating {
                intent.state = TradeState::Buying;
                intent.buy_signature = Some(signature);
            }
        }
    }

    /// Terminal transition out of Evaluating/Buying. Restores the gate
    /// exactly once; a second settle for the same mint is a no-op.
    pub fn settle_buy(&mut self, mint: &Pubkey, outcome: &BuyOutcome) -> SettleAction {
        let Some(intent) = self.intents.get_mut(mint) else {
            return SettleAction::None;
        };
        if !matches!(intent.state, TradeState::Evaluating | TradeState::Buying) {
            return SettleAction::None;
        }

        self.accepting = true;

        match outcome {
            BuyOutcome::Bought { signature, .. } => {
                intent.state = TradeState::Bought;
                intent.buy_signature = Some(*signature);
                SettleAction::ScheduleSell
            }
            other => {
                intent.state = TradeState::Failed;
                intent.failure = Some(other.describe());
                SettleAction::None
            }
        }
    }

    /// Bought -> Selling, when the retry loop is scheduled.
    pub fn begin_sell(&mut self, mint: &Pubkey) -> bool {
        match self.intents.get_mut(mint) {
            Some(intent) if intent.state == TradeState::Bought => {
                intent.state = TradeState::Selling;
                true
            }
            _ => false,
        }
    }

    pub fn settle_sell(&mut self, mint: &Pubkey, outcome: &Result<Signature, SellFailure>) {
        let Some(intent) = self.intents.get_mut(mint) else {
            return;
        };
        if intent.state != TradeState::Selling {
            return;
        }
        match outcome {
            Ok(signature) => {
                intent.state = TradeState::Closed;
                intent.sell_signature = Some(*signature);
            }
            Err(failure) => {
                intent.state = TradeState::Failed;
                intent.failure = Some(format!("sell failed: {failure:?}"));
            }
        }
    }
}

pub struct SniperEngine {
    config: Arc<Config>,
    ledger: TradeLedger,
    pipeline: Arc<TradePipeline>,
    tx: mpsc::Sender<EngineMessage>,
    rx: mpsc::Receiver<EngineMessage>,
}

impl SniperEngine {
    pub fn new(
        config: Arc<Config>,
        pipeline: Arc<TradePipeline>,
        tx: mpsc::Sender<EngineMessage>,
        rx: mpsc::Receiver<EngineMessage>,
    ) -> Self {
        Self {
            config,
            ledger: TradeLedger::new(),
            pipeline,
            tx,
            rx,
        }
    }

    pub async fn run(mut self) {
        info!("Trade coordinator running");
        while let Some(message) = self.rx.recv().await {
            self.handle(message);
        }
    }

    fn handle(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::PoolCreated(event) => self.handle_pool_created(event),
            EngineMessage::BuySubmitted { mint, signature } => {
                info_async!("Buy submitted for {} | signature {}", mint, signature);
                self.ledger.mark_buying(&mint, signature);
            }
            EngineMessage::BuyFinished { mint, outcome } => self.handle_buy_finished(mint, outcome),
            EngineMessage::SellFinished { mint, outcome } => {
                self.ledger.settle_sell(&mint, &outcome);
                let Some(intent) = self.ledger.intent(&mint) else {
                    return;
                };
                match &outcome {
                    Ok(_) => info!(
                        "Position in {} closed | buy {:?} | sell {:?}",
                        mint, intent.buy_signature, intent.sell_signature
                    ),
                    Err(failure) => warn!(
                        "Sell leg for {} gave up: {:?} | intent: {:?}",
                        mint, failure, intent.failure
                    ),
                }
            }
        }
    }

    fn handle_pool_created(&mut self, event: PoolEvent) {
        if !self.ledger.try_accept(&event) {
            warn_async!(
                "Dropping pool event for {} (trade in flight or lifecycle live)",
                event.mint
            );
            return;
        }

        info!(
            "Evaluating pool {} for token {}",
            event.pool_id, event.mint
        );

        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mint = event.mint;
            let outcome = pipeline.execute_buy(event, &tx).await;
            let _ = tx.send(EngineMessage::BuyFinished { mint, outcome }).await;
        });
    }

    fn handle_buy_finished(&mut self, mint: Pubkey, outcome: BuyOutcome) {
        match self.ledger.intent(&mint) {
            Some(intent) => info!(
                "Buy settled for {} (pool {}) | {}",
                intent.mint,
                intent.pool_id,
                outcome.describe()
            ),
            None => info!("Buy settled for {} | {}", mint, outcome.describe()),
        }

        match self.ledger.settle_buy(&mint, &outcome) {
            SettleAction::ScheduleSell => {
                let BuyOutcome::Bought { pool, .. } = outcome else {
                    return;
                };
                self.schedule_sell(mint, *pool);
            }
            SettleAction::None => {}
        }
    }

    fn schedule_sell(&mut self, mint: Pubkey, pool: PoolKeys) {
        if !self.ledger.begin_sell(&mint) {
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let tx = self.tx.clone();
        let delay = Duration::from_secs(self.config.sell_delay_secs);
        let interval = Duration::from_secs(self.config.sell_retry_interval_secs);
        let max_attempts = self.config.sell_max_attempts;

        info!(
            "Sell scheduled for {} in {:?} (retry every {:?}, max attempts {})",
            mint, delay, interval, max_attempts
        );

        tokio::spawn(async move {
            sleep(delay).await;

            let mut attempts = 0u32;
            let mut pending: Option<Signature> = None;

            let outcome = loop {
                attempts += 1;
                match pipeline.execute_sell(&pool, pending.take()).await {
                    Ok(signature) => break Ok(signature),
                    Err(SellAttemptError::ConfirmationTimeout { signature }) => {
                        warn_async!(
                            "Sell attempt {} for {} unconfirmed ({}), will re-check",
                            attempts,
                            mint,
                            signature
                        );
                        pending = Some(signature);
                    }
                    Err(SellAttemptError::NothingToSell) => {
                        break Err(SellFailure::NothingToSell);
                    }
                    Err(err) => {
                        warn_async!("Sell attempt {} for {} failed: {}", attempts, mint, err);
                    }
                }

                if max_attempts != 0 && attempts >= max_attempts {
                    break Err(SellFailure::Exhausted { attempts });
                }
                sleep(interval).await;
            };

            let _ = tx.send(EngineMessage::SellFinished { mint, outcome }).await;
        });
    }
}

#[derive(Debug, Error)]
pub enum SellAttemptError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),
    #[error("builder error: {0}")]
    Builder(#[from] RaydiumBuilderError),
    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),
    #[error("submission failed: {0}")]
    Submission(#[from] ExecutionError),
    #[error("on-chain rejection: {0}")]
    OnChainRejected(String),
    #[error("confirmation timed out for {signature}")]
    ConfirmationTimeout { signature: Signature },
    #[error("no balance left to sell")]
    NothingToSell,
}

/// The buy/sell execution pipeline: resolution, gating, quoting, building,
/// signing, submission, confirmation. Owns no trade state.
pub struct TradePipeline {
    config: Arc<Config>,
    ledger: Arc<LedgerClient>,
    resolver: PoolResolver,
    gate: SafetyGate,
    executor: ExecutionPipeline,
}

impl TradePipeline {
    pub fn new(
        config: Arc<Config>,
        ledger: Arc<LedgerClient>,
        resolver: PoolResolver,
        gate: SafetyGate,
        executor: ExecutionPipeline,
    ) -> Self {
        Self {
            config,
            ledger,
            resolver,
            gate,
            executor,
        }
    }

    fn submit_path(&self) -> SubmitPath {
        if self.config.use_jito_bundle {
            SubmitPath::JitoBundle
        } else {
            SubmitPath::StandardRpc
        }
    }

    pub async fn execute_buy(
        &self,
        event: PoolEvent,
        progress: &mpsc::Sender<EngineMessage>,
    ) -> BuyOutcome {
        let pool = match self.resolver.resolve(event.pool_id, event.mint).await {
            Ok(pool) => pool,
            Err(err) => return BuyOutcome::ResolutionFailed(err.to_string()),
        };

        let reserves = match self.gate.check(&pool).await {
            Ok(reserves) => reserves,
            Err(GateError::Rejected(reason)) => return BuyOutcome::Rejected(reason),
            Err(err) => return BuyOutcome::ResolutionFailed(err.to_string()),
        };

        let amount_in = self.config.buy_amount_lamports();
        // Buy direction: wrapped SOL in, token out.
        let quote = match math::compute_quote(
            reserves.quote,
            reserves.base,
            amount_in,
            pool.swap_fee_numerator,
            pool.swap_fee_denominator,
            self.config.buy_slippage_bps(),
        ) {
            Ok(quote) => quote,
            Err(err) => return BuyOutcome::ResolutionFailed(err.to_string()),
        };

        info_async!(
            "Quote for {} | in={} out={} ({:.4} ui) minOut={} fee={} | price {:.9} -> {:.9} | impact={:.4}%",
            event.mint,
            quote.amount_in,
            quote.amount_out,
            quote.amount_out as f64 / 10f64.powi(pool.base_decimals as i32),
            quote.min_amount_out,
            quote.fee,
            quote.current_price,
            quote.execution_price,
            quote.price_impact * 100.0
        );

        let payer = self.config.operator_pubkey();
        let core = match RaydiumTxBuilder::build_core_buy_instructions(
            &pool,
            payer,
            amount_in,
            quote.min_amount_out,
        ) {
            Ok(core) => core,
            Err(err) => return BuyOutcome::SubmissionFailed(err.to_string()),
        };

        let path = self.submit_path();
        let preamble = PreambleParams {
            payer,
            cu_limit: RAYDIUM_SWAP_CU_LIMIT,
            compute_unit_price_micro_lamports: self
                .config
                .buy_compute_unit_price_microlamports(RAYDIUM_SWAP_CU_LIMIT),
            tip_destination: (path == SubmitPath::JitoBundle)
                .then(ExecutionPipeline::random_jito_tip_address),
            tip_lamports: self.config.buy_tx_tip_lamports(),
        };
        let instructions = RaydiumTxBuilder::assemble_with_preamble(&preamble, &core.instructions);

        let blockhash = match self.ledger.get_latest_blockhash().await {
            Ok(blockhash) => blockhash,
            Err(err) => return BuyOutcome::SubmissionFailed(err.to_string()),
        };
        let keypair = self.config.operator_keypair();
        let tx = match sign_transaction(&instructions, &keypair, blockhash) {
            Ok(tx) => tx,
            Err(err) => return BuyOutcome::SubmissionFailed(err.to_string()),
        };
        let signature = tx.signatures[0];

        let _ = progress
            .send(EngineMessage::BuySubmitted {
                mint: event.mint,
                signature,
            })
            .await;

        if let Err(err) = self.executor.submit(path, &tx).await {
            if err.is_transient() {
                warn_async!("Relay transient rejection for {}: {}", event.mint, err);
            }
            return BuyOutcome::SubmissionFailed(err.to_string());
        }

        match self
            .ledger
            .await_confirmation(&signature, BUY_CONFIRMATION_TIMEOUT)
            .await
        {
            Ok(ConfirmationOutcome::Confirmed) => BuyOutcome::Bought {
                signature,
                pool: Box::new(pool),
            },
            Ok(ConfirmationOutcome::ConfirmedWithProgramError(err)) => {
                BuyOutcome::OnChainRejected(err)
            }
            // Status unknown either way: classify as timeout, never success.
            Ok(ConfirmationOutcome::TimedOut) | Err(_) => BuyOutcome::ConfirmationTimeout,
        }
    }

    /// One sell attempt: 100% of the held balance at fresh reserves.
    ///
    /// `recheck` carries the signature of a previously timed-out attempt;
    /// it is re-polled first so a landed sell is recognized instead of
    /// double-sold.
    pub async fn execute_sell(
        &self,
        pool: &PoolKeys,
        recheck: Option<Signature>,
    ) -> Result<Signature, SellAttemptError> {
        if let Some(signature) = recheck {
            if let Ok(ConfirmationOutcome::Confirmed) = self
                .ledger
                .await_confirmation(&signature, SELL_RECHECK_TIMEOUT)
                .await
            {
                return Ok(signature);
            }
        }

        let payer = self.config.operator_pubkey();
        let token_ata = get_associated_token_address(&payer, &pool.base_mint);
        let balance = match self.ledger.get_token_balance(&token_ata).await {
            Ok(balance) => balance,
            Err(RpcError::AccountNotFound(_)) => 0,
            Err(err) => return Err(err.into()),
        };
        if balance == 0 {
            return Err(SellAttemptError::NothingToSell);
        }

        let base_reserve = self.ledger.get_token_balance(&pool.base_vault).await?;
        let quote_reserve = self.ledger.get_token_balance(&pool.quote_vault).await?;

        // Sell direction: token in, wrapped SOL out.
        let quote = math::compute_quote(
            base_reserve,
            quote_reserve,
            balance,
            pool.swap_fee_numerator,
            pool.swap_fee_denominator,
            self.config.sell_slippage_bps(),
        )?;

        let core = RaydiumTxBuilder::build_core_sell_instructions(
            pool,
            payer,
            balance,
            quote.min_amount_out,
        )?;

        let path = self.submit_path();
        let preamble = PreambleParams {
            payer,
            cu_limit: RAYDIUM_SWAP_CU_LIMIT,
            compute_unit_price_micro_lamports: self
                .config
                .sell_compute_unit_price_microlamports(RAYDIUM_SWAP_CU_LIMIT),
            tip_destination: (path == SubmitPath::JitoBundle)
                .then(ExecutionPipeline::random_jito_tip_address),
            tip_lamports: self.config.sell_tx_tip_lamports(),
        };
        let instructions = RaydiumTxBuilder::assemble_with_preamble(&preamble, &core.instructions);

        let blockhash = self.ledger.get_latest_blockhash().await?;
        let keypair = self.config.operator_keypair();
        let tx = sign_transaction(&instructions, &keypair, blockhash)?;
        let signature = tx.signatures[0];

        self.executor.submit(path, &tx).await?;

        match self
            .ledger
            .await_confirmation(&signature, SELL_CONFIRMATION_TIMEOUT)
            .await?
        {
            ConfirmationOutcome::Confirmed => Ok(signature),
            ConfirmationOutcome::ConfirmedWithProgramError(err) => {
                Err(SellAttemptError::OnChainRejected(err))
            }
            ConfirmationOutcome::TimedOut => {
                Err(SellAttemptError::ConfirmationTimeout { signature })
            }
        }
    }
}

fn sign_transaction(
    instructions: &[Instruction],
    payer: &Keypair,
    blockhash: Hash,
) -> Result<VersionedTransaction, SignerError> {
    let mut message = Message::new(instructions, Some(&payer.pubkey()));
    message.recent_blockhash = blockhash;
    VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[payer])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> PoolEvent {
        PoolEvent {
            mint: Pubkey::new_unique(),
            pool_id: Pubkey::new_unique(),
        }
    }

    fn bought_outcome() -> BuyOutcome {
        BuyOutcome::Bought {
            signature: Signature::default(),
            pool: Box::new(sample_pool()),
        }
    }

    fn sample_pool() -> PoolKeys {
        use crate::pool::{resolver::amm_authority, RAYDIUM_AMM_V4_PROGRAM_ID, WSOL_MINT};
        PoolKeys {
            id: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint: WSOL_MINT,
            base_decimals: 6,
            quote_decimals: 9,
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            coin_vault: Pubkey::new_unique(),
            pc_vault: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            authority: amm_authority(&RAYDIUM_AMM_V4_PROGRAM_ID),
            open_orders: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            withdraw_queue: Pubkey::new_unique(),
            lp_vault: Pubkey::new_unique(),
            swap_fee_numerator: 25,
            swap_fee_denominator: 10_000,
            program_id: RAYDIUM_AMM_V4_PROGRAM_ID,
            market_program_id: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_authority: Pubkey::new_unique(),
            market_base_vault: Pubkey::new_unique(),
            market_quote_vault: Pubkey::new_unique(),
            market_bids: Pubkey::new_unique(),
            market_asks: Pubkey::new_unique(),
            market_event_queue: Pubkey::new_unique(),
        }
    }

    #[test]
    fn single_flight_drops_concurrent_events() {
        let mut ledger = TradeLedger::new();
        let first = event();
        assert!(ledger.try_accept(&first));

        // Everything arriving while the first trade is in flight drops.
        for _ in 0..5 {
            assert!(!ledger.try_accept(&event()));
        }
        assert!(!ledger.accepting());
    }

    #[test]
    fn gate_restored_exactly_once() {
        let mut ledger = TradeLedger::new();
        let first = event();
        assert!(ledger.try_accept(&first));

        let outcome = BuyOutcome::SubmissionFailed("boom".into());
        assert_eq!(ledger.settle_buy(&first.mint, &outcome), SettleAction::None);
        assert!(ledger.accepting());

        // The gate closes for the next accepted event; a duplicate settle
        // of the first mint must not reopen it.
        let second = event();
        assert!(ledger.try_accept(&second));
        assert_eq!(ledger.settle_buy(&first.mint, &outcome), SettleAction::None);
        assert!(!ledger.accepting());
    }

    #[test]
    fn rejection_restores_gate_and_fails_intent() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));

        let outcome = BuyOutcome::Rejected(SafetyRejection::InsufficientLiquidity);
        assert_eq!(ledger.settle_buy(&ev.mint, &outcome), SettleAction::None);
        assert!(ledger.accepting());

        let intent = ledger.intent(&ev.mint).unwrap();
        assert_eq!(intent.state, TradeState::Failed);
        assert!(intent.failure.as_deref().unwrap().contains("rejected"));
    }

    #[test]
    fn confirmed_buy_schedules_sell_and_reopens_gate() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));
        ledger.mark_buying(&ev.mint, Signature::default());
        assert_eq!(ledger.intent(&ev.mint).unwrap().state, TradeState::Buying);

        assert_eq!(
            ledger.settle_buy(&ev.mint, &bought_outcome()),
            SettleAction::ScheduleSell
        );
        assert!(ledger.accepting());
        assert_eq!(ledger.intent(&ev.mint).unwrap().state, TradeState::Bought);

        // The sell proceeds independently of the next cycle.
        assert!(ledger.begin_sell(&ev.mint));
        assert_eq!(ledger.intent(&ev.mint).unwrap().state, TradeState::Selling);
        assert!(ledger.try_accept(&event()));
    }

    #[test]
    fn failed_buy_never_schedules_sell() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));
        ledger.mark_buying(&ev.mint, Signature::default());

        let outcome = BuyOutcome::OnChainRejected("custom program error".into());
        assert_eq!(ledger.settle_buy(&ev.mint, &outcome), SettleAction::None);
        assert_eq!(ledger.intent(&ev.mint).unwrap().state, TradeState::Failed);

        // Selling can only start from Bought.
        assert!(!ledger.begin_sell(&ev.mint));
    }

    #[test]
    fn sell_settles_to_closed_or_failed() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));
        ledger.settle_buy(&ev.mint, &bought_outcome());
        ledger.begin_sell(&ev.mint);

        let sig = Signature::default();
        ledger.settle_sell(&ev.mint, &Ok(sig));
        let intent = ledger.intent(&ev.mint).unwrap();
        assert_eq!(intent.state, TradeState::Closed);
        assert_eq!(intent.sell_signature, Some(sig));

        // And the exhausted path on a second lifecycle.
        let ev2 = event();
        assert!(ledger.try_accept(&ev2));
        ledger.settle_buy(&ev2.mint, &bought_outcome());
        ledger.begin_sell(&ev2.mint);
        ledger.settle_sell(&ev2.mint, &Err(SellFailure::Exhausted { attempts: 25 }));
        assert_eq!(ledger.intent(&ev2.mint).unwrap().state, TradeState::Failed);
    }

    #[test]
    fn terminal_mint_can_be_reaccepted_on_new_event() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));
        ledger.settle_buy(&ev.mint, &BuyOutcome::ConfirmationTimeout);
        assert_eq!(ledger.intent(&ev.mint).unwrap().state, TradeState::Failed);

        // A new external event for the same mint starts a new lifecycle.
        assert!(ledger.try_accept(&ev));
        assert_eq!(
            ledger.intent(&ev.mint).unwrap().state,
            TradeState::Evaluating
        );
    }

    #[test]
    fn live_sell_blocks_reaccept_of_same_mint_only() {
        let mut ledger = TradeLedger::new();
        let ev = event();
        assert!(ledger.try_accept(&ev));
        ledger.settle_buy(&ev.mint, &bought_outcome());
        ledger.begin_sell(&ev.mint);

        // Same mint still selling: dropped. Different mint: accepted.
        assert!(!ledger.try_accept(&ev));
        assert!(ledger.try_accept(&event()));
    }
}
