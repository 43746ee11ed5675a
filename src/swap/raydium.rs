//! Instruction builders for the Raydium V4 swap program.
//!
//! The swap is always quoted against wrapped SOL, so the buy side wraps
//! lamports into a WSOL associated account for the duration of the
//! transaction and closes it afterwards; the sell side does the same to
//! receive the proceeds as native SOL.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::instruction::{close_account, sync_native};
use thiserror::Error;

use crate::pool::PoolKeys;

/// swap_base_in instruction tag in the Raydium V4 program.
const SWAP_BASE_IN_TAG: u8 = 9;

pub const DEFAULT_CU_LIMIT: u32 = 200_000;

#[derive(Debug, Error)]
pub enum RaydiumBuilderError {
    #[error("input amount cannot be zero")]
    ZeroAmountIn,
    #[error("token instruction error: {0}")]
    TokenInstruction(String),
    #[error(transparent)]
    Serialization(#[from] std::io::Error),
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SwapBaseInArgs {
    amount_in: u64,
    minimum_amount_out: u64,
}

/// Parameters shared by every transaction this builder emits: compute
/// budget and the optional relay tip.
#[derive(Clone, Debug)]
pub struct PreambleParams {
    pub payer: Pubkey,
    pub cu_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub tip_destination: Option<Pubkey>,
    pub tip_lamports: u64,
}

/// Core buy instructions (ATA creation, WSOL wrap, swap, WSOL close).
#[derive(Clone, Debug)]
pub struct BuyCoreInstructions {
    pub instructions: Vec<Instruction>,
}

/// Core sell instructions (WSOL ATA, swap, WSOL close).
#[derive(Clone, Debug)]
pub struct SellCoreInstructions {
    pub instructions: Vec<Instruction>,
}

pub struct RaydiumTxBuilder;

impl RaydiumTxBuilder {
    /// Wrapped-SOL in, token out.
    pub fn build_core_buy_instructions(
        pool: &PoolKeys,
        payer: Pubkey,
        amount_in_lamports: u64,
        min_tokens_out: u64,
    ) -> Result<BuyCoreInstructions, RaydiumBuilderError> {
        if amount_in_lamports == 0 {
            return Err(RaydiumBuilderError::ZeroAmountIn);
        }

        let token_ata = get_associated_token_address(&payer, &pool.base_mint);
        let wsol_ata = get_associated_token_address(&payer, &pool.quote_mint);

        let mut instructions = Vec::with_capacity(6);

        instructions.push(create_associated_token_account_idempotent(
            &payer,
            &payer,
            &pool.base_mint,
            &spl_token::id(),
        ));
        instructions.push(create_associated_token_account_idempotent(
            &payer,
            &payer,
            &pool.quote_mint,
            &spl_token::id(),
        ));
        instructions.push(system_instruction::transfer(
            &payer,
            &wsol_ata,
            amount_in_lamports,
        ));
        instructions.push(sync_native_instruction(wsol_ata)?);
        instructions.push(swap_base_in(
            pool,
            payer,
            wsol_ata,
            token_ata,
            amount_in_lamports,
            min_tokens_out,
        )?);
        instructions.push(close_wsol_instruction(wsol_ata, payer)?);

        Ok(BuyCoreInstructions { instructions })
    }

    /// Token in, wrapped-SOL out; proceeds unwrap to the payer on close.
    pub fn build_core_sell_instructions(
        pool: &PoolKeys,
        payer: Pubkey,
        token_amount_in: u64,
        min_lamports_out: u64,
    ) -> Result<SellCoreInstructions, RaydiumBuilderError> {
        if token_amount_in == 0 {
            return Err(RaydiumBuilderError::ZeroAmountIn);
        }

        let token_ata = get_associated_token_address(&payer, &pool.base_mint);
        let wsol_ata = get_associated_token_address(&payer, &pool.quote_mint);

        let mut instructions = Vec::with_capacity(3);

        instructions.push(create_associated_token_account_idempotent(
            &payer,
            &payer,
            &pool.quote_mint,
            &spl_token::id(),
        ));
        instructions.push(swap_base_in(
            pool,
            payer,
            token_ata,
            wsol_ata,
            token_amount_in,
            min_lamports_out,
        )?);
        instructions.push(close_wsol_instruction(wsol_ata, payer)?);

        Ok(SellCoreInstructions { instructions })
    }

    /// Assemble the full instruction list: compute budget, optional tip,
    /// then the core instructions.
    pub fn assemble_with_preamble(
        preamble: &PreambleParams,
        core: &[Instruction],
    ) -> Vec<Instruction> {
        let has_tip = preamble.tip_destination.is_some() && preamble.tip_lamports > 0;
        let mut instructions =
            Vec::with_capacity(2 + if has_tip { 1 } else { 0 } + core.len());

        let cu_limit = if preamble.cu_limit == 0 {
            DEFAULT_CU_LIMIT
        } else {
            preamble.cu_limit
        };
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            preamble.compute_unit_price_micro_lamports,
        ));

        if let Some(tip_destination) = preamble.tip_destination {
            if preamble.tip_lamports > 0 {
                instructions.push(system_instruction::transfer(
                    &preamble.payer,
                    &tip_destination,
                    preamble.tip_lamports,
                ));
            }
        }

        instructions.extend(core.iter().cloned());
        instructions
    }
}

/// The swap instruction itself. Vault metas follow the program's stored
/// orientation; direction comes from the user source/destination pair.
fn swap_base_in(
    pool: &PoolKeys,
    user: Pubkey,
    user_source: Pubkey,
    user_destination: Pubkey,
    amount_in: u64,
    minimum_amount_out: u64,
) -> Result<Instruction, RaydiumBuilderError> {
    let args = SwapBaseInArgs {
        amount_in,
        minimum_amount_out,
    };

    let mut data = Vec::with_capacity(1 + core::mem::size_of::<SwapBaseInArgs>());
    data.push(SWAP_BASE_IN_TAG);
    data.extend(borsh::to_vec(&args)?);

    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(pool.id, false),
        AccountMeta::new_readonly(pool.authority, false),
        AccountMeta::new(pool.open_orders, false),
        AccountMeta::new(pool.target_orders, false),
        AccountMeta::new(pool.coin_vault, false),
        AccountMeta::new(pool.pc_vault, false),
        AccountMeta::new_readonly(pool.market_program_id, false),
        AccountMeta::new(pool.market_id, false),
        AccountMeta::new(pool.market_bids, false),
        AccountMeta::new(pool.market_asks, false),
        AccountMeta::new(pool.market_event_queue, false),
        AccountMeta::new(pool.market_base_vault, false),
        AccountMeta::new(pool.market_quote_vault, false),
        AccountMeta::new_readonly(pool.market_authority, false),
        AccountMeta::new(user_source, false),
        AccountMeta::new(user_destination, false),
        AccountMeta::new_readonly(user, true),
    ];

    Ok(Instruction {
        program_id: pool.program_id,
        accounts,
        data,
    })
}

fn sync_native_instruction(account: Pubkey) -> Result<Instruction, RaydiumBuilderError> {
    sync_native(&spl_token::id(), &account)
        .map_err(|e| RaydiumBuilderError::TokenInstruction(e.to_string()))
}

fn close_wsol_instruction(
    account: Pubkey,
    destination: Pubkey,
) -> Result<Instruction, RaydiumBuilderError> {
    close_account(&spl_token::id(), &account, &destination, &destination, &[])
        .map_err(|e| RaydiumBuilderError::TokenInstruction(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{resolver::amm_authority, RAYDIUM_AMM_V4_PROGRAM_ID, WSOL_MINT};
    use solana_sdk::{compute_budget, system_program};

    fn sample_pool() -> PoolKeys {
        let base_mint = Pubkey::new_unique();
        PoolKeys {
            id: Pubkey::new_unique(),
            base_mint,
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
    fn buy_assembles_expected_instruction_sequence() {
        let pool = sample_pool();
        let payer = Pubkey::new_unique();

        let core =
            RaydiumTxBuilder::build_core_buy_instructions(&pool, payer, 10_000_000, 4_444)
                .unwrap();
        let preamble = PreambleParams {
            payer,
            cu_limit: DEFAULT_CU_LIMIT,
            compute_unit_price_micro_lamports: 1_000,
            tip_destination: Some(Pubkey::new_unique()),
            tip_lamports: 10_000,
        };
        let instructions = RaydiumTxBuilder::assemble_with_preamble(&preamble, &core.instructions);

        assert_eq!(instructions.len(), 9);
        assert_eq!(instructions[0].program_id, compute_budget::id());
        assert_eq!(instructions[1].program_id, compute_budget::id());
        assert_eq!(instructions[2].program_id, system_program::id()); // tip
        assert_eq!(
            instructions[3].program_id,
            spl_associated_token_account::id()
        );
        assert_eq!(
            instructions[4].program_id,
            spl_associated_token_account::id()
        );
        assert_eq!(instructions[5].program_id, system_program::id()); // wrap
        assert_eq!(instructions[6].program_id, spl_token::id()); // sync
        assert_eq!(instructions[7].program_id, RAYDIUM_AMM_V4_PROGRAM_ID);
        assert_eq!(instructions[8].program_id, spl_token::id()); // close

        let swap_ix = &instructions[7];
        assert_eq!(swap_ix.accounts.len(), 18);
        assert_eq!(swap_ix.data[0], SWAP_BASE_IN_TAG);
        let args = SwapBaseInArgs::try_from_slice(&swap_ix.data[1..]).expect("borsh decode");
        assert_eq!(args.amount_in, 10_000_000);
        assert_eq!(args.minimum_amount_out, 4_444);

        // Buy direction: source is the WSOL associated account.
        let wsol_ata = get_associated_token_address(&payer, &pool.quote_mint);
        let token_ata = get_associated_token_address(&payer, &pool.base_mint);
        assert_eq!(swap_ix.accounts[15].pubkey, wsol_ata);
        assert_eq!(swap_ix.accounts[16].pubkey, token_ata);
        assert!(swap_ix.accounts[17].is_signer);
    }

    #[test]
    fn sell_assembles_expected_instruction_sequence() {
        let pool = sample_pool();
        let payer = Pubkey::new_unique();

        let core =
            RaydiumTxBuilder::build_core_sell_instructions(&pool, payer, 1_000_000, 9_000)
                .unwrap();
        let preamble = PreambleParams {
            payer,
            cu_limit: 0, // falls back to the default
            compute_unit_price_micro_lamports: 500,
            tip_destination: None,
            tip_lamports: 0,
        };
        let instructions = RaydiumTxBuilder::assemble_with_preamble(&preamble, &core.instructions);

        assert_eq!(instructions.len(), 5);
        assert_eq!(instructions[0].program_id, compute_budget::id());
        assert_eq!(instructions[1].program_id, compute_budget::id());
        assert_eq!(
            instructions[2].program_id,
            spl_associated_token_account::id()
        );
        assert_eq!(instructions[3].program_id, RAYDIUM_AMM_V4_PROGRAM_ID);
        assert_eq!(instructions[4].program_id, spl_token::id());

        // Sell direction: source is the token associated account.
        let swap_ix = &instructions[3];
        let wsol_ata = get_associated_token_address(&payer, &pool.quote_mint);
        let token_ata = get_associated_token_address(&payer, &pool.base_mint);
        assert_eq!(swap_ix.accounts[15].pubkey, token_ata);
        assert_eq!(swap_ix.accounts[16].pubkey, wsol_ata);
    }

    #[test]
    fn vault_metas_follow_onchain_order() {
        let pool = sample_pool();
        let payer = Pubkey::new_unique();
        let ix = swap_base_in(
            &pool,
            payer,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1,
            1,
        )
        .unwrap();
        assert_eq!(ix.accounts[5].pubkey, pool.coin_vault);
        assert_eq!(ix.accounts[6].pubkey, pool.pc_vault);
        assert_eq!(ix.accounts[14].pubkey, pool.market_authority);
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let pool = sample_pool();
        let payer = Pubkey::new_unique();
        assert!(RaydiumTxBuilder::build_core_buy_instructions(&pool, payer, 0, 1).is_err());
        assert!(RaydiumTxBuilder::build_core_sell_instructions(&pool, payer, 0, 1).is_err());
    }
}
