mod async_log;
mod config;
mod engine;
mod executor;
mod oracle;
mod pool;
mod rpc;
mod safety;
mod swap;
mod webhook;

use std::{env, sync::Arc};

use log::{info, warn};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    engine::{SniperEngine, TradePipeline},
    executor::ExecutionPipeline,
    oracle::OracleClient,
    pool::PoolResolver,
    rpc::LedgerClient,
    safety::SafetyGate,
};

/// Pool-creation events queued towards the coordinator; anything beyond
/// this while a trade is in flight is dropped there anyway.
const ENGINE_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env::set_var(
        env_logger::DEFAULT_FILTER_ENV,
        env::var_os(env_logger::DEFAULT_FILTER_ENV).unwrap_or_else(|| "info".into()),
    );
    env_logger::init();
    let _async_logger = async_log::init_async_logger();

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            if let Some(path) = err.missing_env_path() {
                warn!("No .env found at {}", path.display());
            }
            return Err(err.into());
        }
    };
    log_startup_summary(&config);

    let ledger = Arc::new(LedgerClient::new(config.rpc_url.clone()));
    let oracle = Arc::new(OracleClient::new(config.helius_api_key.clone()));
    let resolver = PoolResolver::new(Arc::clone(&ledger));
    let gate = SafetyGate::new(
        Arc::clone(&ledger),
        Arc::clone(&oracle),
        config.min_liquidity_usd,
    );
    let executor = ExecutionPipeline::new(Arc::clone(&config));
    let pipeline = Arc::new(TradePipeline::new(
        Arc::clone(&config),
        ledger,
        resolver,
        gate,
        executor,
    ));

    let (engine_tx, engine_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
    let engine = SniperEngine::new(
        Arc::clone(&config),
        pipeline,
        engine_tx.clone(),
        engine_rx,
    );
    tokio::spawn(engine.run());

    let app = webhook::router(engine_tx);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Firing up on port {}...", config.port);
    axum::serve(listener, app).await?;

    Ok(())
}

fn log_startup_summary(config: &Config) {
    info!(
        "Startup | operator={} | buy_sol={:.4} | buy_slip={:.2}% | sell_slip={:.2}% | buy_prio={:.4} | sell_prio={:.4} | buy_tip={:.6} | sell_tip={:.6}",
        config.operator_pubkey(),
        config.buy_amount_sol,
        config.buy_slippage_pct,
        config.sell_slippage_pct,
        config.buy_priority_fees,
        config.sell_priority_fees,
        config.buy_tx_tip_sol,
        config.sell_tx_tip_sol,
    );
    info!(
        "Endpoints | rpc={} | jito={} | path={}",
        config.rpc_url,
        config.jito_endpoint,
        if config.use_jito_bundle {
            "JitoBundle"
        } else {
            "StandardRpc"
        }
    );
    info!(
        "Policy | liquidity_floor=${:.2} | sell_delay={}s | sell_retry={}s | sell_max_attempts={}",
        config.min_liquidity_usd,
        config.sell_delay_secs,
        config.sell_retry_interval_secs,
        config.sell_max_attempts,
    );
    if config.helius_api_key.trim().is_empty() {
        warn!("HELIUS_API_KEY missing; token safety checks will fail closed");
    }
}
