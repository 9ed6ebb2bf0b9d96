use anyhow::Context;
use clap::Parser;
use futuresbot::config::{credentials_from_env, BotConfig};
use futuresbot::exchange::{BinanceFuturesClient, ExchangePort};
use futuresbot::execution::{EngineState, OrderSequencer, TradingLoop};
use futuresbot::persistence::{report_unfinished, BracketJournal, RedisBracketJournal};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Automated futures bracket-order trading loop
#[derive(Parser, Debug)]
#[command(name = "futuresbot", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "FUTURESBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 FuturesBot starting");

    let config = BotConfig::load(args.config.as_deref()).context("loading configuration")?;
    let (api_key, api_secret) = credentials_from_env().context("reading API credentials")?;

    log_configuration(&config);

    let client = BinanceFuturesClient::new(config.binance_config(api_key, api_secret))
        .context("creating Binance client")?;
    let exchange: Arc<dyn ExchangePort> = Arc::new(client);

    let mut trading_loop = TradingLoop::new(
        exchange,
        config.loop_settings(),
        config.strategy.build(),
        config.position_cap(),
        OrderSequencer::new(config.bracket_params()),
    );

    if let Some(journal) = connect_journal(config.redis_url.as_deref()).await {
        trading_loop = trading_loop.with_journal(journal);
    }

    trading_loop.refresh_symbols().await;

    let cancel = CancellationToken::new();

    if args.once {
        let mut state = EngineState::default();
        let report = trading_loop.run_cycle(&mut state, &cancel).await;
        tracing::info!("Single cycle finished: {:?}", report);
        return Ok(());
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("\n⚠️  Received Ctrl+C, finishing current step and shutting down...");
            shutdown.cancel();
        }
    });

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let state = trading_loop.run(cancel).await;

    tracing::info!(
        "👋 FuturesBot stopped after {} cycles (last traded: {})",
        state.cycle_count,
        state.last_traded_symbol.as_deref().unwrap_or("none")
    );
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "futuresbot=info,futuresbot::strategy=debug".into());

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(config: &BotConfig) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Strategy: {}", config.strategy);
    tracing::info!(
        "  Notional: {} {} at {}x ({})",
        config.fixed_notional_volume,
        config.quote_asset,
        config.leverage,
        config.margin_mode.as_str()
    );
    tracing::info!(
        "  Stop-loss: {}% | Take-profit: {}%",
        config.stop_loss_fraction * 100.0,
        config.take_profit_fraction * 100.0
    );
    tracing::info!("  Max positions: {}", config.max_concurrent_positions);
    tracing::info!(
        "  Candles: {} x {} | cycle every {}s",
        config.candle_limit,
        config.candle_interval.as_str(),
        config.cycle_interval_secs
    );
    tracing::info!("  Excluded: {}", config.excluded_symbols.join(", "));
}

async fn connect_journal(redis_url: Option<&str>) -> Option<Arc<dyn BracketJournal>> {
    let redis_url = redis_url?;

    match RedisBracketJournal::new(redis_url).await {
        Ok(journal) => {
            match report_unfinished(&journal).await {
                Ok(unfinished) if unfinished.is_empty() => {
                    tracing::info!("✓ No unfinished brackets from previous runs");
                }
                Ok(unfinished) => {
                    tracing::warn!(
                        "⚠️  {} brackets may be missing protective orders, check them on the venue",
                        unfinished.len()
                    );
                }
                Err(e) => tracing::warn!("Failed to read bracket journal: {}", e),
            }
            Some(Arc::new(journal) as Arc<dyn BracketJournal>)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Redis ({}), continuing without bracket journal",
                e
            );
            None
        }
    }
}
