use clap::Parser;
use signalbot::api::{BinanceClient, ExchangeGateway};
use signalbot::config::BotConfig;
use signalbot::execution::{StrategyHandle, StrategyOrchestrator, TradeStatus, TradeStream};
use signalbot::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use tracing_subscriber::EnvFilter;

const SUMMARY_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(name = "signalbot", about = "RSI/MACD signal bot for one Binance spot symbol")]
struct Cli {
    /// TOML configuration file
    #[arg(long, default_value = "signalbot.toml")]
    config: PathBuf,

    /// Override the configured symbol
    #[arg(long)]
    symbol: Option<String>,

    /// Override the configured base asset; required when the symbol changes asset
    #[arg(long)]
    base_asset: Option<String>,

    /// Trade against the live exchange instead of the testnet
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing::info!("🚀 SignalBot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} (base asset {})", config.symbol, config.base_asset);
    tracing::info!("  Timeframe: {}", config.timeframe);
    tracing::info!("  Trade size: {}% of balance", config.balance_pct);
    tracing::info!(
        "  Take profit: {:?}% | Stop loss: {:?}%",
        config.take_profit_pct,
        config.stop_loss_pct
    );
    tracing::info!("  Exchange: {}", if config.testnet { "testnet" } else { "live" });

    if config.api_key.is_none() || config.api_secret.is_none() {
        tracing::warn!("BINANCE_API_KEY / BINANCE_API_SECRET not set, signed requests will fail");
    }

    let client = BinanceClient::new(
        config.testnet,
        config.api_key.clone(),
        config.api_secret.clone(),
    );
    let ws_url = client.ws_url().to_string();
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(client);

    // Seed the candle series before streaming
    let history = gateway
        .historical_candles(&config.symbol, config.timeframe, config.history_limit)
        .await?;
    tracing::info!("✅ Loaded {} historical candles", history.len());

    let (orchestrator, handle) = StrategyOrchestrator::from_config(&config, gateway, history);
    let strategy_task = tokio::spawn(orchestrator.run());

    let stream_task = {
        let stream = TradeStream::new(&ws_url, &config.symbol, handle.clone());
        tracing::info!("🔄 Streaming trades from {}", stream.url());
        tokio::spawn(stream.run())
    };

    let summary_task = {
        let handle = handle.clone();
        tokio::spawn(async move {
            summary_loop(handle).await;
        })
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = strategy_task => {
            tracing::error!("Strategy loop exited: {:?}", result);
        }
        result = stream_task => {
            tracing::error!("Trade stream exited: {:?}", result);
        }
        result = summary_task => {
            tracing::error!("Summary loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 SignalBot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<BotConfig> {
    let mut config = BotConfig::load(Some(&cli.config))?;
    config.apply_overrides(cli.symbol.as_deref(), cli.base_asset.as_deref(), cli.live)?;
    Ok(config)
}

// ============================================================================
// Reporting
// ============================================================================

async fn summary_loop(handle: StrategyHandle) {
    let period = Duration::from_secs(SUMMARY_INTERVAL_SECS);
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;

        let snapshot = match handle.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Summary unavailable: {}", e);
                return;
            }
        };

        let open_trades = snapshot
            .trades
            .iter()
            .filter(|t| t.status != TradeStatus::Closed)
            .count();
        let last_close = snapshot.candles.last().map(|c| c.close);

        tracing::info!(
            "📈 {} candles | last close {:?} | {} open trades | {} trades total | pnl {:.4}",
            snapshot.candles.len(),
            last_close,
            open_trades,
            snapshot.trades.len(),
            snapshot.total_pnl
        );
    }
}
