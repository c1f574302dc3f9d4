//! NIFTY Expiry Seller - Main Entry Point
//!
//! One invocation runs one expiry-day lifecycle. Orders go to the in-memory
//! paper ledger unless `LIVE_TRADING=true`.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use nifty_expiry_seller::config::Config;
use nifty_expiry_seller::exchange::{KiteClient, MarketDataGateway, MockKiteClient, OrderGateway};
use nifty_expiry_seller::strategy::{
    compute_expiry, HolidayCalendar, PositionScanner, RunOutcome, StrategyEngine,
};
use nifty_expiry_seller::utils::{Clock, SystemClock};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// NIFTY Expiry Seller CLI
#[derive(Parser)]
#[command(name = "nifty-expiry-seller")]
#[command(version, about = "Hedged NIFTY weekly option selling on expiry day")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the weekly expiry label for a date
    Expiry {
        /// Date to resolve (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show the open trade recovered from the position ledger, if any
    Positions,
}

/// Trading mode: Live (real orders) or Paper (in-memory ledger).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

impl TradingMode {
    fn from_env() -> Self {
        if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
            TradingMode::Live
        } else {
            TradingMode::Paper
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Expiry { date }) => return show_expiry(&config, date),
        Some(Commands::Positions) => return show_positions(&config).await,
        None => {}
    }

    info!(
        "NIFTY Expiry Seller v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let mode = TradingMode::from_env();
    match mode {
        TradingMode::Live => warn!("LIVE TRADING MODE - real orders will be placed"),
        TradingMode::Paper => info!("PAPER TRADING MODE - orders go to the in-memory ledger"),
    }
    log_config(&config);

    let (market, orders) = connect(&config, mode)?;
    let engine = StrategyEngine::new(&config, market, orders, Arc::new(SystemClock));

    match engine.run().await {
        Ok(outcome) => {
            log_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Strategy run failed");
            Err(e.into())
        }
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "nifty-expiry-seller.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer flushing for the whole process
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("nifty_expiry_seller=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let strategy = &config.strategy;
    info!("Configuration:");
    info!("   Underlying: {}:{}", strategy.segment, strategy.underlying);
    info!("   Lot size: {}", strategy.lot_size);
    info!("   Hedge offset: {} points", strategy.hedge_offset);
    info!("   Expiry weekday: {:?}", strategy.expiry_weekday);
    info!(
        "   Entry {} / cutoff {}",
        strategy.entry_time, strategy.cutoff_time
    );
    info!(
        "   Stop-loss {}x entry, target {}, breakeven band {}",
        strategy.stop_loss_multiplier, strategy.target_floor, strategy.breakeven_band
    );
    info!("   Monitor interval: {}s", strategy.monitor_interval_secs);
}

/// Build the market data and order gateways for a trading mode.
///
/// Market data always comes from the venue.
fn connect(
    config: &Config,
    mode: TradingMode,
) -> Result<(Arc<dyn MarketDataGateway>, Arc<dyn OrderGateway>)> {
    let client = Arc::new(KiteClient::new(&config.kite)?);
    let market: Arc<dyn MarketDataGateway> = client.clone();

    if !client.has_credentials() {
        anyhow::ensure!(
            mode == TradingMode::Paper,
            "Live trading requires kite.api_key and kite.access_token"
        );
        warn!("No Kite credentials provided. Market data requests will be rejected.");
    }

    let orders: Arc<dyn OrderGateway> = match mode {
        TradingMode::Live => client,
        TradingMode::Paper => Arc::new(MockKiteClient::new()),
    };

    Ok((market, orders))
}

fn show_expiry(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| SystemClock.now().date());
    let holidays = HolidayCalendar::new(config.strategy.holidays.iter().copied());
    let label = compute_expiry(date, config.strategy.expiry_weekday, &holidays);

    println!("{}", label);
    Ok(())
}

async fn show_positions(config: &Config) -> Result<()> {
    let scanner = PositionScanner::for_venue(config)?;

    match scanner.detect_existing_trade().await? {
        Some(position) => {
            println!(
                "SELL {} x{}",
                position.sell_leg.instrument_key(),
                position.sell_leg.quantity()
            );
            println!(
                "BUY  {} x{}",
                position.hedge_leg.instrument_key(),
                position.hedge_leg.quantity()
            );
            println!("Current premium: {}", position.entry_price);
        }
        None => println!("No open trade"),
    }

    Ok(())
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NotExpiryDay => info!("Not expiry day. Nothing to do."),
        RunOutcome::EntryWindowClosed => info!("Entry window closed. Nothing to do."),
        RunOutcome::NoBreakout { spot, high, low } => {
            info!(%spot, %high, %low, "No breakout. No trade today.")
        }
        RunOutcome::Exited(report) => info!(
            decision = %report.decision,
            entry = %report.entry_price,
            exit = %report.exit_price,
            polls = report.polls,
            "Trade closed"
        ),
        RunOutcome::HeldToExpiry(report) => info!(
            entry = %report.entry_price,
            last = %report.exit_price,
            "Position left to expire"
        ),
    }
}
