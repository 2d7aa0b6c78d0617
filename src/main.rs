//! Scalping loop simulation.
//!
//! Runs the control loop against the paper venue: a random walk price feed and
//! a paper executor. Backtest mode steps a manual clock instead of waiting on
//! the wall clock.

use anyhow::{Context, Result};
use clap::Parser;
use scalp_core::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scalp-sim", about = "Run the scalping loop against the paper venue")]
struct Cli {
    /// Directory holding default.toml and the per environment overrides
    #[arg(long, env = "SCALP_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Stop after this many ticks. runs until Ctrl-C when omitted
    #[arg(long)]
    ticks: Option<u64>,

    /// Seed for the simulated feed
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Ignore market hours
    #[arg(long)]
    always_on: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = TradingConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    info!(mode = %config.mode, symbols = ?config.symbols, "configuration loaded");
    if config.mode.is_live() {
        warn!("live mode requested but only the paper venue ships with this binary");
    }

    let backtest = config.mode == TradingMode::Backtest;
    let manual = Arc::new(ManualClock::new(Timestamp::now()));
    let clock: Arc<dyn Clock> = if backtest {
        Arc::clone(&manual) as Arc<dyn Clock>
    } else {
        Arc::new(SystemClock)
    };

    let feed = Arc::new(SimulatedFeed::new(Arc::clone(&clock), cli.seed));
    let executor = Arc::new(PaperExecutor::new(
        Arc::clone(&clock),
        config.execution.paper_slippage_bps,
    ));
    let step_ms = config.execution.tick_interval_ms as i64;

    let mut engine = Engine::new(Arc::new(config), feed, executor, clock.now())?;
    if cli.always_on {
        engine = engine.with_session(MarketSession::always_on());
    }
    let control = ControlLoop::new(engine, clock);

    if backtest {
        run_backtest(&control, &manual, step_ms, cli.ticks.unwrap_or(1_000)).await?;
    } else {
        run_live(&control, cli.ticks).await?;
    }

    let status = control.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!("{}", serde_json::to_string_pretty(&control.trades().await)?);
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,scalp_core=debug"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }
}

async fn run_backtest(control: &ControlLoop, clock: &ManualClock, step_ms: i64, ticks: u64) -> Result<()> {
    info!(ticks, "backtest started");
    for _ in 0..ticks {
        clock.advance_millis(step_ms);
        let report = control.step().await?;
        if report.escalations() > 0 {
            warn!(tick = report.tick, "exit escalated during backtest");
        }
    }
    if control.config().session.close_at_eod {
        control.close_all().await;
    }
    Ok(())
}

async fn run_live(control: &ControlLoop, ticks: Option<u64>) -> Result<()> {
    let mut status = control.subscribe();
    control.start().await?;

    let target = async {
        match ticks {
            Some(n) => {
                while status.borrow_and_update().tick_count < n {
                    if status.changed().await.is_err() {
                        break;
                    }
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = target => info!("tick target reached"),
        result = signal::ctrl_c() => {
            result.context("installing Ctrl-C handler")?;
            info!("received Ctrl-C, stopping");
        }
    }

    control.stop().await?;
    Ok(())
}
