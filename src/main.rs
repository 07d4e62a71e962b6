//! Strategy Orchestrator - Main Entry Point
//!
//! Paper deployment: simulated market analysis and paper strategies, with
//! periodic stats snapshots to SQLite.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strategy_orchestrator::config::{Config, LoggingConfig};
use strategy_orchestrator::market::SimulatedMarketProvider;
use strategy_orchestrator::persistence::PersistenceManager;
use strategy_orchestrator::strategy::PaperStrategy;
use strategy_orchestrator::Orchestrator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Strategy Orchestrator CLI
#[derive(Parser)]
#[command(name = "strategy-orchestrator")]
#[command(version, about = "Capital allocation and admission control for trading strategies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paper deployment until Ctrl-C (default)
    Run,

    /// Show the latest persisted stats snapshot
    Status {
        /// Path to SQLite database
        #[arg(short, long, default_value = "data/orchestrator.db")]
        db: String,

        /// Show per-strategy detail
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Status { db, verbose }) => show_status(&db, verbose),
        Some(Commands::Run) | None => {
            let config = Config::load()?;
            config.validate()?;
            init_logging(&config.logging)?;
            run(config).await
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║       Strategy Orchestrator v{} - Paper Deployment       ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let mut builder = Orchestrator::builder(&config);
    builder.market_provider(Arc::new(SimulatedMarketProvider::default_cycle()));

    for paper in &config.strategies {
        let strategy = Arc::new(PaperStrategy::with_edge(
            paper.strategy.name.clone(),
            paper.win_rate_pct,
            paper.profit_per_win,
            paper.loss_per_trade,
        ));
        let capability = strategy.capability(paper.capability);
        builder.register(paper.strategy.clone(), strategy, capability)?;
    }

    let orchestrator = builder.build()?;
    info!(strategies = ?orchestrator.strategy_names(), "🧠 Strategies registered");

    let persistence = if config.persistence.enabled {
        if let Some(parent) = Path::new(&config.persistence.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Some(
            PersistenceManager::new(&config.persistence.db_path)?
                .with_retention(config.persistence.keep_snapshots),
        )
    } else {
        info!("💾 [PERSISTENCE] Disabled");
        None
    };

    orchestrator.start().await;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("🛑 Shutdown signal received");
        signal.cancel();
    });

    let snapshot_interval = Duration::from_secs(config.persistence.snapshot_interval_secs.max(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(snapshot_interval) => {
                snapshot(&orchestrator, persistence.as_ref()).await;
            }
        }
    }

    orchestrator.stop().await;
    snapshot(&orchestrator, persistence.as_ref()).await;

    info!("👋 Strategy Orchestrator shutdown complete");
    Ok(())
}

/// Log a stats summary and persist it when enabled.
async fn snapshot(orchestrator: &Orchestrator, persistence: Option<&PersistenceManager>) {
    let stats = orchestrator.stats().await;
    let performance = orchestrator.performance().await;

    info!(
        market = %orchestrator.market_condition().await,
        allocated = %stats.allocated_capital.round_dp(2),
        available = %stats.available_capital.round_dp(2),
        profit = %stats.total_profit.round_dp(2),
        trades = stats.total_trades,
        win_rate = %stats.overall_win_rate.round_dp(1),
        best = stats.best_performing_strategy.as_deref().unwrap_or("-"),
        "📊 [STATS] Orchestrator snapshot"
    );

    if let Some(persistence) = persistence {
        if let Err(e) = persistence.record_snapshot(Utc::now(), &stats, &performance) {
            warn!(error = %e, "💾 [PERSISTENCE] Failed to record snapshot");
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all(&config.directory)?;

    let file_appender = tracing_appender::rolling::hourly(&config.directory, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    let filter = EnvFilter::from_default_env()
        .add_directive("strategy_orchestrator=debug".parse()?)
        .add_directive(Level::INFO.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        subscriber.json().init();
    } else {
        subscriber.with_ansi(true).init();
    }

    Ok(())
}

fn log_config(config: &Config) {
    let o = &config.orchestrator;
    info!("📋 Configuration:");
    info!("   Total Capital: ${}", o.total_capital);
    info!(
        "   Max Utilization: {:.0}%",
        config.allocation.max_utilization * Decimal::ONE_HUNDRED
    );
    info!(
        "   Intervals: tick {}s, classifier {}s, tracker {}s, rebalance {}s",
        o.tick_interval_secs, o.classifier_interval_secs, o.tracker_interval_secs, o.rebalance_interval_secs
    );
    info!("   Global Cooldown: {}s", o.global_cooldown_secs);
    info!(
        "   Timeouts: dispatch {}s, start {}s, stop {}s",
        o.dispatch_timeout_secs, o.start_timeout_secs, o.stop_timeout_secs
    );
    if config.persistence.enabled {
        info!(
            "   Snapshots: every {}s, keeping {}",
            config.persistence.snapshot_interval_secs, config.persistence.keep_snapshots
        );
    }
    info!("   Fallthrough On Failure: {}", o.fallthrough_on_failure);
    for paper in &config.strategies {
        info!(
            "   Strategy {}: priority {}, {:?}, max {}%",
            paper.strategy.name,
            paper.strategy.priority,
            paper.capability,
            paper.strategy.max_capital_allocation_percent
        );
    }
}

/// Print the latest persisted snapshot.
fn show_status(db_path: &str, verbose: bool) -> Result<()> {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              ORCHESTRATOR STATUS                           ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !Path::new(db_path).exists() {
        println!("\n❌ Database not found: {}", db_path);
        println!("   The orchestrator has not been started yet, or the database path is incorrect.");
        return Ok(());
    }

    let persistence = PersistenceManager::new(db_path)?;

    let Some(snapshot) = persistence.latest_snapshot()? else {
        println!("\n❌ No snapshot found in database.");
        return Ok(());
    };
    let stats = &snapshot.stats;

    println!("\n📊 Capital");
    println!("   ├─ Total:            ${:.2}", stats.total_capital);
    println!("   ├─ Allocated:        ${:.2}", stats.allocated_capital);
    println!("   ├─ Available:        ${:.2}", stats.available_capital);
    println!("   └─ Last Updated:     {}", snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));

    println!("\n📈 Performance");
    println!("   ├─ Total Profit:     ${:.2}", stats.total_profit);
    println!("   ├─ Total Trades:     {}", stats.total_trades);
    println!("   ├─ Win Rate:         {:.1}%", stats.overall_win_rate);
    println!("   ├─ Risk-Adj Return:  {:.4}", stats.risk_adjusted_return);
    println!(
        "   ├─ Best Strategy:    {}",
        stats.best_performing_strategy.as_deref().unwrap_or("-")
    );
    println!(
        "   └─ Worst Strategy:   {}",
        stats.worst_performing_strategy.as_deref().unwrap_or("-")
    );

    println!("\n🧠 Strategies ({})", snapshot.strategies.len());
    for s in &snapshot.strategies {
        println!(
            "   ┌─ {} (score {:.1}, risk {:.2})",
            s.name, s.performance_score, s.risk_score
        );
        println!("   └─ Allocated: ${:.2}", s.capital_allocated);

        if verbose {
            println!(
                "       Trades: {}/{} ({:.1}%), profit ${:.2}",
                s.successful_trades, s.total_trades, s.win_rate, s.total_profit
            );
            match s.last_execution_time {
                Some(at) => println!("       Last dispatch: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("       Last dispatch: never"),
            }
        }
    }
    println!("\n   Snapshots stored: {}", persistence.snapshot_count()?);

    Ok(())
}
