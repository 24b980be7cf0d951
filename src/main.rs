//! Risk engine CLI
//!
//! Runs the leverage, sizing and priority decisions against a session config so operators
//! can check what the engine would do for a given signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use futures_risk_engine::api::{BalancePayload, BalanceSource};
use futures_risk_engine::models::{
    Candidate, EntryReason, ExitReason, Regime, RiskReason, Side, TradeSignal,
};
use futures_risk_engine::trading::{LevelMethod, SizingRequest};
use futures_risk_engine::{DecisionEngine, SessionConfig, SessionSnapshot, SessionStore};

/// Futures risk and decision engine CLI.
#[derive(Parser)]
#[command(name = "risk-engine")]
#[command(about = "Leverage, sizing and exit-priority decisions for futures signals", long_about = None)]
struct Cli {
    /// Session config file (TOML or JSON)
    #[arg(short, long, env = "RISK_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print decisions as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute leverage for a signal
    Leverage {
        symbol: String,

        /// Signal strength (0.0 - 1.0)
        #[arg(short, long)]
        strength: f64,

        /// Market regime (trending, ranging, choppy)
        #[arg(short, long)]
        regime: Regime,

        /// ATR / price ratio
        #[arg(short, long)]
        volatility: Option<f64>,
    },

    /// Size an order from the allocation table
    Size {
        symbol: String,

        #[arg(short, long)]
        price: Decimal,

        #[arg(short, long)]
        regime: Regime,

        /// Available balance in the quote asset
        #[arg(short, long)]
        balance: Decimal,

        #[arg(long, default_value = "1")]
        leverage: u32,

        #[arg(long, default_value = "long")]
        side: Side,

        /// ATR in price units
        #[arg(long)]
        atr: Option<Decimal>,
    },

    /// Show take-profit / stop-loss levels for an entry
    Levels {
        #[arg(short, long)]
        price: Decimal,

        #[arg(long, default_value = "long")]
        side: Side,

        #[arg(long)]
        atr: Option<Decimal>,
    },

    /// Pick the winning reason among simultaneous candidates
    Resolve {
        #[arg(value_enum)]
        family: Family,

        /// Reason labels, e.g. sl_reached tp_reached
        #[arg(required = true)]
        reasons: Vec<String>,
    },

    /// Run the full pipeline for a signal
    Plan {
        symbol: String,

        #[arg(long)]
        side: Side,

        #[arg(short, long)]
        strength: f64,

        #[arg(short, long)]
        regime: Regime,

        #[arg(short, long)]
        price: Decimal,

        #[arg(short, long)]
        volatility: Option<f64>,

        #[arg(long)]
        atr: Option<Decimal>,

        /// Available balance; defaults to the config's dry-run balances
        #[arg(short, long, conflicts_with = "balance_file")]
        balance: Option<Decimal>,

        /// Exchange balance payload (JSON) to read the quote asset from
        #[arg(long)]
        balance_file: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config,

    /// Reload the config periodically and report changes
    Watch {
        /// Reload interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Family {
    Exit,
    Entry,
    Risk,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Leverage {
            symbol,
            strength,
            regime,
            volatility,
        } => {
            let snapshot = SessionSnapshot::from_config(config);
            let mut signal = TradeSignal::new(symbol, Side::Long, strength, regime);
            signal.volatility = volatility;

            let decision = snapshot.leverage.compute(&signal, snapshot.catalog.as_ref());

            if cli.json {
                print_json(&decision)?;
            } else {
                println!("\n=== Leverage: {} ===\n", decision.symbol);
                println!("  Adjusted Strength:    {:.3}", decision.adjusted_strength);
                println!("  Tier:                 {}", decision.tier);
                println!("  Requested:            {}x", decision.requested);
                println!("  Leverage:             {}x", decision.leverage);
                println!("  Catalog Rounding:     {:?}", decision.rounding);
                for adjustment in &decision.adjustments {
                    println!("    - {:?}", adjustment);
                }
            }
        }

        Commands::Size {
            symbol,
            price,
            regime,
            balance,
            leverage,
            side,
            atr,
        } => {
            let snapshot = SessionSnapshot::from_config(config);
            let request = SizingRequest::new(symbol, price, regime, balance)
                .with_leverage(leverage)
                .with_side(side)
                .with_atr(atr);

            let decision = snapshot.sizer.size(&request, &snapshot.allocations)?;

            if cli.json {
                print_json(&decision)?;
            } else {
                println!("\n=== Sizing: {} ({}) ===\n", decision.symbol, decision.regime);
                println!("  Quantity:             {}", decision.quantity);
                println!("  Notional:             ${}", decision.notional.round_dp(2));
                println!("  Leverage:             {}x", decision.leverage);
                println!("  Margin Required:      ${}", decision.margin_required.round_dp(2));
                println!("  Take Profit:          {}", decision.take_profit);
                println!("  Stop Loss:            {}", decision.stop_loss);
                println!("  Levels From:          {}", describe_levels(&decision.level_method));
                println!("  Allocation:           {:?}", decision.allocation_source);
                println!("  Scaled To Minimum:    {}", decision.scaled_to_minimum);
            }
        }

        Commands::Levels { price, side, atr } => {
            if price <= Decimal::ZERO {
                bail!("price must be positive, got {}", price);
            }
            let snapshot = SessionSnapshot::from_config(config);
            let levels = snapshot.sizer.levels(price, side, atr);

            if cli.json {
                print_json(&levels)?;
            } else {
                let tp_pct = (levels.take_profit - price) / price * dec!(100);
                let sl_pct = (levels.stop_loss - price) / price * dec!(100);
                println!("\n=== Exit Levels ({} @ {}) ===\n", side, price);
                println!("  Take Profit:          {} ({}%)", levels.take_profit, tp_pct.round_dp(3));
                println!("  Stop Loss:            {} ({}%)", levels.stop_loss, sl_pct.round_dp(3));
                println!("  Method:               {}", describe_levels(&levels.method));
            }
        }

        Commands::Resolve { family, reasons } => {
            let snapshot = SessionSnapshot::from_config(config);
            let resolver = &snapshot.resolver;

            let (winner, rank, unranked) = match family {
                Family::Exit => {
                    let r = resolver.resolve_exit_detailed(
                        reasons.into_iter().map(|l| Candidate::new(ExitReason::from(l))),
                    );
                    (r.winner.map(|c| c.reason.to_string()), r.rank, labels(&r.unranked))
                }
                Family::Entry => {
                    let r = resolver.resolve_entry_detailed(
                        reasons.into_iter().map(|l| Candidate::new(EntryReason::from(l))),
                    );
                    (r.winner.map(|c| c.reason.to_string()), r.rank, labels(&r.unranked))
                }
                Family::Risk => {
                    let r = resolver.resolve_risk_detailed(
                        reasons.into_iter().map(|l| Candidate::new(RiskReason::from(l))),
                    );
                    (r.winner.map(|c| c.reason.to_string()), r.rank, labels(&r.unranked))
                }
            };

            if cli.json {
                print_json(&serde_json::json!({
                    "winner": winner,
                    "rank": rank,
                    "unranked": unranked,
                }))?;
            } else {
                match (winner, rank) {
                    (Some(winner), Some(rank)) => println!("Winner: {} (rank {})", winner, rank),
                    _ => println!("No candidates"),
                }
                if !unranked.is_empty() {
                    println!("Unranked: {}", unranked.join(", "));
                }
            }
        }

        Commands::Plan {
            symbol,
            side,
            strength,
            regime,
            price,
            volatility,
            atr,
            balance,
            balance_file,
        } => {
            let mut signal = TradeSignal::new(symbol, side, strength, regime);
            signal.volatility = volatility;
            signal.atr = atr;

            let quote_asset = config.sizing.quote_asset.clone();
            let balances: Box<dyn BalanceSource> = match (balance, balance_file) {
                (Some(amount), _) => {
                    Box::new(config.static_balances().with_balance(quote_asset, amount))
                }
                (None, Some(path)) => {
                    let raw = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let payload = serde_json::from_str(&raw)
                        .with_context(|| format!("Failed to parse {}", path.display()))?;
                    Box::new(BalancePayload::new(payload))
                }
                (None, None) => Box::new(config.static_balances()),
            };

            let engine = DecisionEngine::new(Arc::new(SessionStore::from_config(config)));
            let plan = engine.plan_with_balances(&signal, price, balances.as_ref())?;

            if cli.json {
                print_json(&plan)?;
            } else {
                println!("\n=== Trade Plan: {} {} ===\n", plan.signal.side, plan.signal.symbol);
                println!("  Regime:               {}", plan.signal.regime);
                println!("  Tier:                 {}", plan.leverage.tier);
                println!("  Leverage:             {}x", plan.leverage.leverage);
                if plan.leverage.is_degraded() {
                    println!("  Catalog Rounding:     degraded ({:?})", plan.leverage.rounding);
                }
                println!("  Quantity:             {}", plan.sizing.quantity);
                println!("  Notional:             ${}", plan.sizing.notional.round_dp(2));
                println!("  Margin Required:      ${}", plan.sizing.margin_required.round_dp(2));
                println!("  Take Profit:          {}", plan.sizing.take_profit);
                println!("  Stop Loss:            {}", plan.sizing.stop_loss);
            }
        }

        Commands::Config => {
            if cli.json {
                print_json(&config)?;
            } else {
                print_config(&config);
            }
        }

        Commands::Watch { interval } => {
            let Some(path) = cli.config else {
                bail!("watch needs --config (or RISK_ENGINE_CONFIG)");
            };
            watch(path, config, Duration::from_secs(interval.max(1))).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            let config = SessionConfig::load(path)?;
            info!(path = %path.display(), "Loaded session config");
            Ok(config)
        }
        None => {
            warn!("No config given, using built-in defaults (empty allocation table)");
            Ok(SessionConfig::default())
        }
    }
}

/// Reload `path` every `interval`, swapping the snapshot when the content changes.
async fn watch(path: PathBuf, initial: SessionConfig, interval: Duration) -> Result<()> {
    let store = SessionStore::from_config(initial.clone());
    let mut current = initial;
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    info!(path = %path.display(), interval_secs = interval.as_secs(), "Watching session config");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match SessionConfig::load(&path) {
                    Ok(config) if config != current => {
                        let generation = store.replace(SessionSnapshot::from_config(config.clone()));
                        println!("Reloaded {} (generation {})", path.display(), generation);
                        current = config;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %format!("{e:#}"), "Reload failed, keeping current session"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn print_config(config: &SessionConfig) {
    let leverage = &config.leverage;
    let sizing = &config.sizing;
    let exits = &config.exits;

    println!("\n=== Leverage ===\n");
    println!("  Bounds:               {}x - {}x", leverage.min_leverage, leverage.max_leverage);
    println!("  Ranging Cap:          {}x", leverage.ranging_cap);
    println!(
        "  Regime Multipliers:   trending {} / ranging {} / choppy {}",
        leverage.trending_multiplier, leverage.ranging_multiplier, leverage.choppy_multiplier
    );
    println!(
        "  High Volatility:      > {:.1}% -> x{}",
        leverage.high_volatility_threshold * 100.0,
        leverage.high_volatility_multiplier
    );
    println!(
        "  Low Volatility:       < {:.1}% -> x{}",
        leverage.low_volatility_threshold * 100.0,
        leverage.low_volatility_multiplier
    );
    for tier in &leverage.tiers {
        println!("  Tier {:<16} >= {:.2} -> {}x", tier.name, tier.min_strength, tier.leverage);
    }

    println!("\n=== Sizing ===\n");
    println!("  Mode:                 {:?}", sizing.mode);
    println!("  Quote Asset:          {}", sizing.quote_asset);
    println!("  Min Order Value:      ${}", sizing.min_order_value);
    println!("  Safety Margin:        {}%", sizing.min_order_safety_margin * dec!(100));
    println!("  Fixed TP / SL:        {}% / {}%", sizing.take_profit_pct * dec!(100), sizing.stop_loss_pct * dec!(100));
    println!(
        "  ATR TP / SL:          {}x / {}x",
        sizing.atr_take_profit_multiplier, sizing.atr_stop_loss_multiplier
    );

    println!("\n=== Exit Rules ===\n");
    println!("  Emergency Loss:       {}%", exits.emergency_loss_pct * dec!(100));
    println!("  Trailing Activation:  {}%", exits.trailing_activation_pct * dec!(100));
    println!("  Trailing Distance:    {}%", exits.trailing_distance_pct * dec!(100));
    println!("  Max Holding:          {}m", exits.max_holding_minutes);

    println!("\n=== Allocations ===\n");
    for symbol in config.allocations.symbols() {
        let row: Vec<String> = Regime::ALL
            .iter()
            .map(|regime| match config.allocations.resolve(*regime, &symbol) {
                Some(allocation) => format!("{}={}", regime, allocation.quantity),
                None => format!("{}=-", regime),
            })
            .collect();
        println!("  {:<14} {}", symbol, row.join("  "));
    }
    for (regime, symbol) in config.allocations.gaps() {
        println!("  ! no allocation for {} in {}", symbol, regime);
    }

    println!("\n=== Exit Priorities ===\n");
    for (reason, rank) in config.priorities.exit.entries() {
        println!("  {:>3}  {}", rank, reason);
    }

    match &config.catalog {
        Some(catalog) => println!("\nLeverage catalog: {} symbols", catalog.len()),
        None => println!("\nLeverage catalog: none (rounding disabled)"),
    }
}

fn describe_levels(method: &LevelMethod) -> String {
    match method {
        LevelMethod::Atr { atr } => format!("ATR {}", atr),
        LevelMethod::Fixed { reason } => format!("fixed percentages ({:?})", reason),
    }
}

fn labels<R: std::fmt::Display>(reasons: &[R]) -> Vec<String> {
    reasons.iter().map(|r| r.to_string()).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
