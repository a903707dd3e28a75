//! FVG Scan CLI: backtest, scan, parameter and synthetic-data commands.
//!
//! Commands:
//! - `backtest`: replay CSV candles through the simulator and save artifacts
//! - `scan`: one live scan pass over CSV candles, setups logged
//! - `params view|set|remove`: inspect and edit parameter overrides
//! - `synth`: write deterministic synthetic candle files

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use fvgscan_core::domain::Timeframe;
use fvgscan_core::params::{OverrideScope, OverrideStore, PartialParameterSet};
use fvgscan_core::setup::FixedEquity;
use fvgscan_core::sink::LogSink;
use fvgscan_runner::export::save_artifacts;
use fvgscan_runner::overrides::{load_store, save_store};
use fvgscan_runner::synthetic::generate_series;
use fvgscan_runner::{
    write_candles_csv, BacktestResult, Backtester, CsvCandleSource, RunStatus, ScanConfig, Scanner,
};

#[derive(Parser)]
#[command(
    name = "fvgscan",
    about = "FVG Scan: multi-timeframe fair value gap scanner and backtester"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one or more symbols over CSV candles.
    Backtest {
        /// Symbols to backtest. Defaults to the configured symbols.
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// Base timeframe.
        #[arg(long, default_value = "1m")]
        timeframe: Timeframe,

        /// Start time (YYYY-MM-DD or RFC 3339), inclusive.
        #[arg(long)]
        start: String,

        /// End time (YYYY-MM-DD or RFC 3339), exclusive.
        #[arg(long)]
        end: String,

        /// Per-run parameter overrides, e.g. `--set take_profit_rr_ratio=3`.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Output directory for artifacts. Defaults to the configured one.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Run one scan pass and log any trade setups.
    Scan {
        /// Evaluation time (YYYY-MM-DD or RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// Candles of history to load per timeframe, counted on the lowest timeframe.
        #[arg(long, default_value_t = 500)]
        lookback_bars: usize,

        /// Equity used for position sizing.
        #[arg(long, default_value_t = 10_000.0)]
        equity: f64,
    },
    /// Parameter override management.
    Params {
        #[command(subcommand)]
        action: ParamsAction,
    },
    /// Generate deterministic synthetic candle files.
    Synth {
        /// Symbols to generate. Defaults to the configured symbols.
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// Start time (YYYY-MM-DD or RFC 3339).
        #[arg(long, default_value = "2024-01-01")]
        start: String,

        /// Length of the series in minutes.
        #[arg(long, default_value_t = 10_080)]
        minutes: usize,
    },
}

#[derive(Subcommand)]
enum ParamsAction {
    /// Show effective parameters, or the stored layer with `--layer`.
    View {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<Timeframe>,
        /// Show only the override layer at this scope.
        #[arg(long, default_value_t = false)]
        layer: bool,
    },
    /// Set override fields at a scope: global, timeframe, or symbol + timeframe.
    Set {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<Timeframe>,
        /// Fields as NAME=VALUE.
        #[arg(required = true, value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
    /// Remove the override layer at a scope. Global resets to built-in defaults.
    Remove {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<Timeframe>,
    },
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    };

    match cli.command {
        Commands::Backtest {
            symbols,
            timeframe,
            start,
            end,
            overrides,
            output_dir,
        } => run_backtest_cmd(&config, symbols, timeframe, &start, &end, &overrides, output_dir),
        Commands::Scan {
            at,
            lookback_bars,
            equity,
        } => run_scan_cmd(&config, at.as_deref(), lookback_bars, equity),
        Commands::Params { action } => run_params_cmd(&config, action),
        Commands::Synth {
            symbols,
            start,
            minutes,
        } => run_synth_cmd(&config, symbols, &start, minutes),
    }
}

fn run_backtest_cmd(
    config: &ScanConfig,
    symbols: Vec<String>,
    timeframe: Timeframe,
    start: &str,
    end: &str,
    overrides: &[String],
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let symbols = symbols_or_configured(symbols, config)?;
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    let overlay = parse_fields(overrides)?;
    let overlay = (!overlay.is_empty()).then_some(overlay);

    let store = load_store(&config.scanner.overrides_path, config.defaults())?;
    let source = CsvCandleSource::new(&config.scanner.data_dir);
    let backtester = Backtester::new(&source, &store, config.backtest_settings());
    let output_dir = output_dir.unwrap_or_else(|| config.backtest.output_dir.clone());

    let mut failures = 0;
    for (symbol, outcome) in
        backtester.run_backtests(&symbols, timeframe, start, end, overlay.as_ref())
    {
        match outcome {
            Ok(result) => {
                print_summary(&result);
                let run_dir = save_artifacts(&result, &output_dir)?;
                println!("Artifacts saved to: {}", run_dir.display());
            }
            Err(e) => {
                eprintln!("Error for {symbol}: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} backtest(s) failed", symbols.len());
    }
    Ok(())
}

fn run_scan_cmd(config: &ScanConfig, at: Option<&str>, lookback_bars: usize, equity: f64) -> Result<()> {
    if config.scanner.symbols.is_empty() {
        bail!("no symbols configured; set [scanner] symbols in the config file");
    }
    let at = match at {
        Some(s) => parse_time(s)?,
        None => Utc::now(),
    };
    let lowest = config
        .scanner
        .timeframes
        .iter()
        .min()
        .copied()
        .unwrap_or(Timeframe::M1);
    let bars = i32::try_from(lookback_bars).context("lookback too large")?;
    let since = at - lowest.duration() * bars;

    let store = load_store(&config.scanner.overrides_path, config.defaults())?;
    let source = CsvCandleSource::new(&config.scanner.data_dir);
    let scanner = Scanner::new(
        &config.scanner.symbols,
        &config.scanner.timeframes,
        Arc::new(LogSink),
        Box::new(FixedEquity(equity)),
    );
    let report = scanner.scan_source(&source, &store, since, at)?;
    info!(
        candles = report.candles_pushed,
        gaps = report.gaps_formed,
        signals = report.signals.len(),
        setups = report.setups.len(),
        skipped = report.skipped_setups,
        "scan complete"
    );
    Ok(())
}

fn run_params_cmd(config: &ScanConfig, action: ParamsAction) -> Result<()> {
    let path = &config.scanner.overrides_path;
    let mut store = load_store(path, config.defaults())?;

    match action {
        ParamsAction::View {
            symbol,
            timeframe,
            layer,
        } => {
            if layer {
                let scope = scope_from(symbol, timeframe)?;
                let fields = store.get_overrides(&scope);
                println!("{scope} (store version {})", store.version());
                println!("{}", serde_json::to_string_pretty(&fields)?);
                return Ok(());
            }
            let symbol = symbol.unwrap_or_default();
            let timeframes = match timeframe {
                Some(tf) => vec![tf],
                None => config.scanner.timeframes.clone(),
            };
            println!("Store version {}", store.version());
            for tf in timeframes {
                let params = store.resolve(&symbol, tf);
                println!();
                println!("--- {tf} ---");
                if let serde_json::Value::Object(map) = serde_json::to_value(&params)? {
                    for (name, value) in map {
                        println!("{name:<26} {value}");
                    }
                }
            }
        }
        ParamsAction::Set {
            symbol,
            timeframe,
            fields,
        } => {
            let scope = scope_from(symbol, timeframe)?;
            let fields = parse_fields(&fields)?;
            let version = store.set_override(scope.clone(), fields)?;
            save_store(path, &store)?;
            println!("Updated {scope} (store version {version})");
        }
        ParamsAction::Remove { symbol, timeframe } => {
            let scope = scope_from(symbol, timeframe)?;
            if store.remove_override(&scope) {
                save_store(path, &store)?;
                println!("Removed {scope} (store version {})", store.version());
            } else {
                println!("Nothing stored at {scope}");
            }
        }
    }
    Ok(())
}

fn run_synth_cmd(config: &ScanConfig, symbols: Vec<String>, start: &str, minutes: usize) -> Result<()> {
    let symbols = symbols_or_configured(symbols, config)?;
    let start = parse_time(start)?;
    let dir = &config.scanner.data_dir;
    for symbol in &symbols {
        let series = generate_series(symbol, &config.scanner.timeframes, start, minutes);
        for (tf, candles) in &series {
            match write_candles_csv(dir, candles)? {
                Some(path) => println!("{symbol} {tf}: {} candles -> {}", candles.len(), path.display()),
                None => warn!(symbol = %symbol, timeframe = %tf, "series too short, nothing written"),
            }
        }
    }
    Ok(())
}

fn symbols_or_configured(symbols: Vec<String>, config: &ScanConfig) -> Result<Vec<String>> {
    let symbols = if symbols.is_empty() {
        config.scanner.symbols.clone()
    } else {
        symbols
    };
    if symbols.is_empty() {
        bail!("no symbols given; pass --symbol or set [scanner] symbols");
    }
    Ok(symbols)
}

fn scope_from(symbol: Option<String>, timeframe: Option<Timeframe>) -> Result<OverrideScope> {
    Ok(match (symbol, timeframe) {
        (None, None) => OverrideScope::Global,
        (None, Some(tf)) => OverrideScope::Timeframe(tf),
        (Some(symbol), Some(timeframe)) => OverrideScope::Symbol { symbol, timeframe },
        (Some(_), None) => bail!("--symbol requires --timeframe"),
    })
}

fn parse_fields(pairs: &[String]) -> Result<PartialParameterSet> {
    let mut fields = PartialParameterSet::default();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("expected NAME=VALUE, got '{pair}'");
        };
        fields.set_raw(name.trim(), value.trim())?;
    }
    Ok(fields)
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339.
fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{s}': expected YYYY-MM-DD or RFC 3339"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!("Base timeframe: {}", result.base_timeframe);
    println!("Period:         {} to {}", result.start, result.end);
    println!("Bars:           {}", result.bars_processed);
    println!("Signals:        {}", result.signals.len());
    println!(
        "Setups:         {} ({} skipped)",
        result.setups.len(),
        result.skipped_setups
    );
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total P&L:      {:.2}", m.total_pnl);
    println!("Total Return:   {:.2}%", m.total_return_pct);
    match m.sharpe {
        Some(s) => println!("Sharpe:         {s:.3}"),
        None => println!("Sharpe:         n/a"),
    }
    println!("Max Drawdown:   {:.2}", m.max_drawdown);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Max Consec Loss:{}", m.max_consecutive_losses);
    println!("Final Equity:   {:.2}", m.final_equity);
    if result.status == RunStatus::Partial {
        println!();
        println!(
            "WARNING: partial run, {} missing candle range(s)",
            result.data_gaps.len()
        );
    }
    if result.open_position_discarded {
        println!("NOTE: position open at end of data was discarded");
    }
    println!();
}
