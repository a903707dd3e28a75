//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: closed positions and signals for external analysis tools
//! - **Markdown**: human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fvgscan_core::confluence::Signal;

use crate::position::Position;
use crate::runner::{BacktestResult, RunStatus, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export closed positions as CSV, one row per round trip.
pub fn export_positions_csv(positions: &[Position]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "direction",
        "signal_id",
        "entry_time",
        "entry_price",
        "stop_loss",
        "take_profit",
        "size",
        "exit_time",
        "exit_price",
        "exit_reason",
        "pnl",
        "return_pct",
        "bars_held",
    ])?;
    for p in positions {
        wtr.write_record([
            p.symbol.clone(),
            p.direction.to_string(),
            p.signal_id.to_string(),
            p.entry_time.to_rfc3339(),
            format!("{:.6}", p.entry_price),
            format!("{:.6}", p.stop_loss),
            format!("{:.6}", p.take_profit),
            format!("{:.6}", p.size),
            p.exit_time.to_rfc3339(),
            format!("{:.6}", p.exit_price),
            p.exit_reason.to_string(),
            format!("{:.2}", p.pnl),
            format!("{:.6}", p.return_pct),
            p.bars_held.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export signals as CSV with their contributing timeframes.
pub fn export_signals_csv(signals: &[Signal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "symbol",
        "direction",
        "formed_at",
        "confluence_count",
        "primary_timeframe",
        "timeframes",
    ])?;
    for s in signals {
        let timeframes: Vec<&str> = s.timeframes().map(|tf| tf.as_str()).collect();
        wtr.write_record([
            s.id.to_string(),
            s.symbol.clone(),
            s.direction.to_string(),
            s.formed_at.to_rfc3339(),
            s.confluence_count.to_string(),
            s.primary_timeframe.to_string(),
            timeframes.join("|"),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Directory name for a run: symbol, base timeframe and short run id.
pub fn artifact_dir_name(result: &BacktestResult) -> String {
    let symbol: String = result
        .symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{symbol}_{}_{}", result.base_timeframe, result.run_id.short())
}

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{timeframe}_{run_id}/` under `output_dir` containing:
/// - `manifest.json`: the full `BacktestResult`
/// - `positions.csv`: closed positions
/// - `signals.csv`: confluence signals
/// - `report.md`: Markdown summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(artifact_dir_name(result));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(result)?)?;
    std::fs::write(
        run_dir.join("positions.csv"),
        export_positions_csv(&result.positions)?,
    )?;
    std::fs::write(run_dir.join("signals.csv"), export_signals_csv(&result.signals)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(result))?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", result.symbol));
    md.push_str(&format!("| Base Timeframe | {} |\n", result.base_timeframe));
    let tfs: Vec<&str> = result.timeframes.iter().map(|tf| tf.as_str()).collect();
    md.push_str(&format!("| Timeframes | {} |\n", tfs.join(", ")));
    md.push_str(&format!("| Period | {} to {} |\n", result.start, result.end));
    md.push_str(&format!(
        "| Initial Capital | {:.2} |\n",
        result.initial_capital
    ));
    md.push_str(&format!("| Bars | {} |\n", result.bars_processed));
    md.push_str(&format!("| Signals | {} |\n", result.signals.len()));
    md.push_str(&format!(
        "| Setups | {} ({} skipped) |\n",
        result.setups.len(),
        result.skipped_setups
    ));
    md.push_str(&format!("| Run Id | {} |\n", result.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    if result.status == RunStatus::Partial {
        md.push_str("| Status | **PARTIAL** |\n");
    }
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total P&L | {:.2} |\n", m.total_pnl));
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return_pct));
    match m.sharpe {
        Some(s) => md.push_str(&format!("| Sharpe | {s:.3} |\n")),
        None => md.push_str("| Sharpe | n/a |\n"),
    }
    md.push_str(&format!("| Max Drawdown | {:.2} |\n", m.max_drawdown));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));
    md.push_str(&format!(
        "| Max Consecutive Losses | {} |\n",
        m.max_consecutive_losses
    ));
    md.push_str(&format!("| Final Equity | {:.2} |\n", m.final_equity));
    md.push('\n');

    if !result.data_gaps.is_empty() || result.open_position_discarded {
        md.push_str("## Data Quality\n\n");
        for gap in &result.data_gaps {
            md.push_str(&format!(
                "- {} {}: {} missing bar(s) from {} to {}\n",
                gap.symbol, gap.timeframe, gap.missing_bars, gap.start, gap.end
            ));
        }
        if result.open_position_discarded {
            md.push_str("- A position open at the end of data was discarded\n");
        }
        md.push('\n');
    }

    md
}
