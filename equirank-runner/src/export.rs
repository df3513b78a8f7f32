//! Report export — CSV tables for the persistence and plotting layers, JSON for
//! the full report, and a plain-text top-N listing for the terminal.
//!
//! Undefined values are written as empty CSV cells, never as 0.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::charts::{rolling_mean, volatility_bars, VolatilityBar};
use crate::metrics::ReturnSeries;
use crate::report::UniverseReport;
use crate::table::RankedTable;

fn cell(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Ranked table in its current order.
///
/// Columns: ticker, observations, volatility, cumulative_return, sharpe,
/// alpha, beta, pe, pb, dividend_yield, one column per rank, issues
pub fn ranked_table_csv(table: &RankedTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header: Vec<&str> = vec![
        "ticker",
        "observations",
        "volatility",
        "cumulative_return",
        "sharpe",
        "alpha",
        "beta",
        "pe",
        "pb",
        "dividend_yield",
    ];
    header.extend(table.rank_columns().iter().map(|c| c.name.as_str()));
    header.push("issues");
    wtr.write_record(&header)?;

    for (i, row) in table.rows().iter().enumerate() {
        let mut record = vec![
            row.ticker.clone(),
            row.observations.to_string(),
            cell(row.volatility),
            cell(row.cumulative_return),
            cell(row.sharpe),
            cell(row.alpha),
            cell(row.beta),
            cell(row.pe),
            cell(row.pb),
            cell(row.dividend_yield),
        ];
        record.extend(table.rank_columns().iter().map(|c| c.scores[i].to_string()));
        record.push(
            row.issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        );
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush ranked table CSV")?;
    String::from_utf8(data).context("ranked table CSV is not valid UTF-8")
}

/// Long-format per-bar series: ticker, date, close, daily_change,
/// daily_return, cumulative_return, cumulative_return_ma{window}.
pub fn returns_csv(returns: &[ReturnSeries], window: usize) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let smoothed = format!("cumulative_return_ma{window}");
    wtr.write_record([
        "ticker",
        "date",
        "close",
        "daily_change",
        "daily_return",
        "cumulative_return",
        smoothed.as_str(),
    ])?;

    for r in returns {
        let ma = rolling_mean(&r.cumulative_return, window);
        for i in 0..r.len() {
            wtr.write_record([
                r.ticker.clone(),
                r.dates[i].to_string(),
                r.close[i].to_string(),
                cell(r.daily_change[i]),
                cell(r.daily_return[i]),
                cell(r.cumulative_return[i]),
                cell(ma[i]),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush returns CSV")?;
    String::from_utf8(data).context("returns CSV is not valid UTF-8")
}

pub fn volatility_csv(bars: &[VolatilityBar]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ticker", "daily_volatility"])?;
    for b in bars {
        wtr.write_record([b.ticker.clone(), b.daily_volatility.to_string()])?;
    }
    let data = wtr.into_inner().context("failed to flush volatility CSV")?;
    String::from_utf8(data).context("volatility CSV is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn report_json(report: &UniverseReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize UniverseReport to JSON")
}

pub fn import_report_json(json: &str) -> Result<UniverseReport> {
    serde_json::from_str(json).context("failed to deserialize UniverseReport from JSON")
}

// ─── Files ──────────────────────────────────────────────────────────

/// Write `{u}_analysed.csv`, `{u}_returns.csv`, `{u}_volatility.csv` and
/// `{u}_report.json` under `output_dir`, where `u` is the lowercased universe name.
pub fn save_report(report: &UniverseReport, output_dir: &Path, window: usize) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let stem = report.universe.to_lowercase();

    let files = [
        (format!("{stem}_analysed.csv"), ranked_table_csv(&report.table)?),
        (format!("{stem}_returns.csv"), returns_csv(&report.returns, window)?),
        (
            format!("{stem}_volatility.csv"),
            volatility_csv(&volatility_bars(&report.returns))?,
        ),
        (format!("{stem}_report.json"), report_json(report)?),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = output_dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

// ─── Terminal listing ───────────────────────────────────────────────

fn fmt_opt(v: Option<f64>, width: usize, precision: usize) -> String {
    match v {
        Some(v) => format!("{v:>width$.precision$}"),
        None => format!("{:>width$}", "-"),
    }
}

/// Fixed-width listing of the first `n` rows with every rank column.
pub fn format_top(report: &UniverseReport, n: usize) -> String {
    let table = &report.table;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} vs {} ({} to {}), sorted by {}",
        report.universe, report.benchmark, report.start_date, report.end_date, report.primary_rank
    );
    let _ = write!(
        out,
        "{:<12} {:>8} {:>8} {:>7} {:>8} {:>6} {:>7} {:>6} {:>6}",
        "TICKER", "VOL", "CUMRET", "SHARPE", "ALPHA", "BETA", "P/E", "P/B", "DIV%"
    );
    for col in table.rank_columns() {
        let _ = write!(out, " {:>width$}", col.name, width = col.name.len().max(4));
    }
    out.push('\n');

    for (i, row) in table.top(n).iter().enumerate() {
        let _ = write!(
            out,
            "{:<12} {} {} {} {} {} {} {} {}",
            row.ticker,
            fmt_opt(row.volatility, 8, 3),
            fmt_opt(row.cumulative_return, 8, 3),
            fmt_opt(row.sharpe, 7, 2),
            fmt_opt(row.alpha, 8, 5),
            fmt_opt(row.beta, 6, 2),
            fmt_opt(row.pe, 7, 1),
            fmt_opt(row.pb, 6, 2),
            fmt_opt(row.dividend_yield, 6, 2),
        );
        for col in table.rank_columns() {
            let _ = write!(out, " {:>width$}", col.scores[i], width = col.name.len().max(4));
        }
        out.push('\n');
    }
    out
}
