//! Equirank CLI — universe analysis, snapshot download and configuration commands.
//!
//! Commands:
//! - `analyze` — fetch, analyze, rank and export every selected universe
//! - `download` — fetch series and store Parquet snapshots without analysis
//! - `universes` — list configured universes and their tickers
//! - `init-config` — write the default configuration as TOML

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use equirank_core::data::{
    CircuitBreaker, DataProvider, FundamentalsSource, LogProgress, NoFundamentals, SnapshotStore,
    SyntheticFundamentals, SyntheticProvider, YahooClient, YahooFundamentals, YahooProvider,
};
use equirank_runner::export::{format_top, save_report};
use equirank_runner::report::{download_universe, run_universe, Collaborators, RunOptions};
use equirank_runner::AnalysisConfig;

/// Seed for `--synthetic` runs, so repeated demos print the same tables.
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser)]
#[command(
    name = "equirank",
    about = "Equirank — return/risk analysis and percentile ranking of equity universes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze, rank and export universes.
    Analyze {
        /// Path to a TOML config file. Defaults to the built-in configuration.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Universe to analyze (repeatable). Defaults to all configured universes.
        #[arg(long = "universe")]
        universes: Vec<String>,

        /// Start date (YYYY-MM-DD). Overrides the config.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Overrides the config.
        #[arg(long)]
        end: Option<String>,

        /// Output directory. Overrides the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Offline mode: snapshots only, no fundamentals.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Use deterministic synthetic prices and ratios instead of Yahoo Finance.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Rows to print per universe. Overrides the config.
        #[arg(long)]
        top: Option<usize>,

        /// Neither read nor write snapshots.
        #[arg(long, default_value_t = false)]
        no_snapshot: bool,
    },
    /// Fetch series and store Parquet snapshots.
    Download {
        /// Universe to download (repeatable).
        #[arg(long = "universe", required = true)]
        universes: Vec<String>,

        /// Path to a TOML config file. Defaults to the built-in configuration.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Start date (YYYY-MM-DD). Overrides the config.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Overrides the config.
        #[arg(long)]
        end: Option<String>,

        /// Use deterministic synthetic prices instead of Yahoo Finance.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// List configured universes.
    Universes {
        /// Path to a TOML config file. Defaults to the built-in configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration as TOML.
    InitConfig {
        #[arg(long, default_value = "equirank.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            config,
            universes,
            start,
            end,
            output_dir,
            offline,
            synthetic,
            top,
            no_snapshot,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_overrides(&mut config, start.as_deref(), end.as_deref(), output_dir)?;
            if let Some(top) = top {
                config.top_n = top;
            }
            run_analyze(&config, &universes, offline, synthetic, no_snapshot)
        }
        Commands::Download {
            universes,
            config,
            start,
            end,
            synthetic,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_overrides(&mut config, start.as_deref(), end.as_deref(), None)?;
            run_download(&config, &universes, synthetic)
        }
        Commands::Universes { config } => run_universes(&load_config(config.as_deref())?),
        Commands::InitConfig { path, force } => run_init_config(&path, force),
    }
}

/// `RUST_LOG` filters (default `info`); `EQUIRANK_LOG_FORMAT=json` switches to JSON lines.
/// Logs go to stderr so the tables on stdout stay clean.
fn init_tracing() {
    let json_logging = std::env::var("EQUIRANK_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

fn apply_overrides(
    config: &mut AnalysisConfig,
    start: Option<&str>,
    end: Option<&str>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(s) = start {
        config.start_date = parse_date(s)?;
    }
    if let Some(e) = end {
        config.end_date = parse_date(e)?;
    }
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    config.validate()?;
    Ok(())
}

/// Prices and ratios for one invocation.
struct Sources {
    provider: Option<Box<dyn DataProvider>>,
    fundamentals: Box<dyn FundamentalsSource>,
}

fn build_sources(offline: bool, synthetic: bool) -> Result<Sources> {
    if offline && synthetic {
        bail!("--offline and --synthetic are mutually exclusive");
    }
    if synthetic {
        return Ok(Sources {
            provider: Some(Box::new(SyntheticProvider::new(SYNTHETIC_SEED))),
            fundamentals: Box::new(SyntheticFundamentals::new(SYNTHETIC_SEED)),
        });
    }
    if offline {
        return Ok(Sources {
            provider: None,
            fundamentals: Box::new(NoFundamentals),
        });
    }
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let client = Arc::new(YahooClient::new(circuit_breaker).context("failed to build HTTP client")?);
    Ok(Sources {
        provider: Some(Box::new(YahooProvider::new(Arc::clone(&client)))),
        fundamentals: Box::new(YahooFundamentals::new(client)),
    })
}

fn run_analyze(
    config: &AnalysisConfig,
    names: &[String],
    offline: bool,
    synthetic: bool,
    no_snapshot: bool,
) -> Result<()> {
    let selected = config.select(names)?;
    let sources = build_sources(offline, synthetic)?;
    let store = (!no_snapshot).then(|| SnapshotStore::new(&config.snapshot_dir));
    if offline && store.is_none() {
        bail!("--offline needs snapshots; drop --no-snapshot");
    }

    let progress = LogProgress;
    let collab = Collaborators {
        provider: sources.provider.as_deref(),
        fundamentals: sources.fundamentals.as_ref(),
        snapshot: store.as_ref(),
        progress: Some(&progress),
    };
    let run = RunOptions {
        offline,
        force: false,
        write_snapshots: !offline && store.is_some(),
    };

    for universe in selected {
        let report = run_universe(config, universe, collab, run)
            .with_context(|| format!("failed to analyze universe {}", universe.name))?;
        println!("{}", format_top(&report, config.top_n));

        let issues = report.issues_by_ticker();
        if !issues.is_empty() {
            println!("{} of {} tickers have issues (see the issues column)", issues.len(), report.table.len());
        }

        let files = save_report(&report, &config.output_dir, config.chart_window)?;
        for f in &files {
            println!("  wrote {}", f.display());
        }
        println!();
    }
    Ok(())
}

fn run_download(config: &AnalysisConfig, names: &[String], synthetic: bool) -> Result<()> {
    let selected = config.select(names)?;
    let sources = build_sources(false, synthetic)?;
    let Some(provider) = sources.provider.as_deref() else {
        bail!("no price provider available");
    };
    let store = SnapshotStore::new(&config.snapshot_dir);
    let progress = LogProgress;

    let mut any_failed = false;
    for universe in selected {
        let summary = download_universe(config, universe, provider, &store, Some(&progress));
        println!(
            "{}: {} snapshots written to {}",
            universe.name,
            summary.written.len(),
            store.root().join(universe.name.to_lowercase()).display()
        );
        for (ticker, reason) in &summary.failed {
            eprintln!("Error for {ticker}: {reason}");
        }
        any_failed |= !summary.failed.is_empty();
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_universes(config: &AnalysisConfig) -> Result<()> {
    for u in &config.universes {
        println!("{} (benchmark {}, {} tickers)", u.name, u.benchmark, u.tickers.len());
        println!("  {}", u.tickers.join(" "));
    }
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = AnalysisConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "default configuration written");
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "equirank", "analyze", "--universe", "IBEX35", "--universe", "SP500", "--start", "2025-01-01",
            "--synthetic", "--top", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze { universes, synthetic, top, .. } => {
                assert_eq!(universes, vec!["IBEX35", "SP500"]);
                assert!(synthetic);
                assert_eq!(top, Some(10));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn download_requires_universe() {
        assert!(Cli::try_parse_from(["equirank", "download"]).is_err());
    }

    #[test]
    fn overrides_are_validated() {
        let mut config = AnalysisConfig::default();
        apply_overrides(&mut config, Some("2025-06-01"), None, Some(PathBuf::from("out"))).unwrap();
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(config.output_dir, PathBuf::from("out"));

        let mut config = AnalysisConfig::default();
        assert!(apply_overrides(&mut config, Some("2026-01-01"), None, None).is_err());
        assert!(parse_date("01/02/2025").is_err());
    }

    #[test]
    fn offline_and_synthetic_conflict() {
        assert!(build_sources(true, true).is_err());
        assert!(build_sources(true, false).unwrap().provider.is_none());
    }
}
