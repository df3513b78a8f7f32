//! Report assembler — provider → calculator → enricher → ranker → sorted table.
//!
//! Per-ticker work (analysis and enrichment) is independent and may run on the
//! rayon pool; results are collected in input order. Ranking runs only once
//! every row exists. Every input ticker ends up in the table.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use equirank_core::data::{
    DataProvider, DataSource, DownloadProgress, FundamentalsSource, SnapshotMeta, SnapshotStore,
    Universe,
};
use equirank_core::domain::PriceSeries;

use crate::config::AnalysisConfig;
use crate::data_loader::{load_series, load_universe_series, LoadOptions, LoadedSeries};
use crate::enrich::ValuationEnricher;
use crate::metrics::{analyze_against, InstrumentAnalysis, ReturnSeries};
use crate::ranking::{rank_all, RankSpec};
use crate::summary::MetricIssue;
use crate::table::{RankedTable, TableError};

/// External collaborators one run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub provider: Option<&'a dyn DataProvider>,
    pub fundamentals: &'a dyn FundamentalsSource,
    pub snapshot: Option<&'a SnapshotStore>,
    pub progress: Option<&'a dyn DownloadProgress>,
}

/// Per-run switches that are not part of the analysis configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Never touch the network.
    pub offline: bool,
    /// Ignore snapshots that already cover the range.
    pub force: bool,
    /// Persist freshly fetched series to the snapshot store.
    pub write_snapshots: bool,
}

/// Everything produced for one universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseReport {
    pub universe: String,
    pub benchmark: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub primary_rank: String,
    /// Sorted descending by `primary_rank`.
    pub table: RankedTable,
    /// Derived series per ticker, in input order.
    pub returns: Vec<ReturnSeries>,
    pub benchmark_returns: ReturnSeries,
    pub sources: BTreeMap<String, DataSource>,
}

impl UniverseReport {
    /// Rows with at least one issue, keyed by ticker.
    pub fn issues_by_ticker(&self) -> BTreeMap<&str, &[MetricIssue]> {
        self.table
            .rows()
            .iter()
            .filter(|r| !r.issues.is_empty())
            .map(|r| (r.ticker.as_str(), r.issues.as_slice()))
            .collect()
    }
}

/// Analyze and enrich every series against one benchmark, preserving input order.
pub fn analyze_all(
    series: &[PriceSeries],
    benchmark: &ReturnSeries,
    fundamentals: &dyn FundamentalsSource,
    parallel: bool,
) -> Vec<InstrumentAnalysis> {
    let enricher = ValuationEnricher::new(fundamentals);
    let one = |s: &PriceSeries| {
        let mut analysis = analyze_against(s, benchmark);
        enricher.apply(&mut analysis.summary);
        analysis
    };
    if parallel {
        series.par_iter().map(one).collect()
    } else {
        series.iter().map(one).collect()
    }
}

/// Rank every spec, add `total_rank`, sort descending by `primary`.
pub fn build_table(
    analyses: &[InstrumentAnalysis],
    specs: &[RankSpec],
    primary: &str,
) -> Result<RankedTable, TableError> {
    let rows = analyses.iter().map(|a| a.summary.clone()).collect();
    rank_all(RankedTable::new(rows), specs)?.sort_desc_by(primary)
}

/// Assemble the ranked table for already-loaded series.
pub fn assemble(
    series: &[PriceSeries],
    benchmark: &PriceSeries,
    fundamentals: &dyn FundamentalsSource,
    specs: &[RankSpec],
    primary: &str,
    parallel: bool,
) -> Result<RankedTable, TableError> {
    let bench = ReturnSeries::from_series(benchmark);
    build_table(&analyze_all(series, &bench, fundamentals, parallel), specs, primary)
}

/// Snapshot namespace for ticker lists that belong to no configured universe.
const ADHOC_UNIVERSE: &str = "adhoc";

/// Fetch, analyze, enrich and rank one ticker list.
pub fn analyze_universe(
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    benchmark_ticker: &str,
    specs: &[RankSpec],
    primary: &str,
    collab: Collaborators<'_>,
) -> Result<RankedTable, TableError> {
    let opts = LoadOptions {
        start,
        end,
        offline: false,
        force: false,
    };
    let loaded = load_universe_series(tickers, ADHOC_UNIVERSE, collab.snapshot, collab.provider, collab.progress, &opts);
    let benchmark = load_series(benchmark_ticker, ADHOC_UNIVERSE, collab.snapshot, collab.provider, &opts);
    let series: Vec<PriceSeries> = loaded.into_iter().map(|l| l.series).collect();
    assemble(&series, &benchmark.series, collab.fundamentals, specs, primary, false)
}

/// Full pipeline for one configured universe.
pub fn run_universe(
    config: &AnalysisConfig,
    universe: &Universe,
    collab: Collaborators<'_>,
    run: RunOptions,
) -> Result<UniverseReport, TableError> {
    let opts = LoadOptions {
        start: config.start_date,
        end: config.end_date,
        offline: run.offline,
        force: run.force,
    };
    info!(
        universe = %universe.name,
        tickers = universe.tickers.len(),
        benchmark = %universe.benchmark,
        "loading series"
    );

    let benchmark = load_series(&universe.benchmark, &universe.name, collab.snapshot, collab.provider, &opts);
    if benchmark.series.is_empty() {
        warn!(universe = %universe.name, benchmark = %universe.benchmark, "benchmark unavailable; alpha and beta will be undefined");
    }
    let loaded = load_universe_series(
        &universe.tickers,
        &universe.name,
        collab.snapshot,
        collab.provider,
        collab.progress,
        &opts,
    );

    info!(universe = %universe.name, parallel = config.parallel, "analyzing");
    let benchmark_returns = ReturnSeries::from_series(&benchmark.series);
    let series: Vec<PriceSeries> = loaded.iter().map(|l| l.series.clone()).collect();
    let mut analyses = analyze_all(&series, &benchmark_returns, collab.fundamentals, config.parallel);

    for (analysis, l) in analyses.iter_mut().zip(&loaded) {
        if let Some(issue) = &l.issue {
            let issues = &mut analysis.summary.issues;
            issues.retain(|i| !matches!(i, MetricIssue::MissingData { .. }));
            issues.insert(0, issue.clone());
        }
    }

    if run.write_snapshots {
        if let Some(store) = collab.snapshot {
            let requested = (config.start_date, config.end_date);
            write_snapshots(store, &universe.name, requested, &loaded, &analyses);
            if benchmark.is_fresh() {
                let derived = benchmark_returns.to_derived_columns();
                let written =
                    store.write_requested(&universe.name, &benchmark.series, Some(&derived), Some(requested));
                if let Err(e) = written {
                    warn!(ticker = %universe.benchmark, error = %e, "snapshot write failed");
                }
            }
        }
    }

    info!(universe = %universe.name, specs = config.rank_specs.len(), "ranking");
    let table = build_table(&analyses, &config.rank_specs, &config.primary_rank)?;

    let sources = loaded
        .iter()
        .map(|l| (l.series.ticker().to_string(), l.source))
        .collect();
    Ok(UniverseReport {
        universe: universe.name.clone(),
        benchmark: universe.benchmark.clone(),
        start_date: config.start_date,
        end_date: config.end_date,
        primary_rank: config.primary_rank.clone(),
        table,
        returns: analyses.into_iter().map(|a| a.returns).collect(),
        benchmark_returns,
        sources,
    })
}

/// Outcome of a download-only run.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub written: Vec<SnapshotMeta>,
    /// Ticker and reason for every series that could not be fetched or stored.
    pub failed: Vec<(String, String)>,
}

/// Fetch the benchmark and every ticker of `universe` and snapshot them with
/// their derived columns. Existing snapshots are ignored and overwritten.
pub fn download_universe(
    config: &AnalysisConfig,
    universe: &Universe,
    provider: &dyn DataProvider,
    store: &SnapshotStore,
    progress: Option<&dyn DownloadProgress>,
) -> DownloadSummary {
    let opts = LoadOptions {
        start: config.start_date,
        end: config.end_date,
        offline: false,
        force: true,
    };
    let mut tickers = vec![universe.benchmark.clone()];
    tickers.extend(universe.tickers.iter().filter(|t| **t != universe.benchmark).cloned());

    let mut summary = DownloadSummary::default();
    for loaded in load_universe_series(&tickers, &universe.name, None, Some(provider), progress, &opts) {
        let ticker = loaded.series.ticker().to_string();
        if let Some(issue) = loaded.issue {
            summary.failed.push((ticker, issue.to_string()));
            continue;
        }
        let derived = ReturnSeries::from_series(&loaded.series).to_derived_columns();
        let requested = Some((config.start_date, config.end_date));
        match store.write_requested(&universe.name, &loaded.series, Some(&derived), requested) {
            Ok(meta) => summary.written.push(meta),
            Err(e) => summary.failed.push((ticker, e.to_string())),
        }
    }
    info!(
        universe = %universe.name,
        written = summary.written.len(),
        failed = summary.failed.len(),
        "download complete"
    );
    summary
}

fn write_snapshots(
    store: &SnapshotStore,
    universe: &str,
    requested: (NaiveDate, NaiveDate),
    loaded: &[LoadedSeries],
    analyses: &[InstrumentAnalysis],
) {
    for (l, a) in loaded.iter().zip(analyses) {
        if !l.is_fresh() || l.series.is_empty() {
            continue;
        }
        let derived = a.returns.to_derived_columns();
        if let Err(e) = store.write_requested(universe, &l.series, Some(&derived), Some(requested)) {
            warn!(ticker = l.series.ticker(), error = %e, "snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equirank_core::data::{NoFundamentals, SyntheticFundamentals, SyntheticProvider};
    use equirank_core::domain::Bar;
    use tempfile::TempDir;

    fn closes(ticker: &str, values: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let bars = values
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::flat(start + chrono::Days::new(i as u64), *c))
            .collect();
        PriceSeries::new(ticker, bars).unwrap()
    }

    fn small_config() -> AnalysisConfig {
        AnalysisConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            universes: vec![Universe::new("MINI", "^IBEX", &["SAN.MC", "BBVA.MC", "ITX.MC"])],
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let series = vec![
            closes("A", &[10.0, 10.5, 10.2, 10.9]),
            closes("B", &[20.0, 19.0, 19.5, 21.0]),
            PriceSeries::empty("C"),
        ];
        let bench = closes("IDX", &[100.0, 101.0, 100.5, 102.0]);
        let specs = [RankSpec::per(), RankSpec::dividend()];
        let a = assemble(&series, &bench, &NoFundamentals, &specs, "rank_per", false).unwrap();
        let b = assemble(&series, &bench, &NoFundamentals, &specs, "rank_per", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn unknown_primary_is_reported() {
        let err = assemble(&[], &PriceSeries::empty("IDX"), &NoFundamentals, &[RankSpec::per()], "nope", false)
            .unwrap_err();
        assert_eq!(err, TableError::UnknownColumn("nope".into()));
    }

    #[test]
    fn empty_ticker_list_gives_empty_table() {
        let t = assemble(&[], &PriceSeries::empty("IDX"), &NoFundamentals, &[RankSpec::per()], "rank_per", false)
            .unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn run_universe_synthetic_writes_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let provider = SyntheticProvider::new(11);
        let fundamentals = SyntheticFundamentals::new(11);
        let config = small_config();
        let collab = Collaborators {
            provider: Some(&provider),
            fundamentals: &fundamentals,
            snapshot: Some(&store),
            progress: None,
        };
        let run = RunOptions {
            write_snapshots: true,
            ..RunOptions::default()
        };
        let report = run_universe(&config, &config.universes[0], collab, run).unwrap();

        assert_eq!(report.table.len(), 3);
        assert_eq!(report.returns.len(), 3);
        assert!(report.table.rows().iter().all(|r| r.pe.is_some() && r.beta.is_some()));
        assert_eq!(store.list("MINI").len(), 4);
        assert!(report.sources.values().all(|s| *s == DataSource::Synthetic));

        // Offline second pass reads the snapshots back.
        let offline = Collaborators {
            provider: None,
            ..collab
        };
        let again = run_universe(
            &config,
            &config.universes[0],
            offline,
            RunOptions {
                offline: true,
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert!(again.sources.values().all(|s| *s == DataSource::Snapshot));
        assert_eq!(again.table.tickers(), report.table.tickers());
    }

    #[test]
    fn download_snapshots_benchmark_and_tickers() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let config = small_config();
        let summary = download_universe(&config, &config.universes[0], &SyntheticProvider::new(5), &store, None);
        assert_eq!(summary.written.len(), 4);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.written[0].ticker, "^IBEX");
        assert!(store.covers_range("MINI", "SAN.MC", config.start_date, config.end_date));
        assert_eq!(summary.written[1].requested_start, Some(config.start_date));
    }

    #[test]
    fn loader_reason_replaces_generic_missing_data() {
        let config = small_config();
        let collab = Collaborators {
            provider: None,
            fundamentals: &NoFundamentals,
            snapshot: None,
            progress: None,
        };
        let report = run_universe(&config, &config.universes[0], collab, RunOptions::default()).unwrap();
        for row in report.table.rows() {
            let missing: Vec<_> = row
                .issues
                .iter()
                .filter(|i| matches!(i, MetricIssue::MissingData { .. }))
                .collect();
            assert_eq!(missing.len(), 1);
            assert!(missing[0].to_string().contains("no provider"));
        }
        assert_eq!(report.issues_by_ticker().len(), 3);
    }
}
