//! Integration tests for the universe pipeline with in-memory collaborators.
//!
//! No network: providers and fundamentals sources are fixtures that return
//! fixed series, empty series or errors per ticker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use tempfile::TempDir;

use equirank_core::data::{
    DataError, DataProvider, DataSource, FetchResult, FundamentalsSource, NoFundamentals,
    SnapshotStore, Universe,
};
use equirank_core::domain::{Bar, Fundamentals, PriceSeries};
use equirank_runner::export::save_report;
use equirank_runner::metrics::ReturnSeries;
use equirank_runner::ranking::{Bucket, BucketBoundaries, Direction, RankSpec};
use equirank_runner::report::{analyze_universe, run_universe, Collaborators, RunOptions};
use equirank_runner::summary::{Metric, MetricIssue};
use equirank_runner::{AnalysisConfig, TOTAL_RANK};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn series(ticker: &str, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::flat(d(2 + i as u32), *c))
        .collect();
    PriceSeries::new(ticker, bars).unwrap()
}

/// Serves fixed series; unknown tickers are "not found".
struct MapProvider(HashMap<String, PriceSeries>);

impl DataProvider for MapProvider {
    fn name(&self) -> &str {
        "map"
    }

    fn fetch(&self, ticker: &str, _start: NaiveDate, _end: NaiveDate) -> Result<FetchResult, DataError> {
        self.0
            .get(ticker)
            .cloned()
            .map(|series| FetchResult {
                series,
                source: DataSource::YahooFinance,
            })
            .ok_or_else(|| DataError::TickerNotFound {
                ticker: ticker.to_string(),
            })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Counts the fetches that reach the wrapped provider.
struct Counting<'a> {
    inner: &'a dyn DataProvider,
    fetches: AtomicUsize,
}

impl DataProvider for Counting<'_> {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<FetchResult, DataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(ticker, start, end)
    }

    fn is_available(&self) -> bool {
        true
    }
}

struct MapFundamentals(HashMap<String, Fundamentals>);

impl FundamentalsSource for MapFundamentals {
    fn name(&self) -> &str {
        "map"
    }

    fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError> {
        self.0.get(ticker).copied().ok_or_else(|| DataError::FundamentalsUnavailable {
            ticker: ticker.to_string(),
            reason: "not in fixture".into(),
        })
    }
}

fn fixture() -> (MapProvider, MapFundamentals) {
    let mut prices = HashMap::new();
    prices.insert("^IDX".to_string(), series("^IDX", &[100.0, 101.0, 100.0, 102.0, 103.0, 102.5]));
    prices.insert("AAA".to_string(), series("AAA", &[10.0, 10.2, 10.1, 10.5, 10.7, 10.6]));
    prices.insert("BBB".to_string(), series("BBB", &[50.0, 49.0, 49.5, 51.0, 52.0, 51.0]));
    prices.insert("EMPTY".to_string(), PriceSeries::empty("EMPTY"));

    let mut ratios = HashMap::new();
    ratios.insert("AAA".to_string(), Fundamentals::sanitized(Some(8.0), Some(1.1), Some(5.0)));
    ratios.insert("BBB".to_string(), Fundamentals::sanitized(Some(30.0), Some(4.0), None));
    (MapProvider(prices), MapFundamentals(ratios))
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[test]
fn empty_series_row_kept_and_sorted_last() {
    let (provider, fundamentals) = fixture();
    let collab = Collaborators {
        provider: Some(&provider),
        fundamentals: &fundamentals,
        snapshot: None,
        progress: None,
    };
    let table = analyze_universe(
        &tickers(&["EMPTY", "AAA", "BBB"]),
        d(1),
        d(31),
        "^IDX",
        &[RankSpec::per(), RankSpec::dividend()],
        "rank_per",
        collab,
    )
    .unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(table.tickers(), vec!["AAA", "BBB", "EMPTY"]);

    let empty = table.row("EMPTY").unwrap();
    for metric in Metric::ALL {
        assert_eq!(empty.value(metric), None, "{metric} should be undefined");
    }
    assert!(empty.has_missing_data());
    assert_eq!(table.score(2, "rank_per"), Some(0));
    assert_eq!(table.score(2, TOTAL_RANK), Some(0));
}

#[test]
fn failures_never_abort_the_batch() {
    let (provider, fundamentals) = fixture();
    let collab = Collaborators {
        provider: Some(&provider),
        fundamentals: &fundamentals,
        snapshot: None,
        progress: None,
    };
    let table = analyze_universe(
        &tickers(&["AAA", "UNKNOWN", "BBB", "EMPTY"]),
        d(1),
        d(31),
        "^IDX",
        &[RankSpec::per()],
        "rank_per",
        collab,
    )
    .unwrap();
    assert_eq!(table.len(), 4);

    let unknown = table.row("UNKNOWN").unwrap();
    assert!(unknown.has_missing_data());
    assert!(unknown
        .issues
        .iter()
        .any(|i| matches!(i, MetricIssue::FundamentalsUnavailable { .. })));

    let bbb = table.row("BBB").unwrap();
    assert_eq!(bbb.dividend_yield, None);
    assert!(bbb.beta.is_some());
}

#[test]
fn missing_benchmark_only_affects_alpha_beta() {
    let (provider, _) = fixture();
    let collab = Collaborators {
        provider: Some(&provider),
        fundamentals: &NoFundamentals,
        snapshot: None,
        progress: None,
    };
    let table = analyze_universe(
        &tickers(&["AAA"]),
        d(1),
        d(31),
        "^NOPE",
        &[RankSpec::per()],
        "rank_per",
        collab,
    )
    .unwrap();
    let row = table.row("AAA").unwrap();
    assert!(row.volatility.is_some());
    assert!(row.sharpe.is_some());
    assert_eq!(row.beta, None);
    assert_eq!(row.alpha, None);
}

#[test]
fn ten_percent_days_scenario() {
    let r = ReturnSeries::from_series(&series("X", &[100.0, 110.0, 121.0]));
    assert_eq!(r.daily_return[0], None);
    assert!((r.daily_return[1].unwrap() - 0.10).abs() < 1e-12);
    assert!((r.daily_return[2].unwrap() - 0.10).abs() < 1e-12);
    assert!((r.final_cumulative().unwrap() - 0.21).abs() < 1e-12);
}

#[test]
fn bucket_scenario_with_explicit_below_minimum() {
    let buckets = BucketBoundaries::new(
        vec![
            Bucket { threshold: 80.0, score: 3 },
            Bucket { threshold: 40.0, score: 2 },
            Bucket { threshold: 20.0, score: 1 },
        ],
        0,
    )
    .unwrap();
    assert_eq!(buckets.score(85.0), 3);
    assert_eq!(buckets.score(10.0), 0);

    let lenient = BucketBoundaries::new(buckets.buckets().to_vec(), 1).unwrap();
    assert_eq!(lenient.score(10.0), 1);
}

#[test]
fn configured_run_exports_artifacts() {
    let (provider, fundamentals) = fixture();
    let snap = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let store = SnapshotStore::new(snap.path());

    let config = AnalysisConfig {
        start_date: d(1),
        end_date: d(31),
        output_dir: out.path().to_path_buf(),
        snapshot_dir: snap.path().to_path_buf(),
        primary_rank: TOTAL_RANK.into(),
        rank_specs: vec![
            RankSpec::per(),
            RankSpec::new(
                "rank_sharpe",
                Metric::Sharpe,
                Direction::HigherIsBetter,
                BucketBoundaries::from_percentiles(&[50.0]).unwrap(),
            ),
        ],
        universes: vec![Universe::new("FIXTURE", "^IDX", &["EMPTY", "AAA", "BBB"])],
        ..AnalysisConfig::default()
    };
    config.validate().unwrap();

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
    assert_eq!(report.table.tickers().last(), Some(&"EMPTY"));
    assert_eq!(report.sources["EMPTY"], DataSource::Missing);

    // EMPTY has nothing to snapshot; the benchmark does.
    let snapped: Vec<String> = store.list("FIXTURE").into_iter().map(|m| m.ticker).collect();
    assert_eq!(snapped, vec!["AAA", "BBB", "^IDX"]);

    let files = save_report(&report, &config.output_dir, config.chart_window).unwrap();
    assert_eq!(files.len(), 4);
    let analysed = std::fs::read_to_string(&files[0]).unwrap();
    assert!(analysed.lines().next().unwrap().ends_with("rank_per,rank_sharpe,total_rank,issues"));
    assert_eq!(analysed.lines().count(), 4);
}

#[test]
fn second_run_reads_snapshots_when_first_day_is_a_holiday() {
    // Fixture bars start on Jan 2; the configured range starts on Jan 1.
    let (inner, fundamentals) = fixture();
    let provider = Counting {
        inner: &inner,
        fetches: AtomicUsize::new(0),
    };
    let snap = TempDir::new().unwrap();
    let store = SnapshotStore::new(snap.path());
    let config = AnalysisConfig {
        start_date: d(1),
        end_date: d(31),
        snapshot_dir: snap.path().to_path_buf(),
        universes: vec![Universe::new("FIXTURE", "^IDX", &["AAA", "BBB"])],
        ..AnalysisConfig::default()
    };
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

    let first = run_universe(&config, &config.universes[0], collab, run).unwrap();
    assert_eq!(provider.fetches.swap(0, Ordering::SeqCst), 3);
    assert_eq!(first.sources["AAA"], DataSource::YahooFinance);

    let second = run_universe(&config, &config.universes[0], collab, run).unwrap();
    assert_eq!(provider.fetches.load(Ordering::SeqCst), 0);
    assert!(second.sources.values().all(|s| *s == DataSource::Snapshot));
    assert_eq!(second.table.tickers(), first.table.tickers());
    assert_eq!(second.table.row("AAA").unwrap().beta, first.table.row("AAA").unwrap().beta);
}
