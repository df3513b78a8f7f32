//! Equirank Runner — per-universe return/risk analysis, valuation enrichment,
//! cross-sectional ranking and report export.
//!
//! This crate builds on `equirank-core` to provide:
//! - Series loading with snapshot-first fallback
//! - Return/risk calculator (daily and cumulative returns, volatility, Sharpe, Alpha, Beta)
//! - Valuation enricher (P/E, P/B, dividend yield)
//! - Percentile-bucket ranker and the ranked table
//! - Report assembler, chart data and CSV/JSON export

pub mod charts;
pub mod config;
pub mod data_loader;
pub mod enrich;
pub mod export;
pub mod metrics;
pub mod ranking;
pub mod report;
pub mod summary;
pub mod table;

pub use charts::{cumulative_return_lines, rolling_mean, volatility_bars, ChartLine, VolatilityBar};
pub use config::{AnalysisConfig, ConfigError};
pub use data_loader::{load_series, load_universe_series, LoadError, LoadOptions, LoadedSeries};
pub use enrich::{Valuation, ValuationEnricher};
pub use metrics::{analyze, analyze_against, InstrumentAnalysis, ReturnSeries};
pub use ranking::{rank, rank_all, Bucket, BucketBoundaries, BucketError, Direction, RankSpec};
pub use report::{
    analyze_universe, assemble, download_universe, run_universe, Collaborators, DownloadSummary,
    RunOptions, UniverseReport,
};
pub use summary::{InstrumentSummary, Metric, MetricIssue, Undefined};
pub use table::{RankColumn, RankedTable, TableError, TOTAL_RANK};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn result_types_are_send_sync() {
        assert_send::<InstrumentSummary>();
        assert_sync::<InstrumentSummary>();
        assert_send::<RankedTable>();
        assert_sync::<RankedTable>();
        assert_send::<UniverseReport>();
        assert_sync::<UniverseReport>();
        assert_send::<InstrumentAnalysis>();
        assert_sync::<InstrumentAnalysis>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<AnalysisConfig>();
        assert_sync::<AnalysisConfig>();
        assert_send::<RankSpec>();
        assert_sync::<RankSpec>();
    }
}
