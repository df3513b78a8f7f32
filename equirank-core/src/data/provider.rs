//! Provider traits and structured error types.
//!
//! `DataProvider` and `FundamentalsSource` abstract over the external data
//! sources (Yahoo Finance, synthetic data, in-memory mocks) so the analytics
//! never see a network error directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Fundamentals, PriceSeries};

/// Structured error types for data operations.
///
/// Displayable in CLI output and log lines alike.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("ticker not found: {ticker}")]
    TickerNotFound { ticker: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("fundamentals unavailable for {ticker}: {reason}")]
    FundamentalsUnavailable { ticker: String, reason: String },

    #[error("snapshot error: {0}")]
    SnapshotError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no snapshot for ticker '{ticker}' — run `download` first")]
    NoSnapshot { ticker: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Result of a successful fetch for a single ticker.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub series: PriceSeries,
    pub source: DataSource,
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    Snapshot,
    Synthetic,
    /// Nothing usable was obtained; the series is empty.
    Missing,
}

/// Historical series provider.
///
/// The snapshot store sits above this trait; providers know nothing about it.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a ticker over an inclusive date range.
    ///
    /// An `Ok` result may carry an empty series.
    fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<FetchResult, DataError>;

    /// Whether the provider is currently accepting requests.
    fn is_available(&self) -> bool;
}

/// Source of valuation ratios.
pub trait FundamentalsSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError>;
}

/// Fundamentals source that has nothing to offer (offline runs).
pub struct NoFundamentals;

impl FundamentalsSource for NoFundamentals {
    fn name(&self) -> &str {
        "none"
    }

    fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError> {
        Err(DataError::FundamentalsUnavailable {
            ticker: ticker.to_string(),
            reason: "no fundamentals source configured".into(),
        })
    }
}

/// Progress callback for multi-ticker operations.
pub trait DownloadProgress: Send + Sync {
    /// Called when starting to fetch a ticker.
    fn on_start(&self, ticker: &str, index: usize, total: usize);

    /// Called when a ticker fetch completes.
    fn on_complete(&self, ticker: &str, index: usize, total: usize, result: &Result<usize, DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, ticker: &str, index: usize, total: usize) {
        tracing::debug!(ticker, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(
        &self,
        ticker: &str,
        index: usize,
        total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(bars) => tracing::info!(ticker, bars, "[{}/{}] ok", index + 1, total),
            Err(e) => tracing::warn!(ticker, error = %e, "[{}/{}] failed", index + 1, total),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "download batch complete");
    }
}
