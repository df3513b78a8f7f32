//! Series loading for a universe.
//!
//! Fallback policy per ticker:
//! 1. Snapshot covers the requested range (or we are offline and any snapshot exists) → use it
//! 2. Provider available → fetch
//! 3. Provider failed or refusing requests (circuit open) but a stale snapshot
//!    exists → use it, with a warning
//! 4. Otherwise → empty series tagged `DataSource::Missing` plus a `MissingData` issue
//!
//! Nothing here fails the batch: every ticker comes back, in input order.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use equirank_core::data::{DataError, DataProvider, DataSource, DownloadProgress, SnapshotStore};
use equirank_core::domain::PriceSeries;

use crate::summary::MetricIssue;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no snapshot for '{ticker}' and no network access")]
    NoSnapshotOffline { ticker: String },

    #[error("no provider configured for '{ticker}'")]
    NoProvider { ticker: String },

    #[error("provider returned no bars for '{ticker}' in range")]
    EmptySeries { ticker: String },

    #[error("fetch failed for '{ticker}': {source}")]
    Fetch {
        ticker: String,
        #[source]
        source: DataError,
    },
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Ignore snapshots and re-fetch.
    pub force: bool,
}

/// One ticker's series plus provenance. Failed loads carry an empty series and an issue.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: PriceSeries,
    pub source: DataSource,
    pub issue: Option<MetricIssue>,
}

impl LoadedSeries {
    fn missing(ticker: &str, err: &LoadError) -> Self {
        Self {
            series: PriceSeries::empty(ticker),
            source: DataSource::Missing,
            issue: Some(MetricIssue::MissingData {
                reason: err.to_string(),
            }),
        }
    }

    /// Fetched from the network this run (and so worth snapshotting).
    pub fn is_fresh(&self) -> bool {
        matches!(self.source, DataSource::YahooFinance | DataSource::Synthetic)
    }
}

/// Resolve one ticker, or explain why nothing usable was found.
pub fn fetch_series(
    ticker: &str,
    universe: &str,
    snapshot: Option<&SnapshotStore>,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<(PriceSeries, DataSource), LoadError> {
    let from_snapshot = |store: &SnapshotStore| {
        store
            .load(universe, ticker)
            .ok()
            .map(|s| s.between(opts.start, opts.end))
            .filter(|s| !s.is_empty())
    };

    if let Some(store) = snapshot {
        if !opts.force && (opts.offline || store.covers_range(universe, ticker, opts.start, opts.end)) {
            if let Some(series) = from_snapshot(store) {
                debug!(ticker, universe, bars = series.len(), "loaded from snapshot");
                return Ok((series, DataSource::Snapshot));
            }
        }
    }

    if opts.offline {
        return Err(LoadError::NoSnapshotOffline {
            ticker: ticker.to_string(),
        });
    }

    let Some(provider) = provider else {
        return Err(LoadError::NoProvider {
            ticker: ticker.to_string(),
        });
    };

    let response = if provider.is_available() {
        provider.fetch(ticker, opts.start, opts.end)
    } else {
        debug!(ticker, provider = provider.name(), "provider unavailable, skipping fetch");
        Err(DataError::CircuitBreakerTripped)
    };
    let fetched = response
        .map_err(|source| LoadError::Fetch {
            ticker: ticker.to_string(),
            source,
        })
        .and_then(|r| {
            let series = r.series.between(opts.start, opts.end);
            if series.is_empty() {
                Err(LoadError::EmptySeries {
                    ticker: ticker.to_string(),
                })
            } else {
                Ok((series, r.source))
            }
        });

    match fetched {
        Ok(found) => Ok(found),
        Err(e) => match snapshot.and_then(from_snapshot) {
            Some(series) => {
                warn!(ticker, universe, error = %e, "fetch failed, using stale snapshot");
                Ok((series, DataSource::Snapshot))
            }
            None => Err(e),
        },
    }
}

/// Load one ticker. Failures become an empty series with a `MissingData` issue.
pub fn load_series(
    ticker: &str,
    universe: &str,
    snapshot: Option<&SnapshotStore>,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> LoadedSeries {
    match fetch_series(ticker, universe, snapshot, provider, opts) {
        Ok((series, source)) => LoadedSeries {
            series,
            source,
            issue: None,
        },
        Err(e) => {
            warn!(ticker, universe, error = %e, "no usable data");
            LoadedSeries::missing(ticker, &e)
        }
    }
}

/// Load every ticker of a universe sequentially, in input order.
pub fn load_universe_series(
    tickers: &[String],
    universe: &str,
    snapshot: Option<&SnapshotStore>,
    provider: Option<&dyn DataProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> Vec<LoadedSeries> {
    let total = tickers.len();
    let mut failed = 0;
    let loaded: Vec<LoadedSeries> = tickers
        .iter()
        .enumerate()
        .map(|(i, ticker)| {
            if let Some(p) = progress {
                p.on_start(ticker, i, total);
            }
            let result = fetch_series(ticker, universe, snapshot, provider, opts);
            if let Some(p) = progress {
                let report = match &result {
                    Ok((series, _)) => Ok(series.len()),
                    Err(e) => Err(DataError::Other(e.to_string())),
                };
                p.on_complete(ticker, i, total, &report);
            }
            match result {
                Ok((series, source)) => LoadedSeries {
                    series,
                    source,
                    issue: None,
                },
                Err(e) => {
                    failed += 1;
                    LoadedSeries::missing(ticker, &e)
                }
            }
        })
        .collect();

    if let Some(p) = progress {
        p.on_batch_complete(total - failed, failed, total);
    }
    loaded
}
