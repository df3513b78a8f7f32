//! Price series — the date-ordered history of one ticker.
//!
//! Invariant: bar dates are strictly increasing. `PriceSeries::new` rejects
//! input that violates it; `PriceSeries::from_unordered` repairs provider
//! output (sort ascending, last bar wins on a duplicated date).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::Bar;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("{ticker}: bar dates not strictly increasing at index {index} ({prev} then {next})")]
    NotStrictlyIncreasing {
        ticker: String,
        index: usize,
        prev: NaiveDate,
        next: NaiveDate,
    },
}

/// Immutable daily history for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, validating strict date ordering.
    pub fn new(ticker: impl Into<String>, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        let ticker = ticker.into();
        for (i, w) in bars.windows(2).enumerate() {
            if w[1].date <= w[0].date {
                return Err(SeriesError::NotStrictlyIncreasing {
                    ticker,
                    index: i + 1,
                    prev: w[0].date,
                    next: w[1].date,
                });
            }
        }
        Ok(Self { ticker, bars })
    }

    /// Canonicalize arbitrary provider output: sort by date, keep the last bar per date.
    pub fn from_unordered(ticker: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut canonical: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match canonical.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => canonical.push(bar),
            }
        }
        Self {
            ticker: ticker.into(),
            bars: canonical,
        }
    }

    /// Series with no observations (provider returned nothing).
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            bars: Vec::new(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// First and last date, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.bars.first()?.date, self.bars.last()?.date))
    }

    /// Bars within `[start, end]` inclusive.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        Self {
            ticker: self.ticker.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect(),
        }
    }
}
