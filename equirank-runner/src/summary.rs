//! Instrument summary record — one row of a universe's table.
//!
//! Every numeric field is an `Option<f64>`: `None` means the value could not
//! be computed or fetched, and the reason is recorded in `issues`. Nothing is
//! ever coerced to zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use equirank_core::domain::Fundamentals;

/// Summary fields that can be ranked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Volatility,
    CumulativeReturn,
    Sharpe,
    Alpha,
    Beta,
    Pe,
    Pb,
    DividendYield,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Volatility,
        Metric::CumulativeReturn,
        Metric::Sharpe,
        Metric::Alpha,
        Metric::Beta,
        Metric::Pe,
        Metric::Pb,
        Metric::DividendYield,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Volatility => "volatility",
            Metric::CumulativeReturn => "cumulative_return",
            Metric::Sharpe => "sharpe",
            Metric::Alpha => "alpha",
            Metric::Beta => "beta",
            Metric::Pe => "pe",
            Metric::Pb => "pb",
            Metric::DividendYield => "dividend_yield",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Why a statistic has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Undefined {
    #[error("fewer than {needed} defined daily returns")]
    InsufficientObservations { needed: usize },
    #[error("zero variance")]
    ZeroVariance,
    #[error("no dates in common with the benchmark")]
    NoBenchmarkOverlap,
}

/// A contained per-ticker problem. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricIssue {
    /// The provider returned an empty or unusable series.
    MissingData { reason: String },
    /// A statistic had an undefined denominator or too few observations.
    UndefinedMetric { metric: Metric, reason: Undefined },
    /// The fundamentals source failed or had nothing for this ticker.
    FundamentalsUnavailable { reason: String },
}

impl fmt::Display for MetricIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricIssue::MissingData { reason } => write!(f, "missing data: {reason}"),
            MetricIssue::UndefinedMetric { metric, reason } => write!(f, "{metric} undefined: {reason}"),
            MetricIssue::FundamentalsUnavailable { reason } => {
                write!(f, "fundamentals unavailable: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSummary {
    pub ticker: String,
    /// Number of bars the statistics were computed from.
    pub observations: usize,
    pub volatility: Option<f64>,
    pub cumulative_return: Option<f64>,
    pub sharpe: Option<f64>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub issues: Vec<MetricIssue>,
}

impl InstrumentSummary {
    /// A row with every metric undefined.
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            observations: 0,
            volatility: None,
            cumulative_return: None,
            sharpe: None,
            alpha: None,
            beta: None,
            pe: None,
            pb: None,
            dividend_yield: None,
            issues: Vec::new(),
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Volatility => self.volatility,
            Metric::CumulativeReturn => self.cumulative_return,
            Metric::Sharpe => self.sharpe,
            Metric::Alpha => self.alpha,
            Metric::Beta => self.beta,
            Metric::Pe => self.pe,
            Metric::Pb => self.pb,
            Metric::DividendYield => self.dividend_yield,
        }
    }

    pub fn apply_fundamentals(&mut self, fundamentals: Fundamentals) {
        self.pe = fundamentals.pe;
        self.pb = fundamentals.pb;
        self.dividend_yield = fundamentals.dividend_yield;
    }

    pub fn has_missing_data(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, MetricIssue::MissingData { .. }))
    }
}
