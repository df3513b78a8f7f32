//! Return/risk calculator — pure functions over one price series and a benchmark.
//!
//! Undefined results are `None`, never 0.0: a statistic with too few
//! observations or a zero-variance denominator carries an `Undefined` reason
//! that ends up as a `MetricIssue` on the summary row.
//!
//! Alpha and Beta use the single-factor form with no risk-free term.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use equirank_core::data::DerivedColumns;
use equirank_core::domain::PriceSeries;

use crate::summary::{InstrumentSummary, Metric, MetricIssue, Undefined};

/// Annualization factor.
pub const TRADING_DAYS: f64 = 252.0;

/// Standard deviations below this are treated as zero.
const ZERO_VARIANCE: f64 = 1e-15;

/// Per-bar derived series for one ticker. Every vector has one entry per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub ticker: String,
    pub dates: Vec<NaiveDate>,
    pub close: Vec<f64>,
    /// Close minus previous close.
    pub daily_change: Vec<Option<f64>>,
    /// Close / previous close − 1. Undefined at t = 0 and around unusable closes.
    pub daily_return: Vec<Option<f64>>,
    /// Compounded return since the first usable close, carried across gaps.
    /// Undefined on that first bar and on unusable closes.
    pub cumulative_return: Vec<Option<f64>>,
}

impl ReturnSeries {
    pub fn from_series(series: &PriceSeries) -> Self {
        let close = series.closes();
        let usable: Vec<Option<f64>> = series.bars().iter().map(|b| b.usable_close()).collect();
        let daily_return = daily_returns(&usable);
        Self {
            ticker: series.ticker().to_string(),
            dates: series.dates(),
            daily_change: daily_changes(&usable),
            cumulative_return: cumulative_returns(&usable),
            daily_return,
            close,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Daily returns with the undefined entries dropped.
    pub fn defined_returns(&self) -> Vec<f64> {
        self.daily_return.iter().flatten().copied().collect()
    }

    /// Final compounded return, or `None` if no daily return is defined.
    pub fn final_cumulative(&self) -> Option<f64> {
        self.cumulative_return.iter().rev().find_map(|c| *c)
    }

    /// Defined daily returns keyed by date.
    fn returns_by_date(&self) -> HashMap<NaiveDate, f64> {
        self.dates
            .iter()
            .zip(&self.daily_return)
            .filter_map(|(d, r)| r.map(|r| (*d, r)))
            .collect()
    }

    pub fn to_derived_columns(&self) -> DerivedColumns {
        DerivedColumns {
            daily_change: self.daily_change.clone(),
            daily_return: self.daily_return.clone(),
            cumulative_return: self.cumulative_return.clone(),
        }
    }
}

/// Summary row plus the derived series the plotting layer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentAnalysis {
    pub summary: InstrumentSummary,
    pub returns: ReturnSeries,
}

/// Analyze one instrument against its benchmark.
pub fn analyze(series: &PriceSeries, benchmark: &PriceSeries) -> InstrumentSummary {
    analyze_against(series, &ReturnSeries::from_series(benchmark)).summary
}

/// Analyze one instrument against precomputed benchmark returns.
///
/// The benchmark is shared by every ticker of a universe, so callers compute
/// its `ReturnSeries` once.
pub fn analyze_against(series: &PriceSeries, benchmark: &ReturnSeries) -> InstrumentAnalysis {
    let returns = ReturnSeries::from_series(series);
    let mut summary = InstrumentSummary::empty(series.ticker());
    summary.observations = series.len();

    if series.is_empty() {
        summary.issues.push(MetricIssue::MissingData {
            reason: "provider returned no bars".into(),
        });
        return InstrumentAnalysis { summary, returns };
    }

    let defined = returns.defined_returns();
    let mut issues = Vec::new();
    let mut record = |metric: Metric, result: Result<f64, Undefined>| match result {
        Ok(v) => Some(v),
        Err(reason) => {
            issues.push(MetricIssue::UndefinedMetric { metric, reason });
            None
        }
    };

    summary.volatility = record(Metric::Volatility, annualized_volatility(&defined));
    summary.cumulative_return = record(
        Metric::CumulativeReturn,
        returns
            .final_cumulative()
            .ok_or(Undefined::InsufficientObservations { needed: 1 }),
    );
    summary.sharpe = record(Metric::Sharpe, sharpe_ratio(&defined));
    match beta_alpha(&returns, benchmark) {
        Ok((beta, alpha)) => {
            summary.beta = Some(beta);
            summary.alpha = Some(alpha);
        }
        Err(reason) => {
            record(Metric::Beta, Err(reason));
            record(Metric::Alpha, Err(reason));
        }
    }
    summary.issues = issues;

    InstrumentAnalysis { summary, returns }
}

// ─── Individual metric functions ────────────────────────────────────

/// stddev(daily returns) × sqrt(252). Zero for a constant series.
pub fn annualized_volatility(returns: &[f64]) -> Result<f64, Undefined> {
    sample_std(returns)
        .map(|s| s * TRADING_DAYS.sqrt())
        .ok_or(Undefined::InsufficientObservations { needed: 2 })
}

/// mean / stddev × sqrt(252). Undefined when the stddev is zero.
pub fn sharpe_ratio(returns: &[f64]) -> Result<f64, Undefined> {
    let std = sample_std(returns).ok_or(Undefined::InsufficientObservations { needed: 2 })?;
    if std < ZERO_VARIANCE {
        return Err(Undefined::ZeroVariance);
    }
    let mean = mean(returns).ok_or(Undefined::InsufficientObservations { needed: 2 })?;
    Ok(mean / std * TRADING_DAYS.sqrt())
}

/// (Beta, Alpha) over the dates where both daily returns are defined.
///
/// Beta = Cov(instrument, benchmark) / Var(benchmark);
/// Alpha = mean(instrument) − Beta × mean(benchmark).
pub fn beta_alpha(instrument: &ReturnSeries, benchmark: &ReturnSeries) -> Result<(f64, f64), Undefined> {
    let bench = benchmark.returns_by_date();
    let (xs, ys): (Vec<f64>, Vec<f64>) = instrument
        .dates
        .iter()
        .zip(&instrument.daily_return)
        .filter_map(|(d, r)| Some((r.as_ref().copied()?, *bench.get(d)?)))
        .unzip();

    if xs.is_empty() {
        return Err(Undefined::NoBenchmarkOverlap);
    }
    let cov = sample_covariance(&xs, &ys).ok_or(Undefined::InsufficientObservations { needed: 2 })?;
    let var = sample_covariance(&ys, &ys).ok_or(Undefined::InsufficientObservations { needed: 2 })?;
    if var.abs() < ZERO_VARIANCE {
        return Err(Undefined::ZeroVariance);
    }
    let beta = cov / var;
    let (mx, my) = match (mean(&xs), mean(&ys)) {
        (Some(mx), Some(my)) => (mx, my),
        _ => return Err(Undefined::NoBenchmarkOverlap),
    };
    Ok((beta, mx - beta * my))
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Close / previous close − 1, undefined at t = 0 or next to an unusable close.
pub fn daily_returns(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(closes.windows(2).map(|w| match (w[0], w[1]) {
        (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
        _ => None,
    }));
    out
}

/// Close minus previous close.
pub fn daily_changes(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(closes.windows(2).map(|w| Some(w[1]? - w[0]?)));
    out
}

/// Product of (1 + daily return) since the first usable close, minus 1.
///
/// Over a run of usable closes the product telescopes to close / base − 1,
/// which also spans an unusable close: the return from 10 through a bad
/// print to 13.2 is 0.32.
pub fn cumulative_returns(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut base = None;
    closes
        .iter()
        .map(|c| {
            let c = (*c)?;
            match base {
                None => {
                    base = Some(c);
                    None
                }
                Some(b) => Some(c / b - 1.0),
            }
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1).
pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    sample_covariance(values, values).map(f64::sqrt)
}

/// Sample covariance (n − 1). Inputs must be the same length.
pub(crate) fn sample_covariance(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let sum: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Some(sum / (xs.len() - 1) as f64)
}
