//! Chart data for the plotting layer.
//!
//! Two views per universe: a volatility bar chart (daily, not annualized,
//! highest first) and cumulative-return lines smoothed by a trailing mean.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metrics::{sample_std, ReturnSeries};

/// Trailing window used to smooth the cumulative-return chart.
pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityBar {
    pub ticker: String,
    /// Sample stddev of daily returns.
    pub daily_volatility: f64,
}

/// Daily volatility per ticker, highest first. Tickers without at least two
/// defined returns are skipped; equal values keep input order.
pub fn volatility_bars(returns: &[ReturnSeries]) -> Vec<VolatilityBar> {
    let mut bars: Vec<VolatilityBar> = returns
        .iter()
        .filter_map(|r| {
            Some(VolatilityBar {
                ticker: r.ticker.clone(),
                daily_volatility: sample_std(&r.defined_returns())?,
            })
        })
        .collect();
    bars.sort_by(|a, b| b.daily_volatility.total_cmp(&a.daily_volatility));
    bars
}

/// Trailing mean over `window` values. Undefined until the window is full and
/// whenever any value inside it is undefined.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum = slice.iter().try_fold(0.0, |acc, v| v.map(|v| acc + v))?;
            Some(sum / window as f64)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLine {
    pub ticker: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

/// Smoothed cumulative-return line per non-empty ticker.
pub fn cumulative_return_lines(returns: &[ReturnSeries], window: usize) -> Vec<ChartLine> {
    returns
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| ChartLine {
            ticker: r.ticker.clone(),
            dates: r.dates.clone(),
            values: rolling_mean(&r.cumulative_return, window),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use equirank_core::domain::{Bar, PriceSeries};

    fn returns(ticker: &str, closes: &[f64]) -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::flat(start + chrono::Days::new(i as u64), *c))
            .collect();
        ReturnSeries::from_series(&PriceSeries::new(ticker, bars).unwrap())
    }

    #[test]
    fn rolling_mean_waits_for_full_window() {
        let v = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        assert_eq!(rolling_mean(&v, 2), vec![None, Some(1.5), Some(2.5), Some(3.5)]);
        assert_eq!(rolling_mean(&v, 5), vec![None; 4]);
    }

    #[test]
    fn rolling_mean_undefined_inside_window() {
        let v = [Some(1.0), None, Some(3.0), Some(5.0)];
        assert_eq!(rolling_mean(&v, 2), vec![None, None, None, Some(4.0)]);
        assert_eq!(rolling_mean(&v, 0), vec![None; 4]);
    }

    #[test]
    fn volatility_sorted_descending_and_skips_short() {
        let calm = returns("CALM", &[100.0, 100.5, 100.2, 100.6]);
        let wild = returns("WILD", &[100.0, 120.0, 90.0, 115.0]);
        let short = returns("SHORT", &[100.0, 101.0]);
        let empty = ReturnSeries::from_series(&PriceSeries::empty("NONE"));
        let bars = volatility_bars(&[calm, wild, short, empty]);
        let order: Vec<&str> = bars.iter().map(|b| b.ticker.as_str()).collect();
        assert_eq!(order, vec!["WILD", "CALM"]);
    }

    #[test]
    fn lines_skip_empty_series() {
        let a = returns("A", &[1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.6]);
        let empty = ReturnSeries::from_series(&PriceSeries::empty("NONE"));
        let lines = cumulative_return_lines(&[a, empty], DEFAULT_WINDOW);
        assert_eq!(lines.len(), 1);
        // Cumulative return is undefined at t = 0, so the first full window ends at t = 5.
        assert_eq!(lines[0].values.iter().position(Option::is_some), Some(5));
    }
}
