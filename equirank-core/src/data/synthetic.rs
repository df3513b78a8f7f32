//! Synthetic data for offline development and demos.
//!
//! Every ticker follows a geometric random walk driven by a shared market
//! factor plus ticker-specific noise, so Beta and Alpha come out non-trivial.
//! Output is deterministic for a given (seed, ticker) pair. Results produced
//! from synthetic data are tagged `DataSource::Synthetic`.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, DataProvider, DataSource, FetchResult, FundamentalsSource};
use crate::domain::{Bar, Fundamentals, PriceSeries};

fn rng_for(seed: u64, salt: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(salt.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

fn is_weekday(date: &NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub struct SyntheticProvider {
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn generate(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        let mut market = rng_for(self.seed, "__market__");
        let mut own = rng_for(self.seed, ticker);

        let beta: f64 = own.gen_range(0.4..1.6);
        let drift: f64 = own.gen_range(-0.0005..0.0008);
        let noise: f64 = own.gen_range(0.002..0.015);
        let mut price: f64 = own.gen_range(5.0..400.0);

        let mut bars = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end).filter(is_weekday) {
            let market_return: f64 = market.gen_range(-0.015..0.015);
            let idio: f64 = own.gen_range(-1.0..1.0) * noise;
            let daily_return = drift + beta * market_return + idio;

            let open = price;
            let close = (price * (1.0 + daily_return)).max(0.01);
            let high = open.max(close) * (1.0 + own.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - own.gen_range(0.0..0.01));
            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                volume: own.gen_range(100_000..5_000_000u64),
                adj_close: close,
            });
            price = close;
        }
        bars
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let bars = self.generate(ticker, start, end);
        let series = PriceSeries::new(ticker, bars)
            .map_err(|e| DataError::Other(format!("synthetic series invalid: {e}")))?;
        Ok(FetchResult {
            series,
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Deterministic fake valuation ratios. Index tickers (`^...`) get none.
pub struct SyntheticFundamentals {
    seed: u64,
}

impl SyntheticFundamentals {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl FundamentalsSource for SyntheticFundamentals {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError> {
        if ticker.starts_with('^') {
            return Err(DataError::FundamentalsUnavailable {
                ticker: ticker.to_string(),
                reason: "indices carry no valuation ratios".into(),
            });
        }
        let mut rng = rng_for(self.seed, &format!("fundamentals:{ticker}"));
        let pays_dividend = rng.gen_bool(0.7);
        Ok(Fundamentals::sanitized(
            Some(rng.gen_range(4.0..45.0)),
            Some(rng.gen_range(0.5..9.0)),
            pays_dividend.then(|| rng.gen_range(0.5..7.5)),
        ))
    }
}
