//! Yahoo Finance quote endpoint as a fundamentals source.
//!
//! Reads `trailingPE`, `priceToBook` and `dividendYield` from the v7 quote API.
//! Dividend yield is reported in percent; when only
//! `trailingAnnualDividendYield` (a fraction) is present it is scaled to match.

use std::sync::Arc;

use serde::Deserialize;

use super::provider::{DataError, FundamentalsSource};
use super::yahoo::YahooClient;
use crate::domain::Fundamentals;

const QUOTE_URL: &str = "https://query2.finance.yahoo.com/v7/finance/quote";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    result: Option<Vec<QuoteItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    symbol: String,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    price_to_book: Option<f64>,
    dividend_yield: Option<f64>,
    trailing_annual_dividend_yield: Option<f64>,
}

impl QuoteItem {
    fn into_fundamentals(self) -> Fundamentals {
        let dividend_yield = self
            .dividend_yield
            .or(self.trailing_annual_dividend_yield.map(|f| f * 100.0));
        Fundamentals::sanitized(self.trailing_pe, self.price_to_book, dividend_yield)
    }
}

pub struct YahooFundamentals {
    client: Arc<YahooClient>,
}

impl YahooFundamentals {
    pub fn new(client: Arc<YahooClient>) -> Self {
        Self { client }
    }
}

fn parse_quote(ticker: &str, envelope: QuoteEnvelope) -> Result<Fundamentals, DataError> {
    let item = envelope
        .quote_response
        .result
        .unwrap_or_default()
        .into_iter()
        .find(|q| q.symbol.eq_ignore_ascii_case(ticker))
        .ok_or_else(|| DataError::FundamentalsUnavailable {
            ticker: ticker.to_string(),
            reason: "no quote returned".into(),
        })?;
    Ok(item.into_fundamentals())
}

impl FundamentalsSource for YahooFundamentals {
    fn name(&self) -> &str {
        "yahoo_quote"
    }

    fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, DataError> {
        let url = format!("{QUOTE_URL}?symbols={ticker}");
        let envelope: QuoteEnvelope = self.client.get_json(&url, ticker)?;
        parse_quote(ticker, envelope)
    }
}
