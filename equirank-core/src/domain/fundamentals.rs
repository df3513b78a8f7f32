//! Valuation ratios attached to each instrument.

use serde::{Deserialize, Serialize};

/// Externally sourced valuation ratios. Every field is independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Trailing price/earnings.
    pub pe: Option<f64>,
    /// Price/book.
    pub pb: Option<f64>,
    /// Dividend yield as reported by the source.
    pub dividend_yield: Option<f64>,
}

impl Fundamentals {
    /// Build from raw provider values, dropping non-finite numbers and non-positive P/E.
    ///
    /// A negative P/E means negative earnings; it is not a cheap stock.
    pub fn sanitized(pe: Option<f64>, pb: Option<f64>, dividend_yield: Option<f64>) -> Self {
        Self {
            pe: pe.filter(|v| v.is_finite() && *v > 0.0),
            pb: pb.filter(|v| v.is_finite()),
            dividend_yield: dividend_yield.filter(|v| v.is_finite()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pe.is_none() && self.pb.is_none() && self.dividend_yield.is_none()
    }
}
