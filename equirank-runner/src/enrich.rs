//! Valuation enricher — attaches P/E, P/B and dividend yield to a summary row.
//!
//! Source errors are caught here and become a `FundamentalsUnavailable` issue
//! on the row; they never reach the rest of the pipeline.

use tracing::{debug, warn};

use equirank_core::data::FundamentalsSource;
use equirank_core::domain::Fundamentals;

use crate::summary::{InstrumentSummary, MetricIssue};

/// Outcome of one enrichment: whatever ratios were found, plus the reason if none were.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub fundamentals: Fundamentals,
    pub issue: Option<MetricIssue>,
}

pub struct ValuationEnricher<'a> {
    source: &'a dyn FundamentalsSource,
}

impl<'a> ValuationEnricher<'a> {
    pub fn new(source: &'a dyn FundamentalsSource) -> Self {
        Self { source }
    }

    pub fn enrich(&self, ticker: &str) -> Valuation {
        match self.source.fetch_fundamentals(ticker) {
            Ok(f) if f.is_empty() => {
                debug!(ticker, source = self.source.name(), "no valuation ratios reported");
                Valuation {
                    fundamentals: f,
                    issue: Some(MetricIssue::FundamentalsUnavailable {
                        reason: "no valuation ratios reported".into(),
                    }),
                }
            }
            Ok(f) => Valuation {
                fundamentals: f,
                issue: None,
            },
            Err(e) => {
                warn!(ticker, source = self.source.name(), error = %e, "fundamentals unavailable");
                Valuation {
                    fundamentals: Fundamentals::default(),
                    issue: Some(MetricIssue::FundamentalsUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Enrich a row in place.
    pub fn apply(&self, summary: &mut InstrumentSummary) {
        let valuation = self.enrich(&summary.ticker);
        summary.apply_fundamentals(valuation.fundamentals);
        summary.issues.extend(valuation.issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equirank_core::data::{DataError, NoFundamentals};

    struct Fixed(Fundamentals);

    impl FundamentalsSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn fetch_fundamentals(&self, _ticker: &str) -> Result<Fundamentals, DataError> {
            Ok(self.0)
        }
    }

    #[test]
    fn failure_becomes_issue() {
        let source = NoFundamentals;
        let mut row = InstrumentSummary::empty("SAN.MC");
        ValuationEnricher::new(&source).apply(&mut row);
        assert_eq!(row.pe, None);
        assert!(matches!(
            row.issues.as_slice(),
            [MetricIssue::FundamentalsUnavailable { .. }]
        ));
    }

    #[test]
    fn partial_ratios_are_kept() {
        let source = Fixed(Fundamentals::sanitized(Some(11.0), None, Some(4.2)));
        let mut row = InstrumentSummary::empty("SAN.MC");
        ValuationEnricher::new(&source).apply(&mut row);
        assert_eq!(row.pe, Some(11.0));
        assert_eq!(row.pb, None);
        assert_eq!(row.dividend_yield, Some(4.2));
        assert!(row.issues.is_empty());
    }

    #[test]
    fn empty_ratios_flagged() {
        let source = Fixed(Fundamentals::default());
        let v = ValuationEnricher::new(&source).enrich("X");
        assert!(v.fundamentals.is_empty());
        assert!(v.issue.is_some());
    }
}
