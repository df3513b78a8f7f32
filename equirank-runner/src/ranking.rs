//! Cross-sectional ranker — percentile-bucket scores over one universe.
//!
//! For a rank spec, every row's metric is converted to a percentile over the
//! defined values of the whole table, then mapped to a score by scanning the
//! bucket thresholds from highest to lowest: the first threshold the
//! percentile meets or exceeds (inclusive) gives the score. Percentiles below
//! every threshold get the below-minimum score. Rows whose metric is
//! undefined get the floor score and are never dropped.
//!
//! Percentile of v among the n defined values:
//! - higher is better: 100 × #{x ≤ v} / n
//! - lower is better:  100 × #{x ≥ v} / n
//!
//! Equal values therefore share a percentile and a score.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::summary::Metric;
use crate::table::{RankedTable, TableError, TOTAL_RANK};

#[derive(Debug, Error, PartialEq)]
pub enum BucketError {
    #[error("bucket list is empty")]
    Empty,
    #[error("threshold {0} is outside [0, 100]")]
    ThresholdOutOfRange(f64),
    #[error("threshold {0} appears twice")]
    DuplicateThreshold(f64),
    #[error("score {higher} at threshold {at} exceeds the score of a higher threshold")]
    NonMonotonic { at: f64, higher: u32 },
    #[error("below-minimum score {below_minimum} exceeds the lowest bucket score {lowest}")]
    BelowMinimumTooHigh { below_minimum: u32, lowest: u32 },
    #[error("rank column name '{0}' is reserved")]
    ReservedColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Percentile threshold in [0, 100].
    pub threshold: f64,
    pub score: u32,
}

/// Ordered percentile → score mapping, highest threshold first.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketBoundaries {
    buckets: Vec<Bucket>,
    below_minimum: u32,
}

impl BucketBoundaries {
    /// Validate and order a bucket list. Scores must not rise as thresholds fall.
    pub fn new(mut buckets: Vec<Bucket>, below_minimum: u32) -> Result<Self, BucketError> {
        if buckets.is_empty() {
            return Err(BucketError::Empty);
        }
        if let Some(b) = buckets
            .iter()
            .find(|b| !b.threshold.is_finite() || !(0.0..=100.0).contains(&b.threshold))
        {
            return Err(BucketError::ThresholdOutOfRange(b.threshold));
        }
        buckets.sort_by(|a, b| b.threshold.total_cmp(&a.threshold));
        for w in buckets.windows(2) {
            if w[0].threshold == w[1].threshold {
                return Err(BucketError::DuplicateThreshold(w[0].threshold));
            }
            if w[1].score > w[0].score {
                return Err(BucketError::NonMonotonic {
                    at: w[1].threshold,
                    higher: w[1].score,
                });
            }
        }
        let lowest = buckets.last().map_or(0, |b| b.score);
        if below_minimum > lowest {
            return Err(BucketError::BelowMinimumTooHigh { below_minimum, lowest });
        }
        Ok(Self {
            buckets,
            below_minimum,
        })
    }

    /// Positional scores: `[80, 40, 20]` becomes 80→3, 40→2, 20→1, below → 0.
    pub fn from_percentiles(thresholds: &[f64]) -> Result<Self, BucketError> {
        let mut sorted = thresholds.to_vec();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let n = sorted.len() as u32;
        let buckets = sorted
            .into_iter()
            .enumerate()
            .map(|(i, threshold)| Bucket {
                threshold,
                score: n - i as u32,
            })
            .collect();
        Self::new(buckets, 0)
    }

    /// Built-in tables. Entries must already be highest-threshold first with
    /// non-increasing scores.
    fn preset(table: &[(f64, u32)]) -> Self {
        Self {
            buckets: table
                .iter()
                .map(|&(threshold, score)| Bucket { threshold, score })
                .collect(),
            below_minimum: 0,
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn below_minimum(&self) -> u32 {
        self.below_minimum
    }

    /// Score for a percentile. Thresholds are inclusive.
    pub fn score(&self, percentile: f64) -> u32 {
        self.buckets
            .iter()
            .find(|b| percentile >= b.threshold)
            .map_or(self.below_minimum, |b| b.score)
    }

    /// Score given to rows whose metric is undefined.
    pub fn floor_score(&self) -> u32 {
        self.buckets
            .iter()
            .map(|b| b.score)
            .fold(self.below_minimum, u32::min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// One rank column: which metric, which direction, which buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRankSpec", into = "RawRankSpec")]
pub struct RankSpec {
    pub column: String,
    pub metric: Metric,
    pub direction: Direction,
    pub buckets: BucketBoundaries,
}

#[derive(Serialize, Deserialize)]
struct RawRankSpec {
    column: String,
    metric: Metric,
    direction: Direction,
    buckets: Vec<Bucket>,
    #[serde(default)]
    below_minimum: u32,
}

impl TryFrom<RawRankSpec> for RankSpec {
    type Error = BucketError;

    fn try_from(raw: RawRankSpec) -> Result<Self, Self::Error> {
        if raw.column == TOTAL_RANK {
            return Err(BucketError::ReservedColumn(raw.column));
        }
        Ok(Self {
            column: raw.column,
            metric: raw.metric,
            direction: raw.direction,
            buckets: BucketBoundaries::new(raw.buckets, raw.below_minimum)?,
        })
    }
}

impl From<RankSpec> for RawRankSpec {
    fn from(spec: RankSpec) -> Self {
        Self {
            column: spec.column,
            metric: spec.metric,
            direction: spec.direction,
            below_minimum: spec.buckets.below_minimum,
            buckets: spec.buckets.buckets,
        }
    }
}

impl RankSpec {
    pub fn new(
        column: impl Into<String>,
        metric: Metric,
        direction: Direction,
        buckets: BucketBoundaries,
    ) -> Self {
        Self {
            column: column.into(),
            metric,
            direction,
            buckets,
        }
    }

    /// P/E: cheap is attractive. Buckets 80→3, 40→2, 20→1.
    pub fn per() -> Self {
        Self::new(
            "rank_per",
            Metric::Pe,
            Direction::LowerIsBetter,
            BucketBoundaries::preset(&[(80.0, 3), (40.0, 2), (20.0, 1)]),
        )
    }

    /// Dividend yield: 70→2, 30→1.
    pub fn dividend() -> Self {
        Self::new(
            "rank_dividend",
            Metric::DividendYield,
            Direction::HigherIsBetter,
            BucketBoundaries::preset(&[(70.0, 2), (30.0, 1)]),
        )
    }
}

/// Percentile of every value among the defined ones. Non-finite values are undefined.
pub fn percentiles(values: &[Option<f64>], direction: Direction) -> Vec<Option<f64>> {
    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;

    values
        .iter()
        .map(|v| {
            let v = v.filter(|v| v.is_finite())?;
            let count = match direction {
                Direction::HigherIsBetter => sorted.partition_point(|x| *x <= v),
                Direction::LowerIsBetter => sorted.len() - sorted.partition_point(|x| *x < v),
            };
            Some(100.0 * count as f64 / n)
        })
        .collect()
}

/// Bucket score for every value; undefined values get the floor score.
pub fn bucket_scores(values: &[Option<f64>], direction: Direction, buckets: &BucketBoundaries) -> Vec<u32> {
    percentiles(values, direction)
        .into_iter()
        .map(|p| p.map_or(buckets.floor_score(), |p| buckets.score(p)))
        .collect()
}

/// Add (or replace) the rank column described by `spec`.
pub fn rank(mut table: RankedTable, spec: &RankSpec) -> Result<RankedTable, TableError> {
    let values: Vec<Option<f64>> = table.rows().iter().map(|r| r.value(spec.metric)).collect();
    let defined = values.iter().filter(|v| v.is_some()).count();
    debug!(
        column = %spec.column,
        metric = %spec.metric,
        defined,
        rows = values.len(),
        "ranking"
    );
    let scores = bucket_scores(&values, spec.direction, &spec.buckets);
    table.set_rank_column(&spec.column, scores)?;
    Ok(table)
}

/// Rank on every spec in order, then add `total_rank`.
pub fn rank_all(table: RankedTable, specs: &[RankSpec]) -> Result<RankedTable, TableError> {
    specs
        .iter()
        .try_fold(table, |t, spec| rank(t, spec))
        .map(RankedTable::with_total_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::InstrumentSummary;

    fn three_buckets() -> BucketBoundaries {
        BucketBoundaries::from_percentiles(&[80.0, 40.0, 20.0]).unwrap()
    }

    #[test]
    fn bucket_scores_scenario() {
        let b = three_buckets();
        assert_eq!(b.score(85.0), 3);
        assert_eq!(b.score(10.0), 0);
        assert_eq!(b.below_minimum(), 0);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let b = three_buckets();
        assert_eq!(b.score(80.0), 3);
        assert_eq!(b.score(79.999), 2);
        assert_eq!(b.score(40.0), 2);
        assert_eq!(b.score(20.0), 1);
        assert_eq!(b.score(100.0), 3);
    }

    #[test]
    fn custom_below_minimum() {
        let b = BucketBoundaries::new(
            vec![
                Bucket { threshold: 20.0, score: 2 },
                Bucket { threshold: 80.0, score: 5 },
            ],
            1,
        )
        .unwrap();
        assert_eq!(b.buckets()[0].threshold, 80.0);
        assert_eq!(b.score(5.0), 1);
        assert_eq!(b.floor_score(), 1);
    }

    #[test]
    fn presets_pass_validation() {
        for spec in [RankSpec::per(), RankSpec::dividend()] {
            let b = &spec.buckets;
            assert_eq!(BucketBoundaries::new(b.buckets().to_vec(), b.below_minimum()).as_ref(), Ok(b));
        }
        assert_eq!(RankSpec::per().buckets, three_buckets());
    }

    #[test]
    fn invalid_buckets_rejected() {
        assert_eq!(BucketBoundaries::new(vec![], 0), Err(BucketError::Empty));
        assert_eq!(
            BucketBoundaries::from_percentiles(&[120.0]),
            Err(BucketError::ThresholdOutOfRange(120.0))
        );
        assert_eq!(
            BucketBoundaries::from_percentiles(&[50.0, 50.0]),
            Err(BucketError::DuplicateThreshold(50.0))
        );
        assert!(matches!(
            BucketBoundaries::new(
                vec![Bucket { threshold: 70.0, score: 1 }, Bucket { threshold: 30.0, score: 2 }],
                0
            ),
            Err(BucketError::NonMonotonic { .. })
        ));
        assert!(matches!(
            BucketBoundaries::new(vec![Bucket { threshold: 70.0, score: 1 }], 2),
            Err(BucketError::BelowMinimumTooHigh { .. })
        ));
    }

    #[test]
    fn percentiles_both_directions() {
        let v = [Some(10.0), Some(20.0), None, Some(30.0), Some(20.0)];
        let hi = percentiles(&v, Direction::HigherIsBetter);
        assert_eq!(hi, vec![Some(25.0), Some(75.0), None, Some(100.0), Some(75.0)]);
        let lo = percentiles(&v, Direction::LowerIsBetter);
        assert_eq!(lo, vec![Some(100.0), Some(75.0), None, Some(25.0), Some(75.0)]);
    }

    #[test]
    fn undefined_gets_floor() {
        let scores = bucket_scores(
            &[None, Some(1.0), Some(f64::NAN)],
            Direction::HigherIsBetter,
            &three_buckets(),
        );
        assert_eq!(scores, vec![0, 3, 0]);
    }

    #[test]
    fn all_undefined_does_not_panic() {
        let scores = bucket_scores(&[None, None], Direction::LowerIsBetter, &three_buckets());
        assert_eq!(scores, vec![0, 0]);
        assert!(bucket_scores(&[], Direction::LowerIsBetter, &three_buckets()).is_empty());
    }

    #[test]
    fn rank_adds_named_column() {
        let rows = [Some(8.0), Some(25.0), None, Some(12.0), Some(40.0)]
            .iter()
            .enumerate()
            .map(|(i, pe)| {
                let mut r = InstrumentSummary::empty(format!("T{i}"));
                r.pe = *pe;
                r
            })
            .collect();
        let spec = RankSpec::per();
        let t = rank_all(RankedTable::new(rows), &[spec]).unwrap();
        assert_eq!(t.rank_column("rank_per").unwrap().scores, vec![3, 2, 0, 2, 1]);
        assert_eq!(t.rank_column(TOTAL_RANK).unwrap().scores, vec![3, 2, 0, 2, 1]);
    }

    #[test]
    fn rank_spec_toml_roundtrip() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            spec: Vec<RankSpec>,
        }
        let w = Wrapper {
            spec: vec![RankSpec::per(), RankSpec::dividend()],
        };
        let text = toml::to_string(&w).unwrap();
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.spec, w.spec);
    }

    #[test]
    fn reserved_column_rejected() {
        let text = r#"
            column = "total_rank"
            metric = "pe"
            direction = "lower_is_better"
            buckets = [{ threshold = 50.0, score = 1 }]
        "#;
        assert!(toml::from_str::<RankSpec>(text).is_err());
    }
}
