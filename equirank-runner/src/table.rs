//! Ranked table — summary rows plus named per-row score columns.
//!
//! Rows are unique by ticker. Rank columns are parallel vectors: `scores[i]`
//! belongs to `rows[i]`, and every reordering permutes both together.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::summary::InstrumentSummary;

/// Name of the composite column (sum of every other rank column).
pub const TOTAL_RANK: &str = "total_rank";

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("unknown rank column '{0}'")]
    UnknownColumn(String),
    #[error("rank column '{column}' has {got} scores for {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
    #[error("duplicate ticker '{0}'")]
    DuplicateTicker(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankColumn {
    pub name: String,
    pub scores: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRankedTable")]
pub struct RankedTable {
    rows: Vec<InstrumentSummary>,
    rank_columns: Vec<RankColumn>,
}

/// Unchecked wire form; deserializing a `RankedTable` goes through this.
#[derive(Deserialize)]
struct RawRankedTable {
    rows: Vec<InstrumentSummary>,
    rank_columns: Vec<RankColumn>,
}

impl TryFrom<RawRankedTable> for RankedTable {
    type Error = TableError;

    fn try_from(raw: RawRankedTable) -> Result<Self, Self::Error> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = raw.rows.iter().find(|r| !seen.insert(r.ticker.as_str())) {
            return Err(TableError::DuplicateTicker(dup.ticker.clone()));
        }
        let mut table = Self {
            rows: raw.rows,
            rank_columns: Vec::new(),
        };
        for col in raw.rank_columns {
            table.set_rank_column(&col.name, col.scores)?;
        }
        Ok(table)
    }
}

impl RankedTable {
    /// Build a table with no rank columns. A repeated ticker keeps its first row.
    pub fn new(rows: Vec<InstrumentSummary>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let rows = rows
            .into_iter()
            .filter(|r| {
                let fresh = seen.insert(r.ticker.clone());
                if !fresh {
                    warn!(ticker = %r.ticker, "duplicate ticker dropped from table");
                }
                fresh
            })
            .collect();
        Self {
            rows,
            rank_columns: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[InstrumentSummary] {
        &self.rows
    }

    pub fn rank_columns(&self) -> &[RankColumn] {
        &self.rank_columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn tickers(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.ticker.as_str()).collect()
    }

    pub fn rank_column(&self, name: &str) -> Option<&RankColumn> {
        self.rank_columns.iter().find(|c| c.name == name)
    }

    /// Score of row `index` in column `name`.
    pub fn score(&self, index: usize, name: &str) -> Option<u32> {
        self.rank_column(name)?.scores.get(index).copied()
    }

    pub fn row(&self, ticker: &str) -> Option<&InstrumentSummary> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }

    /// Add a rank column, replacing any existing column of the same name.
    pub fn set_rank_column(&mut self, name: &str, scores: Vec<u32>) -> Result<(), TableError> {
        if scores.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.rows.len(),
                got: scores.len(),
            });
        }
        match self.rank_columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.scores = scores,
            None => self.rank_columns.push(RankColumn {
                name: name.to_string(),
                scores,
            }),
        }
        Ok(())
    }

    /// Append (or refresh) `total_rank`, the per-row sum of all other rank columns.
    pub fn with_total_rank(mut self) -> Self {
        let mut totals = vec![0u32; self.rows.len()];
        for col in self.rank_columns.iter().filter(|c| c.name != TOTAL_RANK) {
            for (t, s) in totals.iter_mut().zip(&col.scores) {
                *t += s;
            }
        }
        self.rank_columns.retain(|c| c.name != TOTAL_RANK);
        self.rank_columns.push(RankColumn {
            name: TOTAL_RANK.to_string(),
            scores: totals,
        });
        self
    }

    /// Stable sort, descending by `column`. Rows with missing price data go
    /// after other rows of equal score; otherwise ties keep their order.
    pub fn sort_desc_by(mut self, column: &str) -> Result<Self, TableError> {
        let scores = &self
            .rank_column(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?
            .scores;

        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .cmp(&scores[a])
                .then_with(|| self.rows[a].has_missing_data().cmp(&self.rows[b].has_missing_data()))
        });

        let mut slots: Vec<Option<InstrumentSummary>> = self.rows.drain(..).map(Some).collect();
        self.rows = order.iter().filter_map(|&i| slots[i].take()).collect();
        for col in &mut self.rank_columns {
            col.scores = order.iter().map(|&i| col.scores[i]).collect();
        }
        Ok(self)
    }

    /// The first `n` rows.
    pub fn top(&self, n: usize) -> &[InstrumentSummary] {
        &self.rows[..n.min(self.rows.len())]
    }
}
