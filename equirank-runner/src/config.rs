//! Analysis configuration.
//!
//! One immutable value passed into the pipeline entry points. Loaded from
//! TOML; the default reproduces the reference report (IBEX35, SP500 and
//! INDICES over calendar 2025, ranked on P/E and dividend yield).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use equirank_core::data::Universe;

use crate::charts::DEFAULT_WINDOW;
use crate::ranking::RankSpec;
use crate::table::TOTAL_RANK;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("no rank specs configured")]
    NoRankSpecs,

    #[error("rank column '{0}' is defined twice")]
    DuplicateRankColumn(String),

    #[error("primary rank '{0}' names no rank column")]
    UnknownPrimaryRank(String),

    #[error("universe with an empty name")]
    EmptyUniverseName,

    #[error("universe '{0}' is defined twice")]
    DuplicateUniverse(String),

    #[error("universe '{0}' is not configured")]
    UnknownUniverse(String),

    #[error("chart window must be at least 1")]
    ZeroWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// First date requested from the provider (inclusive).
    pub start_date: NaiveDate,
    /// Last date requested from the provider (inclusive).
    pub end_date: NaiveDate,
    pub output_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    /// Rows printed per universe.
    pub top_n: usize,
    /// Analyze tickers on the rayon pool.
    pub parallel: bool,
    /// Rank column the report is sorted by (may be `total_rank`).
    pub primary_rank: String,
    /// Trailing window for the cumulative-return chart.
    #[serde(default = "default_window")]
    pub chart_window: usize,
    #[serde(rename = "rank")]
    pub rank_specs: Vec<RankSpec>,
    #[serde(rename = "universe")]
    pub universes: Vec<Universe>,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default(),
            output_dir: PathBuf::from("output"),
            snapshot_dir: PathBuf::from("data/snapshots"),
            top_n: 30,
            parallel: true,
            primary_rank: "rank_per".into(),
            chart_window: DEFAULT_WINDOW,
            rank_specs: vec![RankSpec::per(), RankSpec::dividend()],
            universes: vec![Universe::ibex35(), Universe::sp500(), Universe::indices()],
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end_date < self.start_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.rank_specs.is_empty() {
            return Err(ConfigError::NoRankSpecs);
        }
        let mut columns = HashSet::new();
        for spec in &self.rank_specs {
            if !columns.insert(spec.column.as_str()) {
                return Err(ConfigError::DuplicateRankColumn(spec.column.clone()));
            }
        }
        if self.primary_rank != TOTAL_RANK && !columns.contains(self.primary_rank.as_str()) {
            return Err(ConfigError::UnknownPrimaryRank(self.primary_rank.clone()));
        }
        let mut names = HashSet::new();
        for u in &self.universes {
            if u.name.trim().is_empty() {
                return Err(ConfigError::EmptyUniverseName);
            }
            if !names.insert(u.name.to_lowercase()) {
                return Err(ConfigError::DuplicateUniverse(u.name.clone()));
            }
        }
        if self.chart_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn universe(&self, name: &str) -> Option<&Universe> {
        self.universes
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name))
    }

    /// The named universes in the given order, or all of them when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Universe>, ConfigError> {
        if names.is_empty() {
            return Ok(self.universes.iter().collect());
        }
        names
            .iter()
            .map(|n| {
                self.universe(n)
                    .ok_or_else(|| ConfigError::UnknownUniverse(n.clone()))
            })
            .collect()
    }
}
