//! EquiRank Core — domain types and the external collaborators of the analysis.
//!
//! This crate contains:
//! - Domain types (bars, strictly date-ordered price series, fundamentals)
//! - Provider traits for historical series and valuation ratios
//! - Yahoo Finance implementations behind a shared circuit breaker
//! - A deterministic synthetic provider for offline runs
//! - The Parquet snapshot store
//! - Universe definitions (IBEX35, S&P 500, indices/ETFs)

pub mod data;
pub mod domain;
