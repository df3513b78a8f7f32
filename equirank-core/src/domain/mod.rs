//! Domain types for EquiRank

pub mod bar;
pub mod fundamentals;
pub mod series;

pub use bar::Bar;
pub use fundamentals::Fundamentals;
pub use series::{PriceSeries, SeriesError};

/// Ticker symbol as quoted by the data provider (e.g. `SAN.MC`, `^GSPC`).
pub type Ticker = String;
