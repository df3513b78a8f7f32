//! External collaborators: price and fundamentals providers, snapshots, universes

pub mod circuit_breaker;
pub mod provider;
pub mod snapshot;
pub mod synthetic;
pub mod universe;
pub mod yahoo;
pub mod yahoo_quote;

pub use circuit_breaker::CircuitBreaker;
pub use provider::{
    DataError, DataProvider, DataSource, DownloadProgress, FetchResult, FundamentalsSource,
    LogProgress, NoFundamentals,
};
pub use snapshot::{DerivedColumns, SnapshotMeta, SnapshotStore};
pub use synthetic::{SyntheticFundamentals, SyntheticProvider};
pub use universe::{Universe, UniverseError, UniverseSet};
pub use yahoo::{YahooClient, YahooProvider};
pub use yahoo_quote::YahooFundamentals;
