//! Universes — named ticker groups analyzed against a shared benchmark.
//!
//! Stored as TOML (`[[universe]]` tables). The built-in set mirrors the
//! reference report: IBEX35 against `^IBEX`, a large-cap S&P 500 selection
//! against `^GSPC`, and a basket of indices/ETFs also against `^GSPC`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize universe TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub name: String,
    pub benchmark: String,
    pub tickers: Vec<String>,
}

impl Universe {
    pub fn new(name: impl Into<String>, benchmark: impl Into<String>, tickers: &[&str]) -> Self {
        Self {
            name: name.into(),
            benchmark: benchmark.into(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn ibex35() -> Self {
        Self::new(
            "IBEX35",
            "^IBEX",
            &[
                "ACS.MC", "ACX.MC", "AENA.MC", "AMS.MC", "ANA.MC", "ANE.MC", "BBVA.MC", "BKT.MC",
                "CABK.MC", "CLNX.MC", "COL.MC", "ELE.MC", "ENG.MC", "FDR.MC", "FER.MC", "GRF.MC",
                "IAG.MC", "IBE.MC", "IDR.MC", "ITX.MC", "LOG.MC", "MAP.MC", "MRL.MC", "MTS.MC",
                "NTGY.MC", "PUIG.MC", "RED.MC", "REP.MC", "ROVI.MC", "SAB.MC", "SAN.MC", "SCYR.MC",
                "SLR.MC", "TEF.MC", "UNI.MC",
            ],
        )
    }

    pub fn sp500() -> Self {
        Self::new(
            "SP500",
            "^GSPC",
            &[
                "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "BRK-B", "AVGO", "TSLA", "JPM",
                "LLY", "V", "UNH", "XOM", "MA", "JNJ", "PG", "HD", "COST", "ABBV", "WMT", "NFLX",
                "BAC", "KO", "CRM", "CVX", "MRK", "PEP", "ORCL", "ADBE", "TMO", "AMD", "MCD",
                "CSCO", "ABT", "WFC", "DIS", "IBM", "GE", "CAT",
            ],
        )
    }

    pub fn indices() -> Self {
        Self::new(
            "INDICES",
            "^GSPC",
            &[
                "^GSPC", "^IXIC", "^DJI", "^IBEX", "^STOXX50E", "^GDAXI", "^FTSE", "^N225", "SPY",
                "QQQ", "IWM", "DIA", "VGK", "EWP", "GLD", "TLT",
            ],
        )
    }
}

/// A collection of universes, as read from or written to TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSet {
    #[serde(rename = "universe")]
    pub universes: Vec<Universe>,
}

impl UniverseSet {
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// IBEX35, SP500 and INDICES.
    pub fn builtin() -> Self {
        Self {
            universes: vec![Universe::ibex35(), Universe::sp500(), Universe::indices()],
        }
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&Universe> {
        self.universes
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.universes.iter().map(|u| u.name.as_str()).collect()
    }
}
