//! Columnar snapshot of per-ticker histories.
//!
//! Layout: `{root}/{universe}/ticker={TICKER}.parquet` with a
//! `ticker={TICKER}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Optional derived columns (daily change, daily return, cumulative return),
//!   stored nullable so undefined values stay undefined
//! - Integrity validation on load (required columns, row count > 0)
//! - Corrupt files are renamed to `.quarantined` and reported as missing

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::provider::DataError;
use crate::domain::{Bar, PriceSeries};

const REQUIRED_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "adj_close"];

/// Per-bar analytics persisted next to the prices. Each vector matches the bar count.
#[derive(Debug, Clone, Default)]
pub struct DerivedColumns {
    pub daily_change: Vec<Option<f64>>,
    pub daily_return: Vec<Option<f64>>,
    pub cumulative_return: Vec<Option<f64>>,
}

/// Metadata sidecar for one snapshotted ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub ticker: String,
    pub universe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
    /// Range the series was fetched for. Exchange holidays at either end
    /// leave it wider than the stored bars.
    #[serde(default)]
    pub requested_start: Option<NaiveDate>,
    #[serde(default)]
    pub requested_end: Option<NaiveDate>,
}

impl SnapshotMeta {
    /// First date a load can be served for without asking the provider.
    pub fn covered_from(&self) -> NaiveDate {
        self.requested_start
            .map_or(self.start_date, |s| s.min(self.start_date))
    }

    /// Last date a load can be served for. A requested end past the write
    /// date is capped there, since later bars did not exist yet.
    pub fn covered_to(&self) -> NaiveDate {
        self.requested_end
            .map_or(self.end_date, |e| e.min(self.written_at.date()))
            .max(self.end_date)
    }
}

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn universe_dir(&self, universe: &str) -> PathBuf {
        self.root.join(universe.to_lowercase())
    }

    fn parquet_path(&self, universe: &str, ticker: &str) -> PathBuf {
        self.universe_dir(universe)
            .join(format!("ticker={}.parquet", sanitize(ticker)))
    }

    fn meta_path(&self, universe: &str, ticker: &str) -> PathBuf {
        self.universe_dir(universe)
            .join(format!("ticker={}.meta.json", sanitize(ticker)))
    }

    /// Write one ticker's history. Empty series are rejected.
    pub fn write(
        &self,
        universe: &str,
        series: &PriceSeries,
        derived: Option<&DerivedColumns>,
    ) -> Result<SnapshotMeta, DataError> {
        self.write_requested(universe, series, derived, None)
    }

    /// Like [`write`](Self::write), recording the `[start, end]` range the
    /// series was fetched for so later coverage checks ignore missing
    /// trading days at its edges.
    pub fn write_requested(
        &self,
        universe: &str,
        series: &PriceSeries,
        derived: Option<&DerivedColumns>,
        requested: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<SnapshotMeta, DataError> {
        let (start_date, end_date) = series
            .date_range()
            .ok_or_else(|| DataError::SnapshotError(format!("{}: no bars to snapshot", series.ticker())))?;

        if let Some(d) = derived {
            let n = series.len();
            if d.daily_change.len() != n || d.daily_return.len() != n || d.cumulative_return.len() != n {
                return Err(DataError::SnapshotError(format!(
                    "{}: derived columns do not match {n} bars",
                    series.ticker()
                )));
            }
        }

        let dir = self.universe_dir(universe);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::SnapshotError(format!("failed to create dir: {e}")))?;

        let mut df = series_to_dataframe(series, derived)?;
        let path = self.parquet_path(universe, series.ticker());
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::SnapshotError(format!("atomic rename failed: {e}"))
        })?;

        let meta = SnapshotMeta {
            ticker: series.ticker().to_string(),
            universe: universe.to_string(),
            start_date,
            end_date,
            bar_count: series.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(series.bars())
                    .map_err(|e| DataError::SnapshotError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            written_at: chrono::Local::now().naive_local(),
            requested_start: requested.map(|(s, _)| s),
            requested_end: requested.map(|(_, e)| e),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::SnapshotError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(universe, series.ticker()), meta_json)
            .map_err(|e| DataError::SnapshotError(format!("meta write: {e}")))?;

        tracing::debug!(ticker = series.ticker(), universe, bars = series.len(), "snapshot written");
        Ok(meta)
    }

    /// Load a ticker's bars. A corrupt file is quarantined and reported as missing.
    pub fn load(&self, universe: &str, ticker: &str) -> Result<PriceSeries, DataError> {
        let path = self.parquet_path(universe, ticker);
        if !path.exists() {
            return Err(DataError::NoSnapshot {
                ticker: ticker.to_string(),
            });
        }

        match load_and_validate(&path).and_then(|bars| {
            PriceSeries::new(ticker, bars).map_err(|e| DataError::SnapshotError(e.to_string()))
        }) {
            Ok(series) => Ok(series),
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt snapshot");
                let _ = fs::rename(&path, &quarantine);
                Err(DataError::NoSnapshot {
                    ticker: ticker.to_string(),
                })
            }
        }
    }

    pub fn meta(&self, universe: &str, ticker: &str) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.meta_path(universe, ticker)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether the snapshot for `ticker` spans `[start, end]`, judged by the
    /// range it was fetched for when that was recorded.
    pub fn covers_range(&self, universe: &str, ticker: &str, start: NaiveDate, end: NaiveDate) -> bool {
        self.meta(universe, ticker)
            .is_some_and(|m| m.covered_from() <= start && m.covered_to() >= end)
    }

    /// Metadata of every ticker snapshotted under `universe`, sorted by ticker.
    pub fn list(&self, universe: &str) -> Vec<SnapshotMeta> {
        let Ok(entries) = fs::read_dir(self.universe_dir(universe)) else {
            return Vec::new();
        };
        let mut metas: Vec<SnapshotMeta> = entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".meta.json"))
            .filter_map(|e| fs::read_to_string(e.path()).ok())
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect();
        metas.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        metas
    }
}

/// Index tickers start with `^`; keep file names portable.
fn sanitize(ticker: &str) -> String {
    ticker.replace('^', "_IDX_").replace(['/', '\\'], "_")
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn series_to_dataframe(series: &PriceSeries, derived: Option<&DerivedColumns>) -> Result<DataFrame, DataError> {
    let bars = series.bars();
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();

    let mut columns = vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<f64>>()),
        Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<f64>>()),
        Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<f64>>()),
        Column::new("close".into(), bars.iter().map(|b| b.close).collect::<Vec<f64>>()),
        Column::new("volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
        Column::new("adj_close".into(), bars.iter().map(|b| b.adj_close).collect::<Vec<f64>>()),
    ];

    if let Some(d) = derived {
        columns.push(Column::new("daily_change".into(), d.daily_change.clone()));
        columns.push(Column::new("daily_return".into(), d.daily_return.clone()));
        columns.push(Column::new("cumulative_return".into(), d.cumulative_return.clone()));
    }

    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::SnapshotError("empty parquet file".into()));
    }
    for name in REQUIRED_COLUMNS {
        if df.column(name).is_err() {
            return Err(DataError::SnapshotError(format!("missing column '{name}'")));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let f64s = |name: &str| -> Result<Float64Chunked, DataError> {
        col(name)?
            .f64()
            .cloned()
            .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))
    };

    let date_ca = col("date")?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?
        .clone();
    let open = f64s("open")?;
    let high = f64s("high")?;
    let low = f64s("low")?;
    let close = f64s("close")?;
    let adj_close = f64s("adj_close")?;
    let volume = col("volume")?
        .u64()
        .map_err(|e| DataError::ParquetError(format!("volume column type: {e}")))?
        .clone();

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        bars.push(Bar {
            date: epoch() + chrono::Duration::days(days as i64),
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(0),
            adj_close: adj_close.get(i).unwrap_or(f64::NAN),
        });
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn sample_series(ticker: &str) -> PriceSeries {
        PriceSeries::new(
            ticker,
            vec![Bar::flat(d(3), 10.0), Bar::flat(d(4), 11.0), Bar::flat(d(5), 12.1)],
        )
        .unwrap()
    }

    #[test]
    fn epoch_is_unix_epoch() {
        assert_eq!(epoch(), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let series = sample_series("SAN.MC");

        store.write("IBEX35", &series, None).unwrap();
        let loaded = store.load("IBEX35", "SAN.MC").unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn writes_derived_columns() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let series = sample_series("^IBEX");
        let derived = DerivedColumns {
            daily_change: vec![None, Some(1.0), Some(1.1)],
            daily_return: vec![None, Some(0.1), Some(0.1)],
            cumulative_return: vec![None, Some(0.1), Some(0.21)],
        };
        store.write("IBEX35", &series, Some(&derived)).unwrap();

        let file = fs::File::open(store.parquet_path("IBEX35", "^IBEX")).unwrap();
        let df = ParquetReader::new(file).finish().unwrap();
        let ret = df.column("daily_return").unwrap().f64().unwrap().clone();
        assert_eq!(ret.get(0), None);
        assert_eq!(ret.get(1), Some(0.1));
        assert_eq!(store.load("IBEX35", "^IBEX").unwrap().len(), 3);
    }

    #[test]
    fn rejects_mismatched_derived_columns() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let derived = DerivedColumns::default();
        let err = store
            .write("IBEX35", &sample_series("X"), Some(&derived))
            .unwrap_err();
        assert!(matches!(err, DataError::SnapshotError(_)));
    }

    #[test]
    fn rejects_empty_series() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.write("SP500", &PriceSeries::empty("X"), None).is_err());
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(
            store.load("SP500", "AAPL"),
            Err(DataError::NoSnapshot { .. })
        ));
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write("SP500", &sample_series("AAPL"), None).unwrap();
        let path = store.parquet_path("SP500", "AAPL");
        fs::write(&path, b"not parquet").unwrap();

        assert!(store.load("SP500", "AAPL").is_err());
        assert!(!path.exists());
        assert!(path.with_extension("parquet.quarantined").exists());
    }

    #[test]
    fn meta_coverage_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write("SP500", &sample_series("MSFT"), None).unwrap();
        store.write("SP500", &sample_series("AAPL"), None).unwrap();

        let meta = store.meta("SP500", "MSFT").unwrap();
        assert_eq!(meta.bar_count, 3);
        assert!(store.covers_range("SP500", "MSFT", d(3), d(5)));
        assert!(!store.covers_range("SP500", "MSFT", d(1), d(5)));

        let listed: Vec<String> = store.list("SP500").into_iter().map(|m| m.ticker).collect();
        assert_eq!(listed, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn requested_range_covers_holiday_edges() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        // Asked for the 1st..7th; the market only traded the 3rd..5th.
        let meta = store
            .write_requested("SP500", &sample_series("MSFT"), None, Some((d(1), d(7))))
            .unwrap();
        assert_eq!(meta.requested_start, Some(d(1)));
        assert_eq!(meta.start_date, d(3));

        assert!(store.covers_range("SP500", "MSFT", d(1), d(7)));
        assert!(store.covers_range("SP500", "MSFT", d(2), d(6)));
        assert!(!store.covers_range("SP500", "MSFT", NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(), d(7)));
        assert!(!store.covers_range("SP500", "MSFT", d(1), d(8)));
    }

    #[test]
    fn requested_end_is_capped_at_write_date() {
        let meta = SnapshotMeta {
            ticker: "MSFT".into(),
            universe: "SP500".into(),
            start_date: d(3),
            end_date: d(5),
            bar_count: 3,
            data_hash: String::new(),
            written_at: d(10).and_hms_opt(18, 0, 0).unwrap(),
            requested_start: Some(d(1)),
            requested_end: Some(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
        };
        assert_eq!(meta.covered_from(), d(1));
        assert_eq!(meta.covered_to(), d(10));
    }

    #[test]
    fn meta_without_requested_range_still_parses() {
        let json = r#"{"ticker":"MSFT","universe":"SP500","start_date":"2025-02-03",
            "end_date":"2025-02-05","bar_count":3,"data_hash":"",
            "written_at":"2025-02-06T10:00:00"}"#;
        let meta: SnapshotMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.requested_start, None);
        assert_eq!(meta.covered_from(), d(3));
        assert_eq!(meta.covered_to(), d(5));
    }
}
