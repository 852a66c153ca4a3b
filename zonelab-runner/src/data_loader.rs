//! CSV bar loading and confluence-series derivation.
//!
//! One file per symbol and timeframe: `{data_dir}/{SYMBOL}_{tf}.csv` with a
//! header row `open_time,open,high,low,close,volume`. `open_time` is either
//! RFC 3339 or integer epoch milliseconds. `volume` may be omitted.
//!
//! Rows are kept in file order; ordering and sanity are checked by the
//! engine, which rejects the whole symbol on a malformed series.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use zonelab_core::indicators::{Indicator, Sma, Vwap};
use zonelab_core::{Bar, BarSeries, SymbolInput, Timeframe, TimeframeInput};

use crate::config::DeriveOptions;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: unrecognised open_time '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("no bar files for '{symbol}' in {data_dir}")]
    NoData { symbol: String, data_dir: PathBuf },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// `{data_dir}/{SYMBOL}_{tf}.csv`
pub fn csv_path(data_dir: &Path, symbol: &str, timeframe: Timeframe) -> PathBuf {
    data_dir.join(format!("{symbol}_{timeframe}.csv"))
}

/// RFC 3339, or integer milliseconds since the Unix epoch.
pub fn parse_open_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read one bar file.
pub fn load_bars(path: &Path, symbol: &str, timeframe: Timeframe) -> Result<BarSeries, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvRow>().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let open_time = parse_open_time(&record.open_time).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            row: row + 1,
            value: record.open_time.clone(),
        })?;
        bars.push(Bar {
            open_time,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    tracing::debug!(
        symbol,
        timeframe = %timeframe,
        bars = bars.len(),
        path = %path.display(),
        "loaded bars"
    );
    Ok(BarSeries::new(symbol, timeframe, bars))
}

/// Attach the derived moving-average and VWAP series to a loaded series.
pub fn derive_inputs(series: BarSeries, opts: &DeriveOptions) -> TimeframeInput {
    let ma = (opts.ma_period > 0).then(|| Sma::new(opts.ma_period).compute(&series.bars));
    let vwap = opts.derive_vwap.then(|| Vwap::new().compute(&series.bars));
    let mut input = TimeframeInput::new(series);
    if let Some(ma) = ma {
        input = input.with_ma(ma);
    }
    if let Some(vwap) = vwap {
        input = input.with_vwap(vwap);
    }
    input
}

/// Load every available timeframe for a symbol. Missing files are skipped;
/// a symbol with no files at all is an error.
pub fn load_symbol_input(
    data_dir: &Path,
    symbol: &str,
    timeframes: &[Timeframe],
    opts: &DeriveOptions,
) -> Result<SymbolInput, LoadError> {
    let mut input = SymbolInput::new(symbol);
    for &tf in timeframes {
        let path = csv_path(data_dir, symbol, tf);
        if !path.exists() {
            tracing::debug!(symbol, timeframe = %tf, path = %path.display(), "no bar file");
            continue;
        }
        let series = load_bars(&path, symbol, tf)?;
        input.insert(derive_inputs(series, opts));
    }
    if input.timeframes.is_empty() {
        return Err(LoadError::NoData {
            symbol: symbol.to_string(),
            data_dir: data_dir.to_path_buf(),
        });
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn open_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_open_time("2024-01-02T00:00:00Z"), Some(expected));
        assert_eq!(parse_open_time("2024-01-02T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_open_time("1704153600000"), Some(expected));
        assert_eq!(parse_open_time("02/01/2024"), None);
    }

    #[test]
    fn csv_path_layout() {
        let path = csv_path(Path::new("/data"), "BTCUSDT", Timeframe::H4);
        assert_eq!(path, PathBuf::from("/data/BTCUSDT_4h.csv"));
    }

    #[test]
    fn loads_rows_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "AAA_1d.csv",
            "open_time,open,high,low,close,volume\n\
             2024-01-02T00:00:00Z,10,11,9,10.5,100\n\
             1704240000000, 10.5, 12, 10, 11.5, 200\n",
        );
        let series = load_bars(&path, "AAA", Timeframe::D1).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars[1].close, 11.5);
        assert_eq!(
            series.bars[1].open_time,
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
        );
        series.validate().unwrap();
    }

    #[test]
    fn volume_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "AAA_1h.csv",
            "open_time,open,high,low,close\n2024-01-02T00:00:00Z,10,11,9,10.5\n",
        );
        let series = load_bars(&path, "AAA", Timeframe::H1).unwrap();
        assert_eq!(series.bars[0].volume, 0.0);
    }

    #[test]
    fn bad_timestamp_names_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "AAA_1d.csv",
            "open_time,open,high,low,close,volume\n\
             2024-01-02T00:00:00Z,10,11,9,10.5,100\n\
             yesterday,10,11,9,10.5,100\n",
        );
        let err = load_bars(&path, "AAA", Timeframe::D1).unwrap_err();
        assert!(matches!(err, LoadError::Timestamp { row: 2, .. }));
    }

    #[test]
    fn non_numeric_price_is_a_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "AAA_1d.csv",
            "open_time,open,high,low,close,volume\n2024-01-02T00:00:00Z,ten,11,9,10.5,100\n",
        );
        assert!(matches!(
            load_bars(&path, "AAA", Timeframe::D1),
            Err(LoadError::Csv { .. })
        ));
    }

    #[test]
    fn symbol_input_skips_missing_timeframes_and_derives_series() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "AAA_1d.csv",
            "open_time,open,high,low,close,volume\n\
             2024-01-02T00:00:00Z,10,11,9,10.5,100\n\
             2024-01-03T00:00:00Z,10.5,12,10,11.5,200\n",
        );
        let opts = DeriveOptions {
            ma_period: 2,
            derive_vwap: true,
        };
        let input =
            load_symbol_input(dir.path(), "AAA", &[Timeframe::D1, Timeframe::H1], &opts).unwrap();
        assert_eq!(input.timeframes.len(), 1);
        let d1 = &input.timeframes[&Timeframe::D1];
        assert_eq!(d1.ma.as_ref().map(Vec::len), Some(2));
        assert_eq!(d1.vwap.as_ref().map(Vec::len), Some(2));
        assert!(d1.atr.is_none());
    }

    #[test]
    fn symbol_without_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_symbol_input(dir.path(), "ZZZ", &Timeframe::ALL, &DeriveOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::NoData { symbol, .. } if symbol == "ZZZ"));
    }
}
