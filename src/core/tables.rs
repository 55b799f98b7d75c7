//! CSV encoding of the raw price table and the four derived tables.

use crate::domain::model::{CorrelationMatrix, PriceRecord};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_PRICE_COLUMNS: [&str; 3] = ["Price", "Close", "Adj Close"];

const DATE_COLUMN: &str = "Date";
const TICKER_COLUMN: &str = "Ticker";
const SECTOR_COLUMN: &str = "Sector";

/// Parses a session date, keeping only the calendar day.
pub fn parse_session_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    None
}

fn parse_price(raw: &str) -> std::result::Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("price '{}' is not a number", raw))?;
    Ok(value.is_finite().then_some(value))
}

fn column_index(headers: &[String], candidates: &[&str]) -> Result<usize> {
    candidates
        .iter()
        .find_map(|c| headers.iter().position(|h| h == c))
        .ok_or_else(|| EtlError::MissingColumn {
            expected: candidates.iter().map(|c| c.to_string()).collect(),
            available: headers.to_vec(),
        })
}

/// Reads the raw table (`Date, Ticker, Sector` plus a price column found
/// under the first matching alias). Other columns are ignored.
pub fn read_price_table(data: &[u8], price_columns: &[String]) -> Result<Vec<PriceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let date_idx = column_index(&headers, &[DATE_COLUMN])?;
    let ticker_idx = column_index(&headers, &[TICKER_COLUMN])?;
    let sector_idx = column_index(&headers, &[SECTOR_COLUMN])?;
    let aliases: Vec<&str> = if price_columns.is_empty() {
        DEFAULT_PRICE_COLUMNS.to_vec()
    } else {
        price_columns.iter().map(String::as_str).collect()
    };
    let price_idx = column_index(&headers, &aliases)?;
    tracing::debug!("Using '{}' as the price column", headers[price_idx]);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |idx: usize| row.get(idx).unwrap_or("");

        let date = parse_session_date(field(date_idx)).ok_or_else(|| EtlError::InvalidRecord {
            line,
            message: format!("cannot parse date '{}'", field(date_idx)),
        })?;

        let ticker = field(ticker_idx);
        if ticker.is_empty() {
            return Err(EtlError::InvalidRecord {
                line,
                message: "ticker is empty".to_string(),
            });
        }

        let price = parse_price(field(price_idx))
            .map_err(|message| EtlError::InvalidRecord { line, message })?;

        records.push(PriceRecord {
            date,
            ticker: ticker.to_string(),
            sector: field(sector_idx).to_string(),
            price,
        });
    }

    Ok(records)
}

/// Serializes rows with a header; missing values become empty cells.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    into_bytes(writer)
}

/// Reads rows written by [`to_csv`]. An empty file yields no rows.
pub fn from_csv<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}

/// `Ticker,<t1>,<t2>,...` header, then one row per ticker.
pub fn correlation_to_csv(matrix: &CorrelationMatrix) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![TICKER_COLUMN.to_string()];
    header.extend(matrix.tickers.iter().cloned());
    writer.write_record(&header)?;

    for (ticker, row) in matrix.tickers.iter().zip(&matrix.values) {
        let mut record = vec![ticker.clone()];
        record.extend(row.iter().map(|v| format_value(*v)));
        writer.write_record(&record)?;
    }

    into_bytes(writer)
}

pub fn correlation_from_csv(data: &[u8]) -> Result<CorrelationMatrix> {
    let mut reader = csv::Reader::from_reader(data);
    let tickers: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();

    let mut values = Vec::with_capacity(tickers.len());
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let parsed = row
            .iter()
            .skip(1)
            .map(|cell| parse_price(cell).map_err(|message| EtlError::InvalidRecord { line, message }))
            .collect::<Result<Vec<_>>>()?;
        values.push(parsed);
    }

    if values.len() != tickers.len() || values.iter().any(|row| row.len() != tickers.len()) {
        return Err(EtlError::ValidationError {
            message: format!(
                "correlation table is not square ({} columns, {} rows)",
                tickers.len(),
                values.len()
            ),
        });
    }

    Ok(CorrelationMatrix { tickers, values })
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.into_inner().map_err(|e| EtlError::IoError(e.into_error()))
}
