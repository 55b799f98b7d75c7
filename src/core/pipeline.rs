use crate::core::analytics;
use crate::core::tables::{correlation_to_csv, read_price_table, to_csv};
use crate::core::{AnalysisResult, ConfigProvider, Pipeline, PriceRecord, Storage};
use crate::utils::error::{EtlError, Result};
use std::collections::BTreeSet;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Reads the raw price table, derives the four tables and writes them next to it.
pub struct QuantPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> QuantPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn input_location(&self) -> String {
        format!("{}/{}", self.config.output_path(), self.config.input_file())
    }

    /// Drops tickers outside the configured basket and reports basket
    /// tickers that have no rows at all.
    fn apply_basket(&self, records: Vec<PriceRecord>) -> Vec<PriceRecord> {
        let basket = self.config.basket();
        if basket.is_empty() {
            return records;
        }

        let allowed: BTreeSet<&str> = basket.values().flatten().map(String::as_str).collect();
        let before = records.len();
        let kept: Vec<PriceRecord> = records
            .into_iter()
            .filter(|r| allowed.contains(r.ticker.as_str()))
            .collect();
        if kept.len() < before {
            tracing::warn!(
                "Dropped {} rows for tickers outside the configured basket",
                before - kept.len()
            );
        }

        let present: BTreeSet<&str> = kept.iter().map(|r| r.ticker.as_str()).collect();
        for (sector, tickers) in basket {
            for ticker in tickers.iter().filter(|t| !present.contains(t.as_str())) {
                tracing::warn!("No price data for {} ({})", ticker, sector);
            }
        }

        kept
    }

    fn bundle(&self, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default())?;
            zip.write_all(data)?;
        }
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for QuantPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<PriceRecord>> {
        let location = self.input_location();
        tracing::debug!("Reading raw prices from: {}", location);

        let data = match self.storage.read_file(self.config.input_file()).await {
            Ok(data) => data,
            Err(EtlError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EtlError::DataUnavailable {
                    path: location,
                    reason: "file not found".to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(EtlError::DataUnavailable {
                path: location,
                reason: "file is empty".to_string(),
            });
        }

        let records = read_price_table(&data, self.config.price_columns())?;
        let records = self.apply_basket(records);
        if records.is_empty() {
            return Err(EtlError::DataUnavailable {
                path: location,
                reason: "no price rows".to_string(),
            });
        }

        tracing::debug!("Parsed {} price rows", records.len());
        Ok(records)
    }

    async fn transform(&self, data: Vec<PriceRecord>) -> Result<AnalysisResult> {
        if data.is_empty() {
            return Err(EtlError::DataUnavailable {
                path: self.input_location(),
                reason: "no price rows".to_string(),
            });
        }

        let settings = self.config.analysis();
        let result = analytics::analyze(data, &settings)?;

        tracing::debug!(
            "Derived {} risk rows, {} signals, {} growth rows, {}x{} correlation matrix",
            result.risk.len(),
            result.signals.len(),
            result.growth.len(),
            result.correlation.len(),
            result.correlation.len()
        );
        Ok(result)
    }

    async fn load(&self, result: AnalysisResult) -> Result<String> {
        let names = self.config.output_files();
        let risk = to_csv(&result.risk)?;
        let signals = to_csv(&result.signals)?;
        let growth = to_csv(&result.growth)?;
        let correlation = correlation_to_csv(&result.correlation)?;

        let files: [(&str, &[u8]); 4] = [
            (names.risk.as_str(), risk.as_slice()),
            (names.signals.as_str(), signals.as_slice()),
            (names.growth.as_str(), growth.as_slice()),
            (names.correlation.as_str(), correlation.as_slice()),
        ];

        for (name, data) in &files {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            self.storage.write_file(name, data).await?;
            tracing::info!("✅ {} saved", name);
        }

        if let Some(archive) = self.config.archive_name() {
            let zip_data = self.bundle(&files)?;
            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(archive, &zip_data).await?;
            return Ok(format!("{}/{}", self.config.output_path(), archive));
        }

        Ok(self.config.output_path().to_string())
    }
}
