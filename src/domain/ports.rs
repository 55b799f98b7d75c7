use crate::domain::model::{AnalysisResult, AnalysisSettings, OutputFiles, PriceRecord};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_file(&self) -> &str;
    fn output_path(&self) -> &str;
    fn price_columns(&self) -> &[String];
    fn analysis(&self) -> AnalysisSettings;
    fn output_files(&self) -> &OutputFiles;
    /// File name of the ZIP bundle, when one should be written.
    fn archive_name(&self) -> Option<&str>;
    /// Sector -> tickers. Empty when every ticker in the input is accepted.
    fn basket(&self) -> &BTreeMap<String, Vec<String>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<PriceRecord>>;
    async fn transform(&self, data: Vec<PriceRecord>) -> Result<AnalysisResult>;
    async fn load(&self, result: AnalysisResult) -> Result<String>;
}
