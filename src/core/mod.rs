pub mod analytics;
pub mod etl;
pub mod pipeline;
pub mod stats;
pub mod summary;
pub mod tables;

pub use crate::domain::model::{
    AnalysisResult, AnalysisSettings, CorrelationMatrix, GrowthRecord, OutputFiles, PriceRecord,
    RiskRecord, SignalRecord, Trend,
};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
