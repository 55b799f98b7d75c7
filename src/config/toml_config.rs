use crate::core::{AnalysisSettings, ConfigProvider, OutputFiles};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_finite_positive, validate_non_empty_string, validate_path,
    validate_positive_number, validate_range, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
    /// Sector -> tickers. Rows for other tickers are dropped when set.
    #[serde(default)]
    pub basket: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub data_dir: String,
    pub input: String,
    pub price_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default)]
    pub filenames: OutputFiles,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validate_path("source.data_dir", &self.source.data_dir)?;
        validate_path("source.input", &self.source.input)?;
        validate_file_extensions(
            "source.input",
            std::slice::from_ref(&self.source.input),
            &["csv"],
        )?;
        if let Some(columns) = &self.source.price_columns {
            for column in columns {
                validate_non_empty_string("source.price_columns", column)?;
            }
        }

        validate_positive_number("analysis.ma_window", self.analysis.ma_window, 1)?;
        validate_positive_number(
            "analysis.trading_days",
            self.analysis.trading_days as usize,
            1,
        )?;
        validate_finite_positive("analysis.initial_investment", self.analysis.initial_investment)?;
        validate_range("analysis.strong_threshold", self.analysis.strong_threshold, 0.0, 100.0)?;

        let filenames: Vec<String> = self
            .load
            .filenames
            .all()
            .iter()
            .map(|f| f.to_string())
            .collect();
        validate_file_extensions("load.filenames", &filenames, &["csv"])?;
        if filenames.iter().collect::<BTreeSet<_>>().len() != filenames.len() {
            return Err(EtlError::ConfigValidationError {
                field: "load.filenames".to_string(),
                message: "Output file names must be distinct".to_string(),
            });
        }
        if let Some(compression) = &self.load.compression {
            validate_file_extensions(
                "load.compression.filename",
                std::slice::from_ref(&compression.filename),
                &["zip"],
            )?;
        }

        let mut seen = BTreeSet::new();
        for (sector, tickers) in &self.basket {
            if tickers.is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: format!("basket.{}", sector),
                    value: "[]".to_string(),
                    reason: "Sector must list at least one ticker".to_string(),
                });
            }
            for ticker in tickers {
                validate_non_empty_string(&format!("basket.{}", sector), ticker)?;
                if !seen.insert(ticker.as_str()) {
                    return Err(EtlError::InvalidConfigValueError {
                        field: format!("basket.{}", sector),
                        value: ticker.clone(),
                        reason: "Ticker is listed in more than one sector".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// 取得資料目錄
    pub fn data_dir(&self) -> &str {
        &self.source.data_dir
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }

    pub fn verbose_logging(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_level.as_deref())
            .is_some_and(|level| level.eq_ignore_ascii_case("debug") || level.eq_ignore_ascii_case("trace"))
    }

    pub fn basket_size(&self) -> usize {
        self.basket.values().map(Vec::len).sum()
    }
}

impl ConfigProvider for TomlConfig {
    fn input_file(&self) -> &str {
        &self.source.input
    }

    fn output_path(&self) -> &str {
        &self.source.data_dir
    }

    fn price_columns(&self) -> &[String] {
        // 未設定時由讀取器使用預設別名
        self.source.price_columns.as_deref().unwrap_or(&[])
    }

    fn analysis(&self) -> AnalysisSettings {
        self.analysis
    }

    fn output_files(&self) -> &OutputFiles {
        &self.load.filenames
    }

    fn archive_name(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }

    fn basket(&self) -> &BTreeMap<String, Vec<String>> {
        &self.basket
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
