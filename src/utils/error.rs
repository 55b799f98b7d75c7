use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Price data unavailable at '{path}': {reason}")]
    DataUnavailable { path: String, reason: String },

    #[error("Missing column, expected one of {expected:?}. Available columns: {available:?}")]
    MissingColumn {
        expected: Vec<String>,
        available: Vec<String>,
    },

    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: u64, message: String },

    #[error("Duplicate session {date} for ticker {ticker}")]
    DuplicateSession { ticker: String, date: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Processing,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 根據錯誤嚴重程度決定退出碼
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,      // 警告，但成功
            ErrorSeverity::Medium => 2,   // 重新執行可解決
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        }
    }
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::DataUnavailable { .. }
            | EtlError::MissingColumn { .. }
            | EtlError::InvalidRecord { .. }
            | EtlError::DuplicateSession { .. }
            | EtlError::CsvError(_) => ErrorCategory::Input,
            EtlError::ValidationError { .. } => ErrorCategory::Processing,
            EtlError::ZipError(_) | EtlError::IoError(_) | EtlError::SerializationError(_) => {
                ErrorCategory::Output
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::ValidationError { .. } => ErrorSeverity::Low,
            EtlError::DataUnavailable { .. } => ErrorSeverity::Medium,
            EtlError::IoError(_) | EtlError::ZipError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::DataUnavailable { path, .. } => {
                format!("Raw price data not found or empty: {}", path)
            }
            EtlError::MissingColumn {
                expected,
                available,
            } => format!(
                "Cannot find a '{}' column. Available columns: {}",
                expected.join("' / '"),
                available.join(", ")
            ),
            EtlError::InvalidRecord { line, message } => {
                format!("Line {} of the price file is invalid: {}", line, message)
            }
            EtlError::DuplicateSession { ticker, date } => {
                format!("{} appears more than once on {}", ticker, date)
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => format!("Configuration problem: {}", self),
            _ => self.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the command-line flags or the TOML configuration file",
            ErrorCategory::Input => match self {
                EtlError::DataUnavailable { .. } => "Run the fetch step first to produce the raw price table",
                EtlError::MissingColumn { .. } => {
                    "Make sure the price file has Date, Ticker, Sector and a Price (or Close / Adj Close) column"
                }
                _ => "Fix the raw price file and re-run the pipeline",
            },
            ErrorCategory::Processing => "Re-run the pipeline to regenerate the published tables",
            ErrorCategory::Output => "Check that the data directory exists and is writable",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
