pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_config::CliConfig;

#[cfg(feature = "cli")]
mod cli_config {
    use crate::core::tables::DEFAULT_PRICE_COLUMNS;
    use crate::core::{AnalysisSettings, ConfigProvider, OutputFiles};
    use crate::utils::error::Result;
    use crate::utils::validation::{
        validate_file_extensions, validate_non_empty_string, validate_path, Validate,
    };
    use clap::Parser;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "basket-quant")]
    #[command(about = "Risk, trend signals, growth and correlation for a basket of daily stock prices")]
    pub struct CliConfig {
        /// Directory holding the raw price table and the derived tables
        #[arg(long, default_value = "./data")]
        pub data_dir: String,

        /// Raw price table, relative to the data directory
        #[arg(long, default_value = "nifty50_sectors.csv")]
        pub input: String,

        /// Accepted price column names, first match wins
        #[arg(long, value_delimiter = ',', default_value = "Price,Close,Adj Close")]
        pub price_columns: Vec<String>,

        /// Also bundle the four tables into a ZIP file
        #[arg(long, num_args = 0..=1, default_missing_value = "quant_output.zip")]
        pub archive: Option<String>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log CPU and memory usage per stage")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub log_json: bool,

        #[arg(skip)]
        pub output_files: OutputFiles,

        #[arg(skip)]
        pub basket: BTreeMap<String, Vec<String>>,
    }

    impl CliConfig {
        /// Defaults for the given data directory, as if parsed with no flags.
        pub fn with_data_dir(data_dir: impl Into<String>) -> Self {
            Self {
                data_dir: data_dir.into(),
                input: "nifty50_sectors.csv".to_string(),
                price_columns: DEFAULT_PRICE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                archive: None,
                verbose: false,
                monitor: false,
                log_json: false,
                output_files: OutputFiles::default(),
                basket: BTreeMap::new(),
            }
        }
    }

    impl ConfigProvider for CliConfig {
        fn input_file(&self) -> &str {
            &self.input
        }

        fn output_path(&self) -> &str {
            &self.data_dir
        }

        fn price_columns(&self) -> &[String] {
            &self.price_columns
        }

        fn analysis(&self) -> AnalysisSettings {
            AnalysisSettings::default()
        }

        fn output_files(&self) -> &OutputFiles {
            &self.output_files
        }

        fn archive_name(&self) -> Option<&str> {
            self.archive.as_deref()
        }

        fn basket(&self) -> &BTreeMap<String, Vec<String>> {
            &self.basket
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_path("data_dir", &self.data_dir)?;
            validate_path("input", &self.input)?;
            validate_file_extensions("input", std::slice::from_ref(&self.input), &["csv"])?;
            for column in &self.price_columns {
                validate_non_empty_string("price_columns", column)?;
            }
            if let Some(archive) = &self.archive {
                validate_file_extensions("archive", std::slice::from_ref(archive), &["zip"])?;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults_match_pipeline_layout() {
            let config = CliConfig::parse_from(["basket-quant"]);
            assert_eq!(config.output_path(), "./data");
            assert_eq!(config.input_file(), "nifty50_sectors.csv");
            assert_eq!(config.price_columns(), ["Price", "Close", "Adj Close"]);
            assert_eq!(config.archive_name(), None);
            assert_eq!(config.analysis(), AnalysisSettings::default());
            assert!(config.validate().is_ok());

            let built = CliConfig::with_data_dir("./data");
            assert_eq!(built.price_columns, config.price_columns);
        }

        #[test]
        fn test_archive_flag_default_name() {
            let config = CliConfig::parse_from(["basket-quant", "--archive"]);
            assert_eq!(config.archive_name(), Some("quant_output.zip"));

            let config = CliConfig::parse_from(["basket-quant", "--archive", "run.zip"]);
            assert_eq!(config.archive_name(), Some("run.zip"));
        }

        #[test]
        fn test_validation_rejects_bad_input_name() {
            let config = CliConfig::parse_from(["basket-quant", "--input", "prices.xlsx"]);
            assert!(config.validate().is_err());

            let config = CliConfig::parse_from(["basket-quant", "--archive", "bundle.tar"]);
            assert!(config.validate().is_err());
        }
    }
}
