pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
pub use config::toml_config::TomlConfig;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{analytics::analyze, etl::EtlEngine, pipeline::QuantPipeline};
pub use utils::error::{EtlError, Result};
