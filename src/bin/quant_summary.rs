use anyhow::Context;
use basket_quant::core::summary::{build_summary, render_text, PublishedTables, SummaryFilter};
use basket_quant::core::{ConfigProvider, OutputFiles, Trend};
use basket_quant::utils::logger;
use basket_quant::{LocalStorage, TomlConfig};
use clap::Parser;
use std::collections::BTreeSet;

#[derive(Parser)]
#[command(name = "quant-summary")]
#[command(about = "Print the market overview from the published quant tables")]
struct Args {
    /// Directory holding the derived tables
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Take data directory and file names from a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Keep only these sectors in the risk table
    #[arg(long, value_delimiter = ',')]
    sector: Vec<String>,

    /// Keep only these trend labels, e.g. "Strong Bullish,Weak Bullish"
    #[arg(long, value_delimiter = ',')]
    trend: Vec<Trend>,

    /// Number of top momentum tickers in the growth section (3-10)
    #[arg(long, default_value_t = 5)]
    top_n: usize,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let (data_dir, files) = match &args.config {
        Some(path) => {
            let config = TomlConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path))?;
            (config.data_dir().to_string(), config.output_files().clone())
        }
        None => (args.data_dir.clone(), OutputFiles::default()),
    };

    let storage = LocalStorage::new(data_dir.clone());
    let tables = match PublishedTables::load(&storage, &files).await {
        Ok(tables) => tables,
        Err(e) => {
            eprintln!("❌ Unable to load data. Please run the pipeline.");
            eprintln!("💡 {}", e.user_friendly_message());
            std::process::exit(e.severity().exit_code().max(1));
        }
    };
    tracing::debug!(
        "Loaded {} signals, {} risk rows, {} growth rows from {}",
        tables.signals.len(),
        tables.risk.len(),
        tables.growth.len(),
        data_dir
    );

    let filter = SummaryFilter {
        sectors: (!args.sector.is_empty()).then(|| args.sector.iter().cloned().collect()),
        trends: (!args.trend.is_empty()).then(|| args.trend.iter().copied().collect::<BTreeSet<_>>()),
        top_n: args.top_n,
    };
    if filter.top_n() != args.top_n {
        tracing::warn!("--top-n {} clamped to {}", args.top_n, filter.top_n());
    }

    let summary = build_summary(&tables, &filter);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_text(&summary));
    }

    Ok(())
}
