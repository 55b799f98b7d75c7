use basket_quant::config::toml_config::{CompressionConfig, TomlConfig};
use basket_quant::core::{ConfigProvider, Pipeline, PriceRecord};
use basket_quant::utils::{logger, validation::Validate};
use basket_quant::{EtlEngine, LocalStorage, QuantPipeline};
use clap::Parser;
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "toml-quant")]
#[command(about = "Run the quant pipeline from a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "quant-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the data directory from config
    #[arg(long)]
    data_dir: Option<String>,

    /// Bundle the tables into this ZIP file, overriding config
    #[arg(long)]
    archive: Option<String>,

    /// Dry run - parse the input and report what would be computed
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 載入 TOML 配置
    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    logger::init_logger(args.verbose || config.verbose_logging(), config.json_logs());
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    // 應用命令列覆蓋設定
    if let Some(data_dir) = &args.data_dir {
        config.source.data_dir = data_dir.clone();
        tracing::info!("🔧 Data directory overridden to: {}", data_dir);
    }
    if let Some(archive) = &args.archive {
        config.load.compression = Some(CompressionConfig {
            enabled: true,
            filename: archive.clone(),
        });
        tracing::info!("🔧 Archive overridden to: {}", archive);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config, &args);

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    let storage = LocalStorage::new(config.data_dir().to_string());
    let pipeline = QuantPipeline::new(storage, config);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No tables will be written");
        match pipeline.extract().await {
            Ok(records) => perform_dry_run(pipeline.config(), &records),
            Err(e) => {
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 建議: {}", e.recovery_suggestion());
                std::process::exit(e.severity().exit_code());
            }
        }
        return Ok(());
    }

    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            println!("✅ Pipeline completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Pipeline failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.severity().exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("-")
    );
    println!("  Input: {}/{}", config.data_dir(), config.input_file());
    let analysis = config.analysis();
    println!(
        "  MA window: {}  Trading days: {}  Stake: {}  Strong threshold: ±{}%",
        analysis.ma_window,
        analysis.trading_days,
        analysis.initial_investment,
        analysis.strong_threshold
    );
    println!("  Outputs: {}", config.output_files().all().join(", "));
    if let Some(archive) = config.archive_name() {
        println!("  Archive: {} (ZIP)", archive);
    }
    if !config.basket().is_empty() {
        println!(
            "  Basket: {} tickers in {} sectors",
            config.basket_size(),
            config.basket().len()
        );
    }
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

fn perform_dry_run(config: &TomlConfig, records: &[PriceRecord]) {
    let mut sessions: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        *sessions.entry(r.ticker.as_str()).or_default() += 1;
    }
    let first = records.iter().map(|r| r.date).min();
    let last = records.iter().map(|r| r.date).max();

    println!("🔍 Dry Run Analysis:");
    println!("  Rows: {}  Tickers: {}", records.len(), sessions.len());
    if let (Some(first), Some(last)) = (first, last) {
        println!("  Sessions from {} to {}", first, last);
    }

    let window = config.analysis().ma_window;
    for (ticker, count) in &sessions {
        let note = if *count < window {
            format!("  ⚠️ fewer than {} sessions, no moving average", window)
        } else {
            String::new()
        };
        println!("  {:<14} {:>6} sessions{}", ticker, count, note);
    }

    println!();
    println!("✅ Dry run analysis complete.");
}
