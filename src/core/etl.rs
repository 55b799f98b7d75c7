use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting quant pipeline");
        self.monitor.log_stats("Start");

        // Extract
        let raw_data = self.pipeline.extract().await?;
        tracing::info!("✅ Raw data loaded: {} rows", raw_data.len());
        self.monitor.log_stats("Extract");

        // Transform
        let result = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "✅ Derived tables: {} risk, {} signals, {} growth, {} correlated tickers",
            result.risk.len(),
            result.signals.len(),
            result.growth.len(),
            result.correlation.len()
        );
        self.monitor.log_stats("Transform");

        // Load
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("📁 Output saved to: {}", output_path);
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
