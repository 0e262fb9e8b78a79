use fraud_analysis_pipeline::{
    api::{start_server, ApiState},
    completion::client_from_config,
    store::CsvTransactionStore,
    Analyzer, AppConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    info!("Fraud Analysis Pipeline - API Server");
    info!("Port: {}", config.server.port);
    info!("Data file: {}", config.store.data_file.display());

    let store = CsvTransactionStore::open(&config.store.data_file)?;
    let client = client_from_config(&config.completion)?;
    info!(
        max_attempts = client.policy().max_attempts,
        attempt_timeout_ms = config.completion.request_timeout.as_millis() as u64,
        "Completion client ready"
    );

    let analyzer = Arc::new(Analyzer::new(Arc::new(store), client, &config.pipeline));
    info!(model = %analyzer.model(), "Analyzer initialized");

    let state = ApiState {
        analyzer,
        completion_configured: config.completion.is_configured(),
    };

    start_server(state, config.server.port).await?;

    Ok(())
}
