use clap::Parser;
use fraud_analysis_pipeline::{
    completion::client_from_config,
    store::{CsvTransactionStore, TransactionStore},
    AnalysisError, Analyzer, AppConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "analyze",
    version,
    about = "Summarise a customer's transactions for a fraud investigator"
)]
struct Cli {
    /// Customer identifier to analyse
    #[arg(required_unless_present = "list")]
    customer_id: Option<String>,

    /// Extra analyst notes to include in the prompt
    #[arg(short = 'c', long = "context")]
    context: Option<String>,

    /// Transaction CSV file (overrides DATA_FILE_PATH)
    #[arg(short = 'd', long = "data")]
    data: Option<PathBuf>,

    /// List known customers and exit
    #[arg(long = "list")]
    list: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,fraud_analysis_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {}", e.kind(), e);
            if let Some(raw) = e.raw_response() {
                eprintln!("--- raw completion ---\n{}", raw);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AnalysisError> {
    let mut config = AppConfig::from_env()?;
    if let Some(data) = cli.data {
        config.store.data_file = data;
    }

    let store = CsvTransactionStore::open(&config.store.data_file)?;

    if cli.list {
        for customer in store.customers().await? {
            println!("{}", customer);
        }
        return Ok(());
    }

    let client = client_from_config(&config.completion)?;
    info!(model = %client.model(), data = %config.store.data_file.display(), "Analyzer ready");

    let analyzer = Analyzer::new(Arc::new(store), client, &config.pipeline);

    // Ctrl-C abandons the in-flight request.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let customer_id = cli.customer_id.unwrap_or_default();
    let result = analyzer
        .analyze_with_context(&customer_id, cli.context.as_deref(), &cancel)
        .await?;

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("cannot encode result: {}", e),
    }

    Ok(())
}
