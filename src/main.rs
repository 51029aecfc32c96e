mod error;
mod backfill;
mod ledger;
mod bootstrap;
mod config;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::{error, info};

use crate::config::{Cli, Config};
use crate::error::AppResult;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,ledger_backfill=debug,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting credit ledger backfill");

    let result: AppResult<_> = async {
        let config = Config::from_env()?.merge_cli(&cli);
        let options = config.job_options(&cli)?;
        let repository = bootstrap::initialize_repository(&config).await?;
        backfill::run_job(&repository, options).await
    }
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("❌ Backfill failed: {:?}", e);
            Err(e.into())
        }
    }
}
