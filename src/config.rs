use clap::Parser;
use serde::Deserialize;

use crate::backfill::migrator::RunMode;
use crate::backfill::reconciler::{ReconcileScope, DEFAULT_SAMPLE_SIZE};
use crate::backfill::scanner::DEFAULT_PAGE_SIZE;
use crate::backfill::JobOptions;
use crate::error::{AppError, AppResult};

/// Migrate legacy usage events into the credit ledger and spot-check balances
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Write ledger entries (default is a dry run)
    #[arg(long)]
    pub apply: bool,

    /// Usage events fetched per page
    #[arg(long)]
    pub limit: Option<i64>,

    /// Resume the scan after this usage event id
    #[arg(long)]
    pub start_after: Option<i64>,

    /// Number of users to reconcile
    #[arg(long, conflicts_with_all = ["reconcile_all", "skip_reconcile"])]
    pub reconcile_sample: Option<i64>,

    /// Reconcile every user instead of a sample
    #[arg(long, conflicts_with = "skip_reconcile")]
    pub reconcile_all: bool,

    /// Skip the balance check entirely
    #[arg(long)]
    pub skip_reconcile: bool,

    /// Overrides DATABASE_URL
    #[arg(long)]
    pub database_url: Option<String>,
}

/// Settings layered from defaults and the process environment
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    #[serde(default)]
    pub apply: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_reconcile_sample")]
    pub reconcile_sample: i64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_reconcile_sample() -> i64 {
    DEFAULT_SAMPLE_SIZE
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default().try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Apply command-line overrides on top of the environment.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if cli.apply {
            self.apply = true;
        }
        if let Some(limit) = cli.limit {
            self.limit = limit;
        }
        if let Some(sample) = cli.reconcile_sample {
            self.reconcile_sample = sample;
        }
        if let Some(url) = &cli.database_url {
            self.database_url = Some(url.clone());
        }
        self
    }

    pub fn database_url(&self) -> AppResult<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_string()))
    }

    pub fn job_options(&self, cli: &Cli) -> AppResult<JobOptions> {
        if self.limit < 1 {
            return Err(AppError::Config(format!(
                "limit must be at least 1, got {}",
                self.limit
            )));
        }
        if self.reconcile_sample < 0 {
            return Err(AppError::Config(format!(
                "reconcile sample must not be negative, got {}",
                self.reconcile_sample
            )));
        }

        let reconcile = if cli.skip_reconcile {
            ReconcileScope::Skip
        } else if cli.reconcile_all {
            ReconcileScope::All {
                page_size: self.limit,
            }
        } else {
            ReconcileScope::Sample(self.reconcile_sample)
        };

        Ok(JobOptions {
            mode: RunMode::from_apply(self.apply),
            page_size: self.limit,
            start_after: cli.start_after.unwrap_or(0),
            reconcile,
        })
    }
}
