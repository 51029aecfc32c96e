use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the backfill job
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Usage-event conversion errors
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Usage event {event_id} has fractional cost {cost}")]
    FractionalCost { event_id: i64, cost: String },

    #[error("Usage event {event_id} cost {cost} does not fit a ledger delta")]
    DeltaOverflow { event_id: i64, cost: String },
}

impl From<ConversionError> for AppError {
    fn from(error: ConversionError) -> Self {
        AppError::InvalidInput(error.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
