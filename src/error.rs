// Error taxonomy shared by every pipeline stage.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadScoreError {
    /// A required raw column is absent or one of its cells cannot be parsed.
    #[error("schema error: {0}")]
    Schema(String),

    /// The preprocessing transform could not be fit or applied.
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    /// The weak labels cannot support a stratified train/test split.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A candidate classifier failed to fit.
    #[error("model training error: {0}")]
    ModelTraining(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, LeadScoreError>;
