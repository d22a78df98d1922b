use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    /// Not enough price or news history for a symbol. Recoverable: skip the
    /// symbol and continue the batch.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// External source unreachable or failed after retries.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// External source was reachable but returned garbage. Never silently
    /// converted into a fallback reading.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Feature engineering produced a degenerate training set. Fatal for the
    /// training run; no performance record may be written.
    #[error("Feature engineering error: {0}")]
    FeatureEngineering(String),

    /// A required table is absent. Configuration bug, fatal at startup.
    #[error("Schema missing: {0}")]
    SchemaMissing(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Model file error: {0}")]
    ModelIo(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SignalError {
    /// Whether a single-symbol failure should abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SignalError::SchemaMissing(_) | SignalError::Database(_) | SignalError::Config(_)
        )
    }
}
