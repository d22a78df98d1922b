use signal_core::SignalError;
use sqlx::SqlitePool;

/// Tables every writer assumes exist. A missing table is a deployment bug
/// surfaced at startup, not a runtime condition to catch and ignore.
pub const REQUIRED_TABLES: &[&str] = &[
    "sentiment_analysis",
    "news",
    "trading_signals",
    "trading_predictions",
    "model_performance",
    "trading_outcomes",
];

const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sentiment_analysis (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        sentiment_score REAL NOT NULL,
        confidence REAL NOT NULL,
        news_count INTEGER NOT NULL,
        source TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        title TEXT NOT NULL,
        summary TEXT,
        url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS trading_signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        combined_score REAL NOT NULL,
        action TEXT NOT NULL,
        strength TEXT NOT NULL,
        confidence REAL NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trading_predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        signal TEXT NOT NULL,
        confidence REAL NOT NULL,
        sentiment_score REAL NOT NULL,
        pattern_strength REAL NOT NULL,
        price_at_prediction REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        price_change_percent REAL,
        outcome_timestamp TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_predictions_symbol_time
        ON trading_predictions(symbol, timestamp)",
    "CREATE TABLE IF NOT EXISTS model_performance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        model_version TEXT NOT NULL,
        training_samples INTEGER NOT NULL,
        training_accuracy REAL NOT NULL,
        validation_accuracy REAL NOT NULL,
        cross_validation_score REAL NOT NULL,
        feature_count INTEGER NOT NULL,
        timestamp TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trading_outcomes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prediction_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        price_change_percent REAL NOT NULL,
        profitable INTEGER NOT NULL,
        timestamp TEXT NOT NULL
    )",
];

pub(crate) async fn migrate(pool: &SqlitePool) -> Result<(), SignalError> {
    for stmt in SCHEMA_SQL {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;
    }
    Ok(())
}

pub(crate) async fn verify(pool: &SqlitePool) -> Result<(), SignalError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;

    let present: std::collections::HashSet<&str> =
        rows.iter().map(|(name,)| name.as_str()).collect();

    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|t| !present.contains(t))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SignalError::SchemaMissing(missing.join(", ")))
    }
}
