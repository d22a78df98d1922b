use chrono::{Duration, Utc};
use market_data::QuoteClient;
use outcome_predictor::{outcome_label, training_set_from, OutcomePredictor};
use persistence::SignalStore;
use signal_core::{
    MarketDataProvider, PredictionOutcome, PredictionRecord, SignalConfig, SignalError,
};
use tracing::{info, warn};

use crate::lock::JobLock;
use crate::PipelineOptions;

pub async fn run(opts: &PipelineOptions) -> anyhow::Result<()> {
    let _lock = JobLock::acquire(&opts.lock_path("evening"))?;

    let config = SignalConfig::default();
    let store = SignalStore::connect(&opts.db_url(), &config).await?;
    store.migrate().await?;
    store.verify_schema().await?;

    let market = QuoteClient::new();
    let settled = settle_outcomes(&store, &market, &config, opts.dry_run).await?;
    info!(settled, "outcome settlement complete");

    train_model(&store, &config, opts).await?;
    Ok(())
}

/// Attach realized price moves to predictions past the outcome horizon,
/// returning how many were settled. A symbol whose quote cannot be fetched
/// today stays pending and is picked up by the next evening run.
async fn settle_outcomes(
    store: &SignalStore,
    market: &dyn MarketDataProvider,
    config: &SignalConfig,
    dry_run: bool,
) -> anyhow::Result<usize> {
    let now = Utc::now();
    let cutoff = now - Duration::hours(config.outcome_horizon_hours);
    let due = store.pending_predictions(cutoff).await?;
    info!("{} predictions due for settlement", due.len());

    let mut settled = 0usize;
    for prediction in due {
        let Some(id) = prediction.id else { continue };
        if prediction.price_at_prediction <= 0.0 {
            warn!(
                "{}: prediction {id} has a non-positive entry price, leaving pending",
                prediction.symbol
            );
            continue;
        }

        let price = match market.latest_price(&prediction.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!("{}: quote unavailable ({e}), deferring", prediction.symbol);
                continue;
            }
        };

        let change =
            (price - prediction.price_at_prediction) / prediction.price_at_prediction * 100.0;
        let settled_record = PredictionRecord {
            actual_outcome: Some(PredictionOutcome {
                price_change_percent: change,
                outcome_timestamp: now,
            }),
            ..prediction.clone()
        };
        let profitable = outcome_label(&settled_record).unwrap_or(false);

        if dry_run {
            info!(
                "{}: would settle prediction {id} at {:+.2}% ({})",
                prediction.symbol,
                change,
                if profitable { "profitable" } else { "unprofitable" }
            );
            continue;
        }

        if store
            .complete_outcome(id, &prediction.symbol, change, profitable, now)
            .await?
        {
            settled += 1;
        }
    }

    Ok(settled)
}

/// Retrain the outcome model from all completed predictions. Too little data
/// is a normal early-life condition and just skips training; a feature
/// engineering failure aborts the run.
async fn train_model(
    store: &SignalStore,
    config: &SignalConfig,
    opts: &PipelineOptions,
) -> anyhow::Result<()> {
    let completed = store.completed_predictions().await?;
    let examples = training_set_from(&completed)?;

    let predictor = OutcomePredictor::new(config.min_training_samples);
    let (model, performance) = match predictor.train(&examples) {
        Ok(result) => result,
        Err(SignalError::InsufficientData(msg)) => {
            warn!("skipping training: {msg}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        samples = performance.training_samples,
        train_acc = format!("{:.3}", performance.training_accuracy),
        val_acc = format!("{:.3}", performance.validation_accuracy),
        cv = format!("{:.3}", performance.cross_validation_score),
        "outcome model trained"
    );

    if opts.dry_run {
        info!("dry run, model not saved");
        return Ok(());
    }

    model.save(&opts.model_path)?;
    store.insert_model_performance(&performance).await?;
    info!("model saved to {}", opts.model_path.display());
    Ok(())
}
