//! Scheduled entry points for the ASX signal pipeline.
//!
//! `run-morning` fetches data and emits signals before the session opens;
//! `run-evening` settles outcomes and retrains the outcome model after close.
//! Both are designed to be driven by cron and to be safe to re-run.

mod evening;
mod lock;
mod morning;

use std::path::PathBuf;

use anyhow::bail;
use signal_core::{SignalConfig, SignalError};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Big-four banks plus the major regionals, the default coverage universe.
const DEFAULT_SYMBOLS: &[&str] = &[
    "CBA.AX", "WBC.AX", "ANZ.AX", "NAB.AX", "MQG.AX", "BEN.AX", "BOQ.AX", "SUN.AX",
];

#[derive(Debug)]
pub struct PipelineOptions {
    pub symbols: Vec<String>,
    pub db_path: String,
    pub news_url: Option<String>,
    pub model_path: PathBuf,
    pub lock_dir: PathBuf,
    pub dry_run: bool,
}

impl PipelineOptions {
    /// Parse options from CLI args on top of environment defaults. The env
    /// lookup is injected so tests stay hermetic regardless of what the host
    /// has exported.
    fn from_args(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SignalError> {
        let mut symbols: Option<Vec<String>> =
            env("SIGNALS_SYMBOLS").map(|s| split_symbols(&s));
        let mut db_path = env("SIGNALS_DB").unwrap_or_else(|| "signals.db".to_string());
        let mut news_url = env("NEWS_FEED_URL");
        let mut model_path = PathBuf::from(
            env("SIGNALS_MODEL").unwrap_or_else(|| "outcome_model.json".to_string()),
        );
        let mut dry_run = false;

        let missing = |flag: &str, what: &str| {
            SignalError::Config(format!("{flag} needs {what}"))
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--symbols" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| missing("--symbols", "a comma-separated list"))?;
                    symbols = Some(split_symbols(value));
                }
                "--db" => {
                    db_path = iter.next().ok_or_else(|| missing("--db", "a path"))?.clone();
                }
                "--news-url" => {
                    news_url =
                        Some(iter.next().ok_or_else(|| missing("--news-url", "a URL"))?.clone());
                }
                "--model" => {
                    model_path =
                        PathBuf::from(iter.next().ok_or_else(|| missing("--model", "a path"))?);
                }
                "--dry-run" => dry_run = true,
                other => {
                    return Err(SignalError::Config(format!("unknown option '{other}'")));
                }
            }
        }

        let symbols = symbols
            .unwrap_or_else(|| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect());
        if symbols.is_empty() {
            return Err(SignalError::Config("symbol list is empty".to_string()));
        }

        Ok(Self {
            symbols,
            db_path,
            news_url,
            model_path,
            lock_dir: env("SIGNALS_LOCK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            dry_run,
        })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path)
    }

    pub fn lock_path(&self, job: &str) -> PathBuf {
        self.lock_dir.join(format!("signal-pipeline-{job}.lock"))
    }
}

fn split_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn print_usage() {
    eprintln!("Usage: signal-pipeline <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run-morning    fetch data, emit signals and predictions");
    eprintln!("  run-evening    settle outcomes and retrain the outcome model");
    eprintln!("  migrate        create or update the database schema and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --symbols A.AX,B.AX   override the symbol universe");
    eprintln!("  --db PATH             SQLite database path (default signals.db)");
    eprintln!("  --news-url URL        news feed base URL");
    eprintln!("  --model PATH          outcome model JSON path");
    eprintln!("  --dry-run             compute everything, write nothing");
}

async fn migrate(opts: &PipelineOptions) -> anyhow::Result<()> {
    let store = persistence::SignalStore::connect(&opts.db_url(), &SignalConfig::default()).await?;
    store.migrate().await?;
    store.verify_schema().await?;
    Ok(())
}

async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let Some(command) = args.first() else {
        print_usage();
        bail!("missing command");
    };
    let opts = PipelineOptions::from_args(&args[1..], |key| std::env::var(key).ok())?;

    match command.as_str() {
        "run-morning" => morning::run(&opts).await,
        "run-evening" => evening::run(&opts).await,
        "migrate" => migrate(&opts).await,
        other => {
            print_usage();
            bail!("unknown command '{other}'");
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signal_pipeline=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(args: &[&str]) -> PipelineOptions {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        PipelineOptions::from_args(&args, |_| None).unwrap()
    }

    #[test]
    fn test_default_universe() {
        let o = opts(&[]);
        assert_eq!(o.symbols.len(), DEFAULT_SYMBOLS.len());
        assert!(o.symbols.contains(&"CBA.AX".to_string()));
        assert!(!o.dry_run);
    }

    #[test]
    fn test_symbol_override_is_normalized() {
        let o = opts(&["--symbols", "cba.ax, wbc.ax,,"]);
        assert_eq!(o.symbols, vec!["CBA.AX".to_string(), "WBC.AX".to_string()]);
    }

    #[test]
    fn test_db_url_creates_missing_file() {
        let o = opts(&["--db", "/tmp/sig.db", "--dry-run"]);
        assert_eq!(o.db_url(), "sqlite:/tmp/sig.db?mode=rwc");
        assert!(o.dry_run);
    }

    #[test]
    fn test_env_defaults_are_injected() {
        let o = PipelineOptions::from_args(&[], |key| match key {
            "SIGNALS_SYMBOLS" => Some("cba.ax,anz.ax".to_string()),
            "SIGNALS_DB" => Some("/var/lib/signals.db".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(o.symbols, vec!["CBA.AX".to_string(), "ANZ.AX".to_string()]);
        assert_eq!(o.db_path, "/var/lib/signals.db");
    }

    #[test]
    fn test_unknown_option_is_config_error() {
        let args = vec!["--bogus".to_string()];
        let err = PipelineOptions::from_args(&args, |_| None).unwrap_err();
        assert!(matches!(err, SignalError::Config(_)));
    }

    #[test]
    fn test_missing_flag_value_is_config_error() {
        let args = vec!["--db".to_string()];
        let err = PipelineOptions::from_args(&args, |_| None).unwrap_err();
        assert!(matches!(err, SignalError::Config(_)));
    }
}
