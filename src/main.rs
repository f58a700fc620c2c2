use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn};
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use sqlexec::api::{self, SqlEngine};
use sqlexec::config::Config;
use sqlexec::query::BatchResult;
use sqlexec::utils::logging;

#[derive(Parser)]
#[clap(version = "0.1.0", author = "GraphDB Contributors")]
enum Cli {
    /// Read batches from stdin (one per line) and execute them on one session
    Serve {
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Execute a single batch and print the results and counters as JSON
    Query {
        #[clap(short, long)]
        query: String,
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn load_config(path: &str) -> Result<Config> {
    Config::load_or_default(path).map_err(|e| anyhow!("Failed to load config from '{}': {}", path, e))
}

fn batch_to_json(batch: &BatchResult) -> serde_json::Value {
    json!({
        "results": batch.results,
        "error": batch.error.as_ref().map(|failure| json!({
            "index": failure.index,
            "sql": failure.sql,
            "error": failure.to_public_error(),
        })),
    })
}

async fn serve(engine: &SqlEngine) -> Result<()> {
    let session_id = engine.open_session()?;
    let interval_secs = engine.config().metrics.snapshot_interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // 第一次 tick 立即完成
    ticker.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = api::shutdown_signal();
    tokio::pin!(shutdown);

    info!("Serving session {} on stdin", session_id);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Input closed");
                    break;
                };
                let batch = engine.execute(session_id, &line)?;
                if let Some(failure) = &batch.error {
                    warn!("Batch failed: {}", failure.error);
                }
                println!("{}", batch_to_json(&batch));
            }
            _ = ticker.tick(), if interval_secs > 0 => {
                let snapshot = engine.metrics_snapshot();
                info!("Metrics snapshot: {}", serde_json::to_string(&snapshot)?);
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli {
        Cli::Serve { config } => {
            let config = load_config(&config)?;
            logging::init(&config.log).map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

            let engine = SqlEngine::in_memory(config);
            let result = serve(&engine).await;
            engine.shutdown();
            info!("Final metrics: {}", serde_json::to_string(&engine.metrics_snapshot())?);
            logging::shutdown();
            result?;
        }
        Cli::Query { query, config } => {
            let config = load_config(&config)?;
            logging::init(&config.log).map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

            let engine = SqlEngine::in_memory(config);
            let session_id = engine.open_session()?;
            let batch = engine.execute(session_id, &query)?;
            let mut output = batch_to_json(&batch);
            output["metrics"] = serde_json::to_value(engine.metrics_snapshot())?;
            println!("{}", serde_json::to_string_pretty(&output)?);

            engine.shutdown();
            logging::shutdown();
        }
    }

    Ok(())
}
