//! Bulk command handler

use anyhow::{Context, Result};
use colored::*;
use serde_json::json;
use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{BulkCommands, RunArgs};
use crate::api::bulk::{BulkError, BulkExecutor, OutcomeReporter};
use crate::api::{DataverseClient, Operation, OperationResult, Operations, ResilienceConfig};

/// Handle the bulk command
pub async fn handle_bulk_command(command: BulkCommands) -> Result<()> {
    match command {
        BulkCommands::Run(args) => run(args).await,
    }
}

/// Identifies one operation from the input file in console output and
/// reports.
#[derive(Debug, Clone)]
struct ItemLabel {
    /// 1-based position in the operations file
    index: usize,
    kind: &'static str,
    entity: String,
}

impl fmt::Display for ItemLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.index, self.kind, self.entity)
    }
}

/// Prints outcomes as they arrive and collects rows for the JSON report.
struct RunReporter {
    rows: Vec<serde_json::Value>,
}

impl OutcomeReporter<ItemLabel> for RunReporter {
    fn report_success(&mut self, item: ItemLabel, result: OperationResult) {
        println!("{} {}", "ok".green().bold(), item);
        self.rows.push(json!({
            "item": item.to_string(),
            "success": true,
            "status_code": result.status_code,
            "data": result.data,
        }));
    }

    fn report_failure(&mut self, item: ItemLabel, error: BulkError) {
        let tag = if error.is_cancelled() {
            "cancelled".yellow().bold()
        } else {
            "failed".red().bold()
        };
        println!("{} {}: {}", tag, item, error);
        self.rows.push(json!({
            "item": item.to_string(),
            "success": false,
            "cancelled": error.is_cancelled(),
            "attempts": error.attempts(),
            "error": error.to_string(),
        }));
    }
}

async fn run(args: RunArgs) -> Result<()> {
    // Handle --no-color flag
    if args.no_color {
        colored::control::set_override(false);
    }

    if !args.file.exists() {
        anyhow::bail!("Operations file does not exist: {}", args.file.display());
    }
    let content = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read operations file: {}", args.file.display()))?;
    let operations: Operations = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse operations file: {}", args.file.display()))?;
    if operations.is_empty() {
        anyhow::bail!("Operations file is empty: {}", args.file.display());
    }

    let token = std::env::var(&args.token_env).with_context(|| {
        format!(
            "No access token in ${}; export one or point --token-env at the right variable",
            args.token_env
        )
    })?;

    let client = DataverseClient::new(&args.url, token)?;
    let config = ResilienceConfig::builder()
        .max_retries(args.max_retries)
        .initial_backoff(Duration::from_millis(args.initial_backoff_ms))
        .max_batch_size(args.batch_size as usize)
        .max_concurrent_batches(args.concurrency as usize)
        .batch_timeout(Duration::from_secs(args.timeout_secs))
        .build();

    let items: Vec<(ItemLabel, Operation)> = operations
        .into_iter()
        .enumerate()
        .map(|(index, operation)| {
            let label = ItemLabel {
                index: index + 1,
                kind: operation.operation_type(),
                entity: operation.entity().to_string(),
            };
            (label, operation)
        })
        .collect();

    println!(
        "Executing {} operation(s) against {}",
        items.len(),
        args.url.bright_green().bold()
    );

    // Ctrl-C stops new submissions; in-flight batches finish demultiplexing.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received; finishing in-flight batches");
                cancel.cancel();
            }
        });
    }

    let started = Instant::now();
    let executor = BulkExecutor::new(Arc::new(client), config);
    let mut reporter = RunReporter { rows: Vec::new() };
    let summary = executor.run(items, &mut reporter, cancel).await;
    let elapsed = started.elapsed();

    println!();
    println!(
        "{} succeeded, {} failed, {} cancelled in {:.1}s ({} batch call(s), {} retries)",
        summary.succeeded.to_string().green().bold(),
        summary.failed.to_string().red().bold(),
        summary.cancelled.to_string().yellow().bold(),
        elapsed.as_secs_f64(),
        summary.batches,
        summary.retries,
    );

    if let Some(path) = args.output {
        let report = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "environment": args.url,
            "summary": summary,
            "results": reporter.rows,
        });
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        println!(
            "Report saved to: {}",
            path.display().to_string().bright_green()
        );
    }

    let unsuccessful = summary.failed + summary.cancelled;
    if unsuccessful > 0 {
        anyhow::bail!("{unsuccessful} operation(s) did not complete successfully");
    }
    Ok(())
}
