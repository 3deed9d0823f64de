//! batchdispatch - size-capped batch dispatcher
//!
//! CLI entry point for running simulations and inspecting configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use batchdispatch::cli::{Cli, Command, OutputFormat};
use batchdispatch::config::Config;
use batchdispatch::coordinator::{Coordinator, CoordinatorMetrics};
use batchdispatch::domain::{OwnerId, Request, Requester, RequesterEvent};
use batchdispatch::worker::{ExecutorWorkerFactory, SimulatedExecutor};

/// Byte size charged to every simulated poll
const POLL_BYTES: u64 = 64;

/// Upper bound on how long `bd run` waits for outstanding results
const RUN_TIMEOUT: Duration = Duration::from_secs(120);

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("batchdispatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("bd.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "batchdispatch loaded config: workers={}, max-batch-bytes={}",
        config.coordinator.worker_count, config.coordinator.max_batch_bytes
    );

    match cli.command {
        Some(Command::Run {
            creates,
            polls,
            owners,
            create_bytes,
            cancel,
            workers,
            format,
        }) => {
            let plan = RunPlan {
                creates,
                polls,
                owners,
                create_bytes,
                cancel,
            };
            cmd_run(config, workers, plan, format).await
        }
        Some(Command::Config { format }) => cmd_config(&config, format),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(config)?),
        OutputFormat::Text => {
            println!("batchdispatch Configuration");
            println!("---------------------------");
            println!("worker-count:          {}", config.coordinator.worker_count);
            println!("max-batch-bytes:       {}", config.coordinator.max_batch_bytes);
            println!("channel-buffer:        {}", config.coordinator.channel_buffer);
            println!("max-batch-count:       {}", config.worker.max_batch_count);
            println!("idle-backoff-ms:       {}", config.worker.idle_backoff_ms);
            println!("min-batch-interval-ms: {}", config.worker.min_batch_interval_ms);
        }
    }
    Ok(())
}

/// Request mix submitted by `bd run`
struct RunPlan {
    creates: usize,
    polls: usize,
    owners: usize,
    create_bytes: Option<u64>,
    cancel: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
struct RunSummary {
    submitted: usize,
    completed: usize,
    failed: usize,
    size_exceeded: usize,
    cancelled: u64,
    timed_out: bool,
    metrics: Option<CoordinatorMetrics>,
}

/// Drive a coordinator over simulated workers until every request resolves
async fn cmd_run(mut config: Config, workers: Option<usize>, plan: RunPlan, format: OutputFormat) -> Result<()> {
    if let Some(workers) = workers {
        config.coordinator.worker_count = workers;
    }
    config.validate().context("Invalid configuration")?;

    let executor = Arc::new(SimulatedExecutor::new(&config.simulation));
    let factory = Arc::new(ExecutorWorkerFactory::new(executor, config.worker.clone()));
    let coordinator = Coordinator::new(config.coordinator.clone(), factory)?;
    let handle = coordinator.handle();
    let task = tokio::spawn(coordinator.run());

    let (requester, mut events) = Requester::channel("bd-run");
    let owners = plan.owners.max(1);
    let mut summary = RunSummary::default();

    for i in 0..plan.creates.max(plan.polls) {
        let owner = format!("owner-{}", i % owners);
        if i < plan.creates {
            let payload = json!({"owner": owner, "sequence": i});
            let request = match plan.create_bytes {
                Some(bytes) => Request::create(owner.as_str(), requester.clone(), payload, bytes),
                None => Request::create_from_payload(owner.as_str(), requester.clone(), payload),
            };
            handle.submit(request).await?;
            summary.submitted += 1;
        }
        if i < plan.polls {
            let job_id = format!("job-{}", i);
            handle
                .submit(Request::poll(owner.as_str(), requester.clone(), job_id, POLL_BYTES))
                .await?;
            summary.submitted += 1;
        }
    }
    drop(requester);
    info!(submitted = summary.submitted, "Submitted simulated requests");

    if let Some(owner) = &plan.cancel {
        handle.cancel_owner(&OwnerId::from(owner.as_str())).await?;
    }
    summary.cancelled = handle.metrics().await?.cancelled_requests;

    let expected = summary.submitted.saturating_sub(summary.cancelled as usize);
    let collect = async {
        let mut received = 0;
        while received < expected {
            let Some(event) = events.recv().await else {
                break;
            };
            received += 1;
            match event {
                RequesterEvent::Completed { .. } => summary.completed += 1,
                RequesterEvent::Failed { .. } => summary.failed += 1,
                RequesterEvent::SizeExceeded { .. } => summary.size_exceeded += 1,
            }
        }
    };
    if tokio::time::timeout(RUN_TIMEOUT, collect).await.is_err() {
        warn!(expected, "Timed out waiting for request outcomes");
        summary.timed_out = true;
    }

    summary.metrics = Some(handle.metrics().await?);
    handle.shutdown().await?;
    task.await.context("Coordinator task failed")?;

    print_summary(&summary, format)
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(summary)?),
        OutputFormat::Text => {
            println!("{}", "batchdispatch run".bold());
            println!("-----------------");
            println!("Submitted:     {}", summary.submitted);
            println!("Completed:     {}", summary.completed.to_string().green());
            println!("Failed:        {}", summary.failed.to_string().red());
            println!("Size exceeded: {}", summary.size_exceeded.to_string().yellow());
            println!("Cancelled:     {}", summary.cancelled.to_string().yellow());
            if let Some(metrics) = &summary.metrics {
                println!();
                println!("Batches dispatched:  {}", metrics.batches_dispatched);
                println!("Requests dispatched: {}", metrics.requests_dispatched);
                println!("Requeued requests:   {}", metrics.requeued_requests);
                println!("Worker restarts:     {}", metrics.worker_restarts);
                println!("Empty pulls:         {}", metrics.empty_pulls);
            }
            if summary.timed_out {
                println!();
                println!("{}", "Timed out before every request resolved".red().bold());
            }
        }
    }
    Ok(())
}
