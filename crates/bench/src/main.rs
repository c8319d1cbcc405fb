mod cli;
mod workloads;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use batchflow_core::{load_dotenv, EngineConfig};
use batchflow_engine::TaskSystem;

use crate::cli::CliArgs;

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => EngineConfig::from_env().context("invalid engine environment")?,
    };
    if let Some(workers) = args.workers {
        config.worker_threads = workers;
    }
    config.log_summary();

    let engine = TaskSystem::with_config(config).context("failed to start engine")?;
    info!(engine = engine.name(), workers = engine.workers(), "engine ready");

    let mut failed = 0usize;
    for workload in args.workload.expand() {
        let mut best: Option<workloads::Report> = None;
        for _ in 0..args.repeat.max(1) {
            let report = workloads::run(&engine, workload, args.size)?;
            if !report.ok {
                error!(workload = report.workload, "output check failed");
                failed += 1;
            }
            if best.as_ref().map_or(true, |b| report.elapsed_ms < b.elapsed_ms) {
                best = Some(report);
            }
        }
        if let Some(report) = best {
            println!(
                "{:<11} units={:<8} best={:>9.3} ms  checksum={}",
                report.workload, report.units, report.elapsed_ms, report.checksum
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&engine.metrics())?);
    }

    engine.shutdown();
    if failed > 0 {
        anyhow::bail!("{failed} workload run(s) produced wrong output");
    }
    Ok(())
}
