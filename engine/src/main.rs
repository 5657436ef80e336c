use anyhow::{Context, Result};
use clap::Parser;
use lattice_client::{Candidate, Notifier, Resolver};
use lattice_engine::config::Config;
use lattice_engine::{Command, EngineEvent, Metrics, Replica, SyncEngine};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless replica of a remote grid ledger: bootstraps every stage, then
/// follows the per-stage notification feeds and logs what changes.
#[derive(Parser)]
#[command(name = "lattice", version)]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter when RUST_LOG is unset, e.g. `info` or
    /// `lattice_engine=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("could not load config {}", args.config.display()))?;

    let candidates = config
        .read_endpoints
        .iter()
        .map(|endpoint| Candidate::new(&endpoint.name, &endpoint.url))
        .collect::<lattice_client::Result<Vec<_>>>()
        .context("invalid read endpoint")?;
    let resolver =
        Resolver::new(candidates, config.probe_timeout()).context("could not build resolver")?;
    let notifier =
        Notifier::new(&config.notifications_url).context("invalid notifications url")?;

    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);
    let replica = Replica::new();
    let (engine, commands, mut events) = SyncEngine::new(
        resolver,
        notifier,
        config.stages.clone(),
        replica.clone(),
        metrics,
    );
    let engine_task = tokio::spawn(engine.run());
    info!(stages = config.stages.len(), "sync engine started");

    // SIGUSR1 dumps the metrics registry to the log (no scrape endpoint in
    // the headless binary).
    let mut dump_signal =
        signal(SignalKind::user_defined1()).context("could not listen for SIGUSR1")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("could not listen for shutdown signal")?;
                info!("interrupt received, shutting down");
                let _ = commands.send(Command::Shutdown).await;
                break;
            }
            _ = dump_signal.recv() => {
                dump_metrics(&registry);
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                log_event(event);
            }
        }
    }

    engine_task.await.context("sync engine task failed")?;
    Ok(())
}

fn dump_metrics(registry: &Registry) {
    let mut buffer = String::new();
    match encode(&mut buffer, registry) {
        Ok(()) => info!("metrics dump:\n{buffer}"),
        Err(err) => warn!(error = %err, "could not encode metrics"),
    }
}

fn log_event(event: EngineEvent) {
    match event {
        EngineEvent::Progress {
            epoch,
            stage,
            percent,
            ..
        } => info!(epoch, stage, percent, "bootstrap progress"),
        EngineEvent::BootstrapComplete { snapshot } => {
            let enabled = snapshot.stages.iter().filter(|stage| stage.enabled).count();
            info!(
                stages = snapshot.stages.len(),
                enabled, "bootstrap complete"
            );
        }
        EngineEvent::BootstrapFailed { reason } => {
            warn!(reason = reason.as_str(), "bootstrap failed, will retry on refresh");
        }
        EngineEvent::Live => info!("replica live"),
        EngineEvent::LiveDegraded { reason } => {
            warn!(reason = reason.as_str(), "replica live without notifications");
        }
        EngineEvent::CellUpdated {
            stage,
            row,
            col,
            buyer,
            count,
            total_value,
            ..
        } => info!(
            stage,
            row,
            col,
            buyer = buyer.as_str(),
            count,
            ?total_value,
            "cell updated"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_encode_to_text() {
        let mut registry = Registry::default();
        let metrics = Metrics::register(&mut registry);
        metrics.bootstraps.inc();
        metrics.live.set(1);

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("bootstraps_total 1"), "got:\n{buffer}");
        assert!(buffer.contains("live 1"), "got:\n{buffer}");
    }
}
