use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metrics_courier::{
    actors::{
        delivery::{DeliveryQueue, RetryPolicy},
        poller::PollerHandle,
    },
    config::{Config, read_config_file, resolve_config_path},
    envelope::EnvelopeBuilder,
    logging, monitors,
    orchestrator::Orchestrator,
    shutdown::{ShutdownCoordinator, confirm, control::ControlClient},
    transport::HttpTransport,
};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Collects local and remote metrics and ships them to an ingestion server")]
struct Args {
    /// Config file (JSON or TOML)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,

    /// Collect once, deliver everything and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let path = resolve_config_path(args.file.clone())?;
    let config = read_config_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    logging::init(&config.logging, args.verbose)?;
    trace!("started with args: {args:?}");
    info!("loaded configuration from {}", path.display());

    let (orchestrator, poller) = build(&config)?;

    if args.once {
        return run_once(&orchestrator).await;
    }

    tokio::select! {
        result = orchestrator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    if let Some(poller) = poller
        && let Err(e) = poller.shutdown().await
    {
        debug!("{e:#}");
    }
    stop(&orchestrator).await;

    let stats = orchestrator.queue().stats();
    if stats.pending > 0 {
        warn!("{} envelopes were not delivered", stats.pending);
    }
    info!("monitoring stopped");

    Ok(())
}

/// Wire monitors, delivery and shutdown negotiation together
fn build(config: &Config) -> anyhow::Result<(Arc<Orchestrator>, Option<PollerHandle>)> {
    let system_id = config.app.system_id();

    let control = ControlClient::new(config.server.control_base()?)?;
    let coordinator = Arc::new(ShutdownCoordinator::new(
        system_id.clone(),
        confirm::from_mode(config.shutdown.confirmation),
        Some(control.clone()),
    ));

    let transport = HttpTransport::new(config.server.url.clone(), config.server.timeout())
        .context("failed to create delivery transport")?;
    info!("delivering to {}", transport.url());
    let queue = DeliveryQueue::spawn(
        Arc::new(transport),
        Some(coordinator.clone()),
        RetryPolicy::from(&config.server),
    );

    let builder = EnvelopeBuilder::new(
        config.app.name.clone(),
        system_id,
        config.monitoring.group_map(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        builder,
        queue,
        config.monitoring.update_interval(),
    ));

    for monitor in monitors::from_config(&config.monitoring)? {
        orchestrator.register(monitor);
    }
    coordinator.set_monitor_handler(&orchestrator);

    let poller = config.shutdown.poll_interval.map(|secs| {
        debug!("polling for shutdown requests every {secs}s");
        PollerHandle::spawn(control, coordinator.clone(), Duration::from_secs(secs))
    });

    Ok((orchestrator, poller))
}

async fn run_once(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    if orchestrator.monitor_count() == 0 {
        anyhow::bail!("no monitors enabled in configuration");
    }

    if orchestrator.collect_metrics().await.is_none() {
        error!("no envelope produced");
    }

    tokio::select! {
        result = orchestrator.queue().drain_and_stop() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted before all envelopes were delivered");
        }
    }

    stop(&orchestrator).await;
    Ok(())
}

/// Stop collection and delivery. A worker still waiting for a shutdown
/// confirmation would keep the runtime alive, so the process exits instead.
async fn stop(orchestrator: &Orchestrator) {
    orchestrator.stop().await;

    if !orchestrator.queue().is_stopped() {
        warn!("delivery worker still busy, exiting without waiting for it");
        std::process::exit(0);
    }
}
