//! # omm-runner
//!
//! Demo entry point for the OMM access layer.
//!
//! Loads a JSON configuration file, connects a session to an in-process
//! simulated provider, registers the login stream and the configured items,
//! and logs every callback until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! omm-runner config.json --log-level debug
//! ```

mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use omm_access::{ChannelId, DispatchResult, OmmConsumerClient, OmmConsumerEvent, OmmSession, SharedClient};
use omm_core::types::{AckMsg, GenericMsg, RefreshMsg, StatusMsg, UpdateMsg};
use tracing::{error, info, warn};

use crate::sim::SimulatedProvider;

const CHANNEL: ChannelId = ChannelId(1);
const DISPATCH_TIMEOUT: Duration = Duration::from_millis(100);
/// Dispatch rounds to wait for the first source directory.
const DIRECTORY_WAIT_ROUNDS: u32 = 50;

/// OMM access layer demo runner.
#[derive(Parser)]
#[command(name = "omm-runner", about = "OMM access layer demo runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the configured severity.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

/// Logs every message delivered to it.
struct LoggingClient;

impl OmmConsumerClient for LoggingClient {
    fn on_refresh_msg(&self, msg: &RefreshMsg, event: &OmmConsumerEvent) {
        info!(
            "[refresh] handle={} '{}' service={:?} state={} payload={}",
            event.handle(),
            msg.key.name_or_empty(),
            msg.service_name,
            msg.state,
            msg.payload
        );
    }

    fn on_update_msg(&self, msg: &UpdateMsg, event: &OmmConsumerEvent) {
        info!("[update] handle={} '{}' payload={}", event.handle(), msg.key.name_or_empty(), msg.payload);
    }

    fn on_status_msg(&self, msg: &StatusMsg, event: &OmmConsumerEvent) {
        match &msg.state {
            Some(state) => info!("[status] handle={} '{}' state={state}", event.handle(), msg.key.name_or_empty()),
            None => info!("[status] handle={} '{}'", event.handle(), msg.key.name_or_empty()),
        }
    }

    fn on_generic_msg(&self, msg: &GenericMsg, event: &OmmConsumerEvent) {
        info!("[generic] handle={} '{}'", event.handle(), msg.key.name_or_empty());
    }

    fn on_ack_msg(&self, msg: &AckMsg, event: &OmmConsumerEvent) {
        info!("[ack] handle={} ack_id={} nack={:?}", event.handle(), msg.ack_id, msg.nack_code);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = omm_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let logger = config.logger.clone().unwrap_or_default();
    let level = omm_core::logging::effective_level(cli.log_level.as_deref(), logger.severity);
    let log_dir = cli.log_dir.clone().or(logger.log_path.clone());
    let module_name = logger.module_name.clone().unwrap_or_else(|| "omm-runner".to_string());
    omm_core::logging::init_logging(&level, log_dir.as_deref(), &module_name);

    info!(
        "omm-runner starting, config={} level={level} services={} items={}",
        cli.config.display(),
        config.services.len(),
        config.items.len()
    );

    // 3. Session over the simulated provider
    let (tx, rx) = crossbeam_channel::unbounded();
    let provider = SimulatedProvider::new(CHANNEL, config.services.clone(), tx.clone());
    let open_streams = provider.open_streams();
    let session = Arc::new(OmmSession::new(&config, Box::new(provider), rx));
    SimulatedProvider::connect(CHANNEL, &tx)?;
    info!("session '{}' created", session.instance_name());

    // 4. Wait for the source directory
    let waiting = session.clone();
    let ready = tokio::task::spawn_blocking(move || {
        for _ in 0..DIRECTORY_WAIT_ROUNDS {
            waiting.dispatch(DISPATCH_TIMEOUT);
            if waiting.inspect(|d| !d.context().directories().is_empty()) {
                return true;
            }
        }
        false
    })
    .await?;
    if !ready {
        warn!("no source directory after {DIRECTORY_WAIT_ROUNDS} rounds; items will close with unknown service");
    }

    // 5. Register login and items
    let client: SharedClient = Arc::new(LoggingClient);
    let mut handles = Vec::new();
    match session.register_client(config.login().to_request(), client.clone(), None, None) {
        Ok(handle) => handles.push(handle),
        Err(e) => error!("login registration failed: {e}"),
    }
    for (idx, item) in config.items.iter().enumerate() {
        match session.register_client(item.to_request(), client.clone(), None, None) {
            Ok(handle) => {
                info!("item[{idx}]: registered '{}' as handle {handle}", item.name);
                handles.push(handle);
            }
            Err(e) => error!("item[{idx}]: registration of '{}' failed: {e}", item.name),
        }
    }

    // 6. Dispatch loop and update ticker
    let running = Arc::new(AtomicBool::new(true));
    let dispatcher = {
        let session = session.clone();
        let running = running.clone();
        tokio::task::spawn_blocking(move || {
            let mut delivered = 0usize;
            while running.load(Ordering::Relaxed) {
                if let DispatchResult::Dispatched(n) = session.dispatch(DISPATCH_TIMEOUT) {
                    delivered += n;
                }
            }
            delivered
        })
    };

    let interval = config
        .services
        .iter()
        .map(|s| s.update_interval())
        .min()
        .unwrap_or(Duration::from_secs(1));
    let ticker = tokio::spawn(sim::run_updates(CHANNEL, open_streams, tx, interval));

    info!("{} handle(s) registered, press Ctrl+C to stop", handles.len());

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 8. Stop gracefully
    ticker.abort();
    for handle in handles {
        if let Err(e) = session.unregister(handle) {
            error!("error unregistering handle {handle}: {e}");
        }
    }
    running.store(false, Ordering::Relaxed);
    let delivered = dispatcher.await?;

    info!("dispatched {delivered} callback(s), goodbye");
    Ok(())
}
