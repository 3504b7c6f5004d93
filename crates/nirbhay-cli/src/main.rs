// SPDX-License-Identifier: AGPL-3.0
// Nirbhay CLI - Command-line frontend
//
// Trigger or queue an SOS, inspect the offline queue, and run the
// reconnect watch loop.

use clap::{Parser, Subcommand};
use nirbhay_core::{
    connectivity, spawn_probe, AppError, ConnectivityMonitor, DeliveredIncident, DeliveryLog,
    FlushEngine, FlushOutcome, IncidentReporter, LedgerGateway, PendingSos, SettingsStore,
    SignalQueue,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "nirbhay", about = "Nirbhay offline SOS queue", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send an SOS now, or queue it if offline
    Sos {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Report to Algorand instead of Ethereum
        #[arg(long)]
        algorand: bool,
    },
    /// Inspect or clear the pending SOS queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Run one flush pass against the queue
    Flush,
    /// Show recently delivered incidents
    History,
    /// Watch connectivity and flush the queue on reconnect
    Watch,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued SOS signals, oldest first
    List,
    /// Drop every queued SOS signal
    Clear,
}

struct App {
    settings: SettingsStore,
    queue: Arc<SignalQueue>,
    log: Arc<DeliveryLog>,
}

impl App {
    fn open() -> Result<Self, AppError> {
        Ok(Self {
            settings: SettingsStore::new()?,
            queue: Arc::new(SignalQueue::new()?),
            log: Arc::new(DeliveryLog::new()?),
        })
    }

    fn gateway(&self) -> Result<Arc<dyn IncidentReporter>, AppError> {
        Ok(Arc::new(LedgerGateway::new(self.settings.get())?))
    }

    fn engine(&self, monitor: ConnectivityMonitor) -> Result<Arc<FlushEngine>, AppError> {
        Ok(Arc::new(FlushEngine::new(
            self.queue.clone(),
            self.gateway()?,
            monitor,
            self.log.clone(),
        )))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nirbhay_cli=info".parse().unwrap())
                .add_directive("nirbhay_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), AppError> {
    let app = App::open()?;
    let settings = app.settings.get();

    match command {
        Command::Sos { lat, lng, algorand } => {
            let use_algorand = algorand || settings.use_algorand;

            if !connectivity::probe(&settings.probe_target).await {
                app.queue.enqueue_sos(PendingSos::new(lat, lng, use_algorand))?;
                println!("You're offline. SOS queued and will send automatically when back online.");
                return Ok(());
            }

            let tx_hash = app
                .gateway()?
                .report_incident(lat, lng, None, use_algorand)
                .await?;
            app.log
                .add(DeliveredIncident::new(tx_hash.clone(), lat, lng, use_algorand))?;
            println!("SOS sent, tx {}", tx_hash);
        }

        Command::Queue { action } => match action {
            QueueAction::List => {
                println!("Queue: {}", app.queue.dir().display());
                let queued = app.queue.read_sos();
                if queued.is_empty() {
                    println!("Queue is empty");
                }
                for signal in queued {
                    println!(
                        "{}  lat={} lng={} ledger={}",
                        format_millis(signal.created_at),
                        signal.lat,
                        signal.lng,
                        chain_name(signal.use_algorand),
                    );
                }
            }
            QueueAction::Clear => {
                app.queue.clear_sos()?;
                println!("Queue cleared");
            }
        },

        Command::Flush => {
            let monitor = ConnectivityMonitor::new(false);
            monitor.set_online(connectivity::probe(&settings.probe_target).await);

            match app.engine(monitor)?.flush_pending().await {
                FlushOutcome::Cleared { delivered } => {
                    println!("Delivered {} queued signal(s)", delivered)
                }
                FlushOutcome::Aborted { delivered, error } => {
                    println!(
                        "Flush aborted after {} delivery(ies): {}; queue kept for retry",
                        delivered, error
                    )
                }
                FlushOutcome::Skipped(reason) => println!("Nothing to do ({:?})", reason),
            }
        }

        Command::History => {
            let records = app.log.list();
            if records.is_empty() {
                println!("No delivered incidents yet");
            }
            for record in records {
                println!(
                    "{}  {}  lat={} lng={}  tx {}",
                    record.delivered_at.format("%Y-%m-%d %H:%M:%S"),
                    record.chain,
                    record.lat,
                    record.lng,
                    record.tx_hash,
                );
            }
        }

        Command::Watch => {
            let monitor = ConnectivityMonitor::new(false);
            let probe = spawn_probe(
                monitor.clone(),
                settings.probe_target.clone(),
                Duration::from_secs(settings.probe_interval_secs),
            );

            let engine = app.engine(monitor)?;
            println!("Watching connectivity (ctrl-c to stop)");

            tokio::select! {
                _ = engine.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
            probe.abort();
        }
    }

    Ok(())
}

fn chain_name(use_algorand: bool) -> &'static str {
    if use_algorand {
        "algorand"
    } else {
        "ethereum"
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
