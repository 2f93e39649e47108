//! cerberus-agent - passive network observability agent
//!
//! The agent:
//! - Loads the eBPF classifier into the kernel
//! - Attaches it to every usable interface at the TC ingress hook
//! - Drains the event ring buffer into the device catalogue
//! - Snapshots the catalogue to the local store every 30 seconds
//! - Prints new devices, new patterns and periodic statistics

use anyhow::Result;

#[cfg(not(target_os = "linux"))]
fn main() -> Result<()> {
    eprintln!("Error: cerberus-agent requires Linux to run eBPF programs");
    std::process::exit(1);
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<()> {
    use anyhow::Context;
    use aya_log::EbpfLogger;
    use cerberus_agent::aggregator::{NetworkMonitor, DEFAULT_CACHE_SIZE};
    use cerberus_agent::notify;
    use cerberus_agent::probe_loader::{poll_events, ProbeManager};
    use cerberus_agent::store::SnapshotStore;
    use log::{info, warn};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::signal;
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    const DB_PATH: &str = "network.db";
    const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
    const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);
    const STATS_INTERVAL: Duration = Duration::from_secs(60);
    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("cerberus-agent starting...");

    let store = SnapshotStore::open(DB_PATH).context("Failed to open snapshot store")?;
    let (monitor, streams) = NetworkMonitor::new(DEFAULT_CACHE_SIZE, store);
    let monitor = Arc::new(monitor);

    // Console subscribers own their receive ends; a stalled subscriber
    // only ever loses notifications, never capture.
    tokio::spawn(notify::run_device_printer(streams.new_devices));
    tokio::spawn(notify::run_pattern_printer(
        streams.new_patterns,
        monitor.clone(),
    ));

    // Load and attach the classifier
    let mut manager = ProbeManager::new()?;

    if let Err(e) = EbpfLogger::init(manager.bpf_mut()) {
        warn!(
            "Failed to initialize EbpfLogger: {}. Classifier logs will not be visible.",
            e
        );
    }

    info!("Scanning for network interfaces...");
    let interfaces = ProbeManager::discover_interfaces();
    manager.attach_to_interfaces(&interfaces)?;

    let mut ring_buf = manager.events_ring_buf()?;

    // Snapshot worker
    let snapshot_monitor = monitor.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SNAPSHOT_INTERVAL).await;
            snapshot_monitor.persist_once().await;
        }
    });

    // Liveness ticker
    let liveness_monitor = monitor.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LIVENESS_INTERVAL).await;
            println!("{}", liveness_monitor.liveness_line().await);
        }
    });

    // Full statistics ticker
    let stats_monitor = monitor.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(STATS_INTERVAL).await;
            stats_monitor.print_stats().await;
        }
    });

    info!("Monitoring network traffic... Press Ctrl+C to exit");
    info!("Stats will be printed every 60 seconds");

    let mut sigterm = unix_signal(SignalKind::terminate())?;

    // Main event loop: drain the ring buffer in FIFO order until a
    // shutdown signal arrives.
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = sigterm.recv() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let events = poll_events(&mut ring_buf, &monitor);
                for ev in events {
                    monitor.ingest(&ev).await;
                }
            }
        }
    }

    // Drain whatever the classifier submitted before the signal.
    for ev in poll_events(&mut ring_buf, &monitor) {
        monitor.ingest(&ev).await;
    }

    println!("\nFinal Statistics:");
    monitor.print_stats().await;

    info!("Flushing final snapshot...");
    monitor.persist_once().await;

    drop(ring_buf);
    manager.unload();

    info!("cerberus-agent stopped");
    Ok(())
}
