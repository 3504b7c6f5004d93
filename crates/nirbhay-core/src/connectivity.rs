// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Connectivity monitor
//
// Tracks whether the device currently has network connectivity and lets
// subscribers observe offline->online transitions.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared online/offline state backed by a watch channel.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Current connectivity state
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to connectivity transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Publish a new connectivity state. Subscribers are only woken on change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            if *state != online {
                tracing::info!("Connectivity changed: online={}", online);
                *state = online;
                true
            } else {
                false
            }
        });
    }
}

/// Spawn a background task that probes `target` (host:port) on a fixed
/// interval and publishes the result into the monitor.
///
/// A TCP connect within the timeout counts as online. No backoff; the
/// interval is fixed.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    target: String,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let online = probe(&target).await;
            monitor.set_online(online);
            tokio::time::sleep(interval).await;
        }
    })
}

/// One reachability check against `target` (host:port)
pub async fn probe(target: &str) -> bool {
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!("Connectivity probe to {} failed: {}", target, e);
            false
        }
        Err(_) => {
            tracing::debug!("Connectivity probe to {} timed out", target);
            false
        }
    }
}
