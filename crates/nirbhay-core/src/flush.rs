// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Connectivity-triggered flush
//
// Drains the pending SOS queue to the ledger reporter when the device comes
// back online. One pass is all-or-nothing: the queue is only cleared after
// every entry has been delivered, so entries delivered before an abort are
// redelivered on the next pass (at-least-once).

use crate::connectivity::ConnectivityMonitor;
use crate::history::{DeliveredIncident, DeliveryLog};
use crate::queue::SignalQueue;
use crate::reporter::IncidentReporter;
use crate::types::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why a flush pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass is already in flight
    Busy,
    /// The device is offline
    Offline,
    /// Nothing is queued
    Empty,
}

/// Result of one flush pass
#[derive(Debug)]
pub enum FlushOutcome {
    /// The pass was a no-op
    Skipped(SkipReason),
    /// Every queued entry was delivered and the queue was cleared
    Cleared { delivered: usize },
    /// A delivery failed; the whole queue stays persisted for retry
    Aborted { delivered: usize, error: AppError },
}

/// Drains queued SOS signals to the upstream reporter.
///
/// Passes are serialized by an in-flight flag: a trigger that fires while a
/// pass is running skips instead of starting a second drain.
pub struct FlushEngine {
    queue: Arc<SignalQueue>,
    reporter: Arc<dyn IncidentReporter>,
    connectivity: ConnectivityMonitor,
    log: Arc<DeliveryLog>,
    in_flight: AtomicBool,
}

impl FlushEngine {
    pub fn new(
        queue: Arc<SignalQueue>,
        reporter: Arc<dyn IncidentReporter>,
        connectivity: ConnectivityMonitor,
        log: Arc<DeliveryLog>,
    ) -> Self {
        Self {
            queue,
            reporter,
            connectivity,
            log,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one flush pass. Never fails: every error terminates the pass and
    /// is reported in the outcome.
    pub async fn flush_pending(&self) -> FlushOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::Skipped(SkipReason::Busy);
        }

        let outcome = self.drain().await;
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    async fn drain(&self) -> FlushOutcome {
        if !self.connectivity.is_online() {
            return FlushOutcome::Skipped(SkipReason::Offline);
        }

        let queued = self.queue.read_sos();
        if queued.is_empty() {
            return FlushOutcome::Skipped(SkipReason::Empty);
        }

        tracing::info!("Flushing {} queued SOS signal(s)", queued.len());

        let mut delivered = 0;
        for signal in &queued {
            let evidence_hash = format!("{},{}", signal.lat, signal.lng);
            match self
                .reporter
                .report_incident(
                    signal.lat,
                    signal.lng,
                    Some(&evidence_hash),
                    signal.use_algorand,
                )
                .await
            {
                Ok(tx_hash) => {
                    tracing::info!("Queued SOS delivered, tx {}", tx_hash);
                    if let Err(e) = self.log.add(DeliveredIncident::new(
                        tx_hash,
                        signal.lat,
                        signal.lng,
                        signal.use_algorand,
                    )) {
                        tracing::warn!("Failed to record delivery: {}", e);
                    }
                    delivered += 1;
                }
                Err(error) => {
                    // Keep the whole queue, including already-delivered
                    // entries, for the next trigger.
                    tracing::warn!(
                        "Flush aborted after {} of {} deliveries: {}",
                        delivered,
                        queued.len(),
                        error
                    );
                    return FlushOutcome::Aborted { delivered, error };
                }
            }
        }

        if let Err(error) = self.queue.clear_sos() {
            tracing::error!("Delivered {} signal(s) but failed to clear queue: {}", delivered, error);
            return FlushOutcome::Aborted { delivered, error };
        }

        FlushOutcome::Cleared { delivered }
    }

    /// Trigger loop: one eager pass at startup, then one pass per
    /// offline->online transition. Runs until the connectivity monitor is
    /// dropped.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.connectivity.subscribe();
        let mut was_online = *rx.borrow();

        let outcome = self.flush_pending().await;
        tracing::debug!("Startup flush: {:?}", outcome);

        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online && !was_online {
                let outcome = self.flush_pending().await;
                tracing::debug!("Reconnect flush: {:?}", outcome);
            }
            was_online = online;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PendingSos;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Records every delivery call; fails all calls from `fail_from` on
    struct RecordingReporter {
        calls: Mutex<Vec<(f64, f64, bool)>>,
        fail_from: Option<usize>,
    }

    impl RecordingReporter {
        fn new(fail_from: Option<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_from,
            }
        }

        fn calls(&self) -> Vec<(f64, f64, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl IncidentReporter for RecordingReporter {
        async fn report_incident(
            &self,
            lat: f64,
            lng: f64,
            _evidence_hash: Option<&str>,
            use_algorand: bool,
        ) -> Result<String, AppError> {
            let call_index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((lat, lng, use_algorand));
                calls.len() - 1
            };

            match self.fail_from {
                Some(n) if call_index >= n => {
                    Err(AppError::Delivery("ledger rejected".to_string()))
                }
                _ => Ok(format!("0xtx{}", call_index)),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        queue: Arc<SignalQueue>,
        log: Arc<DeliveryLog>,
        monitor: ConnectivityMonitor,
    }

    fn fixture(online: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(SignalQueue::with_dir(dir.path().join("queue")).unwrap());
        let log = Arc::new(DeliveryLog::at_path(dir.path().join("delivery_log.json")).unwrap());
        let monitor = ConnectivityMonitor::new(online);
        Fixture {
            _dir: dir,
            queue,
            log,
            monitor,
        }
    }

    fn engine(fx: &Fixture, reporter: Arc<dyn IncidentReporter>) -> FlushEngine {
        FlushEngine::new(
            fx.queue.clone(),
            reporter,
            fx.monitor.clone(),
            fx.log.clone(),
        )
    }

    #[tokio::test]
    async fn test_full_success_clears_queue_in_order() {
        let fx = fixture(true);
        for i in 0..3 {
            fx.queue
                .enqueue_sos(PendingSos::new(10.0 + i as f64, 20.0, i == 1))
                .unwrap();
        }

        let reporter = Arc::new(RecordingReporter::new(None));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(outcome, FlushOutcome::Cleared { delivered: 3 }));
        assert!(fx.queue.read_sos().is_empty());
        assert_eq!(
            reporter.calls(),
            vec![(10.0, 20.0, false), (11.0, 20.0, true), (12.0, 20.0, false)]
        );
    }

    #[tokio::test]
    async fn test_first_failure_leaves_whole_queue() {
        let fx = fixture(true);
        for i in 0..4 {
            fx.queue
                .enqueue_sos(PendingSos::new(10.0 + i as f64, 20.0, false))
                .unwrap();
        }

        // Succeeds for calls 0 and 1, fails on call 2
        let reporter = Arc::new(RecordingReporter::new(Some(2)));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(outcome, FlushOutcome::Aborted { delivered: 2, .. }));
        // All four entries stay queued, not just the undelivered tail
        assert_eq!(fx.queue.read_sos().len(), 4);
        // Entries after the failed one were never attempted
        assert_eq!(reporter.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_offline_pass_is_a_noop() {
        let fx = fixture(false);
        fx.queue.enqueue_sos(PendingSos::new(28.6, 77.2, false)).unwrap();

        let reporter = Arc::new(RecordingReporter::new(None));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(
            outcome,
            FlushOutcome::Skipped(SkipReason::Offline)
        ));
        assert!(reporter.calls().is_empty());
        assert_eq!(fx.queue.read_sos().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_pass_is_a_noop() {
        let fx = fixture(true);
        let reporter = Arc::new(RecordingReporter::new(None));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(outcome, FlushOutcome::Skipped(SkipReason::Empty)));
        assert!(reporter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_queued_sos_delivered_once_on_reconnect() {
        let fx = fixture(false);
        fx.queue.enqueue_sos(PendingSos::new(28.6, 77.2, false)).unwrap();
        assert_eq!(fx.queue.read_sos().len(), 1);

        fx.monitor.set_online(true);
        let reporter = Arc::new(RecordingReporter::new(None));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(outcome, FlushOutcome::Cleared { delivered: 1 }));
        assert!(fx.queue.read_sos().is_empty());
        assert_eq!(reporter.calls(), vec![(28.6, 77.2, false)]);
        // Delivery was recorded in the log
        assert_eq!(fx.log.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_second_entry_keeps_both_queued() {
        let fx = fixture(true);
        fx.queue.enqueue_sos(PendingSos::new(1.0, 2.0, false)).unwrap();
        fx.queue.enqueue_sos(PendingSos::new(3.0, 4.0, false)).unwrap();

        // A succeeds, B fails
        let reporter = Arc::new(RecordingReporter::new(Some(1)));
        let outcome = engine(&fx, reporter.clone()).flush_pending().await;

        assert!(matches!(outcome, FlushOutcome::Aborted { delivered: 1, .. }));
        assert_eq!(reporter.calls().len(), 2);

        // A is still queued for redelivery even though it was delivered
        let remaining = fx.queue.read_sos();
        assert_eq!(remaining.len(), 2);
        assert_eq!((remaining[0].lat, remaining[0].lng), (1.0, 2.0));
        assert_eq!((remaining[1].lat, remaining[1].lng), (3.0, 4.0));
    }

    /// Poll `condition` until it holds, failing the test after a timeout
    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_run_flushes_eagerly_at_startup() {
        let fx = fixture(true);
        fx.queue.enqueue_sos(PendingSos::new(28.6, 77.2, false)).unwrap();

        let reporter = Arc::new(RecordingReporter::new(None));
        let engine = Arc::new(engine(&fx, reporter.clone()));
        let handle = tokio::spawn(engine.run());

        // No transition needed: the startup pass alone drains the queue
        let queue = fx.queue.clone();
        wait_until(move || queue.read_sos().is_empty()).await;
        assert_eq!(reporter.calls(), vec![(28.6, 77.2, false)]);

        handle.abort();
    }

    #[tokio::test]
    async fn test_run_flushes_on_reconnect_only() {
        let fx = fixture(false);
        fx.queue.enqueue_sos(PendingSos::new(28.6, 77.2, false)).unwrap();

        let reporter = Arc::new(RecordingReporter::new(None));
        let engine = Arc::new(engine(&fx, reporter.clone()));
        let handle = tokio::spawn(engine.run());

        // Startup pass while offline delivers nothing
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(reporter.calls().is_empty());
        assert_eq!(fx.queue.read_sos().len(), 1);

        // offline -> online drains the queue
        fx.monitor.set_online(true);
        let queue = fx.queue.clone();
        wait_until(move || queue.read_sos().is_empty()).await;
        assert_eq!(reporter.calls(), vec![(28.6, 77.2, false)]);

        // online -> offline triggers nothing, even with work queued
        fx.monitor.set_online(false);
        fx.queue.enqueue_sos(PendingSos::new(1.0, 2.0, true)).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(reporter.calls().len(), 1);
        assert_eq!(fx.queue.read_sos().len(), 1);

        handle.abort();
    }

    /// Blocks each delivery until released, to hold a pass in flight
    struct GatedReporter {
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl IncidentReporter for GatedReporter {
        async fn report_incident(
            &self,
            _lat: f64,
            _lng: f64,
            _evidence_hash: Option<&str>,
            _use_algorand: bool,
        ) -> Result<String, AppError> {
            self.gate.notified().await;
            Ok("0xgated".to_string())
        }
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let fx = fixture(true);
        fx.queue.enqueue_sos(PendingSos::new(28.6, 77.2, false)).unwrap();

        let gate = Arc::new(Notify::new());
        let engine = Arc::new(engine(
            &fx,
            Arc::new(GatedReporter { gate: gate.clone() }),
        ));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.flush_pending().await }
        });

        // Let the first pass reach the gated delivery call
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let second = engine.flush_pending().await;
        assert!(matches!(second, FlushOutcome::Skipped(SkipReason::Busy)));

        gate.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, FlushOutcome::Cleared { delivered: 1 }));
    }
}
