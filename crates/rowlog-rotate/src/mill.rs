//! Background retention trigger
//!
//! One worker thread per writer runs retention passes. Writers signal it
//! through a channel with a single slot: if a pass is already pending the
//! signal is dropped, since that pending pass hasn't started yet and will see
//! the writer's file anyway. Signalling never blocks.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use rowlog_core::Result;

use crate::retention::{Retention, RetentionReport};

/// Reports buffered for a subscriber before new ones are dropped
const REPORT_BACKLOG: usize = 64;

type ReportChannel = (Sender<Result<RetentionReport>>, Receiver<Result<RetentionReport>>);

/// Schedules retention passes on a background thread
pub struct Mill {
    retention: Arc<Retention>,
    signal: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    reports: Arc<Mutex<Option<ReportChannel>>>,
}

impl Mill {
    pub fn new(retention: Arc<Retention>) -> Self {
        Self {
            retention,
            signal: None,
            worker: None,
            reports: Arc::new(Mutex::new(None)),
        }
    }

    /// Request a retention pass. Starts the worker on first use.
    pub fn trigger(&mut self) {
        if self.signal.is_none() {
            self.start();
        }
        let Some(signal) = &self.signal else {
            return;
        };

        match signal.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => debug!("Retention pass already pending"),
            Err(TrySendError::Disconnected(())) => {
                warn!("Retention worker is gone, restarting it");
                self.signal = None;
                self.worker = None;
                self.start();
                if let Some(signal) = &self.signal {
                    let _ = signal.try_send(());
                }
            }
        }
    }

    /// Receiver for the result of every retention pass run from now on.
    /// All calls share one channel, so each report goes to one receiver.
    pub fn subscribe(&self) -> Receiver<Result<RetentionReport>> {
        let mut reports = self.reports.lock();
        let (_, rx) = reports.get_or_insert_with(|| bounded(REPORT_BACKLOG));
        rx.clone()
    }

    /// Whether the worker thread has been started
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop accepting triggers and wait for the worker to finish the pending
    /// pass, if any.
    pub fn shutdown(&mut self) {
        self.signal = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Retention worker panicked");
            }
        }
    }

    fn start(&mut self) {
        let (tx, rx) = bounded::<()>(1);
        let retention = Arc::clone(&self.retention);
        let reports = Arc::clone(&self.reports);

        let spawned = thread::Builder::new()
            .name("rowlog-mill".to_string())
            .spawn(move || run_worker(rx, retention, reports));

        match spawned {
            Ok(handle) => {
                debug!("Started retention worker for {}", self.retention.dir().display());
                self.signal = Some(tx);
                self.worker = Some(handle);
            }
            Err(e) => warn!("Failed to start retention worker: {}", e),
        }
    }
}

impl Drop for Mill {
    fn drop(&mut self) {
        // Closing the channel lets the worker exit after its pending pass
        self.signal = None;
    }
}

fn run_worker(
    rx: Receiver<()>,
    retention: Arc<Retention>,
    reports: Arc<Mutex<Option<ReportChannel>>>,
) {
    for () in rx.iter() {
        let result = retention.run_once();
        match &result {
            Ok(report) => debug!(
                "Retention pass done: {} scanned, {} removed",
                report.scanned,
                report.removed.len()
            ),
            Err(e) => warn!("Retention pass failed: {}", e),
        }

        if let Some((tx, _)) = reports.lock().as_ref() {
            if tx.try_send(result).is_err() {
                debug!("Retention report dropped, subscriber backlog full");
            }
        }
    }
}
