//! Event source adapter
//!
//! Merges the one-shot enumeration and the live monitor into a single
//! ordered feed: one add signal per present device, then exactly one
//! baseline marker, then live events for as long as the monitor delivers.
//!
//! The monitor is opened before enumerating. Events raised while the
//! enumeration runs queue up in the monitor and are forwarded after the
//! baseline marker, so no hot-plug is lost between the two.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::DeviceSource;
use crate::constants::watch::SIGNAL_QUEUE_CAPACITY;
use crate::data::DeviceEvent;
use ht_error::{HwTaggerError, Result};

/// Message between the event source task and its watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    /// Every device present at watch start has been emitted
    BaselineComplete,
    /// An enumerated device or a live event
    Device(Option<DeviceEvent>),
}

/// Receiving end of one subsystem's signal feed
pub struct EventFeed {
    subsystem: String,
    signals: mpsc::Receiver<SyncSignal>,
    task: JoinHandle<Result<()>>,
}

impl EventFeed {
    /// Start enumeration and monitoring on a blocking worker thread
    pub fn start(source: Arc<dyn DeviceSource>, subsystem: &str) -> Self {
        let (tx, signals) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        let task_subsystem = subsystem.to_string();
        let task = tokio::task::spawn_blocking(move || {
            produce_signals(source.as_ref(), &task_subsystem, &tx)
        });

        Self {
            subsystem: subsystem.to_string(),
            signals,
            task,
        }
    }

    /// Next signal, `None` once the source has stopped
    pub async fn next(&mut self) -> Option<SyncSignal> {
        self.signals.recv().await
    }

    /// Collect the reason the feed ended
    ///
    /// A source that stops without an error still ends the watch, which is
    /// reported as [`HwTaggerError::MonitorClosed`].
    pub async fn finish(self) -> HwTaggerError {
        drop(self.signals);
        match self.task.await {
            Ok(Err(e)) => e,
            Ok(Ok(())) => HwTaggerError::MonitorClosed(self.subsystem),
            Err(e) => HwTaggerError::Task(format!("event source for {}: {}", self.subsystem, e)),
        }
    }
}

/// Body of the event source task
///
/// Returns `Ok` only when the watcher hung up.
fn produce_signals(
    source: &dyn DeviceSource,
    subsystem: &str,
    tx: &mpsc::Sender<SyncSignal>,
) -> Result<()> {
    let mut monitor = source.subscribe(subsystem)?;
    let devices = source.enumerate(subsystem)?;
    info!(subsystem, devices = devices.len(), "Enumerated present devices");

    for device in devices {
        if tx
            .blocking_send(SyncSignal::Device(Some(DeviceEvent::add(device))))
            .is_err()
        {
            return Ok(());
        }
    }
    if tx.blocking_send(SyncSignal::BaselineComplete).is_err() {
        return Ok(());
    }

    loop {
        let event = monitor.receive()?;
        debug!(subsystem, action = %event.action, "Device event");
        if tx.blocking_send(SyncSignal::Device(Some(event))).is_err() {
            return Ok(());
        }
    }
}
