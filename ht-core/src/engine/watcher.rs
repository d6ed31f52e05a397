//! Watcher orchestration
//!
//! One [`Watcher`] drives one scope: it consumes the scope's event feed in
//! order, feeds the state tracker and reconciles after the baseline and
//! after every event that changed the known keys. Scopes share nothing and
//! run as independent tasks.

use std::convert::Infallible;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::feed::{EventFeed, SyncSignal};
use super::reconcile::Reconciler;
use super::tracker::StateTracker;
use crate::backend::{DeviceSource, LabelStore};
use crate::data::WatchScope;
use ht_error::{HwTaggerError, Result};

/// Process-wide watch settings
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Identity of the host whose labels are managed
    pub host: String,
    pub dry_run: bool,
}

pub struct Watcher {
    scope: WatchScope,
    source: Arc<dyn DeviceSource>,
    tracker: StateTracker,
    reconciler: Reconciler,
}

impl Watcher {
    pub fn new(
        scope: WatchScope,
        source: Arc<dyn DeviceSource>,
        store: Arc<dyn LabelStore>,
        settings: &WatchSettings,
    ) -> Self {
        Self {
            scope,
            source,
            tracker: StateTracker::new(),
            reconciler: Reconciler::new(settings.host.clone(), store, settings.dry_run),
        }
    }

    /// Watch until a collaborator fails
    ///
    /// Never returns `Ok`: losing the event feed or the label store leaves
    /// the known keys unverifiable, so every failure ends the watch.
    pub async fn run(mut self) -> Result<Infallible> {
        info!(
            prefix = %self.scope.prefix,
            subsystem = %self.scope.subsystem,
            "Starting device watch"
        );
        let mut feed = EventFeed::start(self.source.clone(), &self.scope.subsystem);

        while let Some(signal) = feed.next().await {
            match signal {
                SyncSignal::BaselineComplete => {
                    info!(
                        subsystem = %self.scope.subsystem,
                        keys = self.tracker.len(),
                        "Baseline complete"
                    );
                    self.reconciler.enable();
                    self.sync().await?;
                }
                SyncSignal::Device(Some(event)) => {
                    if self.tracker.apply(&event, &self.scope) {
                        self.sync().await?;
                    }
                }
                SyncSignal::Device(None) => {}
            }
        }

        Err(feed.finish().await)
    }

    async fn sync(&self) -> Result<()> {
        self.reconciler
            .sync(&self.scope, &self.tracker.known_keys())
            .await
            .map(|_| ())
    }
}

/// Run one watcher per scope, resolving with the first fatal error
pub async fn run_watchers(
    scopes: Vec<WatchScope>,
    source: Arc<dyn DeviceSource>,
    store: Arc<dyn LabelStore>,
    settings: WatchSettings,
) -> Result<Infallible> {
    if scopes.is_empty() {
        return Err(HwTaggerError::config("no watch scopes configured"));
    }

    let mut watchers = JoinSet::new();
    for scope in scopes {
        let watcher = Watcher::new(scope, source.clone(), store.clone(), &settings);
        watchers.spawn(watcher.run());
    }

    match watchers.join_next().await {
        Some(Ok(Ok(never))) => match never {},
        Some(Ok(Err(e))) => {
            error!(source = e.source_kind(), "Watch failed: {}", e);
            Err(e)
        }
        Some(Err(e)) => Err(HwTaggerError::Task(format!("watcher task: {}", e))),
        None => Err(HwTaggerError::generic("all watchers exited")),
    }
}
