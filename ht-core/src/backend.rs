//! Collaborator interfaces
//!
//! The engine never talks to udev or to the cluster directly. Bindings
//! implement these traits and are handed to the watchers explicitly, so
//! tests can substitute in-memory doubles.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::data::{Device, DeviceEvent, NodeLabels};
use ht_error::Result;

/// Device enumeration and monitoring for one backend
#[cfg_attr(test, automock)]
pub trait DeviceSource: Send + Sync + 'static {
    /// List the devices currently present in a subsystem (blocking)
    fn enumerate(&self, subsystem: &str) -> Result<Vec<Device>>;

    /// Open a live add/remove subscription for a subsystem (blocking)
    fn subscribe(&self, subsystem: &str) -> Result<Box<dyn DeviceMonitor>>;
}

/// A live subscription; `receive` blocks until the next event
///
/// Any error is terminal for the subscription.
#[cfg_attr(test, automock)]
pub trait DeviceMonitor: Send {
    fn receive(&mut self) -> Result<DeviceEvent>;
}

/// Host-scoped label storage with full-replace updates
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LabelStore: Send + Sync {
    async fn get_labels(&self, host: &str) -> Result<NodeLabels>;

    /// Replace the host's entire label set
    async fn update_labels(&self, host: &str, labels: NodeLabels) -> Result<()>;
}
