//! Data types shared by the engine and the collaborator bindings

mod device;
mod labels;
mod scope;

pub use device::{Device, DeviceAction, DeviceEvent};
pub use labels::{LabelDiff, LabelSet, NodeLabels};
pub use scope::{DeviceFilter, FilterFn, IdentifierTag, WatchScope};
