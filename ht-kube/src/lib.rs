//! Kubernetes binding for hw-tagger
//!
//! Implements [`ht_core::LabelStore`] on the node objects of a cluster,
//! using in-cluster service account credentials or a kubeconfig file.

pub mod client;
pub mod config;

pub use client::NodeLabelStore;
pub use config::{ClusterConfig, TokenSource};
