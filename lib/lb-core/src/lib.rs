//! Reconciliation core for the Gateway API load-balancer controller
//!
//! Watch events are turned into ingestion keys, the graph builder derives
//! one desired object graph per Gateway, and the sync engine pushes the
//! difference against the realized-state cache to the external load
//! balancer, retrying failed keys on a fast or slow schedule.

pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod index;
pub mod key;
pub mod ledger;
pub mod metrics;
pub mod queue;
pub mod resource;
pub mod retry;
pub mod source;
pub mod status;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{CacheEntry, RealizedStateCache};
pub use client::{ClientError, LbObject, LoadBalancerClient, ObjectRef, ObjectType, RemoteObject};
pub use config::{ConfigError, ControllerConfig};
pub use controller::Controller;
pub use error::{CoreError, Result};
pub use graph::{GraphBuilder, ObjectGraph, ObjectGraphStore};
pub use key::{IngestionKey, ModelKey, ObjectName, ResourceKind};
pub use ledger::ResourceVersionLedger;
pub use metrics::SyncMetrics;
pub use resource::{Change, Resource, WatchEvent};
pub use retry::{RetryClass, RetryScheduler};
pub use source::{ClusterApi, SourceError};
pub use status::{StatusPublisher, StatusTarget, StatusUpdate};
pub use sync::{SyncEngine, SyncOutcome};
