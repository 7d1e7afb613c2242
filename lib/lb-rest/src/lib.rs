//! REST implementation of the load balancer collaborator
//!
//! Talks to the external load balancer controller over its JSON API: CRUD per
//! object type, paged inventory reads filtered by the creating cluster, and a
//! cluster health probe.

pub mod client;
pub mod config;

pub use client::RestClient;
pub use config::RestConfig;
