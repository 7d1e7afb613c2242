//! Desired-state object graphs, one per Gateway

pub mod builder;
pub mod matching;
pub mod model;
pub mod store;
pub mod validate;

pub use builder::GraphBuilder;
pub use model::ObjectGraph;
pub use store::ObjectGraphStore;
