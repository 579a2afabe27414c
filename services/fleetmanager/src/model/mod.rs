//! Fleet-manager data model module.
//!
//! # Purpose
//! Re-exports the connector/deployment/namespace/shard-metadata models shared
//! by the API, store, and reconcile layers.
mod catalog;
mod connector;
mod deployment;
mod namespace;

pub use catalog::{CatalogKey, ShardMetadata};
pub use connector::{Connector, ConnectorPhase, ConnectorStatus, DesiredState};
pub use deployment::Deployment;
pub use namespace::{Namespace, NamespacePhase};
