//! Fleet-manager HTTP API modules.
//!
//! # Purpose
//! Thin REST surface over the connector store: request intake, user edits,
//! and intent flips that the reconcile loop reacts to, plus health and
//! readiness endpoints for the serving gate.
pub mod connectors;
pub mod error;
pub mod openapi;
pub mod system;
pub mod types;
