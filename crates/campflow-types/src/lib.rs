//! Shared domain types for Campflow.
//!
//! This crate contains the core domain types used across the Campflow engine:
//! workflow state and checkpoints, project records, artifact cache records,
//! engine configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod cache;
pub mod config;
pub mod error;
pub mod project;
pub mod workflow;
