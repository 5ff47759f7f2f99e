//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (campflow-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod artifact_cache;
pub mod project;
pub mod session;
