//! Workflow engine and storage ports for Campflow.
//!
//! This crate defines the "ports" (repository traits and external call
//! contracts) that the infrastructure layer implements. It depends only on
//! `campflow-types` -- never on `campflow-infra` or any database/IO crate.

pub mod campaign;
pub mod external;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
