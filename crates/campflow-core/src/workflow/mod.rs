//! Workflow engine core: step graph, sequential execution, and durable checkpointing.
//!
//! This module contains the "brain" of the workflow engine:
//! - `step` -- Step contract and step error type
//! - `graph` -- Step graph builder with edge validation and cycle detection
//! - `resume` -- Resumption resolver (pure next-step computation)
//! - `checkpoint` -- Checkpoint tracker wrapping every step with autosave
//! - `executor` -- Sequential scheduler walking the graph
//! - `session` -- Session preparation and resume detection
//! - `retry` -- Exponential backoff and rate-limit backoff for external calls
//! - `cache` -- Hybrid artifact cache
//! - `concurrency` -- Optimistic concurrency guard for shared collections
//! - `progress` -- Progress reporter trait and implementations
//! - `fanout` -- Bounded parallel fan-out of independent calls

pub mod cache;
pub mod checkpoint;
pub mod concurrency;
pub mod executor;
pub mod fanout;
pub mod graph;
pub mod progress;
pub mod resume;
pub mod retry;
pub mod session;
pub mod step;
