//! Call contracts for the external collaborators a workflow depends on.
//!
//! - `generator` -- generative/analytical calls returning JSON (`Generator`, `BoxGenerator`)
//! - `analyzer` -- parsing and classification of downloaded artifacts
//! - `lookup` -- read-only search used by fan-out discovery
//! - `blob` -- artifact upload/download by storage path
//! - `publisher` -- ads-platform publishing, subject to rate limiting

pub mod analyzer;
pub mod blob;
pub mod box_generator;
pub mod generator;
pub mod lookup;
pub mod publisher;
