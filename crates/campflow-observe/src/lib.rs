//! Observability setup for Campflow: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
