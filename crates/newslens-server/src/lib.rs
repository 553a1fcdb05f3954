//! HTTP surface for NewsLens: SSE analysis streams, agent listing and health probes.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
