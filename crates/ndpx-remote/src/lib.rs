//! # ndpx-remote: Remote-Tier Collaborator Implementations
//!
//! Reference implementations of the collaborator traits the rewrite engine
//! consumes:
//!
//! - **`json`**: the JSON directive serializer (filters, aggregates, and
//!   the remote aggregate output schema).
//! - **`query_text`**: the remote query-text rendering of a filter set.
//! - **`size_service`**: relation-size lookup -- a static in-memory table
//!   for tests and a deadline-bounded external helper for deployments where
//!   sizes live behind a metastore-adjacent process.
//!
//! All serializers here are deterministic for identical inputs; the rewrite
//! engine's idempotence depends on that.

pub mod json;
pub mod query_text;
pub mod size_service;

pub use json::NdpJsonSerializer;
pub use size_service::{ExternalSizeHelper, StaticSizeService};
