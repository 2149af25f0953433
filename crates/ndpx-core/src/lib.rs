//! # ndpx-core: Plan and Statistics Foundation
//!
//! This crate defines the data model shared by the near-data-processing
//! (NDP) pushdown rewriter:
//!
//! - **`expr`**: scalar/aggregate expression trees and attribute references
//!   (identity by expression id, not by name).
//! - **`plan`**: the immutable plan-node tree (Scan, Filter, Project,
//!   Aggregate) and the synthesized remote relation.
//! - **`options`**: the additive string-keyed option map that is the wire
//!   contract to the remote tier.
//! - **`stats`**: table/column statistics and the statistics visitor used
//!   for size estimation.
//! - **`catalog`**: catalog trait for relation metadata, plus an in-memory
//!   implementation.
//! - **`remote`**: collaborator traits for the pushdown serializer and the
//!   relation-size lookup service.

pub mod catalog;
pub mod expr;
pub mod options;
pub mod plan;
pub mod remote;
pub mod stats;
