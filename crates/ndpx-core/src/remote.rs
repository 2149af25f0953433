//! # Remote-Tier Collaborator Contracts
//!
//! The rewrite engine delegates two concerns to external collaborators, both
//! modeled as traits so production backends and test doubles plug in behind
//! `dyn` references:
//!
//! - [`PushdownSerializer`]: turns filter sets and aggregates into the
//!   remote tier's query text and JSON directive formats. Implementations
//!   must be **deterministic** given identical inputs; the rewriter's
//!   idempotence depends on it.
//! - [`RelationSizeService`]: looks up the on-storage byte size of a
//!   relation when the catalog has no statistics for it. This is the one
//!   external call the engine makes; implementations must bound it with a
//!   deadline and report failure through the explicit error channel rather
//!   than blocking the rewrite.
//!
//! Serializer failures are never fatal: the engine maps them to a neutral
//! (absent) directive and falls back to local execution of the affected
//! predicate set.

use crate::expr::{AggExpr, AttributeRef, Expr};

/// Errors from a pushdown serializer.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// The expression shape has no remote representation.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
    /// The schema description handed to the serializer is unusable.
    #[error("malformed schema: {0}")]
    MalformedSchema(String),
}

/// Serializes pushdown directives for the remote tier.
pub trait PushdownSerializer: Send + Sync {
    /// Render the filter set as remote query text over the given read
    /// columns.
    fn filters_to_query_text(
        &self,
        schema: &[AttributeRef],
        filters: &[Expr],
        columns: &[AttributeRef],
    ) -> Result<String, SerializeError>;

    /// Render the filter set as a JSON directive.
    fn filters_to_json(
        &self,
        filters: &[Expr],
        schema: &[AttributeRef],
    ) -> Result<String, SerializeError>;

    /// Render a (partial or top) aggregate as a JSON directive.
    fn aggregate_to_json(
        &self,
        group_by: &[Expr],
        aggregates: &[AggExpr],
        schema: &[AttributeRef],
        top_aggregate: bool,
    ) -> Result<String, SerializeError>;

    /// Output schema of the remote partial aggregate, in the order the
    /// remote tier will produce columns.
    fn aggregate_schema(
        &self,
        aggregates: &[AggExpr],
        group_by: &[Expr],
    ) -> Vec<AttributeRef>;

    /// Per-filter report of which filters this serializer can carry.
    /// Backs the partially-valid pushdown path: a non-empty supported
    /// subset of an otherwise invalid filter set may still be pushed,
    /// with the full predicate re-checked locally.
    fn supported_filters(&self, filters: &[Expr]) -> Vec<bool>;
}

/// Errors from the relation-size lookup collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SizeServiceError {
    /// The lookup did not complete within its deadline.
    #[error("size lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The helper process or backend could not be reached or failed.
    #[error("size service unavailable: {0}")]
    Unavailable(String),
    /// The backend answered, but not with a parseable byte count.
    #[error("malformed size response: {0}")]
    Malformed(String),
}

/// Looks up the on-storage byte size of a relation by location.
pub trait RelationSizeService: Send + Sync {
    fn storage_size(&self, location: &str) -> Result<u64, SizeServiceError>;
}
