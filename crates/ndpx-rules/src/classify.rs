//! # Predicate Classification
//!
//! Decides how much of a filter set the remote tier can execute. Each
//! filter is recursively decomposed through boolean connectives (AND, OR,
//! NOT), comparisons, IN-lists, null checks, and string match predicates,
//! down to a terminal column reference; it is that terminal attribute that
//! gets reported for a classifiable filter, not the predicate text.
//!
//! The per-filter verdicts aggregate into one plan-level
//! [`PushdownStatus`]:
//!
//! - every filter classifiable → `FullyValid`,
//! - otherwise, if the serializer reports a non-empty subset it can carry →
//!   `PartiallyValid` (the full predicate is still re-checked locally),
//! - otherwise → `Invalid`.
//!
//! One malformed predicate therefore disqualifies the fully-valid path for
//! the whole set; the subset decision belongs to the serializer, this module
//! only reports pass/fail per predicate.
//!
//! ## Null-check-only sets
//!
//! A filter set consisting solely of IS NOT NULL predicates offers no
//! selectivity worth a remote round trip; [`is_null_filter_only`] lets the
//! eligibility gate decline such fragments before any rewrite work happens.

use crate::resolve::{describe, resolve_attribute, ResolveError};
use ndpx_core::expr::{AttributeRef, Expr, UnaryOp};
use ndpx_core::remote::PushdownSerializer;

/// How much of a filter (or aggregate) set the remote tier can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushdownStatus {
    /// The remote tier executes the whole set; the local node may be elided.
    FullyValid,
    /// The remote tier executes a subset; a local node must re-apply the
    /// full original predicate for correctness.
    PartiallyValid,
    /// Nothing is delegated; the local node is retained unchanged.
    Invalid,
}

/// Classify one filter, returning the terminal attribute it constrains.
pub fn filter_attribute(expr: &Expr) -> Result<AttributeRef, ResolveError> {
    match expr {
        Expr::And(children) | Expr::Or(children) => {
            let mut first = None;
            for child in children {
                let attr = filter_attribute(child)?;
                first.get_or_insert(attr);
            }
            first.ok_or_else(|| ResolveError::Unsupported("empty connective".into()))
        }
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => filter_attribute(operand),
        Expr::UnaryOp {
            op: UnaryOp::IsNull | UnaryOp::IsNotNull,
            operand,
        } => resolve_attribute(operand),
        Expr::BinaryOp { op, left, right } if op.is_comparison() => {
            let l = comparison_operand(left)?;
            let r = comparison_operand(right)?;
            l.or(r)
                .ok_or_else(|| ResolveError::Unsupported("comparison of two literals".into()))
        }
        Expr::InList { expr, .. } => resolve_attribute(expr),
        Expr::StringMatch { expr, .. } => resolve_attribute(expr),
        other => Err(ResolveError::Unsupported(describe(other))),
    }
}

/// One side of a comparison: a literal (no attribute) or a column reference,
/// possibly under an alias or cast.
fn comparison_operand(expr: &Expr) -> Result<Option<AttributeRef>, ResolveError> {
    match expr {
        Expr::Literal(_) => Ok(None),
        other => resolve_attribute(other).map(Some),
    }
}

/// Terminal attributes of every filter in the set, all-or-nothing.
pub fn filter_attributes(filters: &[Expr]) -> Result<Vec<AttributeRef>, ResolveError> {
    filters.iter().map(filter_attribute).collect()
}

/// Aggregate per-filter verdicts into a plan-level status.
pub fn classify_filters(filters: &[Expr], serializer: &dyn PushdownSerializer) -> PushdownStatus {
    if filters.is_empty() {
        return PushdownStatus::FullyValid;
    }
    let all_classifiable = filters.iter().all(|f| filter_attribute(f).is_ok());
    if all_classifiable {
        return PushdownStatus::FullyValid;
    }
    // The serializer owns the narrower partial path: push whichever subset
    // it can carry, keep the full predicate locally.
    let supported = serializer.supported_filters(filters);
    if supported.iter().any(|&ok| ok) {
        PushdownStatus::PartiallyValid
    } else {
        PushdownStatus::Invalid
    }
}

/// True when every filter is an IS NOT NULL check over a plain column.
pub fn is_null_filter_only(filters: &[Expr]) -> bool {
    !filters.is_empty()
        && filters.iter().all(|f| {
            matches!(
                f,
                Expr::UnaryOp {
                    op: UnaryOp::IsNotNull,
                    operand
                } if resolve_attribute(operand).is_ok()
            )
        })
}
