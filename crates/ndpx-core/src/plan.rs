//! # Plan Node Tree
//!
//! The plan representation consumed and produced by the pushdown rewriter.
//! It is a small closed set of operator kinds -- Scan, Filter, Project,
//! Aggregate -- modeled as a tagged variant rather than an open class
//! hierarchy, with an explicit unrecognized scan-source variant instead of a
//! throwing path. Inspecting a node is an exhaustive match returning a
//! result, never an exception.
//!
//! Nodes are immutable: a rewrite builds a fresh fragment and the host
//! substitutes it for the original. Children are `Arc`-shared so untouched
//! subtrees are reused rather than deep-copied.

use crate::catalog::TableRef;
use crate::expr::{AttrId, AttributeRef, Expr};
use crate::options::OptionMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Row-count and byte-size estimate attached to a rewritten scan, consumed
/// by the host's cost-based optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub row_count: f64,
    pub size_bytes: f64,
}

/// The synthesized relation standing in for an original scan, carrying
/// pushdown directives as options.
///
/// Bound to the deduplicated attribute set actually read. Has no intrinsic
/// partitioning information at rewrite time; partition discovery happens
/// later, outside this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelation {
    pub schema: Vec<AttributeRef>,
    pub options: OptionMap,
    /// Re-estimate marker: true when this relation was injected purely to
    /// compute a speculative size estimate, in which case the eligibility
    /// gate allows one more rewrite pass. A terminal rewrite sets this to
    /// false so fix-point iteration leaves the node alone.
    pub estimate_only: bool,
}

/// Concrete kind of relation behind a scan node.
///
/// Three kinds are recognized by the rewriter; anything else is `Opaque` and
/// skipped without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanSource {
    /// Columnar-file scan (parquet on a filesystem or object store).
    ParquetFile { location: String },
    /// Generic filesystem-backed relation.
    Filesystem { location: String },
    /// The engine's own remote relation, produced by a prior rewrite.
    Remote(RemoteRelation),
    /// Unrecognized relation kind; fragments over it are never rewritten.
    Opaque { description: String },
}

impl ScanSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, ScanSource::Remote(_))
    }
}

/// A leaf scan over some relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanNode {
    pub source: ScanSource,
    /// Attributes this scan emits, in output order.
    pub output: Vec<AttributeRef>,
    /// Full schema of the underlying data (a superset of `output`).
    pub schema: Vec<AttributeRef>,
    pub options: OptionMap,
    /// Catalog handle, when the relation is registered.
    pub table: Option<TableRef>,
    /// Size estimate computed at rewrite time, if any.
    pub estimate: Option<Estimate>,
}

/// One output expression of an Aggregate node: a scalar expression over
/// embedded aggregate calls (and group-by columns), exposed under a name
/// with its own attribute identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateItem {
    pub id: AttrId,
    pub name: String,
    pub expr: Expr,
}

/// Operator nodes. The tree is immutable; rewrites produce new nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    Scan(ScanNode),
    /// Predicate filter over one child. Predicates are a conjunct list.
    Filter {
        predicates: Vec<Expr>,
        child: Arc<PlanNode>,
    },
    /// Column projection / expression evaluation over one child.
    Project {
        exprs: Vec<Expr>,
        child: Arc<PlanNode>,
    },
    /// Grouped aggregation over one child.
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggregateItem>,
        child: Arc<PlanNode>,
    },
}

/// Kind discriminant for matching without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    Scan,
    Filter,
    Project,
    Aggregate,
}

impl PlanNode {
    pub fn kind(&self) -> PlanKind {
        match self {
            PlanNode::Scan(_) => PlanKind::Scan,
            PlanNode::Filter { .. } => PlanKind::Filter,
            PlanNode::Project { .. } => PlanKind::Project,
            PlanNode::Aggregate { .. } => PlanKind::Aggregate,
        }
    }

    pub fn children(&self) -> Vec<&Arc<PlanNode>> {
        match self {
            PlanNode::Scan(_) => vec![],
            PlanNode::Filter { child, .. }
            | PlanNode::Project { child, .. }
            | PlanNode::Aggregate { child, .. } => vec![child],
        }
    }

    /// Ordered output attributes of this node.
    ///
    /// Project expressions without a column-shaped top (for example an
    /// unaliased `a + b`) synthesize a positional attribute; well-formed
    /// plans alias such expressions, so this is a fallback, not a normal
    /// path.
    pub fn output(&self) -> Vec<AttributeRef> {
        match self {
            PlanNode::Scan(scan) => scan.output.clone(),
            PlanNode::Filter { child, .. } => child.output(),
            PlanNode::Project { exprs, .. } => exprs
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    e.output_attribute().unwrap_or_else(|| {
                        AttributeRef::new(
                            u32::MAX - i as u32,
                            format!("_col{i}"),
                            crate::expr::DataType::Int64,
                            true,
                        )
                    })
                })
                .collect(),
            PlanNode::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let mut out: Vec<AttributeRef> = group_by
                    .iter()
                    .filter_map(|e| e.output_attribute())
                    .collect();
                for item in aggregates {
                    out.push(AttributeRef {
                        id: item.id,
                        name: item.name.clone(),
                        data_type: crate::expr::DataType::Int64,
                        nullable: true,
                    });
                }
                out
            }
        }
    }

    /// The scan at the bottom of this node, if the node is itself a scan.
    pub fn as_scan(&self) -> Option<&ScanNode> {
        match self {
            PlanNode::Scan(s) => Some(s),
            _ => None,
        }
    }
}
