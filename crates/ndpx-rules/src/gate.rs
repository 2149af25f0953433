//! # Eligibility Gate
//!
//! Decides, per plan fragment, whether a rewrite should even be attempted.
//! This is a cheap structural screen run before any serialization or size
//! estimation:
//!
//! - fragments already rewritten (child is the engine's own remote relation)
//!   are declined, unless the relation was injected purely for size
//!   estimation, in which case its re-estimate marker allows one more pass --
//!   this is what makes fix-point iteration idempotent;
//! - fragments with no filters at all are declined (nothing to delegate
//!   beyond projection, not worth the churn);
//! - filter sets consisting only of IS NOT NULL checks are declined -- no
//!   selectivity gain justifies the remote round trip, and for a child that
//!   already is a remote relation the decline is unconditional;
//! - fragments whose relation kind is unrecognized are declined;
//! - fragments where neither projection nor filter attribute resolution
//!   succeeds are declined, unless `always_inject` asks for a best-effort
//!   rewrite (used for speculative size estimates rather than final plans).

use crate::classify::{filter_attributes, is_null_filter_only};
use crate::resolve::resolve_attributes;
use ndpx_core::expr::Expr;
use ndpx_core::plan::{PlanNode, ScanSource};

/// Structural screen: is this fragment a legal rewrite candidate at all?
pub fn needs_rule(_project: &[Expr], filters: &[Expr], child: &PlanNode) -> bool {
    let Some(scan) = child.as_scan() else {
        return false;
    };
    match &scan.source {
        ScanSource::Opaque { .. } => return false,
        ScanSource::Remote(rel) => {
            // Null-only filter sets over our own remote relation are
            // declined unconditionally, re-estimate marker or not.
            if is_null_filter_only(filters) {
                return false;
            }
            if !rel.estimate_only {
                return false;
            }
        }
        ScanSource::ParquetFile { .. } | ScanSource::Filesystem { .. } => {}
    }
    if filters.is_empty() {
        return false;
    }
    if is_null_filter_only(filters) {
        return false;
    }
    true
}

/// Full eligibility check including attribute resolution.
pub fn can_handle_plan(
    project: &[Expr],
    filters: &[Expr],
    child: &PlanNode,
    always_inject: bool,
) -> bool {
    if !needs_rule(project, filters, child) {
        return false;
    }
    if always_inject {
        return true;
    }
    resolve_attributes(project).is_ok() || filter_attributes(filters).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndpx_core::expr::{AttributeRef, BinaryOp, DataType, ScalarValue};
    use ndpx_core::options::OptionMap;
    use ndpx_core::plan::{RemoteRelation, ScanNode};

    fn attr(id: u32, name: &str) -> AttributeRef {
        AttributeRef::new(id, name, DataType::Int64, true)
    }

    fn scan_with(source: ScanSource) -> PlanNode {
        let a = attr(1, "a");
        PlanNode::Scan(ScanNode {
            source,
            output: vec![a.clone()],
            schema: vec![a],
            options: OptionMap::new(),
            table: None,
            estimate: None,
        })
    }

    fn gt_filter() -> Vec<Expr> {
        let a = attr(1, "a");
        vec![Expr::binary(
            BinaryOp::Gt,
            Expr::attr(&a),
            Expr::lit(ScalarValue::Int64(5)),
        )]
    }

    #[test]
    fn declines_empty_and_null_only_filters() {
        let a = attr(1, "a");
        let scan = scan_with(ScanSource::ParquetFile {
            location: "hdfs://t".into(),
        });
        assert!(!needs_rule(&[], &[], &scan));
        assert!(!needs_rule(&[], &[Expr::is_not_null(&a)], &scan));
        assert!(needs_rule(&[], &gt_filter(), &scan));
    }

    #[test]
    fn declines_rewritten_remote_but_allows_reestimate() {
        let terminal = scan_with(ScanSource::Remote(RemoteRelation {
            schema: vec![attr(1, "a")],
            options: OptionMap::new(),
            estimate_only: false,
        }));
        let speculative = scan_with(ScanSource::Remote(RemoteRelation {
            schema: vec![attr(1, "a")],
            options: OptionMap::new(),
            estimate_only: true,
        }));
        assert!(!needs_rule(&[], &gt_filter(), &terminal));
        assert!(needs_rule(&[], &gt_filter(), &speculative));
    }

    #[test]
    fn always_inject_bypasses_resolution_failure() {
        let scan = scan_with(ScanSource::ParquetFile {
            location: "hdfs://t".into(),
        });
        let a = attr(1, "a");
        let unresolvable_project = vec![Expr::Function {
            name: "upper".into(),
            args: vec![Expr::attr(&a)],
        }];
        let unsupported_filter = vec![Expr::Function {
            name: "rand".into(),
            args: vec![],
        }];
        assert!(!can_handle_plan(
            &unresolvable_project,
            &unsupported_filter,
            &scan,
            false
        ));
        assert!(can_handle_plan(
            &unresolvable_project,
            &unsupported_filter,
            &scan,
            true
        ));
    }
}
