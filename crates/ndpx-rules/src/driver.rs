//! # Rule Driver
//!
//! Applies the pushdown rewrite, once per optimization pass, to every
//! matching fragment in the plan tree. The host engine may run the pass
//! repeatedly (fix-point iteration) until the plan stabilizes, so the rule
//! must be idempotent: rewriting an already-rewritten fragment is a no-op,
//! enforced by the eligibility gate's already-rewritten check.
//!
//! Matching is top-down: at each node the driver tries to match the largest
//! eligible fragment (Aggregate over Project over Filter over Scan, down to
//! a bare Filter over Scan) and substitutes the replacement in place without
//! descending into it; otherwise it recurses into the children and rebuilds
//! the node only when a child actually changed.

use crate::{aggregate, gate, rewrite};
use ndpx_core::catalog::Catalog;
use ndpx_core::expr::Expr;
use ndpx_core::plan::PlanNode;
use ndpx_core::remote::{PushdownSerializer, RelationSizeService};
use std::sync::Arc;
use tracing::{debug, trace};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct PushdownConfig {
    /// Two-stage aggregate pushdown. Implemented and tested, but shipped
    /// off by default; flip deliberately, not by accident.
    pub enable_aggregate_pushdown: bool,
    /// Remote processor to route delegated work to, if any.
    pub processor_id: Option<String>,
    /// Upper bound on fix-point passes in [`optimize`].
    pub max_passes: usize,
}

impl Default for PushdownConfig {
    fn default() -> Self {
        Self {
            enable_aggregate_pushdown: false,
            processor_id: None,
            max_passes: 10,
        }
    }
}

/// Context passed to rules during application.
pub struct RuleContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub serializer: &'a dyn PushdownSerializer,
    pub size_service: Option<&'a dyn RelationSizeService>,
    pub config: &'a PushdownConfig,
}

/// A plan rewrite rule: takes a plan, returns a plan.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, plan: &Arc<PlanNode>, ctx: &RuleContext<'_>) -> Arc<PlanNode>;
}

/// The NDP pushdown rule.
pub struct NdpPushdownRule;

impl Rule for NdpPushdownRule {
    fn name(&self) -> &str {
        "NdpPushdown"
    }

    fn apply(&self, plan: &Arc<PlanNode>, ctx: &RuleContext<'_>) -> Arc<PlanNode> {
        transform(plan, ctx)
    }
}

/// Default rule set for the engine.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(NdpPushdownRule)]
}

/// Run all rules to a fix point (bounded by `max_passes`).
pub fn optimize(
    plan: &Arc<PlanNode>,
    rules: &[Box<dyn Rule>],
    ctx: &RuleContext<'_>,
) -> Arc<PlanNode> {
    let mut current = plan.clone();
    for pass in 0..ctx.config.max_passes {
        let mut next = current.clone();
        for rule in rules {
            trace!("pass {pass}: applying rule '{}'", rule.name());
            next = rule.apply(&next, ctx);
        }
        if *next == *current {
            debug!("plan stable after {pass} pass(es)");
            return current;
        }
        current = next;
    }
    debug!("hit pass limit ({})", ctx.config.max_passes);
    current
}

/// Top-down traversal: rewrite the largest matching fragment at each
/// position, otherwise recurse.
fn transform(plan: &Arc<PlanNode>, ctx: &RuleContext<'_>) -> Arc<PlanNode> {
    if let Some(replacement) = try_rewrite_at(plan, ctx) {
        return replacement;
    }
    match &**plan {
        PlanNode::Scan(_) => plan.clone(),
        PlanNode::Filter { predicates, child } => {
            let new_child = transform(child, ctx);
            if Arc::ptr_eq(&new_child, child) {
                plan.clone()
            } else {
                Arc::new(PlanNode::Filter {
                    predicates: predicates.clone(),
                    child: new_child,
                })
            }
        }
        PlanNode::Project { exprs, child } => {
            let new_child = transform(child, ctx);
            if Arc::ptr_eq(&new_child, child) {
                plan.clone()
            } else {
                Arc::new(PlanNode::Project {
                    exprs: exprs.clone(),
                    child: new_child,
                })
            }
        }
        PlanNode::Aggregate {
            group_by,
            aggregates,
            child,
        } => {
            let new_child = transform(child, ctx);
            if Arc::ptr_eq(&new_child, child) {
                plan.clone()
            } else {
                Arc::new(PlanNode::Aggregate {
                    group_by: group_by.clone(),
                    aggregates: aggregates.clone(),
                    child: new_child,
                })
            }
        }
    }
}

/// Match a rewrite-eligible fragment rooted at this node.
fn try_rewrite_at(plan: &Arc<PlanNode>, ctx: &RuleContext<'_>) -> Option<Arc<PlanNode>> {
    match &**plan {
        // Aggregate over (Project over)? Filter over Scan
        PlanNode::Aggregate {
            group_by,
            aggregates,
            child,
        } if ctx.config.enable_aggregate_pushdown => {
            let (project, filters, scan_node) = match &**child {
                PlanNode::Project { exprs, child: below } => match &**below {
                    PlanNode::Filter {
                        predicates,
                        child: grandchild,
                    } => (exprs.clone(), predicates.clone(), grandchild.clone()),
                    _ => return None,
                },
                PlanNode::Filter {
                    predicates,
                    child: below,
                } => (
                    below.output().iter().map(Expr::attr).collect(),
                    predicates.clone(),
                    below.clone(),
                ),
                _ => return None,
            };
            let scan = scan_node.as_scan()?;
            if !gate::can_handle_plan(&project, &filters, &scan_node, false) {
                return None;
            }
            aggregate::rewrite_aggregate(group_by, aggregates, &project, &filters, scan, ctx)
        }
        // Project over Filter over Scan
        PlanNode::Project { exprs, child } => {
            let PlanNode::Filter {
                predicates,
                child: grandchild,
            } = &**child
            else {
                return None;
            };
            let scan = grandchild.as_scan()?;
            if !gate::can_handle_plan(exprs, predicates, grandchild, false) {
                return None;
            }
            rewrite::rewrite_fragment(exprs, predicates, scan, ctx, false)
        }
        // Filter directly over Scan: the projection is the scan's own output
        PlanNode::Filter { predicates, child } => {
            let scan = child.as_scan()?;
            let project: Vec<Expr> = child.output().iter().map(Expr::attr).collect();
            if !gate::can_handle_plan(&project, predicates, child, false) {
                return None;
            }
            rewrite::rewrite_fragment(&project, predicates, scan, ctx, false)
        }
        _ => None,
    }
}

/// Best-effort rewrite of one fragment for speculative size estimation.
///
/// Bypasses the resolution checks of the eligibility gate (`always_inject`)
/// and marks the resulting remote relation for re-estimation, so a later
/// regular pass may still rewrite it properly.
pub fn speculative_rewrite(
    project: &[Expr],
    filters: &[Expr],
    child: &Arc<PlanNode>,
    ctx: &RuleContext<'_>,
) -> Option<Arc<PlanNode>> {
    let scan = child.as_scan()?;
    if !gate::can_handle_plan(project, filters, child, true) {
        return None;
    }
    rewrite::rewrite_fragment(project, filters, scan, ctx, true)
}
