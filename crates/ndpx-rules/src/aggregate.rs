//! # Aggregate Validation and Two-Stage Rewrite
//!
//! ## Validation
//!
//! An aggregate node is eligible for remote computation only when every one
//! of its constituent aggregate calls passes: MIN, MAX, SUM, and
//! single-argument COUNT are supported (COUNT is modeled for pushdown as a
//! remote SUM over the same argument), the argument must be built purely
//! from column references, literals, and the four binary arithmetic
//! operators, and neither DISTINCT nor a FILTER clause may be present -- the
//! remote tier's aggregate path has no filtered-aggregate concept. One
//! failing call disqualifies the whole node.
//!
//! ## Deduplication
//!
//! Duplicate aggregate calls (by canonical form) are deduplicated and
//! assigned a stable output ordinal by a pure fold, so `max(a) + 1` and
//! `max(a) + 2` share one underlying remote `max(a)`. No counter state
//! escapes the fold; the ordinal map is returned alongside the deduplicated
//! list.
//!
//! ## Two-stage rewrite
//!
//! The rewrite produces a remote partial aggregate (per-partition partial
//! results, serialized into the relation's options) and a local top
//! aggregate recombining them: SUM of partial SUMs, MIN of partial MINs,
//! MAX of partial MAXs, and SUM of partial COUNTs. Aliases introduced by
//! the projection under the aggregate are substituted structurally on the
//! expression tree before serialization, so remote references line up with
//! renamed columns without text-level find/replace on the generated JSON.
//!
//! The whole path is gated behind
//! [`PushdownConfig::enable_aggregate_pushdown`](crate::driver::PushdownConfig),
//! default off.

use crate::classify::{classify_filters, PushdownStatus};
use crate::driver::RuleContext;
use crate::estimate::SizeEstimator;
use crate::relation::RelationArgs;
use crate::resolve::resolve_attribute;
use ndpx_core::expr::{AggExpr, AggFunc, AttrId, Expr};
use ndpx_core::options::keys;
use ndpx_core::plan::{AggregateItem, PlanNode, RemoteRelation, ScanNode, ScanSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Is this aggregate node, as a whole, eligible for remote computation?
pub fn validate_aggregate_set(group_by: &[Expr], aggregates: &[AggregateItem]) -> bool {
    if !group_by.iter().all(|e| resolve_attribute(e).is_ok()) {
        return false;
    }
    aggregates.iter().all(|item| {
        let calls = item.expr.aggregate_calls();
        if calls.is_empty() {
            // a passthrough of a group-by column is fine; anything else is
            // an expression the remote aggregate cannot produce
            return resolve_attribute(&item.expr).is_ok();
        }
        calls.into_iter().all(valid_call) && combining_shape_ok(&item.expr)
    })
}

fn valid_call(agg: &AggExpr) -> bool {
    if agg.filter.is_some() || agg.distinct {
        return false;
    }
    match agg.func {
        AggFunc::Min | AggFunc::Max | AggFunc::Sum | AggFunc::Count => arithmetic_only(&agg.arg),
        AggFunc::Avg => false,
    }
}

/// The argument grammar: column references, literals, and the four binary
/// arithmetic operators. Logical operators, branching, and user-defined
/// functions all fail.
fn arithmetic_only(expr: &Expr) -> bool {
    match expr {
        Expr::Attribute(_) | Expr::Literal(_) => true,
        Expr::Alias { child, .. } | Expr::Cast { child, .. } => arithmetic_only(child),
        Expr::BinaryOp { op, left, right } if op.is_arithmetic() => {
            arithmetic_only(left) && arithmetic_only(right)
        }
        _ => false,
    }
}

/// The expression *around* embedded aggregate calls must itself be
/// arithmetic so the local stage can recombine partial results.
fn combining_shape_ok(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate(_) | Expr::Attribute(_) | Expr::Literal(_) => true,
        Expr::Alias { child, .. } | Expr::Cast { child, .. } => combining_shape_ok(child),
        Expr::BinaryOp { op, left, right } if op.is_arithmetic() => {
            combining_shape_ok(left) && combining_shape_ok(right)
        }
        _ => false,
    }
}

/// Deduplicate aggregate calls by canonical form and assign stable output
/// ordinals. Pure fold: the ordinal mapping is built and returned, no
/// external counter.
pub fn dedup_aggregates(aggregates: &[AggregateItem]) -> (Vec<AggExpr>, HashMap<AggExpr, usize>) {
    aggregates
        .iter()
        .flat_map(|item| item.expr.aggregate_calls())
        .fold(
            (Vec::new(), HashMap::new()),
            |(mut deduped, mut ordinals), call| {
                let canonical = call.canonical();
                if !ordinals.contains_key(&canonical) {
                    ordinals.insert(canonical, deduped.len());
                    deduped.push(call.clone());
                }
                (deduped, ordinals)
            },
        )
}

/// Rewrite an Aggregate(→Project)→Filter→Scan fragment into a local top
/// aggregate over a remote partial aggregate. Declines (`None`) whenever
/// validation, classification, or serialization does not fully succeed --
/// a partially-delegated aggregate has no correct local recombination.
#[allow(clippy::too_many_arguments)]
pub fn rewrite_aggregate(
    group_by: &[Expr],
    aggregates: &[AggregateItem],
    project: &[Expr],
    filters: &[Expr],
    scan: &ScanNode,
    ctx: &RuleContext<'_>,
) -> Option<Arc<PlanNode>> {
    if !validate_aggregate_set(group_by, aggregates) {
        trace!("aggregate set not eligible for remote computation");
        return None;
    }
    // Aggregate pushdown folds the filter into the remote stage; anything
    // less than fully-valid filters would make the partial results wrong.
    if classify_filters(filters, ctx.serializer) != PushdownStatus::FullyValid {
        trace!("filters not fully delegable, skipping aggregate pushdown");
        return None;
    }
    let args = RelationArgs::from_scan(scan)?;

    // Structural alias substitution: projection aliases are replaced by
    // their underlying column names on the expression tree itself, before
    // anything is serialized.
    let aliases = alias_substitutions(project);
    let substitute =
        |e: &Expr| e.rewrite_attributes(&|a| match aliases.get(&a.id) {
            Some(name) => a.renamed(name.clone()),
            None => a.clone(),
        });
    let group_by_sub: Vec<Expr> = group_by.iter().map(&substitute).collect();
    let filters_sub: Vec<Expr> = filters.iter().map(&substitute).collect();

    let (deduped, ordinals) = dedup_aggregates(aggregates);
    let partial: Vec<AggExpr> = deduped
        .iter()
        .map(|call| {
            let canonical = call.canonical();
            AggExpr {
                arg: substitute(&canonical.arg),
                ..canonical
            }
        })
        .collect();

    let remote_schema = ctx.serializer.aggregate_schema(&partial, &group_by_sub);
    let group_width = group_by.len();
    if remote_schema.len() != group_width + partial.len() {
        debug!("serializer returned inconsistent aggregate schema, skipping");
        return None;
    }

    let aggregate_json = match ctx
        .serializer
        .aggregate_to_json(&group_by_sub, &partial, &remote_schema, false)
    {
        Ok(json) => json,
        Err(err) => {
            debug!("aggregate serialization failed ({err}), skipping");
            return None;
        }
    };
    // Filters re-rendered with aliases substituted, carried on the remote
    // relation so the remote tier applies them before the partial aggregate.
    let filters_top_json = match ctx.serializer.filters_to_json(&filters_sub, &remote_schema) {
        Ok(json) => json,
        Err(err) => {
            debug!("top-aggregate filter serialization failed ({err}), skipping");
            return None;
        }
    };

    let mut options = scan.options.clone();
    options.set(keys::PATH, args.location.clone());
    options.set(keys::FORMAT, crate::rewrite::REMOTE_FORMAT);
    options.set(keys::OUTPUT_FORMAT, crate::rewrite::REMOTE_OUTPUT_FORMAT);
    options.set(keys::NDP_JSON_AGGREGATE, aggregate_json);
    options.set(keys::NDP_JSON_FILTERS_TOP, filters_top_json);
    let read_names: Vec<&str> = remote_schema.iter().map(|a| a.name.as_str()).collect();
    options.set(keys::NDP_PROJECT_COLUMNS, read_names.join(","));
    options.set(
        keys::NDP_PROJECT_JSON,
        serde_json::to_string(&read_names).unwrap_or_default(),
    );
    if let Some(id) = &ctx.config.processor_id {
        options.set(keys::PROCESSOR_ID, id.clone());
    }

    let estimator = SizeEstimator::new(ctx.catalog, ctx.size_service);
    let estimate = estimator.estimate_fragment(&args, &remote_schema, &[], filters);

    debug!(
        "pushing down partial aggregate at {} ({} remote aggregates, {} groups)",
        args.location,
        partial.len(),
        group_width
    );

    let remote = Arc::new(PlanNode::Scan(ScanNode {
        source: ScanSource::Remote(RemoteRelation {
            schema: remote_schema.clone(),
            options: options.clone(),
            estimate_only: false,
        }),
        output: remote_schema.clone(),
        schema: remote_schema.clone(),
        options,
        table: scan.table.clone(),
        estimate: Some(estimate),
    }));

    // Local top stage: recombine partial results. Each original aggregate
    // call is replaced by a combining call over the partial output column
    // at its ordinal.
    let partial_cols = &remote_schema[group_width..];
    let top_items: Vec<AggregateItem> = aggregates
        .iter()
        .map(|item| AggregateItem {
            id: item.id,
            name: item.name.clone(),
            expr: replace_aggregate_calls(&item.expr, &|call| {
                let ordinal = ordinals[&call.canonical()];
                let combine = match call.func {
                    AggFunc::Min => AggFunc::Min,
                    AggFunc::Max => AggFunc::Max,
                    // SUM and count-as-sum both recombine by summation
                    AggFunc::Sum | AggFunc::Count => AggFunc::Sum,
                    AggFunc::Avg => unreachable!("rejected by validation"),
                };
                Expr::Aggregate(Box::new(AggExpr::new(
                    combine,
                    Expr::attr(&partial_cols[ordinal]),
                )))
            }),
        })
        .collect();

    let top_group_by: Vec<Expr> = remote_schema[..group_width]
        .iter()
        .map(Expr::attr)
        .collect();

    Some(Arc::new(PlanNode::Aggregate {
        group_by: top_group_by,
        aggregates: top_items,
        child: remote,
    }))
}

/// Map from attribute id to the underlying column name for every alias the
/// projection introduces.
fn alias_substitutions(project: &[Expr]) -> HashMap<AttrId, String> {
    let mut map = HashMap::new();
    for expr in project {
        if let Expr::Alias { child, .. } = expr {
            if let Ok(inner) = resolve_attribute(child) {
                map.insert(inner.id, inner.name);
            }
        }
    }
    map
}

/// Structurally replace every embedded aggregate call.
fn replace_aggregate_calls(expr: &Expr, f: &impl Fn(&AggExpr) -> Expr) -> Expr {
    match expr {
        Expr::Aggregate(call) => f(call),
        Expr::Attribute(_) | Expr::Literal(_) => expr.clone(),
        Expr::Alias { name, child } => Expr::Alias {
            name: name.clone(),
            child: Box::new(replace_aggregate_calls(child, f)),
        },
        Expr::Cast { to, child } => Expr::Cast {
            to: *to,
            child: Box::new(replace_aggregate_calls(child, f)),
        },
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op: *op,
            left: Box::new(replace_aggregate_calls(left, f)),
            right: Box::new(replace_aggregate_calls(right, f)),
        },
        Expr::UnaryOp { op, operand } => Expr::UnaryOp {
            op: *op,
            operand: Box::new(replace_aggregate_calls(operand, f)),
        },
        other => other.clone(),
    }
}
