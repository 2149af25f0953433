//! # Relation Rewriter
//!
//! The central rewrite algorithm. Given an eligible Scan→Filter(→Project)
//! fragment, it synthesizes a remote relation carrying only the attributes
//! actually needed, attaches serialized pushdown directives as string-valued
//! options, and reconstructs Filter/Project nodes around it only when the
//! remote tier could not fully absorb them.
//!
//! ## Degradation, never failure
//!
//! Every classification or serialization failure degrades to "do not push
//! down this fragment" (or to pushing a smaller portion), preserving the
//! original plan's semantics at the cost of performance. The one exception
//! is a structural mismatch during mandatory attribute mapping -- a column
//! referenced by the fragment that does not exist in the scan's schema --
//! which indicates a malformed input plan and is surfaced as a
//! distinguishable [`RewriteError::Internal`] (logged, fragment skipped)
//! rather than silently producing a wrong plan.

use crate::classify::{classify_filters, PushdownStatus};
use crate::driver::RuleContext;
use crate::estimate::SizeEstimator;
use crate::relation::RelationArgs;
use crate::resolve::resolve_attributes;
use ndpx_core::expr::{AttributeRef, Expr};
use ndpx_core::options::keys;
use ndpx_core::plan::{PlanNode, RemoteRelation, ScanNode, ScanSource};
use std::sync::Arc;
use tracing::{debug, trace};

/// Source format tag handed to the remote tier.
pub const REMOTE_FORMAT: &str = "parquet";
/// Result encoding requested from the remote tier.
pub const REMOTE_OUTPUT_FORMAT: &str = "binary";

/// Structural bug in the input plan, distinguishable from the ordinary
/// "unsupported, fall back" path.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Rewrite one fragment, or decline (`None`) leaving the plan unmodified.
///
/// `project` is the projection list requested above the filter (the scan's
/// own output when the fragment has no Project node). `always_inject`
/// requests a best-effort rewrite for speculative size estimation; the
/// resulting remote relation carries the re-estimate marker so a later pass
/// may rewrite it again.
pub fn rewrite_fragment(
    project: &[Expr],
    filters: &[Expr],
    scan: &ScanNode,
    ctx: &RuleContext<'_>,
    always_inject: bool,
) -> Option<Arc<PlanNode>> {
    match try_rewrite(project, filters, scan, ctx, always_inject) {
        Ok(result) => result,
        Err(err) => {
            // A malformed fragment is a bug upstream; skipping it keeps the
            // original plan correct.
            debug!("declining rewrite: {err}");
            None
        }
    }
}

fn try_rewrite(
    project: &[Expr],
    filters: &[Expr],
    scan: &ScanNode,
    ctx: &RuleContext<'_>,
    always_inject: bool,
) -> Result<Option<Arc<PlanNode>>, RewriteError> {
    let Some(args) = RelationArgs::from_scan(scan) else {
        trace!("unrecognized relation kind, fragment skipped");
        return Ok(None);
    };

    let mut status = classify_filters(filters, ctx.serializer);

    // The portion of the filter set handed to the remote tier.
    let mut pushed: Vec<Expr> = match status {
        PushdownStatus::FullyValid => filters.to_vec(),
        PushdownStatus::PartiallyValid => ctx
            .serializer
            .supported_filters(filters)
            .into_iter()
            .zip(filters.iter())
            .filter_map(|(ok, f)| ok.then(|| f.clone()))
            .collect(),
        PushdownStatus::Invalid => Vec::new(),
    };

    // Attributes needed by the projection, mapped back to the scan's own
    // schema (alias resolution keeps alias names; the remote tier reads the
    // underlying columns). When projection resolution fails the fragment is
    // still eligible through its filters, so fall back to the scan's full
    // output.
    let project_read = match resolve_attributes(project) {
        Ok(attrs) => map_to_schema(&attrs, scan)?,
        Err(err) => {
            trace!("projection not resolvable ({err}), reading full scan output");
            scan.output.clone()
        }
    };

    // Every column the original predicates reference: a residual local
    // filter re-applies the full filter set, so the remote relation must
    // produce all of them whenever pushdown is not fully valid.
    let filter_referenced: Vec<AttributeRef> = filters
        .iter()
        .flat_map(|f| f.attributes())
        .cloned()
        .collect();
    let filter_read = map_to_schema(&filter_referenced, scan)?;

    // Serialize directives up front; any serializer failure degrades to
    // Invalid (neutral directive, local filter retained) before the read
    // schema is fixed.
    let mut query_text = None;
    let mut filters_json = None;
    if !pushed.is_empty() {
        let text = ctx
            .serializer
            .filters_to_query_text(&scan.schema, &pushed, &project_read);
        let json = ctx.serializer.filters_to_json(&pushed, &scan.schema);
        match (text, json) {
            (Ok(text), Ok(json)) => {
                query_text = Some(text);
                filters_json = Some(json);
            }
            (text, json) => {
                let err = text.err().or(json.err()).map(|e| e.to_string());
                debug!(
                    "serializer declined filter set ({}), falling back to local filtering",
                    err.unwrap_or_default()
                );
                status = PushdownStatus::Invalid;
                pushed.clear();
            }
        }
    }

    // Minimal read schema: with fully absorbed filters only the projection
    // attributes are needed (filter attributes are implied by the pushed
    // predicate); otherwise filter attributes are read explicitly for the
    // residual local filter.
    let mut read_schema = dedup_attrs(&project_read);
    if status != PushdownStatus::FullyValid {
        for a in &filter_read {
            if !read_schema.contains(a) {
                read_schema.push(a.clone());
            }
        }
    }
    if read_schema.is_empty() {
        trace!("empty read schema, nothing to delegate");
        return Ok(None);
    }

    let mut options = scan.options.clone();
    options.set(keys::PATH, args.location.clone());
    options.set(keys::FORMAT, REMOTE_FORMAT);
    options.set(keys::OUTPUT_FORMAT, REMOTE_OUTPUT_FORMAT);
    let read_names: Vec<&str> = read_schema.iter().map(|a| a.name.as_str()).collect();
    options.set(keys::NDP_PROJECT_COLUMNS, read_names.join(","));
    options.set(
        keys::NDP_PROJECT_JSON,
        serde_json::to_string(&read_names).unwrap_or_default(),
    );
    if let Some(id) = &ctx.config.processor_id {
        options.set(keys::PROCESSOR_ID, id.clone());
    }
    if let Some(text) = query_text {
        options.set(keys::NDP_QUERY_TEXT, text);
    }
    if let Some(json) = filters_json {
        options.set(keys::NDP_JSON_FILTERS, json);
    }

    let estimator = SizeEstimator::new(ctx.catalog, ctx.size_service);
    let filter_extra: &[AttributeRef] = if status == PushdownStatus::FullyValid {
        &[]
    } else {
        &filter_read
    };
    let estimate = estimator.estimate_fragment(&args, &read_schema, filter_extra, filters);

    debug!(
        "pushing down scan at {} ({:?}, {} columns, ~{:.0} rows)",
        args.location,
        status,
        read_schema.len(),
        estimate.row_count
    );

    let remote = Arc::new(PlanNode::Scan(ScanNode {
        source: ScanSource::Remote(RemoteRelation {
            schema: read_schema.clone(),
            options: options.clone(),
            // Marker is the negation of "needs further pushdown": a
            // speculative rewrite stays open for one more pass.
            estimate_only: always_inject,
        }),
        output: read_schema.clone(),
        schema: read_schema,
        options,
        table: scan.table.clone(),
        estimate: Some(estimate),
    }));

    // Even partially-pushed filters are re-checked locally: the residual
    // Filter applies the full original predicate set.
    let filtered = if status == PushdownStatus::FullyValid {
        remote
    } else {
        Arc::new(PlanNode::Filter {
            predicates: filters.to_vec(),
            child: remote,
        })
    };

    // Restore the requested output shape only when it differs; a no-op
    // projection would just be churn.
    let requested: Option<Vec<AttributeRef>> =
        project.iter().map(|e| e.output_attribute()).collect();
    let result = match requested {
        Some(req) if shapes_match(&req, &filtered.output()) => filtered,
        _ => Arc::new(PlanNode::Project {
            exprs: project.to_vec(),
            child: filtered,
        }),
    };
    Ok(Some(result))
}

/// Map resolved attributes back to the scan's schema entries by id,
/// deduplicated in first-seen order. A reference to a column absent from
/// the schema is a structural bug in the input plan.
fn map_to_schema(
    attrs: &[AttributeRef],
    scan: &ScanNode,
) -> Result<Vec<AttributeRef>, RewriteError> {
    let mut out: Vec<AttributeRef> = Vec::with_capacity(attrs.len());
    for a in attrs {
        let mapped = scan
            .schema
            .iter()
            .find(|s| s.id == a.id)
            .ok_or_else(|| {
                RewriteError::Internal(format!(
                    "attribute {a} not found in scan schema during re-projection"
                ))
            })?;
        if !out.contains(mapped) {
            out.push(mapped.clone());
        }
    }
    Ok(out)
}

fn dedup_attrs(attrs: &[AttributeRef]) -> Vec<AttributeRef> {
    let mut out: Vec<AttributeRef> = Vec::with_capacity(attrs.len());
    for a in attrs {
        if !out.contains(a) {
            out.push(a.clone());
        }
    }
    out
}

/// Same attributes, same names, same order.
fn shapes_match(requested: &[AttributeRef], current: &[AttributeRef]) -> bool {
    requested.len() == current.len()
        && requested
            .iter()
            .zip(current.iter())
            .all(|(r, c)| r.id == c.id && r.name == c.name)
}
