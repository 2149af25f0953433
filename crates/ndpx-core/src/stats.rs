//! # Statistics and Size Estimation
//!
//! Table and column statistics, plus the statistics visitor that estimates
//! the row count and byte size of a plan fragment. The rewriter attaches the
//! visitor's estimates to rewritten scans so the host's cost-based optimizer
//! keeps making valid choices downstream.
//!
//! ## Derivation
//!
//! - **Scan**: rows from table statistics; bytes are rows times the summed
//!   per-column width of the attributes actually read, so estimated size is
//!   monotonic in column count.
//! - **Filter**: rows scaled by a default per-conjunct selectivity, floored
//!   at one row.
//! - **Project**: rows unchanged; bytes scaled by the output/input width
//!   ratio.
//! - **Aggregate**: one row for a global aggregate, otherwise the default
//!   group-reduction factor applied to input rows.
//!
//! When the catalog has no statistics for a scanned relation, the visitor
//! consults the optional [`RelationSizeService`] collaborator for the raw
//! storage size and derives rows from the average row width. The collaborator
//! call is deadline-bounded by its implementation; on failure the visitor
//! falls back to fixed defaults rather than aborting.

use crate::catalog::Catalog;
use crate::expr::AttributeRef;
use crate::plan::{Estimate, PlanNode, ScanNode, ScanSource};
use crate::remote::RelationSizeService;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default selectivity applied per filter conjunct when no better estimate
/// is available.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Row count assumed for relations with no statistics and no reachable
/// storage size.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;

/// Statistics for a relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    /// Raw size on storage, when the metastore recorded one. Checked before
    /// falling back to the external size helper.
    pub storage_size: Option<u64>,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            storage_size: None,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    pub fn with_storage_size(mut self, bytes: u64) -> Self {
        self.storage_size = Some(bytes);
        self
    }
}

/// Per-column statistics used for width and selectivity estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL, in [0.0, 1.0].
    pub null_fraction: f64,
    /// Average size of a single value in bytes.
    pub avg_size_bytes: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            avg_size_bytes: 8.0,
        }
    }

    pub fn with_avg_size(mut self, bytes: f64) -> Self {
        self.avg_size_bytes = bytes;
        self
    }
}

/// Estimates row counts and byte sizes for plan fragments.
pub struct StatsVisitor<'a> {
    catalog: &'a dyn Catalog,
    size_service: Option<&'a dyn RelationSizeService>,
}

impl<'a> StatsVisitor<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            size_service: None,
        }
    }

    pub fn with_size_service(mut self, service: &'a dyn RelationSizeService) -> Self {
        self.size_service = Some(service);
        self
    }

    /// Estimate the output of a plan fragment, bottom-up.
    pub fn estimate(&self, plan: &PlanNode) -> Estimate {
        match plan {
            PlanNode::Scan(scan) => self.estimate_scan(scan),
            PlanNode::Filter { predicates, child } => {
                let input = self.estimate(child);
                let selectivity = DEFAULT_FILTER_SELECTIVITY.powi(predicates.len() as i32);
                let row_count = (input.row_count * selectivity).max(1.0);
                let ratio = if input.row_count > 0.0 {
                    row_count / input.row_count
                } else {
                    1.0
                };
                Estimate {
                    row_count,
                    size_bytes: input.size_bytes * ratio,
                }
            }
            PlanNode::Project { child, .. } => {
                let input = self.estimate(child);
                let in_width = row_width_from_attrs(&child.output());
                let out_width = row_width_from_attrs(&plan.output());
                let ratio = if in_width > 0.0 {
                    out_width / in_width
                } else {
                    1.0
                };
                Estimate {
                    row_count: input.row_count,
                    size_bytes: input.size_bytes * ratio,
                }
            }
            PlanNode::Aggregate { group_by, child, .. } => {
                let input = self.estimate(child);
                let row_count = if group_by.is_empty() {
                    1.0
                } else {
                    (input.row_count * DEFAULT_FILTER_SELECTIVITY).max(1.0)
                };
                Estimate {
                    row_count,
                    // rough per-group output width
                    size_bytes: row_count * 100.0,
                }
            }
        }
    }

    fn estimate_scan(&self, scan: &ScanNode) -> Estimate {
        // A rewritten remote scan already carries the estimate computed when
        // it was synthesized; its row count already reflects remote
        // filtering. Re-estimation with a narrower output scales bytes by
        // the width ratio but never re-derives rows.
        if let ScanSource::Remote(rel) = &scan.source {
            if let Some(est) = scan.estimate {
                let full_width = row_width_from_attrs(&rel.schema);
                let read_width = row_width_from_attrs(&scan.output);
                let ratio = if full_width > 0.0 && read_width > 0.0 {
                    read_width / full_width
                } else {
                    1.0
                };
                return Estimate {
                    row_count: est.row_count,
                    size_bytes: est.size_bytes * ratio,
                };
            }
        }

        if let Some(stats) = scan.table.as_ref().and_then(|t| self.catalog.table_stats(t)) {
            let width = row_width(&scan.output, &stats);
            // The recorded on-storage size, when present, beats the derived
            // rows-times-width figure; scale it by the fraction of the row
            // actually read.
            let size_bytes = match stats.storage_size {
                Some(bytes) => {
                    let full_width = row_width(&scan.schema, &stats).max(1.0);
                    bytes as f64 * (width / full_width)
                }
                None => stats.row_count * width,
            };
            return Estimate {
                row_count: stats.row_count,
                size_bytes,
            };
        }

        // No catalog entry: ask the size collaborator for raw storage bytes
        // and scale by the fraction of columns read.
        if let Some(service) = self.size_service {
            if let Some(location) = scan_location(scan) {
                match service.storage_size(location) {
                    Ok(bytes) => {
                        let full_width = row_width_from_attrs(&scan.schema).max(1.0);
                        let read_width = row_width_from_attrs(&scan.output);
                        let size_bytes = bytes as f64 * (read_width / full_width);
                        let row_count = (bytes as f64 / full_width).max(1.0);
                        return Estimate {
                            row_count,
                            size_bytes,
                        };
                    }
                    Err(err) => {
                        tracing::debug!("size lookup failed for scan: {err}");
                    }
                }
            }
        }

        Estimate {
            row_count: DEFAULT_ROW_COUNT,
            size_bytes: DEFAULT_ROW_COUNT * row_width_from_attrs(&scan.output),
        }
    }
}

/// Storage location of a scan, for size lookups.
pub fn scan_location(scan: &ScanNode) -> Option<&str> {
    match &scan.source {
        ScanSource::ParquetFile { location } | ScanSource::Filesystem { location } => {
            Some(location.as_str())
        }
        ScanSource::Remote(rel) => rel.options.get(crate::options::keys::PATH),
        ScanSource::Opaque { .. } => None,
    }
}

/// Average row width over the given attributes, preferring column
/// statistics and falling back to per-type defaults.
pub fn row_width(attrs: &[AttributeRef], stats: &Statistics) -> f64 {
    attrs
        .iter()
        .map(|a| {
            stats
                .column_stats
                .get(&a.name)
                .map(|c| c.avg_size_bytes)
                .unwrap_or_else(|| a.data_type.default_width())
        })
        .sum()
}

/// Row width from declared types alone.
pub fn row_width_from_attrs(attrs: &[AttributeRef]) -> f64 {
    attrs.iter().map(|a| a.data_type.default_width()).sum()
}
