//! # Relation Descriptor
//!
//! [`RelationArgs`] is a read-only view of a scan node, derived once per
//! rewrite invocation by inspecting the scan's concrete source kind. Three
//! kinds are recognized: the columnar-file scan, the generic
//! filesystem-backed relation, and the engine's own remote relation. An
//! unrecognized kind yields `None` and the fragment is skipped -- derivation
//! is an exhaustive match, not a downcast that can throw.

use ndpx_core::catalog::TableRef;
use ndpx_core::expr::AttributeRef;
use ndpx_core::options::{keys, OptionMap};
use ndpx_core::plan::{ScanNode, ScanSource};

/// Read-only view of a scan used throughout one rewrite.
pub struct RelationArgs<'a> {
    /// Resource locator of the underlying data.
    pub location: String,
    /// The scan node this view was derived from.
    pub scan: &'a ScanNode,
    /// Attributes the scan emits.
    pub output: &'a [AttributeRef],
    /// Full schema of the underlying data.
    pub schema: &'a [AttributeRef],
    /// Options already attached to the relation.
    pub options: &'a OptionMap,
    /// Catalog handle, when registered.
    pub table: Option<&'a TableRef>,
}

impl<'a> RelationArgs<'a> {
    /// Derive the descriptor from a scan, or `None` when the relation kind
    /// is unrecognized.
    pub fn from_scan(scan: &'a ScanNode) -> Option<Self> {
        let location = match &scan.source {
            ScanSource::ParquetFile { location } | ScanSource::Filesystem { location } => {
                location.clone()
            }
            ScanSource::Remote(rel) => rel
                .options
                .get(keys::PATH)
                .unwrap_or_default()
                .to_string(),
            ScanSource::Opaque { .. } => return None,
        };
        Some(Self {
            location,
            scan,
            output: &scan.output,
            schema: &scan.schema,
            options: &scan.options,
            table: scan.table.as_ref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndpx_core::expr::DataType;

    #[test]
    fn opaque_source_is_not_described() {
        let scan = ScanNode {
            source: ScanSource::Opaque {
                description: "jdbc view".into(),
            },
            output: vec![AttributeRef::new(1, "a", DataType::Int64, true)],
            schema: vec![AttributeRef::new(1, "a", DataType::Int64, true)],
            options: OptionMap::new(),
            table: None,
            estimate: None,
        };
        assert!(RelationArgs::from_scan(&scan).is_none());
    }
}
