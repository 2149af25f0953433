//! # Relation Option Map
//!
//! The option map is the wire contract handed to the remote storage/compute
//! tier: a string-keyed, string-valued map attached to the remote relation.
//! Required keys locate and describe the source (`path`, `format`,
//! `outputFormat`); optional keys carry serialized pushdown directives.
//!
//! Keys are **additive**: a fragment may be rewritten more than once in
//! nested contexts, and existing keys (including prior pushdown directives)
//! must survive later rewrites. `merge` therefore never removes entries, and
//! `set` on an existing key is an intentional overwrite by the caller.
//!
//! A `BTreeMap` keeps iteration and serialization order deterministic, which
//! the serializer contract requires for idempotent rewrites.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known option keys understood by the remote tier.
pub mod keys {
    /// Resource locator of the underlying data.
    pub const PATH: &str = "path";
    /// Source file format tag.
    pub const FORMAT: &str = "format";
    /// Result encoding requested from the remote tier.
    pub const OUTPUT_FORMAT: &str = "outputFormat";
    /// Serialized filter set (JSON) for the remote scan.
    pub const NDP_JSON_FILTERS: &str = "ndpjsonfilters";
    /// Serialized aggregate (JSON) for the remote partial aggregate.
    pub const NDP_JSON_AGGREGATE: &str = "ndpjsonaggregate";
    /// Filter set (JSON) re-rendered against the aggregate's output
    /// columns, carried on the remote relation and applied by the remote
    /// tier before the partial aggregate.
    pub const NDP_JSON_FILTERS_TOP: &str = "ndpjsonfilterstop";
    /// Serialized projection (JSON).
    pub const NDP_PROJECT_JSON: &str = "ndpprojectjson";
    /// Comma-separated projection column names.
    pub const NDP_PROJECT_COLUMNS: &str = "ndpprojectcolumns";
    /// Remote query text rendering of the pushed filter set.
    pub const NDP_QUERY_TEXT: &str = "ndpquerytext";
    /// Identifier of the remote processor handling this relation.
    pub const PROCESSOR_ID: &str = "processorid";
}

/// String-to-string option map carried on a remote relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionMap(BTreeMap<String, String>);

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy all entries from `other`, overwriting on key collision. Existing
    /// keys absent from `other` are preserved (additive contract).
    pub fn merge(&mut self, other: &OptionMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for OptionMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_existing_keys() {
        let mut base = OptionMap::new();
        base.set(keys::NDP_JSON_FILTERS, "{\"filters\":[]}");
        base.set(keys::PATH, "old");

        let mut update = OptionMap::new();
        update.set(keys::PATH, "hdfs://data/t.parquet");
        update.set(keys::FORMAT, "parquet");

        base.merge(&update);
        assert_eq!(base.get(keys::PATH), Some("hdfs://data/t.parquet"));
        assert_eq!(base.get(keys::FORMAT), Some("parquet"));
        // prior directive survives the second rewrite
        assert_eq!(base.get(keys::NDP_JSON_FILTERS), Some("{\"filters\":[]}"));
    }
}
