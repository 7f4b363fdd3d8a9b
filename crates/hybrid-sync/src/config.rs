//! Runtime configuration for a [`HybridWorld`](crate::world::HybridWorld).

use serde::{Deserialize, Serialize};

use hybrid_ecs::archetype_cache::CacheConfig;
use hybrid_ecs::handle_table::TableConfig;

use crate::SyncError;

/// Every field falls back to its default when missing from the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub cache: CacheConfig,
    /// Sizing of the transform container.
    pub container: TableConfig,
}

impl HybridConfig {
    /// Parse a JSON document such as
    /// `{"cache": {"verify_component_sets": true}, "container": {"min_parallel_len": 256}}`.
    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(json)?)
    }
}
