//! Curated premade model catalogs

use serde::Serialize;

use crate::request::ComputeType;

/// One curated model
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Key operators use in requests (e.g. `llama3.2:3b`)
    pub key: &'static str,
    /// Human readable name
    pub display_name: &'static str,
    /// Name the server reports for the model
    pub model_name: &'static str,
    /// Image with the model baked in
    pub image: &'static str,
    /// Compute type the model is sized for
    pub compute_type: ComputeType,
    /// Minimum GPUs per worker on GPU compute
    pub min_gpus: u32,
}

/// A provider's curated model list
#[derive(Clone, Copy, Debug)]
pub struct ModelCatalog {
    entries: &'static [CatalogEntry],
}

impl ModelCatalog {
    /// Wrap a static entry list
    pub const fn new(entries: &'static [CatalogEntry]) -> Self {
        Self { entries }
    }

    /// Every entry, in catalog order
    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<&'static CatalogEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Reverse lookup by container image
    ///
    /// Tags are compared exactly; a digest-pinned or re-tagged image does not
    /// match.
    pub fn find_by_image(&self, image: &str) -> Option<&'static CatalogEntry> {
        self.entries.iter().find(|e| e.image == image)
    }

    /// Minimum GPUs for a key, if the entry asks for more than one
    pub fn min_gpus(&self, key: &str) -> Option<u32> {
        self.get(key).map(|e| e.min_gpus).filter(|n| *n > 0)
    }
}
