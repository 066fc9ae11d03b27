//! Premade AIKit images published for KAITO

use crate::catalog::{CatalogEntry, ModelCatalog};
use crate::request::ComputeType;

const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry {
        key: "llama3.2:1b",
        display_name: "Llama 3.2 1B Instruct",
        model_name: "llama-3.2-1b-instruct",
        image: "ghcr.io/kaito-project/aikit/llama3.2:1b",
        compute_type: ComputeType::Cpu,
        min_gpus: 0,
    },
    CatalogEntry {
        key: "llama3.2:3b",
        display_name: "Llama 3.2 3B Instruct",
        model_name: "llama-3.2-3b-instruct",
        image: "ghcr.io/kaito-project/aikit/llama3.2:3b",
        compute_type: ComputeType::Cpu,
        min_gpus: 0,
    },
    CatalogEntry {
        key: "llama3.1:8b",
        display_name: "Llama 3.1 8B Instruct",
        model_name: "llama-3.1-8b-instruct",
        image: "ghcr.io/kaito-project/aikit/llama3.1:8b",
        compute_type: ComputeType::Gpu,
        min_gpus: 1,
    },
    CatalogEntry {
        key: "phi3.5:3.8b",
        display_name: "Phi 3.5 Mini Instruct",
        model_name: "phi-3.5-3.8b-instruct",
        image: "ghcr.io/kaito-project/aikit/phi3.5:3.8b",
        compute_type: ComputeType::Cpu,
        min_gpus: 0,
    },
    CatalogEntry {
        key: "gemma2:2b",
        display_name: "Gemma 2 2B Instruct",
        model_name: "gemma-2-2b-instruct",
        image: "ghcr.io/kaito-project/aikit/gemma2:2b",
        compute_type: ComputeType::Cpu,
        min_gpus: 0,
    },
    CatalogEntry {
        key: "mixtral:8x7b",
        display_name: "Mixtral 8x7B Instruct",
        model_name: "mixtral-8x7b-instruct",
        image: "ghcr.io/kaito-project/aikit/mixtral:8x7b",
        compute_type: ComputeType::Gpu,
        min_gpus: 2,
    },
    CatalogEntry {
        key: "codestral:22b",
        display_name: "Codestral 22B",
        model_name: "codestral-22b",
        image: "ghcr.io/kaito-project/aikit/codestral:22b",
        compute_type: ComputeType::Gpu,
        min_gpus: 1,
    },
];

/// Premade models KAITO can serve
pub const KAITO_CATALOG: ModelCatalog = ModelCatalog::new(ENTRIES);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<&str> = KAITO_CATALOG.entries().iter().map(|e| e.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), KAITO_CATALOG.entries().len());
    }

    #[test]
    fn images_round_trip_to_served_names() {
        for entry in KAITO_CATALOG.entries() {
            let found = KAITO_CATALOG.find_by_image(entry.image).unwrap();
            assert_eq!(found.key, entry.key);
        }
        assert_eq!(KAITO_CATALOG.min_gpus("mixtral:8x7b"), Some(2));
        assert_eq!(KAITO_CATALOG.min_gpus("llama3.2:3b"), None);
    }
}
