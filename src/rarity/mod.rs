//! Rarity catalog
//!
//! Immutable tokenId -> rank lookup loaded once from the static dataset
//! (`{"nfts": [{tokenId, officialRank, rarityScore, imageUrl}, ...]}`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::types::RarityRecord;

#[derive(Debug, Deserialize)]
struct RarityDataset {
    #[serde(default)]
    nfts: Vec<RarityRecord>,
}

/// Read-only rarity index keyed by token id
#[derive(Debug, Clone, Default)]
pub struct RarityCatalog {
    records: HashMap<String, RarityRecord>,
}

impl RarityCatalog {
    /// Build from records. Rank 0 is undefined and is dropped; for duplicate
    /// token ids the first record wins.
    pub fn from_records(records: impl IntoIterator<Item = RarityRecord>) -> Self {
        let mut index = HashMap::new();
        for record in records {
            if record.official_rank == 0 {
                warn!(token_id = %record.token_id, "Dropping rarity record with rank 0");
                continue;
            }
            if index.contains_key(&record.token_id) {
                warn!(token_id = %record.token_id, "Duplicate rarity record ignored");
                continue;
            }
            index.insert(record.token_id.clone(), record);
        }
        Self { records: index }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let dataset: RarityDataset =
            serde_json::from_str(json).context("Failed to parse rarity dataset")?;
        Ok(Self::from_records(dataset.nfts))
    }

    /// Load the dataset from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rarity dataset {}", path.display()))?;
        let catalog = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            records = catalog.len(),
            "📂 Rarity catalog loaded"
        );
        Ok(catalog)
    }

    pub fn get(&self, token_id: &str) -> Option<&RarityRecord> {
        self.records.get(token_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_dataset_and_indexes_by_token() {
        let catalog = RarityCatalog::from_json_str(
            r#"{"nfts": [
                {"tokenId": "1", "officialRank": 10, "rarityScore": 300.5, "imageUrl": "a"},
                {"tokenId": "2", "officialRank": 2000, "rarityScore": 12.0, "imageUrl": "b"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("1").map(|r| r.official_rank), Some(10));
        assert!(catalog.get("3").is_none());
    }

    #[test]
    fn first_duplicate_wins_and_rank_zero_is_dropped() {
        let catalog = RarityCatalog::from_json_str(
            r#"{"nfts": [
                {"tokenId": "5", "officialRank": 4, "rarityScore": 1.0, "imageUrl": "first"},
                {"tokenId": "5", "officialRank": 9, "rarityScore": 2.0, "imageUrl": "second"},
                {"tokenId": "6", "officialRank": 0, "rarityScore": 2.0, "imageUrl": "zero"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("5").unwrap().image_url, "first");
        assert!(catalog.get("6").is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(RarityCatalog::load("does/not/exist.json").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nft-data.json");
        fs::write(
            &path,
            r#"{"nfts": [{"tokenId": 77, "officialRank": 1, "rarityScore": 999.0, "imageUrl": "x"}]}"#,
        )
        .unwrap();

        let catalog = RarityCatalog::load(&path).unwrap();
        assert_eq!(catalog.get("77").map(|r| r.official_rank), Some(1));
    }
}
