use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUNDLED_CATALOG: &str = include_str!("../assets/breeds.json");

/// A single breed in the static catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breed {
    pub name: String,
    pub asset_key: String,
    pub difficulty_rating: u8,
}

impl Breed {
    #[must_use]
    pub fn new(name: impl Into<String>, asset_key: impl Into<String>, difficulty_rating: u8) -> Self {
        Self {
            name: name.into(),
            asset_key: asset_key.into(),
            difficulty_rating,
        }
    }
}

/// Errors raised while loading a breed catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog JSON could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("breed {name} has difficulty rating {rating} (expected 1..=5)")]
    RatingOutOfRange { name: String, rating: u8 },
    #[error("breed name {0} appears more than once")]
    DuplicateName(String),
}

/// Container for all breed data, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BreedCatalog {
    pub breeds: Vec<Breed>,
}

impl BreedCatalog {
    /// Create an empty catalog (useful for tests)
    #[must_use]
    pub fn empty() -> Self {
        Self { breeds: Vec::new() }
    }

    /// Load a catalog from a JSON string and check every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed, a rating falls outside
    /// 1..=5, or a breed name is duplicated.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.check()?;
        Ok(catalog)
    }

    /// Build a catalog from pre-parsed breeds.
    ///
    /// # Errors
    ///
    /// Returns an error if a rating falls outside 1..=5 or a name is duplicated.
    pub fn from_breeds(breeds: Vec<Breed>) -> Result<Self, CatalogError> {
        let catalog = Self { breeds };
        catalog.check()?;
        Ok(catalog)
    }

    /// The dataset shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled asset is malformed.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED_CATALOG)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breeds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breeds.is_empty()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Breed> {
        self.breeds.iter().find(|breed| breed.name == name)
    }

    fn check(&self) -> Result<(), CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for breed in &self.breeds {
            if !(1..=5).contains(&breed.difficulty_rating) {
                return Err(CatalogError::RatingOutOfRange {
                    name: breed.name.clone(),
                    rating: breed.difficulty_rating,
                });
            }
            if !seen.insert(breed.name.as_str()) {
                return Err(CatalogError::DuplicateName(breed.name.clone()));
            }
        }
        Ok(())
    }
}

static EMERGENCY_BREEDS: Lazy<BreedCatalog> = Lazy::new(|| BreedCatalog {
    breeds: vec![
        Breed::new("Labrador Retriever", "breeds/labrador_retriever", 1),
        Breed::new("German Shepherd", "breeds/german_shepherd", 1),
        Breed::new("Golden Retriever", "breeds/golden_retriever", 1),
        Breed::new("Beagle", "breeds/beagle", 1),
    ],
});

/// Fixed four-breed catalog used when every other challenge source is exhausted.
#[must_use]
pub fn emergency_catalog() -> &'static BreedCatalog {
    &EMERGENCY_BREEDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_from_json_reads_records() {
        let json = r#"{
            "breeds": [
                { "name": "Pug", "asset_key": "breeds/pug", "difficulty_rating": 1 },
                { "name": "Saluki", "asset_key": "breeds/saluki", "difficulty_rating": 5 }
            ]
        }"#;

        let catalog = BreedCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.breeds[1].name, "Saluki");
        assert_eq!(catalog.find("Pug").map(|b| b.difficulty_rating), Some(1));
    }

    #[test]
    fn catalog_rejects_out_of_range_rating() {
        let json = r#"{ "breeds": [ { "name": "Pug", "asset_key": "pug", "difficulty_rating": 6 } ] }"#;
        let err = BreedCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::RatingOutOfRange { rating: 6, .. }));
    }

    #[test]
    fn catalog_rejects_duplicate_names() {
        let err = BreedCatalog::from_breeds(vec![
            Breed::new("Pug", "a", 1),
            Breed::new("Pug", "b", 2),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName(name) if name == "Pug"));
    }

    #[test]
    fn bundled_catalog_covers_every_rating() {
        let catalog = BreedCatalog::bundled().unwrap();
        for rating in 1..=5 {
            assert!(
                catalog.breeds.iter().any(|b| b.difficulty_rating == rating),
                "no breed with rating {rating}"
            );
        }
    }

    #[test]
    fn emergency_catalog_has_four_breeds() {
        assert_eq!(emergency_catalog().len(), 4);
    }
}
