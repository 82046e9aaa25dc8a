//! Challenge selection: one correct breed, one distractor, random slot order.
use log::{debug, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::constants::{LOG_POOL_EMERGENCY, LOG_POOL_FALLBACK, MAX_USED_BREED_NAMES, TARGET_CHALLENGE};
use crate::data::{Breed, BreedCatalog, emergency_catalog};
use crate::error::GameError;
use crate::phase::DifficultyPhase;

/// Which of the two image slots a player tapped or a challenge marks correct.
pub type Slot = u8;

/// One round: the breed to identify plus a distractor image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub correct_breed_name: String,
    pub correct_asset_key: String,
    pub incorrect_asset_key: String,
    pub correct_slot: Slot,
    pub phase: DifficultyPhase,
}

impl Challenge {
    /// Asset key shown in the given slot.
    #[must_use]
    pub fn asset_in_slot(&self, slot: Slot) -> &str {
        if slot == self.correct_slot {
            &self.correct_asset_key
        } else {
            &self.incorrect_asset_key
        }
    }

    /// Both image keys, in slot order.
    #[must_use]
    pub fn asset_keys(&self) -> [String; 2] {
        [
            self.asset_in_slot(0).to_string(),
            self.asset_in_slot(1).to_string(),
        ]
    }
}

/// Where a challenge came from once the fallback chain is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeSource {
    Fresh,
    PreviousPhase(DifficultyPhase),
    RelaxedExclusion,
    Emergency,
}

/// Insertion-ordered set of breed names already shown this session.
///
/// Bounded: inserting past the limit drops the oldest name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsedBreeds {
    names: VecDeque<String>,
}

impl UsedBreeds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|used| used == name)
    }

    /// Record a name; returns false if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push_back(name);
        while self.names.len() > MAX_USED_BREED_NAMES {
            self.names.pop_front();
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// Keep only the `keep` most recently inserted names.
    pub fn retain_recent(&mut self, keep: usize) {
        while self.names.len() > keep {
            self.names.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Rough heap footprint, used by pressure sampling.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.names
            .iter()
            .map(|name| name.len() + std::mem::size_of::<String>())
            .sum()
    }
}

impl FromIterator<String> for UsedBreeds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut used = Self::new();
        for name in iter {
            used.insert(name);
        }
        used
    }
}

/// Produces challenges from a read-only catalog.
#[derive(Debug, Clone)]
pub struct ChallengeGenerator {
    catalog: Arc<BreedCatalog>,
}

impl ChallengeGenerator {
    #[must_use]
    pub const fn new(catalog: Arc<BreedCatalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &BreedCatalog {
        &self.catalog
    }

    /// Number of breeds in `phase` not yet in `used`.
    #[must_use]
    pub fn fresh_in_phase(&self, phase: DifficultyPhase, used: &UsedBreeds) -> usize {
        self.catalog
            .breeds
            .iter()
            .filter(|breed| phase.accepts(breed.difficulty_rating) && !used.contains(&breed.name))
            .count()
    }

    /// Pick a challenge for `phase`, excluding every name in `used`.
    ///
    /// # Errors
    ///
    /// Returns `ContentExhausted` when no eligible correct breed (or no
    /// distractor at all) exists.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        phase: DifficultyPhase,
        used: &UsedBreeds,
        rng: &mut R,
    ) -> Result<Challenge, GameError> {
        build_challenge(&self.catalog, phase, Some(phase), used, rng)
    }

    /// Pick a challenge, walking the fallback chain when the phase pool is dry:
    /// previous phase's pool, then the same phase with no exclusions, then the
    /// emergency catalog.
    ///
    /// # Errors
    ///
    /// Returns `ContentExhausted` only if even the emergency catalog fails.
    pub fn generate_with_fallback<R: Rng + ?Sized>(
        &self,
        phase: DifficultyPhase,
        used: &UsedBreeds,
        rng: &mut R,
    ) -> Result<(Challenge, ChallengeSource), GameError> {
        match self.generate(phase, used, rng) {
            Ok(challenge) => return Ok((challenge, ChallengeSource::Fresh)),
            Err(GameError::ContentExhausted { .. }) => {}
            Err(other) => return Err(other),
        }

        if let Some(previous) = phase.previous()
            && let Ok(challenge) = build_challenge(&self.catalog, phase, Some(previous), used, rng)
        {
            debug!(
                target: TARGET_CHALLENGE,
                "{LOG_POOL_FALLBACK} phase={phase} source=previous:{previous}"
            );
            return Ok((challenge, ChallengeSource::PreviousPhase(previous)));
        }

        let relaxed = UsedBreeds::new();
        if let Ok(challenge) = self.generate(phase, &relaxed, rng) {
            debug!(
                target: TARGET_CHALLENGE,
                "{LOG_POOL_FALLBACK} phase={phase} source=relaxed"
            );
            return Ok((challenge, ChallengeSource::RelaxedExclusion));
        }

        warn!(
            target: TARGET_CHALLENGE,
            "{LOG_POOL_EMERGENCY} phase={phase} catalog_size={}",
            self.catalog.len()
        );
        build_challenge(emergency_catalog(), phase, None, &relaxed, rng)
            .map(|challenge| (challenge, ChallengeSource::Emergency))
    }
}

fn build_challenge<R: Rng + ?Sized>(
    catalog: &BreedCatalog,
    phase: DifficultyPhase,
    pool: Option<DifficultyPhase>,
    used: &UsedBreeds,
    rng: &mut R,
) -> Result<Challenge, GameError> {
    let candidates: Vec<&Breed> = catalog
        .breeds
        .iter()
        .filter(|breed| pool.is_none_or(|p| p.accepts(breed.difficulty_rating)))
        .filter(|breed| !used.contains(&breed.name))
        .collect();
    let Some(correct) = candidates.choose(rng).copied() else {
        return Err(GameError::ContentExhausted { phase });
    };

    let distractors: Vec<&Breed> = catalog
        .breeds
        .iter()
        .filter(|breed| breed.name != correct.name && !used.contains(&breed.name))
        .collect();
    let incorrect = match distractors.choose(rng).copied() {
        Some(breed) => breed,
        None => {
            let any_other: Vec<&Breed> = catalog
                .breeds
                .iter()
                .filter(|breed| breed.name != correct.name)
                .collect();
            any_other
                .choose(rng)
                .copied()
                .ok_or(GameError::ContentExhausted { phase })?
        }
    };

    let correct_slot: Slot = if rng.gen_bool(0.5) { 0 } else { 1 };
    Ok(Challenge {
        correct_breed_name: correct.name.clone(),
        correct_asset_key: correct.asset_key.clone(),
        incorrect_asset_key: incorrect.asset_key.clone(),
        correct_slot,
        phase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn catalog() -> Arc<BreedCatalog> {
        Arc::new(
            BreedCatalog::from_breeds(vec![
                Breed::new("Pug", "pug", 1),
                Breed::new("Beagle", "beagle", 2),
                Breed::new("Corgi", "corgi", 3),
                Breed::new("Akita", "akita", 4),
                Breed::new("Saluki", "saluki", 5),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn generate_respects_phase_and_exclusions() {
        let generator = ChallengeGenerator::new(catalog());
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut used = UsedBreeds::new();
        used.insert("Pug");
        for _ in 0..20 {
            let challenge = generator
                .generate(DifficultyPhase::Beginner, &used, &mut rng)
                .unwrap();
            assert_eq!(challenge.correct_breed_name, "Beagle");
            assert_ne!(challenge.correct_asset_key, challenge.incorrect_asset_key);
            assert!(challenge.correct_slot <= 1);
        }
    }

    #[test]
    fn generate_reports_exhausted_pool() {
        let generator = ChallengeGenerator::new(catalog());
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let used: UsedBreeds = ["Corgi".to_string()].into_iter().collect();
        let err = generator
            .generate(DifficultyPhase::Intermediate, &used, &mut rng)
            .unwrap_err();
        assert_eq!(
            err,
            GameError::ContentExhausted {
                phase: DifficultyPhase::Intermediate
            }
        );
    }

    #[test]
    fn fallback_prefers_previous_phase_then_relaxed_then_emergency() {
        let generator = ChallengeGenerator::new(catalog());
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        let used: UsedBreeds = ["Corgi".to_string()].into_iter().collect();
        let (challenge, source) = generator
            .generate_with_fallback(DifficultyPhase::Intermediate, &used, &mut rng)
            .unwrap();
        assert_eq!(
            source,
            ChallengeSource::PreviousPhase(DifficultyPhase::Beginner)
        );
        assert!(["Pug", "Beagle"].contains(&challenge.correct_breed_name.as_str()));
        assert_eq!(challenge.phase, DifficultyPhase::Intermediate);

        let used: UsedBreeds = ["Pug", "Beagle"].iter().map(ToString::to_string).collect();
        let (challenge, source) = generator
            .generate_with_fallback(DifficultyPhase::Beginner, &used, &mut rng)
            .unwrap();
        assert_eq!(source, ChallengeSource::RelaxedExclusion);
        assert!(["Pug", "Beagle"].contains(&challenge.correct_breed_name.as_str()));

        let empty = ChallengeGenerator::new(Arc::new(
            BreedCatalog::from_breeds(vec![Breed::new("Saluki", "saluki", 5)]).unwrap(),
        ));
        let (challenge, source) = empty
            .generate_with_fallback(DifficultyPhase::Beginner, &UsedBreeds::new(), &mut rng)
            .unwrap();
        assert_eq!(source, ChallengeSource::Emergency);
        assert!(emergency_catalog().find(&challenge.correct_breed_name).is_some());
    }

    #[test]
    fn distractor_relaxes_when_everything_else_is_used() {
        let generator = ChallengeGenerator::new(catalog());
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let used: UsedBreeds = ["Pug", "Corgi", "Akita", "Saluki"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let challenge = generator
            .generate(DifficultyPhase::Beginner, &used, &mut rng)
            .unwrap();
        assert_eq!(challenge.correct_breed_name, "Beagle");
        assert_ne!(challenge.incorrect_asset_key, "beagle");
    }

    #[test]
    fn used_breeds_stay_bounded_and_ordered() {
        let mut used = UsedBreeds::new();
        for i in 0..(MAX_USED_BREED_NAMES + 5) {
            used.insert(format!("breed-{i}"));
        }
        assert_eq!(used.len(), MAX_USED_BREED_NAMES);
        assert!(!used.contains("breed-0"));
        assert!(!used.insert(format!("breed-{}", MAX_USED_BREED_NAMES + 4)));
        used.retain_recent(2);
        let names: Vec<String> = used.iter().map(ToString::to_string).collect();
        let expected = vec![
            format!("breed-{}", MAX_USED_BREED_NAMES + 3),
            format!("breed-{}", MAX_USED_BREED_NAMES + 4),
        ];
        assert_eq!(names, expected);
    }
}
