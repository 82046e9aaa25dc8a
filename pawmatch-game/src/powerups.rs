//! Power-up kinds and the fixed-slot inventory.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MAX_POWER_UPS_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    Hint,
    ExtraTime,
    Skip,
    SecondChance,
    /// Exists in the broader game; never granted or usable in breed mode.
    FiftyFifty,
}

impl PowerUpKind {
    /// Kinds that can be held and used in breed-matching mode.
    pub const BREED_MODE: [Self; 4] = [Self::Hint, Self::ExtraTime, Self::Skip, Self::SecondChance];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::ExtraTime => "extra_time",
            Self::Skip => "skip",
            Self::SecondChance => "second_chance",
            Self::FiftyFifty => "fifty_fifty",
        }
    }

    #[must_use]
    pub const fn available_in_breed_mode(self) -> bool {
        !matches!(self, Self::FiftyFifty)
    }
}

impl fmt::Display for PowerUpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts per breed-mode power-up. One field per kind so every match over the
/// closed set is checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpInventory {
    #[serde(default)]
    pub hint: u32,
    #[serde(default)]
    pub extra_time: u32,
    #[serde(default)]
    pub skip: u32,
    #[serde(default)]
    pub second_chance: u32,
}

impl Default for PowerUpInventory {
    fn default() -> Self {
        Self::starting()
    }
}

impl PowerUpInventory {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            hint: 0,
            extra_time: 0,
            skip: 0,
            second_chance: 0,
        }
    }

    /// Inventory granted at session start, also the recovery safe default.
    #[must_use]
    pub const fn starting() -> Self {
        Self {
            hint: 1,
            extra_time: 1,
            skip: 1,
            second_chance: 1,
        }
    }

    #[must_use]
    pub const fn count(&self, kind: PowerUpKind) -> u32 {
        match kind {
            PowerUpKind::Hint => self.hint,
            PowerUpKind::ExtraTime => self.extra_time,
            PowerUpKind::Skip => self.skip,
            PowerUpKind::SecondChance => self.second_chance,
            PowerUpKind::FiftyFifty => 0,
        }
    }

    const fn slot_mut(&mut self, kind: PowerUpKind) -> Option<&mut u32> {
        match kind {
            PowerUpKind::Hint => Some(&mut self.hint),
            PowerUpKind::ExtraTime => Some(&mut self.extra_time),
            PowerUpKind::Skip => Some(&mut self.skip),
            PowerUpKind::SecondChance => Some(&mut self.second_chance),
            PowerUpKind::FiftyFifty => None,
        }
    }

    /// Sum of all counts; widened so corrupted values cannot overflow.
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.hint)
            + u64::from(self.extra_time)
            + u64::from(self.skip)
            + u64::from(self.second_chance)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.total() >= u64::from(MAX_POWER_UPS_TOTAL)
    }

    /// Add one of `kind`; refuses unavailable kinds and a full inventory.
    pub fn grant(&mut self, kind: PowerUpKind) -> bool {
        if self.is_full() {
            return false;
        }
        match self.slot_mut(kind) {
            Some(slot) => {
                *slot = slot.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Remove one of `kind`; never goes below zero.
    pub fn consume(&mut self, kind: PowerUpKind) -> bool {
        match self.slot_mut(kind) {
            Some(slot) if *slot > 0 => {
                *slot -= 1;
                true
            }
            _ => false,
        }
    }

    /// Grant a uniformly random breed-mode kind, if there is room.
    pub fn grant_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PowerUpKind> {
        if self.is_full() {
            return None;
        }
        let kind = *PowerUpKind::BREED_MODE.choose(rng)?;
        self.grant(kind).then_some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn consume_never_goes_negative() {
        let mut inventory = PowerUpInventory::empty();
        assert!(!inventory.consume(PowerUpKind::Hint));
        assert!(inventory.grant(PowerUpKind::Hint));
        assert!(inventory.consume(PowerUpKind::Hint));
        assert_eq!(inventory.count(PowerUpKind::Hint), 0);
    }

    #[test]
    fn fifty_fifty_is_never_held() {
        let mut inventory = PowerUpInventory::starting();
        assert!(!inventory.grant(PowerUpKind::FiftyFifty));
        assert!(!inventory.consume(PowerUpKind::FiftyFifty));
        assert_eq!(inventory.count(PowerUpKind::FiftyFifty), 0);
        assert!(!PowerUpKind::FiftyFifty.available_in_breed_mode());
    }

    #[test]
    fn grants_stop_at_total_cap() {
        let mut inventory = PowerUpInventory::empty();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let mut granted = 0;
        for _ in 0..40 {
            if inventory.grant_random(&mut rng).is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, MAX_POWER_UPS_TOTAL);
        assert_eq!(inventory.total(), u64::from(MAX_POWER_UPS_TOTAL));
    }
}
