use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{PRELOAD_SPACING_MS, PRELOAD_STAGGER_STEP_MS, PRELOAD_STAGGERED_KEYS};
use crate::numbers::len_to_u64;

/// Worker pool a preload runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreloadPriority {
    /// Images for the challenge on screen; urgent pool.
    Critical,
    /// Upcoming challenges; background pool.
    #[default]
    Normal,
}

/// Start delay for the `index`-th key of a preload batch: 100/200/300ms for
/// the first three keys, then 500ms apart.
#[must_use]
pub fn preload_delay(index: usize) -> Duration {
    let staggered = len_to_u64(PRELOAD_STAGGERED_KEYS);
    let position = len_to_u64(index);
    let millis = if position < staggered {
        (position + 1) * PRELOAD_STAGGER_STEP_MS
    } else {
        staggered * PRELOAD_STAGGER_STEP_MS + (position + 1 - staggered) * PRELOAD_SPACING_MS
    };
    Duration::from_millis(millis)
}
