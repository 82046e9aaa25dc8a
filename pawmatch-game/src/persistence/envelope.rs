//! Versioned, checksummed JSON wrapper for stored values.
//!
//! The checksum is XxHash64 over the canonical (`serde_json::Value`) encoding
//! of the payload, so key order in the stored bytes does not matter.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use twox_hash::XxHash64;

use super::validation::ValidationFailure;
use crate::constants::{CHECKSUM_SEED, ENVELOPE_VERSION};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: u64,
    state: Value,
}

fn checksum(value: &Value) -> Result<u64, serde_json::Error> {
    let canonical = serde_json::to_vec(value)?;
    Ok(XxHash64::oneshot(CHECKSUM_SEED, &canonical))
}

fn corrupted(detail: impl ToString) -> ValidationFailure {
    ValidationFailure::Corrupted {
        detail: detail.to_string(),
    }
}

/// Wrap `payload` for storage.
///
/// # Errors
///
/// Returns an error if `payload` cannot be represented as JSON.
pub fn seal<T: Serialize>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let state = serde_json::to_value(payload)?;
    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        checksum: checksum(&state)?,
        state,
    };
    serde_json::to_vec(&envelope)
}

/// Unwrap stored bytes, verifying version and checksum.
///
/// # Errors
///
/// Returns `ValidationFailure::Corrupted` for undecodable bytes, an unknown
/// version, a checksum mismatch or a payload of the wrong shape.
pub fn open<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ValidationFailure> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(corrupted)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(corrupted(format!("unknown version {}", envelope.version)));
    }
    let expected = checksum(&envelope.state).map_err(corrupted)?;
    if expected != envelope.checksum {
        return Err(corrupted("checksum mismatch"));
    }
    serde_json::from_value(envelope.state).map_err(corrupted)
}
