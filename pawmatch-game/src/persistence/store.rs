use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::StoreError;

/// Key/value byte store the host provides for session persistence.
pub trait SessionStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn save(&self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Read the value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Remove the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be removed.
    fn delete(&self, key: &str) -> Result<(), Self::Error>;
}

/// In-process store with failure injection. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing_saves: Arc<AtomicU32>,
    failing_loads: Arc<AtomicU32>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` loads fail.
    pub fn fail_next_loads(&self, count: u32) {
        self.failing_loads.store(count, Ordering::SeqCst);
    }

    /// Overwrite raw bytes, bypassing the envelope.
    pub fn put_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.values.lock().insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SessionStore for MemoryStore {
    type Error = StoreError;

    fn save(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        if Self::take_failure(&self.failing_saves) {
            return Err(StoreError::new(key, "injected save failure"));
        }
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        if Self::take_failure(&self.failing_loads) {
            return Err(StoreError::new(key, "injected load failure"));
        }
        Ok(self.values.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.values.lock().remove(key);
        Ok(())
    }
}
