use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

/// Run-wide registry of every accepted `_key`.
///
/// One tracker is shared by all concurrently running steps of a run. The
/// `_type` each key was first registered with is kept so records can be
/// looked up by key later.
#[derive(Debug, Default)]
pub struct KeyUniquenessTracker {
    keys: Mutex<HashMap<String, String>>,
}

impl KeyUniquenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a single key.
    pub fn register(&self, key: &str, record_type: &str) -> Result<(), StorageError> {
        self.register_all([(key, record_type)])
    }

    /// Register a batch of `(key, type)` pairs atomically.
    ///
    /// Either every key is accepted or none is: duplicates against earlier
    /// registrations or within the batch itself are reported before the set
    /// is touched.
    pub fn register_all<'a, I>(&self, entries: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let entries: Vec<(&str, &str)> = entries.into_iter().collect();
        let mut keys = self.lock();

        let mut pending: HashMap<&str, &str> = HashMap::with_capacity(entries.len());
        for (key, record_type) in &entries {
            if let Some(existing_type) = keys.get(*key) {
                return Err(StorageError::DuplicateKey {
                    key: key.to_string(),
                    existing_type: existing_type.clone(),
                });
            }
            if let Some(existing_type) = pending.insert(key, record_type) {
                return Err(StorageError::DuplicateKey {
                    key: key.to_string(),
                    existing_type: existing_type.to_string(),
                });
            }
        }

        for (key, record_type) in pending {
            keys.insert(key.to_string(), record_type.to_string());
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// The `_type` a key was registered with.
    pub fn type_of(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
