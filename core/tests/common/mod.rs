#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use collector_core::{GraphObjectStore, KeyUniquenessTracker};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("collector=debug")
        .try_init();
}

pub fn new_store(root: &Path) -> Arc<GraphObjectStore> {
    Arc::new(GraphObjectStore::new(root, Arc::new(KeyUniquenessTracker::new())))
}

pub fn new_store_with_threshold(root: &Path, threshold: usize) -> Arc<GraphObjectStore> {
    Arc::new(
        GraphObjectStore::new(root, Arc::new(KeyUniquenessTracker::new()))
            .with_flush_threshold(threshold),
    )
}

/// Ordered log of handler invocations shared between steps.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
