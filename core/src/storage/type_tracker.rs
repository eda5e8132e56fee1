use std::collections::BTreeSet;
use std::sync::Mutex;

/// Records which `_type`s a single step actually produced.
#[derive(Debug, Default)]
pub struct TypeTracker {
    types: Mutex<BTreeSet<String>>,
}

/// Difference between the types a step declared and the ones it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDiff {
    /// Produced but never declared.
    pub undeclared: Vec<String>,
    /// Declared but never produced.
    pub unencountered: Vec<String>,
}

impl TypeDiff {
    pub fn is_empty(&self) -> bool {
        self.undeclared.is_empty() && self.unencountered.is_empty()
    }
}

impl TypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, record_type: &str) {
        let mut types = match self.types.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !types.contains(record_type) {
            types.insert(record_type.to_string());
        }
    }

    /// Encountered types in sorted order.
    pub fn encountered(&self) -> Vec<String> {
        match self.types.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn diff(&self, declared: &[String]) -> TypeDiff {
        let encountered: BTreeSet<String> = self.encountered().into_iter().collect();
        let declared: BTreeSet<&String> = declared.iter().collect();

        TypeDiff {
            undeclared: encountered
                .iter()
                .filter(|t| !declared.contains(t))
                .cloned()
                .collect(),
            unencountered: declared
                .into_iter()
                .filter(|t| !encountered.contains(*t))
                .cloned()
                .collect(),
        }
    }
}
