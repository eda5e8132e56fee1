use std::future::Future;
use std::sync::Arc;

use crate::error::StepError;
use crate::storage::{GraphObjectStore, Record, RecordKind, TypeTracker};

/// Handle given to a step handler, bound to the calling step.
///
/// Writes are tagged with the step id and reads flush the step's own buffer
/// first, so a step always sees what it wrote.
#[derive(Clone)]
pub struct StepContext {
    step_id: Arc<str>,
    store: Arc<GraphObjectStore>,
    type_tracker: Arc<TypeTracker>,
}

impl StepContext {
    pub fn new(
        step_id: impl Into<Arc<str>>,
        store: Arc<GraphObjectStore>,
        type_tracker: Arc<TypeTracker>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            store,
            type_tracker,
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    async fn add(&self, kind: RecordKind, records: Vec<Record>) -> Result<(), StepError> {
        let types: Vec<String> = records.iter().map(|r| r.record_type.clone()).collect();
        self.store.add(&self.step_id, kind, records).await?;
        for record_type in &types {
            self.type_tracker.register(record_type);
        }
        Ok(())
    }

    pub async fn add_entity(&self, entity: Record) -> Result<(), StepError> {
        self.add(RecordKind::Entities, vec![entity]).await
    }

    pub async fn add_entities(&self, entities: Vec<Record>) -> Result<(), StepError> {
        self.add(RecordKind::Entities, entities).await
    }

    pub async fn add_relationship(&self, relationship: Record) -> Result<(), StepError> {
        self.add(RecordKind::Relationships, vec![relationship]).await
    }

    pub async fn add_relationships(&self, relationships: Vec<Record>) -> Result<(), StepError> {
        self.add(RecordKind::Relationships, relationships).await
    }

    pub async fn iterate_entities<F, Fut>(&self, record_type: &str, visitor: F) -> Result<(), StepError>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = Result<(), StepError>>,
    {
        self.store
            .iterate(Some(self.step_id()), RecordKind::Entities, record_type, visitor)
            .await
    }

    pub async fn iterate_relationships<F, Fut>(
        &self,
        record_type: &str,
        visitor: F,
    ) -> Result<(), StepError>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = Result<(), StepError>>,
    {
        self.store
            .iterate(
                Some(self.step_id()),
                RecordKind::Relationships,
                record_type,
                visitor,
            )
            .await
    }

    /// Whether any step of this run already registered `key`.
    pub fn has_key(&self, key: &str) -> bool {
        self.store.key_tracker().contains(key)
    }

    pub async fn find_entity(&self, key: &str) -> Result<Option<Record>, StepError> {
        Ok(self.store.find_entity(Some(self.step_id()), key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyUniquenessTracker;

    fn context(dir: &std::path::Path) -> (StepContext, Arc<TypeTracker>) {
        let store = Arc::new(GraphObjectStore::new(
            dir,
            Arc::new(KeyUniquenessTracker::new()),
        ));
        let tracker = Arc::new(TypeTracker::new());
        (StepContext::new("fetch-users", store, tracker.clone()), tracker)
    }

    #[tokio::test]
    async fn adds_register_encountered_types() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, tracker) = context(dir.path());

        ctx.add_entity(Record::new("u1", "acme_user", "User"))
            .await
            .unwrap();
        ctx.add_relationship(Record::relationship(
            "a|has|u1",
            "acme_account_has_user",
            "HAS",
            "a",
            "u1",
        ))
        .await
        .unwrap();

        assert_eq!(
            tracker.encountered(),
            vec!["acme_account_has_user", "acme_user"]
        );
        assert!(ctx.has_key("u1"));
    }

    #[tokio::test]
    async fn rejected_add_does_not_register_type() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, tracker) = context(dir.path());

        ctx.add_entity(Record::new("k", "acme_user", "User"))
            .await
            .unwrap();
        let err = ctx
            .add_entity(Record::new("k", "acme_group", "Group"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Storage(_)));
        assert_eq!(tracker.encountered(), vec!["acme_user"]);
    }

    #[tokio::test]
    async fn reads_own_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        ctx.add_entities(vec![
            Record::new("u1", "acme_user", "User"),
            Record::new("u2", "acme_user", "User"),
        ])
        .await
        .unwrap();

        let mut keys = Vec::new();
        ctx.iterate_entities("acme_user", |e| {
            keys.push(e.key);
            async { Ok(()) }
        })
        .await
        .unwrap();
        keys.sort();
        assert_eq!(keys, vec!["u1", "u2"]);

        let found = ctx.find_entity("u2").await.unwrap();
        assert_eq!(found.map(|e| e.key), Some("u2".to_string()));
    }
}
