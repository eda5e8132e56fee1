use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::executor::scheduler::execute_with_permits;

use super::key_tracker::KeyUniquenessTracker;
use super::layout::{batch_relative_path, manifest_path, resolve_relative};
use super::record::{BatchFile, Record, RecordKind};

pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;
pub const DEFAULT_FLUSH_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BufferKey {
    step_id: String,
    kind: RecordKind,
}

impl BufferKey {
    fn new(step_id: &str, kind: RecordKind) -> Self {
        Self {
            step_id: step_id.to_string(),
            kind,
        }
    }
}

/// Buffered, disk-backed store for the records of one run.
///
/// Buffers are partitioned by `(step, kind)`, so concurrently running steps
/// never share one. Once `add` returns, a record is either buffered or
/// durably flushed.
pub struct GraphObjectStore {
    root: PathBuf,
    flush_threshold: usize,
    key_tracker: Arc<KeyUniquenessTracker>,
    buffers: Mutex<HashMap<BufferKey, Vec<Record>>>,
    write_permits: Arc<Semaphore>,
    index_lock: tokio::sync::Mutex<()>,
}

impl GraphObjectStore {
    pub fn new(root: impl Into<PathBuf>, key_tracker: Arc<KeyUniquenessTracker>) -> Self {
        Self {
            root: root.into(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            key_tracker,
            buffers: Mutex::new(HashMap::new()),
            write_permits: Arc::new(Semaphore::new(DEFAULT_FLUSH_CONCURRENCY)),
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &StorageConfig, key_tracker: Arc<KeyUniquenessTracker>) -> Self {
        Self::new(&cfg.directory, key_tracker)
            .with_flush_threshold(cfg.flush_threshold)
            .with_flush_concurrency(cfg.flush_concurrency)
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    pub fn with_flush_concurrency(mut self, concurrency: usize) -> Self {
        self.write_permits = Arc::new(Semaphore::new(concurrency.max(1)));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    pub fn key_tracker(&self) -> &Arc<KeyUniquenessTracker> {
        &self.key_tracker
    }

    fn lock_buffers(&self) -> MutexGuard<'_, HashMap<BufferKey, Vec<Record>>> {
        match self.buffers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of records of `kind` buffered for a step and not yet flushed.
    pub fn buffered_len(&self, step_id: &str, kind: RecordKind) -> usize {
        self.lock_buffers()
            .get(&BufferKey::new(step_id, kind))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Accept records produced by `step_id`.
    ///
    /// Records that set `_key`, `_type` or `_class` as a property are
    /// rejected. Keys are registered before anything is buffered; a duplicate
    /// rejects the whole call. Reaching the flush threshold flushes before
    /// returning.
    pub async fn add(
        &self,
        step_id: &str,
        kind: RecordKind,
        records: Vec<Record>,
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some((key, field)) = records
            .iter()
            .find_map(|r| r.shadowed_field().map(|field| (&r.key, field)))
        {
            return Err(StorageError::ReservedProperty {
                key: key.clone(),
                field: field.to_string(),
            });
        }

        self.key_tracker.register_all(
            records
                .iter()
                .map(|r| (r.key.as_str(), r.record_type.as_str())),
        )?;

        let key = BufferKey::new(step_id, kind);
        let buffered = {
            let mut buffers = self.lock_buffers();
            let buffer = buffers.entry(key.clone()).or_default();
            buffer.extend(records);
            buffer.len()
        };

        if buffered >= self.flush_threshold {
            tracing::debug!(
                target: "collector.store",
                step_id = %step_id,
                kind = %kind,
                buffered,
                "flush threshold reached"
            );
            self.flush_buffer(key).await?;
        }

        Ok(())
    }

    /// Flush every buffer, or only those of one step.
    pub async fn flush(&self, step_id: Option<&str>) -> Result<(), StorageError> {
        let keys: Vec<BufferKey> = self
            .lock_buffers()
            .keys()
            .filter(|k| step_id.map_or(true, |id| k.step_id == id))
            .cloned()
            .collect();

        let mut first_err = None;
        for key in keys {
            if let Err(err) = self.flush_buffer(key).await {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn flush_buffer(&self, key: BufferKey) -> Result<(), StorageError> {
        let records = match self.lock_buffers().remove(&key) {
            Some(records) if !records.is_empty() => records,
            _ => return Ok(()),
        };

        let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in records {
            groups
                .entry(record.record_type.clone())
                .or_default()
                .push(record);
        }

        let outcomes = execute_with_permits(
            groups,
            self.write_permits.clone(),
            |(record_type, records)| self.write_batch(&key, record_type, records),
        )
        .await;

        let mut unwritten = Vec::new();
        let mut first_err = None;
        for outcome in outcomes {
            if let Err((records, err)) = outcome {
                unwritten.extend(records);
                first_err.get_or_insert(err);
            }
        }

        if let Some(err) = first_err {
            // Put unwritten records back ahead of anything added meanwhile.
            let mut buffers = self.lock_buffers();
            let buffer = buffers.entry(key).or_default();
            unwritten.append(buffer);
            *buffer = unwritten;
            return Err(err);
        }

        Ok(())
    }

    async fn write_batch(
        &self,
        key: &BufferKey,
        record_type: String,
        records: Vec<Record>,
    ) -> Result<(), (Vec<Record>, StorageError)> {
        match self
            .persist_batch(&key.step_id, key.kind, &record_type, &records)
            .await
        {
            Ok(relative) => {
                tracing::debug!(
                    target: "collector.store",
                    step_id = %key.step_id,
                    kind = %key.kind,
                    record_type = %record_type,
                    records = records.len(),
                    path = %relative,
                    "batch flushed"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target: "collector.store",
                    step_id = %key.step_id,
                    record_type = %record_type,
                    error = %err,
                    "batch flush failed"
                );
                Err((records, err))
            }
        }
    }

    async fn persist_batch(
        &self,
        step_id: &str,
        kind: RecordKind,
        record_type: &str,
        records: &[Record],
    ) -> Result<String, StorageError> {
        let batch_id = Uuid::new_v4().to_string();
        let relative = batch_relative_path(step_id, kind, &batch_id);
        let path = resolve_relative(&self.root, &relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let mut payload = BTreeMap::new();
        payload.insert(kind.as_str(), records);
        let bytes = serde_json::to_vec(&payload)?;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        if let Err(err) = self.append_to_index(kind, record_type, &relative).await {
            // An unindexed batch would be re-flushed and uploaded twice.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err);
        }

        Ok(relative)
    }

    async fn append_to_index(
        &self,
        kind: RecordKind,
        record_type: &str,
        relative: &str,
    ) -> Result<(), StorageError> {
        let manifest = manifest_path(&self.root, kind, record_type);
        let _guard = self.index_lock.lock().await;

        if let Some(parent) = manifest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest)
            .await
            .map_err(|e| StorageError::io(&manifest, e))?;
        file.write_all(format!("{relative}\n").as_bytes())
            .await
            .map_err(|e| StorageError::io(&manifest, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io(&manifest, e))?;

        Ok(())
    }

    /// Batch files indexed under `record_type`, in manifest order.
    pub async fn indexed_batches(
        &self,
        kind: RecordKind,
        record_type: &str,
    ) -> Result<Vec<PathBuf>, StorageError> {
        let manifest = manifest_path(&self.root, kind, record_type);
        let content = {
            let _guard = self.index_lock.lock().await;
            tokio::fs::read_to_string(&manifest).await
        };
        let content = match content {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&manifest, e)),
        };

        let mut seen = HashSet::new();
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && seen.insert(*line))
            .map(|line| resolve_relative(&self.root, line))
            .collect())
    }

    async fn read_batch(&self, path: &Path, kind: RecordKind) -> Result<Vec<Record>, StorageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let batch: BatchFile =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::CorruptBatch {
                path: path.to_path_buf(),
                source,
            })?;

        if batch.kind() != Some(kind) {
            return Err(StorageError::CorruptBatch {
                path: path.to_path_buf(),
                source: <serde_json::Error as serde::de::Error>::custom(format!(
                    "expected a single '{kind}' array"
                )),
            });
        }

        Ok(batch.into_records(kind))
    }

    /// Visit every durably stored record of `record_type`.
    ///
    /// When `step_id` is given, that step's own buffered records are flushed
    /// first so its writes are visible to itself. Batches are read one at a
    /// time in no particular order, and the walk can be repeated at will.
    pub async fn iterate<F, Fut, E>(
        &self,
        step_id: Option<&str>,
        kind: RecordKind,
        record_type: &str,
        mut visitor: F,
    ) -> Result<(), E>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<StorageError>,
    {
        if let Some(step_id) = step_id {
            self.flush(Some(step_id)).await?;
        }

        for path in self.indexed_batches(kind, record_type).await? {
            for record in self.read_batch(&path, kind).await? {
                if record.record_type == record_type {
                    visitor(record).await?;
                }
            }
        }

        Ok(())
    }

    /// Look up an entity by `_key`, scanning only the batches of its type.
    pub async fn find_entity(
        &self,
        step_id: Option<&str>,
        key: &str,
    ) -> Result<Option<Record>, StorageError> {
        let Some(record_type) = self.key_tracker.type_of(key) else {
            return Ok(None);
        };

        if let Some(step_id) = step_id {
            self.flush(Some(step_id)).await?;
        }

        for path in self
            .indexed_batches(RecordKind::Entities, &record_type)
            .await?
        {
            let found = self
                .read_batch(&path, RecordKind::Entities)
                .await?
                .into_iter()
                .find(|r| r.key == key);
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }
}
