//! The record store.
//!
//! Owns the live record set together with a lexical and a vector index, and
//! persists all three to a backing directory on [`Store::save`].
//!
//! Every public operation takes one FIFO-fair async mutex over the whole state
//! and keeps it until it finishes, embedder and file I/O included, so no two
//! operations interleave. Mutations are applied only after every fallible
//! await has succeeded: a failed or dropped operation leaves no partial state.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::StoreConfig;
use crate::embedder::Embedder;
use crate::embedding::Embedding;
use crate::error::{EncodingError, StorageError, StoreError};
use crate::index::{
    content_hash, prepare_for_embedding, rrf_fusion, LexicalIndex, VectorIndex,
};
use crate::lock::StoreLock;
use crate::persist::{self, PersistedRecordRef, RECORDS_FILE_NAME};
use crate::record::{Payload, Record};
use crate::storage::{BackendLocal, StorageManager};

/// A live record plus its insertion sequence number.
#[derive(Debug, Clone)]
struct Entry<T> {
    record: Record<T>,
    /// Monotonic across the store's lifetime, persisted; breaks date ties
    seq: u64,
}

struct StoreState<T> {
    records: HashMap<String, Entry<T>>,
    lexical: LexicalIndex,
    vectors: VectorIndex,
    next_seq: u64,
    /// Provider tag of the last embeddings the embedder returned
    seen_provider: Option<String>,
    /// Background write started by `save(false)`
    pending_save: Option<JoinHandle<std::io::Result<()>>>,
}

/// Where an inserted record's embedding comes from.
enum EmbeddingSource {
    /// Unchanged text: keep the stored embedding
    Reuse(Embedding),
    /// Index into the batch sent to the embedder
    Fresh(usize),
}

impl<T: Payload> StoreState<T> {
    fn new(config: &StoreConfig) -> Self {
        Self {
            records: HashMap::new(),
            lexical: LexicalIndex::new(config.bm25_k1, config.bm25_b),
            vectors: VectorIndex::new(),
            next_seq: 0,
            seen_provider: None,
            pending_save: None,
        }
    }

    /// Insert or replace `record` in the record set and both indexes.
    fn upsert(&mut self, record: Record<T>, seq: u64, content_hash: u64, embedding: Embedding) {
        self.lexical.insert(&record.id, &record.text);
        self.vectors.insert(&record.id, content_hash, embedding);
        self.next_seq = self.next_seq.max(seq + 1);
        self.records
            .insert(record.id.clone(), Entry { record, seq });
    }

    fn remove(&mut self, id: &str) -> bool {
        if self.records.remove(id).is_none() {
            return false;
        }
        self.lexical.remove(id);
        self.vectors.remove(id);
        true
    }

    fn remove_groups(&mut self, groups: &[&str]) -> usize {
        let ids: Vec<String> = self
            .records
            .values()
            .filter(|e| {
                e.record
                    .group
                    .as_deref()
                    .is_some_and(|g| groups.contains(&g))
            })
            .map(|e| e.record.id.clone())
            .collect();

        ids.iter().filter(|id| self.remove(id)).count()
    }

    /// Order scored ids by score, then date, then insertion; newest first on ties.
    fn rank(&self, scored: Vec<(String, f32)>, limit: usize) -> Vec<Record<T>> {
        let mut hits: Vec<(&Entry<T>, f32)> = scored
            .into_iter()
            .filter_map(|(id, score)| self.records.get(&id).map(|e| (e, score)))
            .collect();

        hits.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| recency(a, b))
        });

        hits.into_iter()
            .take(limit)
            .map(|(e, _)| e.record.clone())
            .collect()
    }

    fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        let mut entries: Vec<&Entry<T>> = self.records.values().collect();
        entries.sort_by_key(|e| e.seq);

        let refs: Vec<PersistedRecordRef<'_, T>> = entries
            .into_iter()
            .filter_map(|e| {
                let vector = self.vectors.get(&e.record.id)?;
                Some(PersistedRecordRef {
                    id: &e.record.id,
                    group: e.record.group.as_deref(),
                    date: e.record.date,
                    text: &e.record.text,
                    data: &e.record.data,
                    seq: e.seq,
                    content_hash: vector.content_hash,
                    embedding: &vector.embedding,
                })
            })
            .collect();

        persist::encode(refs.into_iter())
    }

    /// Wait for a background write started by an earlier `save(false)`.
    async fn finish_pending_save(&mut self) -> Result<(), StoreError> {
        if let Some(handle) = self.pending_save.take() {
            join_write(handle).await?;
        }
        Ok(())
    }
}

/// Newest first: later date, then later insertion.
fn recency<T>(a: &Entry<T>, b: &Entry<T>) -> Ordering {
    b.record
        .date
        .cmp(&a.record.date)
        .then_with(|| b.seq.cmp(&a.seq))
}

async fn join_write(handle: JoinHandle<std::io::Result<()>>) -> Result<(), StoreError> {
    handle
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(StorageError::Io)?;
    Ok(())
}

/// Durable, queryable collection of [`Record`]s.
pub struct Store<T: Payload> {
    state: Mutex<StoreState<T>>,
    embedder: Arc<dyn Embedder>,
    config: StoreConfig,
    backend: Option<Arc<BackendLocal>>,
    _lock: Option<StoreLock>,
}

impl<T: Payload> Store<T> {
    /// Open a store at `location`, or a purely in-memory one for `None`.
    ///
    /// With a location, `passagedb.yaml` in that directory configures the
    /// store when present, and existing records are loaded before returning.
    pub fn open(location: Option<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let config = match &location {
            Some(dir) if dir.exists() => StoreConfig::load_with(dir)?,
            _ => StoreConfig::default(),
        };
        Self::open_with_config(location, embedder, config)
    }

    /// In-memory store with default config.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        let config = StoreConfig::default();
        Self {
            state: Mutex::new(StoreState::new(&config)),
            embedder,
            config,
            backend: None,
            _lock: None,
        }
    }

    pub fn open_with_config(
        location: Option<PathBuf>,
        embedder: Arc<dyn Embedder>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        config.validate()?;

        let mut state = StoreState::new(&config);

        let Some(dir) = location else {
            return Ok(Self {
                state: Mutex::new(state),
                embedder,
                config,
                backend: None,
                _lock: None,
            });
        };

        let backend = BackendLocal::new(&dir).map_err(StorageError::Io)?;
        let lock = acquire_lock(&dir)?;

        if backend.exists(RECORDS_FILE_NAME) {
            let bytes = backend.read(RECORDS_FILE_NAME).map_err(StorageError::Io)?;
            let loaded = persist::decode::<T>(&bytes)?;

            if loaded.skipped > 0 {
                log::warn!(
                    "Skipped {} unreadable records in {}",
                    loaded.skipped,
                    dir.display()
                );
            }

            for p in loaded.records {
                let record = Record {
                    id: p.id,
                    group: p.group,
                    date: p.date,
                    text: p.text,
                    data: p.data,
                };
                state.upsert(record, p.seq, p.content_hash, p.embedding);
            }
            log::info!("Loaded {} records from {}", state.records.len(), dir.display());
        } else {
            log::info!("No existing records at {}, starting fresh", dir.display());
        }

        Ok(Self {
            state: Mutex::new(state),
            embedder,
            config,
            backend: Some(Arc::new(backend)),
            _lock: Some(lock),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Backing directory, `None` for an in-memory store.
    pub fn location(&self) -> Option<&Path> {
        self.backend.as_ref().map(|b| b.base_dir.as_path())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }

    /// Insert or replace `records`, embedding new or changed text in one batch.
    pub async fn insert(&self, records: Vec<Record<T>>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.insert_locked(&mut state, records, None).await?;
        Ok(())
    }

    /// Delete every record in `group` and insert `records`, as one step.
    pub async fn insert_replacing_group(
        &self,
        records: Vec<Record<T>>,
        group: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.insert_locked(&mut state, records, Some(group)).await?;
        Ok(())
    }

    async fn insert_locked(
        &self,
        state: &mut StoreState<T>,
        records: Vec<Record<T>>,
        replace_group: Option<&str>,
    ) -> Result<(), StoreError> {
        // unknown until the embedder has answered once; no reuse before that
        let provider = self
            .embedder
            .provider()
            .map(str::to_string)
            .or_else(|| state.seen_provider.clone());

        let mut documents: Vec<String> = Vec::new();
        let mut batch_slots: HashMap<String, usize> = HashMap::new();
        let mut plan = Vec::with_capacity(records.len());

        for record in records {
            let prepared = prepare_for_embedding(&record.text, self.config.max_embed_chars);
            let hash = content_hash(&prepared);

            let reusable = state.vectors.get(&record.id).filter(|v| {
                v.content_hash == hash && provider.as_deref() == Some(v.embedding.provider())
            });

            let source = match reusable {
                Some(v) => EmbeddingSource::Reuse(v.embedding.clone()),
                None => {
                    let slot = *batch_slots.entry(prepared.clone()).or_insert_with(|| {
                        documents.push(prepared);
                        documents.len() - 1
                    });
                    EmbeddingSource::Fresh(slot)
                }
            };
            plan.push((record, hash, source));
        }

        let embeddings = if documents.is_empty() {
            Vec::new()
        } else {
            log::debug!(
                "Embedding {} texts for {} records",
                documents.len(),
                plan.len()
            );
            self.embed_checked(&documents).await?
        };

        // nothing below can fail
        if let Some(first) = embeddings.first() {
            state.seen_provider = Some(first.provider().to_string());
        }
        if let Some(group) = replace_group {
            let removed = state.remove_groups(&[group]);
            log::debug!("Replacing {} records in group '{}'", removed, group);
        }

        for (record, hash, source) in plan {
            let embedding = match source {
                EmbeddingSource::Reuse(embedding) => embedding,
                EmbeddingSource::Fresh(slot) => embeddings[slot].clone(),
            };
            let seq = state.next_seq;
            state.upsert(record, seq, hash, embedding);
        }

        Ok(())
    }

    /// Call the embedder and verify the one-per-document, single-space contract.
    async fn embed_checked(&self, documents: &[String]) -> Result<Vec<Embedding>, StoreError> {
        let embeddings = self.embedder.embed(documents).await?;

        if embeddings.len() != documents.len() {
            return Err(EncodingError::EmbeddingCountMismatch {
                expected: documents.len(),
                got: embeddings.len(),
            }
            .into());
        }

        if let Some(first) = embeddings.first() {
            for other in &embeddings[1..] {
                if other.provider() != first.provider() {
                    return Err(EncodingError::MixedProviders(
                        first.provider().to_string(),
                        other.provider().to_string(),
                    )
                    .into());
                }
                if other.dimensions() != first.dimensions() {
                    return Err(
                        EncodingError::MixedDimensions(first.dimensions(), other.dimensions())
                            .into(),
                    );
                }
            }
        }

        if !self.config.half_precision {
            return Ok(embeddings);
        }
        Ok(embeddings
            .into_iter()
            .map(|e| e.with_precision(true))
            .collect())
    }

    /// Remove records by id. Unknown ids are ignored. Returns how many were removed.
    pub async fn delete_records(&self, ids: &[&str]) -> usize {
        let mut state = self.state.lock().await;
        ids.iter().filter(|id| state.remove(id)).count()
    }

    /// Remove every record whose group is in `groups`. Returns how many were removed.
    pub async fn delete_groups(&self, groups: &[&str]) -> usize {
        let mut state = self.state.lock().await;
        state.remove_groups(groups)
    }

    /// Keep only the `keep` most recent records (by date, then insertion).
    /// Returns how many were removed.
    pub async fn delete_oldest_records(&self, keep: usize) -> usize {
        let mut state = self.state.lock().await;
        if state.records.len() <= keep {
            return 0;
        }

        let mut entries: Vec<&Entry<T>> = state.records.values().collect();
        entries.sort_by(|a, b| recency(a, b));
        let evicted: Vec<String> = entries
            .into_iter()
            .skip(keep)
            .map(|e| e.record.id.clone())
            .collect();

        for id in &evicted {
            state.remove(id);
        }
        log::debug!("Evicted {} oldest records, kept {}", evicted.len(), keep);
        evicted.len()
    }

    pub async fn record(&self, id: &str) -> Option<Record<T>> {
        let state = self.state.lock().await;
        state.records.get(id).map(|e| e.record.clone())
    }

    /// Records of `group`, newest first.
    pub async fn group_records(&self, group: &str) -> Vec<Record<T>> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry<T>> = state
            .records
            .values()
            .filter(|e| e.record.in_group(group))
            .collect();
        entries.sort_by(|a, b| recency(a, b));
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// BM25 ranking of record text against `query`.
    ///
    /// Only records sharing at least one term with the query are returned.
    pub async fn full_text_search(&self, query: &str, limit: Option<usize>) -> Vec<Record<T>> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let state = self.state.lock().await;

        let scored = state.lexical.search(query);
        log::debug!("Full-text query matched {} records", scored.len());
        state.rank(scored, limit)
    }

    /// Cosine-similarity ranking against the embedded `query`.
    ///
    /// Records embedded by a different provider, or with a different
    /// dimension, are left out.
    pub async fn embedding_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Record<T>>, StoreError> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let mut state = self.state.lock().await;

        if state.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_query(query).await?;
        state.seen_provider = Some(query_embedding.provider().to_string());
        let scored = state.vectors.search(&query_embedding);
        Ok(state.rank(scored, limit))
    }

    /// Weighted reciprocal rank fusion of the full-text and embedding rankings.
    ///
    /// `semantic_weight` defaults to the configured weight.
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: Option<usize>,
        semantic_weight: Option<f32>,
    ) -> Result<Vec<Record<T>>, StoreError> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let weight = semantic_weight.unwrap_or(self.config.semantic_weight);
        let mut state = self.state.lock().await;

        if state.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_query(query).await?;
        state.seen_provider = Some(query_embedding.provider().to_string());
        let ranked_ids = |scored: Vec<(String, f32)>| -> Vec<String> {
            let count = scored.len();
            state
                .rank(scored, count)
                .into_iter()
                .map(|r| r.id)
                .collect()
        };

        let semantic = ranked_ids(state.vectors.search(&query_embedding));
        let lexical = ranked_ids(state.lexical.search(query));

        let fused = rrf_fusion(&semantic, &lexical, weight)
            .into_iter()
            .map(|f| (f.id, f.score))
            .collect();
        Ok(state.rank(fused, limit))
    }

    async fn embed_query(&self, query: &str) -> Result<Embedding, StoreError> {
        let prepared = prepare_for_embedding(query, self.config.max_embed_chars);
        let mut embeddings = self.embed_checked(&[prepared]).await?;
        embeddings.pop().ok_or_else(|| {
            EncodingError::EmbeddingCountMismatch {
                expected: 1,
                got: 0,
            }
            .into()
        })
    }

    /// Write the current state to the backing directory.
    ///
    /// With `sync`, returns once the data is durable. Without it the write
    /// runs in the background; its outcome is reported by the next `save`
    /// or by [`Store::close`]. A no-op for in-memory stores.
    pub async fn save(&self, sync: bool) -> Result<(), StoreError> {
        let Some(backend) = self.backend.clone() else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        state.finish_pending_save().await?;

        let bytes = state.encode()?;
        let count = state.records.len();
        let handle =
            tokio::task::spawn_blocking(move || backend.write(RECORDS_FILE_NAME, &bytes, sync));

        if sync {
            join_write(handle).await?;
            log::info!("Saved {} records", count);
        } else {
            state.pending_save = Some(handle);
            log::debug!("Scheduled background save of {} records", count);
        }
        Ok(())
    }

    /// Wait for any background save to finish and report its result.
    pub async fn close(self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.finish_pending_save().await?;
        Ok(())
    }
}

fn acquire_lock(dir: &Path) -> Result<StoreLock, StorageError> {
    StoreLock::try_acquire(dir).map_err(|err| {
        if err.kind() == std::io::ErrorKind::WouldBlock {
            StorageError::Locked(dir.display().to_string())
        } else {
            StorageError::Io(err)
        }
    })
}
