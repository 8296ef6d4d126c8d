//! Long-term memory on top of the vector store.
//!
//! Writes are strict: a failed insert is an error the caller sees.
//! Reads degrade: any storage or embedding fault during retrieval is
//! logged and the caller gets an empty result, so a broken backend
//! never takes a conversation down with it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::memory::types::{MemoryCategory, MemoryRecord, MemoryStats, RecalledMemory};
use crate::storage::{LanceMemoryStore, RecordFilter};

/// Importance at or above which a memory skips the distance cutoff.
const DISTANCE_EXEMPT_IMPORTANCE: i32 = 9;

/// Knobs for a single recall pass.
#[derive(Debug, Clone)]
pub struct RecallParams {
    /// How many memories to return.
    pub n_results: usize,
    /// Drop candidates below this importance.
    pub min_importance: i32,
    /// Restrict the candidate pool to one category.
    pub category: Option<MemoryCategory>,
    /// Drop candidates further than this from the query. `None` uses the
    /// configured default. High-importance memories are exempt.
    pub max_distance: Option<f32>,
}

impl Default for RecallParams {
    fn default() -> Self {
        Self {
            n_results: 10,
            min_importance: 5,
            category: None,
            max_distance: None,
        }
    }
}

pub struct MemoryEngine {
    store: LanceMemoryStore,
    embedder: Arc<dyn EmbeddingProvider>,
    config: MemoryConfig,
}

impl MemoryEngine {
    /// Wrap an already-initialized store.
    pub fn new(
        store: LanceMemoryStore,
        embedder: Arc<dyn EmbeddingProvider>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Embed text for storage. A provider failure downgrades to a zero
    /// vector so the memory is still kept; it just won't rank in
    /// similarity search.
    async fn embed_or_zero(&self, text: &str) -> Vec<f32> {
        match self.embedder.embed(text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding failed, storing zero vector: {e}");
                vec![0.0; self.store.dimensions()]
            }
        }
    }

    /// Persist a new memory. The content is embedded at save time.
    pub async fn save(
        &self,
        content: &str,
        category: MemoryCategory,
        importance: i32,
        tags: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Result<MemoryRecord> {
        let mut record = MemoryRecord::new(content, category, importance, tags);
        record.embedding = self.embed_or_zero(content).await;
        record.metadata = metadata;

        self.store.insert(&record).await?;
        info!(
            "Saved memory {} ({}, importance {})",
            record.id, record.category, record.importance
        );
        Ok(record)
    }

    /// Retrieve the memories most relevant to a query.
    ///
    /// Candidates are overfetched from the vector store, filtered by
    /// importance and distance, then ranked by
    /// `importance * (1 - distance)` so that an important near miss can
    /// outrank a trivial exact hit.
    pub async fn recall(&self, query: &str, params: RecallParams) -> Vec<RecalledMemory> {
        if params.n_results == 0 {
            return Vec::new();
        }

        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Recall skipped, query embedding failed: {e}");
                return Vec::new();
            }
        };

        let fetch = params.n_results * self.config.candidate_multiplier.max(1);
        let mut filter = RecordFilter::new();
        if let Some(category) = params.category {
            filter = filter.with_category(category);
        }

        let candidates = match self
            .store
            .nearest(&query_embedding, fetch, filter.to_sql_clause())
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Recall failed, returning no memories: {e}");
                return Vec::new();
            }
        };

        let max_distance = params.max_distance.unwrap_or(self.config.max_distance);
        let mut results: Vec<RecalledMemory> = candidates
            .into_iter()
            .filter(|record| record.importance >= params.min_importance)
            .filter_map(|record| {
                let distance = 1.0 - cosine_similarity(&query_embedding, &record.embedding);
                if distance > max_distance && record.importance < DISTANCE_EXEMPT_IMPORTANCE {
                    return None;
                }
                let relevance = 1.0 - distance;
                let score = record.importance as f32 * relevance;
                Some(RecalledMemory {
                    record,
                    distance,
                    relevance,
                    score,
                })
            })
            .collect();

        // Stable sort keeps backend proximity order between equal scores
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(params.n_results);

        debug!("Recalled {} memories for query", results.len());
        results
    }

    pub async fn get(&self, id: &str) -> Option<MemoryRecord> {
        match self.store.get(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Memory lookup failed for {id}: {e}");
                None
            }
        }
    }

    pub async fn get_by_tag(&self, tag: &str, limit: usize) -> Vec<MemoryRecord> {
        // The stored-tag filter is a substring match; re-check candidates
        // for an exact tag so "art" does not match "heart"
        let filter = RecordFilter::new().with_tag(tag).to_sql_clause();
        match self.store.scan(filter, None).await {
            Ok(mut records) => {
                records.retain(|record| record.tags.iter().any(|t| t == tag));
                records.truncate(limit);
                records
            }
            Err(e) => {
                warn!("Tag lookup failed for '{tag}': {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_by_category(&self, category: MemoryCategory, limit: usize) -> Vec<MemoryRecord> {
        let filter = RecordFilter::new().with_category(category).to_sql_clause();
        match self.store.scan(filter, Some(limit)).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Category lookup failed for '{category}': {e}");
                Vec::new()
            }
        }
    }

    /// Most recently created memories, newest first.
    pub async fn get_recent(&self, limit: usize) -> Vec<MemoryRecord> {
        match self.store.scan(None, None).await {
            Ok(mut records) => {
                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                records.truncate(limit);
                records
            }
            Err(e) => {
                warn!("Recent-memory lookup failed: {e}");
                Vec::new()
            }
        }
    }

    /// Update fields on an existing memory. Changing the content
    /// re-embeds it. Returns `None` when the id does not exist.
    pub async fn update(
        &self,
        id: &str,
        content: Option<&str>,
        importance: Option<i32>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<MemoryRecord>> {
        let Some(mut record) = self.store.get(id).await? else {
            return Ok(None);
        };

        if let Some(content) = content {
            if content != record.content {
                record.content = content.to_string();
                record.embedding = self.embed_or_zero(content).await;
            }
        }
        if let Some(importance) = importance {
            record.set_importance(importance);
        }
        if let Some(tags) = tags {
            record.tags = tags;
        }
        record.updated_at = Utc::now();

        self.store.replace(&record).await?;
        debug!("Updated memory {id}");
        Ok(Some(record))
    }

    /// Delete a memory. Returns whether it existed; deleting a missing
    /// id is not an error.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.store.delete(id).await?;
        if existed {
            info!("Deleted memory {id}");
        }
        Ok(existed)
    }

    /// Counts by category and importance. Faults degrade to empty stats.
    pub async fn stats(&self) -> MemoryStats {
        let records = match self.store.scan(None, None).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Memory stats unavailable: {e}");
                return MemoryStats::empty();
            }
        };

        let mut stats = MemoryStats::empty();
        stats.total = records.len();
        for record in &records {
            *stats
                .by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
            *stats.by_importance.entry(record.importance).or_insert(0) += 1;
        }
        stats
    }
}

/// Cosine similarity between two vectors, clamped to [-1, 1].
/// Mismatched or empty vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
