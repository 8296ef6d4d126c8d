//! Memory record types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Fact,
    Emotion,
    Insight,
    Plan,
    Preference,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Fact,
        MemoryCategory::Emotion,
        MemoryCategory::Insight,
        MemoryCategory::Plan,
        MemoryCategory::Preference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Fact => "fact",
            MemoryCategory::Emotion => "emotion",
            MemoryCategory::Insight => "insight",
            MemoryCategory::Plan => "plan",
            MemoryCategory::Preference => "preference",
        }
    }

    /// Lenient parse for labels coming from model output or storage.
    /// Unknown labels fall back to `Fact`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "emotion" => MemoryCategory::Emotion,
            "insight" => MemoryCategory::Insight,
            "plan" => MemoryCategory::Plan,
            "preference" => MemoryCategory::Preference,
            _ => MemoryCategory::Fact,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Produce a `mem_<millis>` identifier. Same-millisecond callers get
/// strictly increasing values, so ids never collide within a process.
pub fn generate_memory_id() -> String {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_ID_MILLIS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(if last >= now { last + 1 } else { now })
        })
        .unwrap_or(now);
    let assigned = if previous >= now { previous + 1 } else { now };
    format!("mem_{assigned}")
}

/// A single long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Time-derived identifier assigned at creation
    pub id: String,
    /// Natural-language content; the embedding is computed from this
    pub content: String,
    /// Fixed-width embedding vector (all zeros when embedding degraded)
    pub embedding: Vec<f32>,
    /// Classification bucket
    pub category: MemoryCategory,
    /// Importance on a 1-10 scale
    pub importance: i32,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Open metadata bag persisted as JSON
    pub metadata: Map<String, Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last content or attribute change
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a record with a fresh id and clamped importance. The
    /// embedding starts empty and is filled in at save time.
    pub fn new(
        content: impl Into<String>,
        category: MemoryCategory,
        importance: i32,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_memory_id(),
            content: content.into(),
            embedding: Vec::new(),
            category,
            importance: importance.clamp(1, 10),
            tags,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn set_importance(&mut self, importance: i32) {
        self.importance = importance.clamp(1, 10);
        self.updated_at = Utc::now();
    }
}

/// A memory returned from recall, annotated with its query geometry.
#[derive(Debug, Clone, Serialize)]
pub struct RecalledMemory {
    pub record: MemoryRecord,
    /// Cosine distance to the query (0 = identical direction)
    pub distance: f32,
    /// 1 - distance
    pub relevance: f32,
    /// importance * relevance; the recall ranking key
    pub score: f32,
}

/// Aggregate counts over the memory store.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Counts for every importance level 1 through 10, zeros included
    pub by_importance: BTreeMap<i32, usize>,
}

impl MemoryStats {
    pub fn empty() -> Self {
        let mut by_category = BTreeMap::new();
        for category in MemoryCategory::ALL {
            by_category.insert(category.as_str().to_string(), 0);
        }
        let mut by_importance = BTreeMap::new();
        for level in 1..=10 {
            by_importance.insert(level, 0);
        }
        Self {
            total: 0,
            by_category,
            by_importance,
        }
    }
}
