//! Long-term memory: categorized, scored, embedded records.

pub mod engine;
pub mod types;

pub use engine::{MemoryEngine, RecallParams, cosine_similarity};
pub use types::{MemoryCategory, MemoryRecord, MemoryStats, RecalledMemory, generate_memory_id};
