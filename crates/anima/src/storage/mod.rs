//! Persistence for long-term memories.

pub mod filter;
pub mod lance;

pub use filter::RecordFilter;
pub use lance::LanceMemoryStore;
