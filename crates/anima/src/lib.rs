//! Anima - A conversational agent engine with long-term memory
//!
//! This crate orchestrates conversation turns end to end: semantic
//! memory recall, deterministic prompt assembly, tool dispatch through
//! a capability registry, and model-driven memory formation.

pub mod capability;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod storage;
pub mod testing;

pub use error::AnimaError;
