pub mod config;
pub mod memory;
pub mod sessions;
pub mod stats;

pub use config::ConfigCommand;
pub use memory::MemoryCommand;
pub use sessions::SessionsCommand;
pub use stats::StatsCommand;
