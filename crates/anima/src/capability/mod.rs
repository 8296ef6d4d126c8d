//! Capability registration, dispatch, and the inline tool-call syntax.

pub mod builtin;
pub mod parser;
pub mod registry;

pub use builtin::register_builtins;
pub use parser::{ArgMap, ArgValue, ToolCall, parse_tool_calls};
pub use registry::{Capability, CapabilityRegistry, CapabilitySpec, InvocationOutcome};
