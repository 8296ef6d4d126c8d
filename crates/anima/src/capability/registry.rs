//! Named capability registration and dispatch.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::capability::parser::ArgMap;
use crate::error::Result;

/// A named, schema-described callable the language model may invoke.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Grouping label used in the prompt manifest.
    fn category(&self) -> &'static str {
        "general"
    }

    /// Per-parameter schema: a JSON object mapping parameter name to
    /// `{type, description, ...}`.
    fn parameters(&self) -> Value {
        json!({})
    }

    /// Human-readable description of the return shape.
    fn returns(&self) -> &'static str;

    async fn invoke(&self, args: &ArgMap) -> Result<Value>;
}

/// Listing entry describing one registered capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: Value,
    pub returns: String,
}

/// Uniform result envelope for a single capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationOutcome {
    Success { result: Value },
    Error { error: String },
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            InvocationOutcome::Success { result } => {
                json!({"status": "success", "result": result})
            }
            InvocationOutcome::Error { error } => {
                json!({"status": "error", "error": error})
            }
        }
    }
}

/// Registry of capabilities keyed by name.
///
/// Listing and manifest rendering follow registration order so prompt
/// assembly stays deterministic.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: DashMap<String, Arc<dyn Capability>>,
    order: RwLock<Vec<String>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Re-registering a name replaces the handler
    /// but keeps its original listing position.
    pub fn register(&self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        let previous = self.capabilities.insert(name.clone(), capability);
        if previous.is_none() {
            if let Ok(mut order) = self.order.write() {
                order.push(name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Describe every registered capability in registration order.
    pub fn list(&self) -> Vec<CapabilitySpec> {
        let order = match self.order.read() {
            Ok(order) => order.clone(),
            Err(_) => return Vec::new(),
        };
        order
            .iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|entry| {
                let cap = entry.value();
                CapabilitySpec {
                    name: cap.name().to_string(),
                    description: cap.description().to_string(),
                    category: cap.category().to_string(),
                    parameters: cap.parameters(),
                    returns: cap.returns().to_string(),
                }
            })
            .collect()
    }

    /// Invoke a capability by name, capturing any failure in the envelope.
    pub async fn execute(&self, name: &str, args: &ArgMap) -> InvocationOutcome {
        let Some(capability) = self.capabilities.get(name).map(|e| e.value().clone()) else {
            return InvocationOutcome::Error {
                error: format!("capability '{name}' not found"),
            };
        };

        debug!(capability = name, "dispatching capability");
        match capability.invoke(args).await {
            Ok(result) => InvocationOutcome::Success { result },
            Err(e) => InvocationOutcome::Error {
                error: e.to_string(),
            },
        }
    }

    /// Render the prompt block describing available capabilities.
    ///
    /// An empty registry renders an empty string so the block can be
    /// dropped from the prompt entirely.
    pub fn manifest(&self) -> String {
        let specs = self.list();
        if specs.is_empty() {
            return String::new();
        }

        let mut lines = vec![
            "[AVAILABLE TOOLS]".to_string(),
            "You can use tools by outputting: [TOOL:tool_name(param1=\"value\", param2=123)]"
                .to_string(),
            String::new(),
        ];

        // Group under category headings in first-appearance order
        let mut categories: Vec<(String, Vec<&CapabilitySpec>)> = Vec::new();
        for spec in &specs {
            match categories.iter_mut().find(|(c, _)| *c == spec.category) {
                Some((_, group)) => group.push(spec),
                None => categories.push((spec.category.clone(), vec![spec])),
            }
        }

        for (category, group) in categories {
            lines.push(format!("## {} TOOLS", category.to_uppercase()));
            lines.push(String::new());
            for spec in group {
                lines.push(format!("### {}", spec.name));
                lines.push(spec.description.clone());
                let has_params = spec
                    .parameters
                    .as_object()
                    .is_some_and(|params| !params.is_empty());
                if has_params {
                    let rendered =
                        serde_json::to_string_pretty(&spec.parameters).unwrap_or_default();
                    lines.push(format!("Parameters: {rendered}"));
                }
                lines.push(format!("Returns: {}", spec.returns));
                lines.push(String::new());
            }
        }

        lines.push("[END TOOLS]".to_string());
        lines.join("\n")
    }
}
