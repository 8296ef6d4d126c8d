//! SQL-style filter clauses for memory scans.

use crate::memory::types::MemoryCategory;

/// Escape a string literal for use in a Lance filter expression.
pub(crate) fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

/// Composable prefilter over stored memory rows.
///
/// The tag clause is a coarse substring match; callers needing exact
/// tag semantics re-check the candidate rows after the scan.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub category: Option<MemoryCategory>,
    pub min_importance: Option<i32>,
    pub tag_contains: Option<String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: MemoryCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_min_importance(mut self, min_importance: i32) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_contains = Some(tag.into());
        self
    }

    /// Render as a SQL clause, or `None` when no conditions are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut parts = Vec::new();

        if let Some(category) = self.category {
            parts.push(format!("category = '{}'", category.as_str()));
        }
        if let Some(min_importance) = self.min_importance {
            parts.push(format!("importance >= {min_importance}"));
        }
        if let Some(tag) = &self.tag_contains {
            parts.push(format!("tags LIKE '%{}%'", escape_sql(tag)));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}
