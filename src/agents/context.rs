//! Dependency-result context passed from prerequisite tasks into a
//! dependent task's prompt.
//!
//! Keys follow the `{agent}_{index}_result` convention. The map renders
//! either as pretty JSON or, when the plan task opts in, as a compact
//! key/value-per-line form. Values that do not render as a single line fall
//! back silently to their JSON encoding, so both sides tolerate mixed
//! content.

use std::collections::BTreeMap;

use serde_json::Value;

/// Ordered map of prerequisite results.
#[derive(Debug, Clone, Default)]
pub struct DependencyContext {
    entries: BTreeMap<String, Value>,
}

impl DependencyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one prerequisite result under its `{agent}_{index}_result` key.
    pub fn insert(&mut self, agent: &str, index: usize, payload: Value) {
        self.entries.insert(format!("{agent}_{index}_result"), payload);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render as a prompt block. `compact` selects the line-oriented form.
    pub fn render(&self, compact: bool) -> String {
        if compact {
            self.render_compact()
        } else {
            self.render_json()
        }
    }

    fn render_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries)
            .unwrap_or_else(|_| self.render_compact())
    }

    /// One `key: value` line per entry. Multi-line or structured values fall
    /// back to single-line JSON so the block stays line-oriented.
    fn render_compact(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) if !s.contains('\n') => s.clone(),
                    other => serde_json::to_string(other).unwrap_or_default(),
                };
                format!("{key}: {rendered}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_follow_convention() {
        let mut ctx = DependencyContext::new();
        ctx.insert("search", 0, json!("found three files"));
        let block = ctx.render(true);
        assert_eq!(block, "search_0_result: found three files");
    }

    #[test]
    fn compact_falls_back_to_json_for_structures() {
        let mut ctx = DependencyContext::new();
        ctx.insert("search", 0, json!({"files": ["a.rs", "b.rs"]}));
        let block = ctx.render(true);
        assert!(block.starts_with("search_0_result: {"));
        assert!(block.contains("a.rs"));
        assert_eq!(block.lines().count(), 1);
    }

    #[test]
    fn multiline_strings_fall_back_to_json() {
        let mut ctx = DependencyContext::new();
        ctx.insert("code", 1, json!("line one\nline two"));
        let block = ctx.render(true);
        assert_eq!(block.lines().count(), 1);
        assert!(block.contains("\\n"));
    }

    #[test]
    fn json_rendering_is_parseable() {
        let mut ctx = DependencyContext::new();
        ctx.insert("search", 0, json!("hit"));
        ctx.insert("code", 1, json!({"changed": 2}));
        let parsed: serde_json::Value = serde_json::from_str(&ctx.render(false)).unwrap();
        assert_eq!(parsed["search_0_result"], "hit");
        assert_eq!(parsed["code_1_result"]["changed"], 2);
    }
}
