//! Priority-ordered prompt assembly under a token budget.
//!
//! Sections are added with a numeric priority (0 is highest). The builder
//! walks sections in priority order and drops any section that would push
//! the running token total over the cap. Priority-0 sections (the system
//! prompt) are never dropped, even when they alone exceed the cap.

use crate::ai::types::estimate_tokens;

struct Section {
    priority: u8,
    name: String,
    content: String,
}

pub struct PromptBuilder {
    sections: Vec<Section>,
    token_cap: usize,
}

/// The assembled prompt plus the names of any dropped sections.
pub struct BuiltPrompt {
    pub text: String,
    pub dropped: Vec<String>,
}

impl PromptBuilder {
    pub fn new(token_cap: usize) -> Self {
        Self {
            sections: Vec::new(),
            token_cap,
        }
    }

    /// Add a section. Empty content is ignored.
    pub fn add(&mut self, priority: u8, name: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        if content.is_empty() {
            return;
        }
        self.sections.push(Section {
            priority,
            name: name.into(),
            content,
        });
    }

    /// Assemble the prompt. Sections keep their insertion order in the
    /// output; priority only controls which survive the budget.
    pub fn build(mut self) -> BuiltPrompt {
        let mut order: Vec<usize> = (0..self.sections.len()).collect();
        order.sort_by_key(|&i| self.sections[i].priority);

        let mut kept = vec![false; self.sections.len()];
        let mut total = 0usize;
        let mut dropped = Vec::new();

        for i in order {
            let section = &self.sections[i];
            let cost = estimate_tokens(&section.content) + 1;
            if section.priority == 0 || total + cost <= self.token_cap {
                kept[i] = true;
                total += cost;
            } else {
                dropped.push(section.name.clone());
            }
        }

        let mut parts = Vec::new();
        for (i, section) in self.sections.drain(..).enumerate() {
            if kept[i] {
                parts.push(section.content);
            }
        }

        BuiltPrompt {
            text: parts.join("\n\n"),
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_everything_under_budget() {
        let mut b = PromptBuilder::new(1000);
        b.add(0, "system", "You are an agent.");
        b.add(20, "context", "Some project context.");
        let built = b.build();
        assert!(built.text.contains("You are an agent."));
        assert!(built.text.contains("project context"));
        assert!(built.dropped.is_empty());
    }

    #[test]
    fn drops_low_priority_sections_over_budget() {
        let mut b = PromptBuilder::new(30);
        b.add(0, "system", "s".repeat(80));
        b.add(10, "state", "t".repeat(40));
        b.add(20, "context", "c".repeat(400));
        let built = b.build();
        assert!(built.text.contains(&"s".repeat(80)));
        assert!(built.text.contains(&"t".repeat(40)));
        assert_eq!(built.dropped, vec!["context".to_string()]);
    }

    #[test]
    fn system_prompt_never_dropped() {
        let mut b = PromptBuilder::new(1);
        b.add(0, "system", "x".repeat(4000));
        let built = b.build();
        assert_eq!(built.text, "x".repeat(4000));
        assert!(built.dropped.is_empty());
    }

    #[test]
    fn output_preserves_insertion_order() {
        let mut b = PromptBuilder::new(1000);
        b.add(20, "later", "BBB");
        b.add(0, "system", "AAA");
        let built = b.build();
        // "later" was inserted first, so it renders first even though the
        // system section has higher priority.
        assert!(built.text.find("BBB").unwrap() < built.text.find("AAA").unwrap());
    }

    #[test]
    fn empty_sections_ignored() {
        let mut b = PromptBuilder::new(100);
        b.add(0, "system", "hello");
        b.add(5, "empty", "");
        let built = b.build();
        assert_eq!(built.text, "hello");
    }
}
