//! Prompt Builder
//!
//! Standardized prompt construction for generation calls. Output is fully
//! deterministic (ordered sections, ordered context) so identical inputs
//! produce identical prompts and therefore identical cache keys.
//!
//! ## Layout
//!
//! 1. **Fields**: plain `Key: value` header lines
//! 2. **Role**: the AI role for the task
//! 3. **Objectives**: numbered goals
//! 4. **Context**: ordered key-value inputs
//! 5. **Sections**: prior artifacts and free text
//! 6. **Focus / Anti-patterns**: drift control

/// Prompt section types
#[derive(Debug, Clone, PartialEq)]
pub enum PromptSection {
    /// Machine-readable `Key: value` lines
    Fields(Vec<(String, String)>),
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Ordered key-value context
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
    /// Anti-patterns with good/bad examples
    AntiPatterns { bad: Vec<String>, good: Vec<String> },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `Key: value` header line, merged into one block
    pub fn field(mut self, key: &str, value: &str) -> Self {
        let entry = (key.to_string(), value.to_string());
        match self
            .sections
            .iter_mut()
            .find(|s| matches!(s, PromptSection::Fields(_)))
        {
            Some(PromptSection::Fields(fields)) => fields.push(entry),
            _ => self.sections.push(PromptSection::Fields(vec![entry])),
        }
        self
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives(mut self, objectives: &[&str]) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.iter().map(|o| o.to_string()).collect(),
        ));
        self
    }

    /// Add a context item; items keep insertion order, later keys overwrite
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        let existing = self.sections.iter_mut().find_map(|s| match s {
            PromptSection::Context(ctx) => Some(ctx),
            _ => None,
        });

        match existing {
            Some(ctx) => match ctx.iter_mut().find(|(k, _)| k == key) {
                Some((_, v)) => *v = value.to_string(),
                None => ctx.push((key.to_string(), value.to_string())),
            },
            None => self.sections.push(PromptSection::Context(vec![(
                key.to_string(),
                value.to_string(),
            )])),
        }
        self
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    pub fn focus(mut self, target: &str, restrictions: &[&str]) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    pub fn anti_patterns(mut self, bad: &[&str], good: &[&str]) -> Self {
        self.sections.push(PromptSection::AntiPatterns {
            bad: bad.iter().map(|b| b.to_string()).collect(),
            good: good.iter().map(|g| g.to_string()).collect(),
        });
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Fields(fields) => {
                    for (key, value) in fields {
                        prompt.push_str(&format!("{}: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(ctx) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in ctx {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
                PromptSection::AntiPatterns { bad, good } => {
                    prompt.push_str("<what_not_to_do>\n");
                    for example in bad {
                        prompt.push_str(&format!("WRONG: {}\n", example));
                    }
                    prompt.push_str("</what_not_to_do>\n\n<what_to_do>\n");
                    for example in good {
                        prompt.push_str(&format!("CORRECT: {}\n", example));
                    }
                    prompt.push_str("</what_to_do>\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_and_objectives() {
        let prompt = PromptBuilder::new()
            .role("product strategist", "project planning")
            .objectives(&["Define the problem", "Name the users"])
            .build();

        assert!(prompt.contains("<ROLE>"));
        assert!(prompt.contains("product strategist"));
        assert!(prompt.contains("1. Define the problem"));
        assert!(prompt.contains("2. Name the users"));
    }

    #[test]
    fn test_fields_render_first_as_plain_lines() {
        let prompt = PromptBuilder::new()
            .field("Project", "Habit Coach")
            .role("planner", "roadmaps")
            .field("Section", "roadmap")
            .build();

        assert!(prompt.starts_with("Project: Habit Coach\nSection: roadmap\n"));
    }

    #[test]
    fn test_context_is_ordered_and_overwrites() {
        let prompt = PromptBuilder::new()
            .context_item("Budget", "small")
            .context_item("Audience", "students")
            .context_item("Budget", "medium")
            .build();

        let budget = prompt.find("**Budget**: medium").unwrap();
        let audience = prompt.find("**Audience**: students").unwrap();
        assert!(budget < audience);
        assert!(!prompt.contains("small"));
    }

    #[test]
    fn test_identical_inputs_identical_prompts() {
        let build = || {
            PromptBuilder::new()
                .context_item("A", "1")
                .context_item("B", "2")
                .section("Prior", "text")
                .build()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_focus_and_anti_patterns() {
        let prompt = PromptBuilder::new()
            .focus("the roadmap", &["Do NOT restate the plan"])
            .anti_patterns(&["Vague phases"], &["Dated milestones"])
            .build();

        assert!(prompt.contains("<FOCUS>"));
        assert!(prompt.contains("Do NOT restate the plan"));
        assert!(prompt.contains("WRONG: Vague phases"));
        assert!(prompt.contains("CORRECT: Dated milestones"));
    }
}
