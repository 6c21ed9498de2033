//! Blueprint Data Model

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::blueprint::milestone;
use crate::types::{ForgeError, GenerationId};

// =============================================================================
// Sections
// =============================================================================

/// Named, independently regenerable part of a blueprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Plan,
    TechStack,
    Workflow,
    Roadmap,
    Financials,
}

impl SectionKind {
    /// Pipeline order; every section follows its dependencies
    pub const ALL: [SectionKind; 5] = [
        Self::Plan,
        Self::TechStack,
        Self::Workflow,
        Self::Roadmap,
        Self::Financials,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::TechStack => "tech_stack",
            Self::Workflow => "workflow",
            Self::Roadmap => "roadmap",
            Self::Financials => "financials",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Plan => "Project Plan",
            Self::TechStack => "Technology Stack",
            Self::Workflow => "Development Workflow",
            Self::Roadmap => "Roadmap",
            Self::Financials => "Financial Outlook",
        }
    }

    /// Earlier sections whose text feeds this section's prompt
    pub fn dependencies(self) -> &'static [SectionKind] {
        match self {
            Self::Plan => &[],
            Self::TechStack => &[Self::Plan],
            Self::Workflow => &[Self::Plan, Self::TechStack],
            Self::Roadmap => &[Self::Plan, Self::TechStack, Self::Workflow],
            Self::Financials => &[Self::Plan, Self::Roadmap],
        }
    }

    /// Optional sections degrade to a placeholder instead of aborting the run
    pub fn is_required(self) -> bool {
        !matches!(self, Self::Financials)
    }

    /// Progress percentage reported once this section is done
    pub fn milestone(self) -> u8 {
        match self {
            Self::Plan => milestone::PLAN,
            Self::TechStack => milestone::TECH_STACK,
            Self::Workflow => milestone::WORKFLOW,
            Self::Roadmap => milestone::ROADMAP,
            Self::Financials => milestone::FINANCIALS,
        }
    }

    pub fn step_label(self) -> String {
        format!("generating_{}", self.as_str())
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "plan" => Ok(Self::Plan),
            "tech_stack" | "stack" => Ok(Self::TechStack),
            "workflow" => Ok(Self::Workflow),
            "roadmap" => Ok(Self::Roadmap),
            "financials" | "finance" => Ok(Self::Financials),
            other => Err(ForgeError::Config(format!(
                "Unknown section '{}'. Expected one of: plan, tech_stack, workflow, roadmap, financials",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub content: String,
    pub provider: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// Placeholder substituted after an optional section failed
    #[serde(default)]
    pub degraded: bool,
}

// =============================================================================
// Request
// =============================================================================

/// Caller input for one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintRequest {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_users: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

impl BlueprintRequest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Characters of meaningful context (title + description)
    pub fn context_chars(&self) -> usize {
        self.title.trim().chars().count() + self.description.trim().chars().count()
    }
}

// =============================================================================
// Blueprint
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub ai_calls_used: u32,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub duration_ms: u64,
    /// Step names in completion order
    pub completed_steps: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionKind>,
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Completeness score 0 - 100
    pub score: u8,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }
}

/// Composite artifact assembled by one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: GenerationId,
    pub request: BlueprintRequest,
    pub sections: BTreeMap<SectionKind, Section>,
    pub metadata: GenerationMetadata,
    pub validation: ValidationReport,
}

impl Blueprint {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.get(&kind)
    }

    /// Sections in pipeline order
    pub fn ordered_sections(&self) -> impl Iterator<Item = &Section> {
        SectionKind::ALL
            .iter()
            .filter_map(|kind| self.sections.get(kind))
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n{}\n\n", self.request.title, self.request.description);
        for section in self.ordered_sections() {
            out.push_str(&format!("---\n\n<!-- {} -->\n\n", section.kind));
            out.push_str(section.content.trim());
            out.push_str("\n\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_precede_sections() {
        for (position, kind) in SectionKind::ALL.iter().enumerate() {
            for dep in kind.dependencies() {
                let dep_position = SectionKind::ALL.iter().position(|k| k == dep).unwrap();
                assert!(dep_position < position, "{} must follow {}", kind, dep);
            }
        }
    }

    #[test]
    fn test_milestones_increase() {
        let milestones: Vec<u8> = SectionKind::ALL.iter().map(|k| k.milestone()).collect();
        assert!(milestones.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_parse_section_names() {
        assert_eq!("tech-stack".parse::<SectionKind>().unwrap(), SectionKind::TechStack);
        assert_eq!(" Roadmap ".parse::<SectionKind>().unwrap(), SectionKind::Roadmap);
        assert!("budget".parse::<SectionKind>().is_err());
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for kind in SectionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_only_financials_optional() {
        let optional: Vec<_> = SectionKind::ALL.iter().filter(|k| !k.is_required()).collect();
        assert_eq!(optional, vec![&SectionKind::Financials]);
    }
}
