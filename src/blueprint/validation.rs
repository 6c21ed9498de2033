//! Blueprint Validation with Penalty Scoring
//!
//! Deterministic structural and content checks, no AI call. Starts from 100
//! and subtracts a penalty per finding:
//!
//! - missing or empty required section
//! - missing optional section
//! - section shorter or longer than the configured bounds
//! - degraded placeholder
//! - section-specific content markers absent

use serde::{Deserialize, Serialize};

use crate::constants::blueprint as bp_constants;

use super::types::{
    Blueprint, IssueSeverity, Section, SectionKind, ValidationIssue, ValidationReport,
};

/// Configuration for validation scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_section_chars: usize,
    pub max_section_chars: usize,
    pub missing_required_penalty: u32,
    pub missing_optional_penalty: u32,
    pub too_short_penalty: u32,
    pub too_long_penalty: u32,
    pub degraded_penalty: u32,
    /// Per absent marker
    pub missing_marker_penalty: u32,
    pub missing_title_penalty: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_section_chars: bp_constants::MIN_SECTION_CHARS,
            max_section_chars: bp_constants::MAX_SECTION_CHARS,
            missing_required_penalty: 25,
            missing_optional_penalty: 5,
            too_short_penalty: 10,
            too_long_penalty: 5,
            degraded_penalty: 10,
            missing_marker_penalty: 3,
            missing_title_penalty: 10,
        }
    }
}

/// Terms a well-formed section is expected to mention (case-insensitive)
fn content_markers(kind: SectionKind) -> &'static [&'static str] {
    match kind {
        SectionKind::Plan => &["problem", "target users", "value proposition"],
        SectionKind::TechStack => &["frontend", "backend", "database"],
        SectionKind::Workflow => &["step"],
        SectionKind::Roadmap => &["phase"],
        SectionKind::Financials => &["cost", "revenue"],
    }
}

struct Findings {
    penalty: u32,
    issues: Vec<ValidationIssue>,
    suggestions: Vec<String>,
}

impl Findings {
    fn add(
        &mut self,
        penalty: u32,
        section: Option<SectionKind>,
        severity: IssueSeverity,
        message: String,
        suggestion: String,
    ) {
        self.penalty += penalty;
        self.issues.push(ValidationIssue {
            section,
            severity,
            message,
        });
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
    }
}

pub struct BlueprintValidator {
    config: ValidationConfig,
}

impl Default for BlueprintValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlueprintValidator {
    pub fn new() -> Self {
        Self {
            config: ValidationConfig::default(),
        }
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, blueprint: &Blueprint) -> ValidationReport {
        let mut findings = Findings {
            penalty: 0,
            issues: Vec::new(),
            suggestions: Vec::new(),
        };

        if blueprint.request.title.trim().is_empty() {
            findings.add(
                self.config.missing_title_penalty,
                None,
                IssueSeverity::Error,
                "Blueprint has no title".to_string(),
                "Give the project a short descriptive title".to_string(),
            );
        }

        for kind in SectionKind::ALL {
            match blueprint.section(kind) {
                Some(section) => self.check_section(section, &mut findings),
                None if kind.is_required() => findings.add(
                    self.config.missing_required_penalty,
                    Some(kind),
                    IssueSeverity::Error,
                    format!("Required section '{}' is missing", kind),
                    format!("Regenerate the {} section", kind.title()),
                ),
                None => findings.add(
                    self.config.missing_optional_penalty,
                    Some(kind),
                    IssueSeverity::Warning,
                    format!("Optional section '{}' is missing", kind),
                    format!("Generate the {} section for a complete picture", kind.title()),
                ),
            }
        }

        let score = 100u32.saturating_sub(findings.penalty).min(100) as u8;
        ValidationReport {
            score,
            issues: findings.issues,
            suggestions: findings.suggestions,
        }
    }

    fn check_section(&self, section: &Section, findings: &mut Findings) {
        let kind = section.kind;
        let content = section.content.trim();
        let chars = content.chars().count();

        if chars == 0 {
            let severity = if kind.is_required() {
                IssueSeverity::Error
            } else {
                IssueSeverity::Warning
            };
            findings.add(
                self.config.missing_required_penalty,
                Some(kind),
                severity,
                format!("Section '{}' is empty", kind),
                format!("Regenerate the {} section", kind.title()),
            );
            return;
        }

        if section.degraded {
            findings.add(
                self.config.degraded_penalty,
                Some(kind),
                IssueSeverity::Warning,
                format!("Section '{}' is a placeholder after a failed generation", kind),
                format!("Regenerate the {} section once providers recover", kind.title()),
            );
            return;
        }

        if chars < self.config.min_section_chars {
            findings.add(
                self.config.too_short_penalty,
                Some(kind),
                IssueSeverity::Warning,
                format!(
                    "Section '{}' is short ({} chars, expected at least {})",
                    kind, chars, self.config.min_section_chars
                ),
                format!("Ask for more detail in the {} section", kind.title()),
            );
        } else if chars > self.config.max_section_chars {
            findings.add(
                self.config.too_long_penalty,
                Some(kind),
                IssueSeverity::Warning,
                format!(
                    "Section '{}' is long ({} chars, expected at most {})",
                    kind, chars, self.config.max_section_chars
                ),
                format!("Ask for a more concise {} section", kind.title()),
            );
        }

        let lower = content.to_lowercase();
        let missing: Vec<&str> = content_markers(kind)
            .iter()
            .copied()
            .filter(|marker| !lower.contains(marker))
            .collect();
        if !missing.is_empty() {
            findings.add(
                self.config.missing_marker_penalty * missing.len() as u32,
                Some(kind),
                IssueSeverity::Warning,
                format!("Section '{}' does not cover: {}", kind, missing.join(", ")),
                format!(
                    "Regenerate the {} section with feedback to cover {}",
                    kind.title(),
                    missing.join(", ")
                ),
            );
        }
    }
}

/// Validate with the default configuration
pub fn validate_blueprint(blueprint: &Blueprint) -> ValidationReport {
    BlueprintValidator::new().validate(blueprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::types::{BlueprintRequest, GenerationMetadata};
    use crate::types::GenerationId;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn content_for(kind: SectionKind) -> String {
        let markers = content_markers(kind).join(", ");
        format!("{} covering {}. {}", kind.title(), markers, "Detail. ".repeat(40))
    }

    fn blueprint(kinds: &[SectionKind]) -> Blueprint {
        let sections: BTreeMap<_, _> = kinds
            .iter()
            .map(|&kind| {
                (
                    kind,
                    Section {
                        kind,
                        content: content_for(kind),
                        provider: "offline".to_string(),
                        model: "offline".to_string(),
                        generated_at: Utc::now(),
                        degraded: false,
                    },
                )
            })
            .collect();

        Blueprint {
            id: GenerationId::new("g"),
            request: BlueprintRequest::new("Title", "Description"),
            sections,
            metadata: GenerationMetadata {
                ai_calls_used: kinds.len() as u32,
                total_cost_usd: 0.0,
                total_tokens: 0,
                duration_ms: 0,
                completed_steps: vec![],
                generated_at: Utc::now(),
            },
            validation: ValidationReport::default(),
        }
    }

    #[test]
    fn test_complete_blueprint_scores_full() {
        let report = validate_blueprint(&blueprint(&SectionKind::ALL));
        assert_eq!(report.score, 100);
        assert!(report.issues.is_empty());
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_missing_required_section_is_error() {
        let report = validate_blueprint(&blueprint(&[
            SectionKind::Plan,
            SectionKind::Workflow,
            SectionKind::Roadmap,
            SectionKind::Financials,
        ]));
        assert_eq!(report.score, 75);
        assert!(report.has_errors());
        assert_eq!(report.issues[0].section, Some(SectionKind::TechStack));
    }

    #[test]
    fn test_missing_optional_is_warning() {
        let report = validate_blueprint(&blueprint(&SectionKind::ALL[..4]));
        assert_eq!(report.score, 95);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_short_and_marker_penalties() {
        let mut bp = blueprint(&SectionKind::ALL);
        if let Some(plan) = bp.sections.get_mut(&SectionKind::Plan) {
            plan.content = "Just a problem statement.".to_string();
        }

        let report = validate_blueprint(&bp);
        // too short (10) + two missing markers (2 * 3)
        assert_eq!(report.score, 84);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[1].message.contains("target users"));
    }

    #[test]
    fn test_degraded_section_penalized() {
        let mut bp = blueprint(&SectionKind::ALL);
        if let Some(fin) = bp.sections.get_mut(&SectionKind::Financials) {
            fin.degraded = true;
        }
        assert_eq!(validate_blueprint(&bp).score, 90);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let mut bp = blueprint(&[]);
        bp.request.title = String::new();
        let report = validate_blueprint(&bp);
        assert_eq!(report.score, 0);
        assert!(report.issues.len() >= 5);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let bp = blueprint(&SectionKind::ALL[..3]);
        assert_eq!(validate_blueprint(&bp), validate_blueprint(&bp));
    }
}
