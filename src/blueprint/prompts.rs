//! Section Prompt Templates

use std::collections::BTreeMap;

use crate::ai::prompt::PromptBuilder;
use crate::ai::provider::{PROJECT_TAG, SECTION_TAG};

use super::types::{BlueprintRequest, Section, SectionKind};

pub const SYSTEM_PROMPT: &str = "You are a senior product and engineering consultant. \
Write concise, concrete Markdown. Use the headings requested, avoid filler, \
and never invent facts that contradict the provided context.";

fn tag(tag: &str) -> &str {
    tag.trim_end_matches(':')
}

fn objectives(kind: SectionKind) -> &'static [&'static str] {
    match kind {
        SectionKind::Plan => &[
            "State the core Problem in two or three sentences",
            "Describe the Target Users and their main pain points",
            "Articulate the Value Proposition and what success looks like",
        ],
        SectionKind::TechStack => &[
            "Recommend a Frontend, Backend and Database with one-line rationale each",
            "Name hosting and third-party services the plan requires",
            "Keep the stack consistent with the budget and team size",
        ],
        SectionKind::Workflow => &[
            "Describe the development workflow as numbered Steps",
            "Cover planning, implementation, review, testing and release",
            "Reference the chosen stack where tooling matters",
        ],
        SectionKind::Roadmap => &[
            "Break delivery into Phases with durations",
            "List the milestone that closes each Phase",
            "Order Phases so every dependency ships first",
        ],
        SectionKind::Financials => &[
            "Estimate monthly Cost for hosting, tooling and people",
            "Propose a Revenue model with indicative pricing",
            "Estimate the break-even point against the roadmap",
        ],
    }
}

fn base(request: &BlueprintRequest, kind: SectionKind) -> PromptBuilder {
    let mut builder = PromptBuilder::new()
        .field(tag(PROJECT_TAG), request.title.trim())
        .field(tag(SECTION_TAG), kind.as_str())
        .role("product consultant", &format!("writing the {}", kind.title()))
        .objectives(objectives(kind))
        .context_item("Title", request.title.trim())
        .context_item("Description", request.description.trim());

    if let Some(users) = &request.target_users {
        builder = builder.context_item("Target users", users);
    }
    if let Some(budget) = &request.budget {
        builder = builder.context_item("Budget", budget);
    }
    if let Some(timeline) = &request.timeline {
        builder = builder.context_item("Timeline", timeline);
    }
    if !request.constraints.is_empty() {
        builder = builder.context_item("Constraints", &request.constraints.join("; "));
    }
    builder
}

fn with_dependencies(
    mut builder: PromptBuilder,
    kind: SectionKind,
    sections: &BTreeMap<SectionKind, Section>,
) -> PromptBuilder {
    for dep in kind.dependencies() {
        if let Some(section) = sections.get(dep) {
            builder = builder.section(dep.title(), section.content.trim());
        }
    }
    builder
}

/// Prompt for the first generation of a section
pub fn section_prompt(
    request: &BlueprintRequest,
    kind: SectionKind,
    completed: &BTreeMap<SectionKind, Section>,
) -> String {
    let builder = with_dependencies(base(request, kind), kind, completed);
    builder
        .focus(
            kind.title(),
            &[
                "Do NOT repeat earlier sections verbatim",
                "Do NOT add sections other than the one requested",
            ],
        )
        .build()
}

/// Prompt for regenerating one section with caller feedback
pub fn regeneration_prompt(
    request: &BlueprintRequest,
    kind: SectionKind,
    sections: &BTreeMap<SectionKind, Section>,
    feedback: Option<&str>,
) -> String {
    let mut builder = with_dependencies(base(request, kind), kind, sections);

    if let Some(previous) = sections.get(&kind) {
        builder = builder.section("Previous Version", previous.content.trim());
    }
    let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
    builder = match feedback {
        Some(feedback) => builder.section("Requested Changes", feedback),
        None => builder.section(
            "Requested Changes",
            "Improve clarity and specificity while keeping the same structure.",
        ),
    };

    builder
        .focus(
            kind.title(),
            &["Rewrite ONLY this section", "Apply every requested change"],
        )
        .build()
}
