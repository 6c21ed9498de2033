//! Offline Provider
//!
//! Network-free client that renders deterministic Markdown from the prompt.
//! Used for dry runs, demos and as a last-resort fallback entry.

use async_trait::async_trait;

use super::{Completion, CompletionRequest, ProviderClient, ProviderKind, TokenUsage};
use crate::types::{ProviderError, estimate_tokens};

/// Prompt line announcing which section is requested
pub const SECTION_TAG: &str = "Section:";
/// Prompt line carrying the project title
pub const PROJECT_TAG: &str = "Project:";

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineProvider;

impl OfflineProvider {
    pub fn new() -> Self {
        Self
    }

    fn tagged<'a>(prompt: &'a str, tag: &str) -> Option<&'a str> {
        prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix(tag))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn render(prompt: &str) -> String {
        let project = Self::tagged(prompt, PROJECT_TAG).unwrap_or("the project");
        let section = Self::tagged(prompt, SECTION_TAG).unwrap_or("");

        match section {
            "plan" => format!(
                "## Project Plan: {project}\n\n\
                 ### Problem\nTeams lack a single place to plan and track {project}, \
                 so work is duplicated and priorities drift.\n\n\
                 ### Target Users\nSmall product teams and independent founders.\n\n\
                 ### Value Proposition\nA guided workflow that turns an idea into an \
                 actionable plan in minutes.\n"
            ),
            "tech_stack" => format!(
                "## Technology Stack for {project}\n\n\
                 - **Frontend**: TypeScript single-page app with a component library\n\
                 - **Backend**: Rust HTTP service exposing a JSON API\n\
                 - **Database**: PostgreSQL with migrations under version control\n\
                 - **Hosting**: Managed containers behind a load balancer\n"
            ),
            "workflow" => format!(
                "## Development Workflow for {project}\n\n\
                 1. Step one: capture requirements as issues with acceptance criteria\n\
                 2. Step two: implement on short-lived branches with code review\n\
                 3. Step three: run automated tests in continuous integration\n\
                 4. Step four: deploy to staging, verify, then promote to production\n"
            ),
            "roadmap" => format!(
                "## Roadmap for {project}\n\n\
                 ### Phase 1: Foundation (weeks 1-4)\nCore data model, authentication, \
                 first usable screen.\n\n\
                 ### Phase 2: Launch (weeks 5-8)\nBeta with early users and feedback loop.\n\n\
                 ### Phase 3: Growth (weeks 9-16)\nIntegrations, billing and onboarding.\n"
            ),
            "financials" => format!(
                "## Financial Outlook for {project}\n\n\
                 ### Cost\nHosting and tooling around $300 per month during beta, \
                 plus contractor time for design.\n\n\
                 ### Revenue\nSubscription tiers at $12 and $39 per seat per month, \
                 break-even near 150 paying seats.\n"
            ),
            other => format!(
                "## {}\n\nDeterministic offline draft for {project}. Replace with a \
                 provider-generated version for production use.\n",
                if other.is_empty() { "Draft" } else { other }
            ),
        }
    }
}

#[async_trait]
impl ProviderClient for OfflineProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let text = Self::render(&request.prompt);

        let prompt_tokens = estimate_tokens(&request.prompt)
            + request.system_prompt.as_deref().map(estimate_tokens).unwrap_or(0);
        let completion_tokens = estimate_tokens(&text);

        let usage = TokenUsage::new(
            u32::try_from(prompt_tokens).unwrap_or(u32::MAX),
            u32::try_from(completion_tokens).unwrap_or(u32::MAX),
        );

        Ok(Completion { text, usage })
    }

    async fn probe(&self) -> bool {
        true
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "offline".to_string(),
            prompt: prompt.to_string(),
            system_prompt: None,
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    #[tokio::test]
    async fn test_renders_requested_section() {
        let provider = OfflineProvider::new();
        let completion = provider
            .complete(&request("Project: Habit Coach\nSection: tech_stack\n"))
            .await
            .unwrap();

        assert!(completion.text.contains("Habit Coach"));
        assert!(completion.text.contains("Backend"));
        assert_eq!(completion.usage.cost_usd, 0.0);
        assert_eq!(
            completion.usage.total_tokens,
            completion.usage.prompt_tokens + completion.usage.completion_tokens
        );
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let provider = OfflineProvider::new();
        let prompt = request("Project: X\nSection: roadmap");
        let a = provider.complete(&prompt).await.unwrap();
        let b = provider.complete(&prompt).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_section_falls_back_to_draft() {
        let provider = OfflineProvider::new();
        let completion = provider.complete(&request("free text")).await.unwrap();
        assert!(completion.text.starts_with("## Draft"));
        assert!(provider.probe().await);
    }
}
