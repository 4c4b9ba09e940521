//! Synthesis prompts and the LLM-backed bridge collaborators
//!
//! Builds the per-repo synthesis prompt from the evidence pack and
//! wires [`LlmClient`] into the collaborator seams the gap loop
//! expects: a [`SynthesisClient`] for full documents and a boxed
//! repair closure for citation patches. Both count against the shared
//! run budget.

use crate::budget::RunBudget;
use crate::llm::LlmClient;
use async_trait::async_trait;
use specforge_bridge::{BridgeError, RepairFn, SynthesisClient};
use specforge_protocol::evidence::{FocusHint, RepoCard};
use std::sync::Arc;
use tracing::debug;

const SYNTH_SYSTEM: &str = "You extract structured app specifications from repository \
evidence. You respond with a single JSON object and nothing else: no prose, no code \
fences. Every claim you make must be supported by the evidence ids you are given; \
never invent evidence ids.";

const REPAIR_SYSTEM: &str = "You fix missing citations in an app specification. You \
respond with a single JSON object and nothing else. You only add citations; you never \
change any other field.";

/// The synthesis prompt for one repo: metadata, evidence lines, the
/// output contract, and any focus carried over from a failed pass.
pub fn build_synthesis_prompt(card: &RepoCard, focus: Option<&FocusHint>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Repository: {} ({} stars)\n",
        card.repo.full_name, card.repo.stars
    ));
    if let Some(description) = card.repo.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("Description: {}\n", description.trim()));
    }
    if !card.repo.topics.is_empty() {
        prompt.push_str(&format!("Topics: {}\n", card.repo.topics.join(", ")));
    }

    prompt.push_str("\nEvidence (cite only these ids):\n");
    for line in card.evidence_lines() {
        prompt.push_str(&line);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nDescribe the desktop application this repository implements (or the closest \
         app it could back) as one JSON object with exactly these top-level keys:\n\
         - schema_version: the number 3\n\
         - app: {name, one_liner, core_loop: {summary, citations}, citations}\n\
         - screens: array of {name, purpose, citations}\n\
         - rust_commands: array of {name, purpose, async, input, output, citations}; \
         input and output are dictionaries of field name to one of \
         string|boolean|int|float|timestamp|json, with a ? suffix for optional fields\n\
         - data_model: {tables: array of {name, columns: array of {name, type}, citations}}; \
         column types are TEXT|INTEGER|REAL|BOOLEAN|BLOB|JSON|DATETIME\n\
         - mvp_plan: array of strings like \"week 1: scaffold\"\n\
         - acceptance_tests: array of {text, citations}\n\
         \nEvery citations array lists evidence ids from the list above that support \
         that record. Cite each record; a record you cannot support with evidence \
         should not appear.\n",
    );

    if let Some(hint) = focus.filter(|h| !h.is_empty()) {
        prompt.push_str("\nThe previous attempt left gaps.\n");
        if !hint.keywords.is_empty() {
            prompt.push_str(&format!(
                "Pay particular attention to: {}.\n",
                hint.keywords.join(", ")
            ));
        }
        if hint.need_tables {
            prompt.push_str("Ground the data_model tables in the evidence.\n");
        }
        if hint.need_commands {
            prompt.push_str("Ground the rust_commands in the evidence.\n");
        }
    }

    prompt.push_str("\nReturn only the JSON object.\n");
    prompt
}

// ============================================================================
// Collaborator implementations
// ============================================================================

/// LLM-backed document synthesis.
pub struct SpecSynthesizer {
    llm: LlmClient,
    budget: Arc<RunBudget>,
}

impl SpecSynthesizer {
    pub fn new(llm: LlmClient, budget: Arc<RunBudget>) -> Self {
        Self { llm, budget }
    }
}

#[async_trait]
impl SynthesisClient for SpecSynthesizer {
    async fn synthesize(
        &self,
        card: &RepoCard,
        focus: Option<&FocusHint>,
    ) -> specforge_bridge::Result<String> {
        let calls = self.budget.record_llm_call();
        debug!(repo = %card.repo.full_name, llm_calls = calls, "synthesis call");
        let prompt = build_synthesis_prompt(card, focus);
        self.llm
            .chat(SYNTH_SYSTEM, &prompt, true)
            .await
            .map_err(|e| BridgeError::Synthesis(e.to_string()))
    }
}

/// Citation-repair closure over the same client and budget.
pub fn citation_repair_fn(llm: LlmClient, budget: Arc<RunBudget>) -> RepairFn {
    Box::new(move |prompt| {
        let llm = llm.clone();
        let budget = budget.clone();
        Box::pin(async move {
            budget.record_llm_call();
            llm.chat(REPAIR_SYSTEM, &prompt, true).await.map_err(|e| e.to_string())
        })
    })
}

/// Repair closure for offline use: every call reports the missing key.
pub fn offline_repair_fn() -> RepairFn {
    Box::new(|_prompt| {
        Box::pin(async { Err("no repair model available in offline mode".to_string()) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_protocol::evidence::{EvidenceKind, RepoMeta};

    fn card() -> RepoCard {
        let mut card = RepoCard::new(RepoMeta {
            full_name: "acme/notekeep".to_string(),
            description: Some("Markdown notes with offline sync".to_string()),
            stars: 412,
            topics: vec!["notes".to_string()],
            default_branch: "main".to_string(),
            url: "https://github.com/acme/notekeep".to_string(),
        });
        card.add_evidence(
            EvidenceKind::Readme,
            "https://github.com/acme/notekeep#readme",
            "README",
            "Write markdown notes and sync them",
        );
        card
    }

    #[test]
    fn test_prompt_carries_metadata_and_evidence() {
        let prompt = build_synthesis_prompt(&card(), None);
        assert!(prompt.contains("Repository: acme/notekeep (412 stars)"));
        assert!(prompt.contains("Description: Markdown notes with offline sync"));
        assert!(prompt.contains("[E-RD-001] (readme) README: Write markdown notes and sync them"));
        assert!(prompt.contains("schema_version: the number 3"));
        assert!(prompt.contains("Return only the JSON object."));
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn test_prompt_includes_focus_section() {
        let focus = FocusHint {
            keywords: vec!["notebooks".to_string(), "sync".to_string()],
            need_tables: true,
            need_commands: false,
        };
        let prompt = build_synthesis_prompt(&card(), Some(&focus));
        assert!(prompt.contains("Pay particular attention to: notebooks, sync."));
        assert!(prompt.contains("Ground the data_model tables"));
        assert!(!prompt.contains("Ground the rust_commands"));
    }

    #[test]
    fn test_empty_focus_adds_nothing() {
        let prompt = build_synthesis_prompt(&card(), Some(&FocusHint::default()));
        assert!(!prompt.contains("previous attempt"));
    }

    #[tokio::test]
    async fn test_offline_repair_always_errors() {
        let repair = offline_repair_fn();
        let out = repair("prompt".to_string()).await;
        assert!(out.is_err());
    }
}
