//! Gap loop: iterative synthesis until a spec passes the bridge
//!
//! One repo gets up to `max_iters` synthesis rounds. The first round
//! synthesizes from the card as mined; every later round is shaped by
//! what the previous bridge report complained about, via a
//! [`FocusHint`] that steers both evidence enrichment and the next
//! prompt. Two special cases bend the enrich-then-retry rule:
//!
//! - stability retry: a structural failure, or repair exhaustion with
//!   zero unknown ids on an already well-fed card, usually means model
//!   noise rather than missing evidence. The loop re-runs the exact
//!   same synthesis once, skipping enrichment. One such retry per
//!   repo.
//! - budget: the oracle is consulted at each iteration boundary and a
//!   refusal ends the repo with `BUDGET_CUTOFF`.
//!
//! The loop never unwinds on model misbehavior; every iteration's
//! report is retained on the outcome.

use crate::classify::{classify_failure, ClassifyInput};
use crate::error::Result;
use crate::orchestrator::{run_bridge, BridgeInput};
use crate::repair::RepairFn;
use async_trait::async_trait;
use specforge_protocol::defaults::{
    DEFAULT_MAX_GAP_ITERS, DEFAULT_MAX_REPAIR_ATTEMPTS, DEFAULT_STABILITY_EVIDENCE_FLOOR,
};
use specforge_protocol::evidence::{EnrichmentReport, FocusHint, RepoCard};
use specforge_protocol::report::{
    BridgeReport, FailureEntry, GapLoopState, QualityConfig, RepoOutcome,
};
use tracing::{info, warn};

// ============================================================================
// Collaborator traits
// ============================================================================

/// Produces one raw spec document for a repo card, optionally steered
/// by a focus hint.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, card: &RepoCard, focus: Option<&FocusHint>) -> Result<String>;
}

/// Fetches additional evidence for a card, guided by a focus hint.
/// Implementations append through [`RepoCard::add_evidence`] so ids
/// stay collision-free.
#[async_trait]
pub trait EvidenceEnricher: Send + Sync {
    async fn enrich(&self, card: &mut RepoCard, focus: &FocusHint) -> Result<EnrichmentReport>;
}

/// Cooperative budget check, consulted at iteration boundaries only.
/// An iteration already underway always runs to completion.
pub trait BudgetOracle: Send + Sync {
    fn should_continue(&self) -> bool;
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct GapLoopConfig {
    pub max_iters: u32,
    pub max_repair_attempts: u32,
    pub quality: QualityConfig,
    /// Minimum evidence count for repair exhaustion to be treated as
    /// instability rather than an evidence gap.
    pub stability_evidence_floor: usize,
}

impl Default for GapLoopConfig {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_MAX_GAP_ITERS,
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            quality: QualityConfig::default(),
            stability_evidence_floor: DEFAULT_STABILITY_EVIDENCE_FLOOR,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives the gap loop for one repo at a time. Collaborators are
/// borrowed so a single controller can be shared across a run.
pub struct GapLoopController<'a> {
    config: GapLoopConfig,
    synthesis: &'a dyn SynthesisClient,
    enricher: &'a dyn EvidenceEnricher,
    budget: &'a dyn BudgetOracle,
    repair_fn: &'a RepairFn,
}

impl<'a> GapLoopController<'a> {
    pub fn new(
        config: GapLoopConfig,
        synthesis: &'a dyn SynthesisClient,
        enricher: &'a dyn EvidenceEnricher,
        budget: &'a dyn BudgetOracle,
        repair_fn: &'a RepairFn,
    ) -> Self {
        Self { config, synthesis, enricher, budget, repair_fn }
    }

    /// Process one repo to a terminal outcome: a canonical document or
    /// a classified failure.
    pub async fn process_repo(&self, card: &mut RepoCard) -> RepoOutcome {
        let repo_id = card.repo.full_name.clone();
        let mut state = GapLoopState {
            evidence_total_initial: card.evidence_total(),
            ..Default::default()
        };
        let mut reports: Vec<BridgeReport> = Vec::new();
        let mut focus: Option<FocusHint> = None;
        let mut enrich_next = false;
        let mut stability_retry_used = false;
        let mut budget_hit = false;

        for iteration in 1..=self.config.max_iters {
            if !self.budget.should_continue() {
                budget_hit = true;
                break;
            }

            if enrich_next {
                enrich_next = false;
                if let Some(hint) = &focus {
                    match self.enricher.enrich(card, hint).await {
                        Ok(added) => {
                            state.evidence_added_total += added.total_added();
                            info!(
                                repo = %repo_id,
                                added = added.total_added(),
                                total = card.evidence_total(),
                                "evidence enriched"
                            );
                        }
                        Err(e) => {
                            warn!(repo = %repo_id, error = %e, "enrichment failed, continuing with existing evidence");
                        }
                    }
                }
            }

            state.iterations_used = iteration;

            let raw = match self.synthesis.synthesize(card, focus.as_ref()).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(repo = %repo_id, iteration, error = %e, "synthesis call failed");
                    state.last_error = Some(format!("synthesis failed: {}", e));
                    continue;
                }
            };

            let input = BridgeInput {
                repo_id: repo_id.clone(),
                raw_model_text: raw,
                allowed_evidence_ids: card.allowed_ids(),
                evidence_lines: card.evidence_lines(),
                max_repair_attempts: self.config.max_repair_attempts,
                quality: self.config.quality,
            };
            let outcome = run_bridge(input, self.repair_fn).await;

            if outcome.ok {
                info!(repo = %repo_id, iteration, "bridge passed");
                reports.push(outcome.report);
                state.evidence_total_final = card.evidence_total();
                return RepoOutcome {
                    repo_id,
                    success: true,
                    canonical: outcome.canonical,
                    failure: None,
                    state,
                    reports,
                };
            }

            let report = outcome.report;
            state.last_error = Some(
                report
                    .outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| report.failure_text()),
            );

            if self.is_instability(&report, card) && !stability_retry_used {
                // Same focus, no enrichment: repeat the exact synthesis
                // once.
                stability_retry_used = true;
                info!(repo = %repo_id, iteration, "instability suspected, retrying unchanged");
            } else {
                focus = Some(derive_focus_hint(&report));
                enrich_next = true;
            }
            reports.push(report);
        }

        state.evidence_total_final = card.evidence_total();

        let classify_input = ClassifyInput {
            budget_cutoff: budget_hit,
            report: reports.last(),
            ..Default::default()
        };
        let kind = classify_failure(&classify_input);
        let reason = if budget_hit {
            format!(
                "run budget exhausted after {} of {} iterations",
                state.iterations_used, self.config.max_iters
            )
        } else {
            state.last_error.clone().unwrap_or_else(|| {
                format!("no usable model response in {} iterations", self.config.max_iters)
            })
        };
        warn!(repo = %repo_id, kind = %kind, reason = %reason, "repo failed");

        RepoOutcome {
            repo_id,
            success: false,
            canonical: None,
            failure: Some(FailureEntry::new(kind, reason)),
            state,
            reports,
        }
    }

    /// A structural failure, or clean repair exhaustion on a card that
    /// already carries plenty of evidence, points at model noise.
    fn is_instability(&self, report: &BridgeReport, card: &RepoCard) -> bool {
        let structural = report
            .last_failed_stage()
            .is_some_and(|stage| stage.name.is_structural());
        let exhausted_clean = report
            .outcome
            .reason
            .as_deref()
            .is_some_and(|r| r.starts_with("repair attempts exhausted"))
            && report.outcome.unknown_ids_count == Some(0)
            && card.evidence_total() >= self.config.stability_evidence_floor;
        structural || exhausted_clean
    }
}

// ============================================================================
// Focus hints
// ============================================================================

/// Pipeline vocabulary and filler that never makes a useful search
/// keyword. Record names survive the filter.
const FOCUS_STOPWORDS: [&str; 56] = [
    "acceptance",
    "acceptance_test",
    "acceptance_tests",
    "after",
    "attempts",
    "below",
    "bridge",
    "canonical",
    "canonical_invalid",
    "canonical_validate",
    "citation",
    "citations",
    "command",
    "commands",
    "coverage",
    "document",
    "empty",
    "empty_citations",
    "error",
    "evidence",
    "evidence_gate",
    "exhausted",
    "failed",
    "field",
    "fields",
    "found",
    "gates",
    "invalid",
    "json",
    "keys",
    "low_coverage",
    "minimum",
    "missing",
    "model",
    "normalize",
    "object",
    "output",
    "parse",
    "parse_error",
    "patch_invalid",
    "patch_unknown_ids",
    "quality_gate",
    "repair",
    "repair_call_failed",
    "schema_version",
    "screen",
    "screens",
    "table",
    "tables",
    "uncited",
    "unknown",
    "unknown_ids",
    "validate",
    "validation",
    "wire_invalid",
    "wire_validate",
];

const MAX_FOCUS_KEYWORDS: usize = 8;

/// Derive what the next round should chase from a failed report:
/// content keywords out of the failure text, plus flags when the
/// complaints touch tables or commands.
pub fn derive_focus_hint(report: &BridgeReport) -> FocusHint {
    let text = report.failure_text();
    let lowered = text.to_lowercase();

    let mut keywords: Vec<String> = Vec::new();
    for token in lowered.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if token.len() < 4 {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if FOCUS_STOPWORDS.contains(&token) {
            continue;
        }
        if keywords.iter().any(|k| k == token) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() == MAX_FOCUS_KEYWORDS {
            break;
        }
    }

    FocusHint {
        keywords,
        need_tables: lowered.contains("table"),
        need_commands: lowered.contains("command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use chrono::Utc;
    use serde_json::json;
    use specforge_protocol::evidence::{EvidenceKind, RepoMeta};
    use specforge_protocol::report::{FailureKind, FinalReport, StageName, StageResult};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ---- fakes ----

    struct ScriptedSynth {
        responses: Mutex<VecDeque<std::result::Result<String, String>>>,
        focus_seen: Mutex<Vec<Option<FocusHint>>>,
    }

    impl ScriptedSynth {
        fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                focus_seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.focus_seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SynthesisClient for ScriptedSynth {
        async fn synthesize(&self, _card: &RepoCard, focus: Option<&FocusHint>) -> Result<String> {
            self.focus_seen.lock().unwrap().push(focus.cloned());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(raw)) => Ok(raw),
                Some(Err(e)) => Err(BridgeError::Synthesis(e)),
                None => Err(BridgeError::Synthesis("script exhausted".to_string())),
            }
        }
    }

    struct CountingEnricher {
        add_per_call: usize,
        calls: AtomicUsize,
    }

    impl CountingEnricher {
        fn new(add_per_call: usize) -> Self {
            Self { add_per_call, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EvidenceEnricher for CountingEnricher {
        async fn enrich(&self, card: &mut RepoCard, _focus: &FocusHint) -> Result<EnrichmentReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut report = EnrichmentReport::default();
            for i in 0..self.add_per_call {
                card.add_evidence(
                    EvidenceKind::Issue,
                    "https://example.invalid/issue",
                    format!("Issue {}", i),
                    "enriched detail",
                );
            }
            report.record(EvidenceKind::Issue, self.add_per_call);
            Ok(report)
        }
    }

    struct CappedBudget {
        remaining: AtomicUsize,
    }

    impl CappedBudget {
        fn new(iterations: usize) -> Self {
            Self { remaining: AtomicUsize::new(iterations) }
        }
    }

    impl BudgetOracle for CappedBudget {
        fn should_continue(&self) -> bool {
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    fn no_repair() -> RepairFn {
        Box::new(|_prompt| {
            Box::pin(async { Err::<String, String>("no repair scripted".to_string()) })
        })
    }

    // ---- fixtures ----

    fn test_card() -> RepoCard {
        let mut card = RepoCard::new(RepoMeta {
            full_name: "acme/notes".to_string(),
            url: "https://github.com/acme/notes".to_string(),
            ..Default::default()
        });
        card.add_evidence(EvidenceKind::Readme, "u1", "README", "A notes app");
        card.add_evidence(EvidenceKind::Issue, "u2", "Issue #4", "Crash on save");
        card
    }

    /// A document citing `app_citation` on the app and `E-RD-001`
    /// everywhere else.
    fn doc_citing(app_citation: &str) -> String {
        json!({
            "app": {"name": "notes", "one_liner": "Keep notes",
                    "citations": [app_citation],
                    "core_loop": {"summary": "open, edit, save", "citations": ["E-RD-001"]}},
            "screens": [{"name": "home", "purpose": "p", "citations": ["E-RD-001"]}],
            "rust_commands": [{"name": "save", "purpose": "p", "async": false,
                               "input": {"title": "string"}, "output": {"ok": "boolean"},
                               "citations": ["E-RD-001"]}],
            "data_model": {"tables": [{"name": "items",
                "columns": [{"name": "id", "type": "INTEGER"}], "citations": ["E-RD-001"]}]},
            "mvp_plan": ["week 1: scaffold"],
            "acceptance_tests": [{"text": "works", "citations": ["E-RD-001"]}]
        })
        .to_string()
    }

    fn config(max_iters: u32) -> GapLoopConfig {
        GapLoopConfig {
            max_iters,
            max_repair_attempts: 0,
            ..Default::default()
        }
    }

    // ---- scenarios ----

    #[tokio::test]
    async fn test_success_on_first_iteration() {
        let synth = ScriptedSynth::new(vec![Ok(doc_citing("E-RD-001"))]);
        let enricher = CountingEnricher::new(3);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(3), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(outcome.success);
        assert!(outcome.canonical.is_some());
        assert_eq!(outcome.state.iterations_used, 1);
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
        assert!(synth.focus_seen.lock().unwrap()[0].is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_failure_enriches_then_succeeds() {
        // Iteration 1 cites an id outside the card; iteration 2, after
        // enrichment, cites real evidence.
        let synth = ScriptedSynth::new(vec![
            Ok(doc_citing("E-IS-099")),
            Ok(doc_citing("E-RD-001")),
        ]);
        let enricher = CountingEnricher::new(2);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(2), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(outcome.success, "failure: {:?}", outcome.failure);
        assert_eq!(outcome.state.iterations_used, 2);
        assert_eq!(outcome.reports.len(), 2);
        assert!(!outcome.reports[0].outcome.ok);
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.state.evidence_added_total, 2);
        assert_eq!(outcome.state.evidence_total_initial, 2);
        assert_eq!(outcome.state.evidence_total_final, 4);
        // Second synthesis carried a focus hint.
        assert!(synth.focus_seen.lock().unwrap()[1].is_some());
    }

    #[tokio::test]
    async fn test_structural_failure_gets_stability_retry_without_enrichment() {
        let synth = ScriptedSynth::new(vec![
            Ok("the model rambled instead of emitting json".to_string()),
            Ok(doc_citing("E-RD-001")),
        ]);
        let enricher = CountingEnricher::new(5);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(3), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(outcome.success);
        assert_eq!(outcome.state.iterations_used, 2);
        // Retry ran unchanged: no enrichment, no focus.
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state.evidence_added_total, 0);
        assert!(synth.focus_seen.lock().unwrap()[1].is_none());
    }

    #[tokio::test]
    async fn test_stability_retry_only_once() {
        // Three structural failures; the retry burns after the first,
        // so the second failure takes the enrichment path.
        let synth = ScriptedSynth::new(vec![
            Ok("garbage".to_string()),
            Ok("garbage".to_string()),
            Ok("garbage".to_string()),
        ]);
        let enricher = CountingEnricher::new(1);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(3), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state.iterations_used, 3);
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.failure.as_ref().unwrap().kind,
            FailureKind::BridgeWireInvalid
        );
    }

    #[tokio::test]
    async fn test_budget_cutoff_between_iterations() {
        let synth = ScriptedSynth::new(vec![
            Ok(doc_citing("E-IS-099")),
            Ok(doc_citing("E-RD-001")),
        ]);
        let enricher = CountingEnricher::new(1);
        let budget = CappedBudget::new(1);
        let repair = no_repair();
        let controller = GapLoopController::new(config(3), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(!outcome.success);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::BudgetCutoff);
        assert!(failure.reason.contains("budget"));
        assert_eq!(outcome.state.iterations_used, 1);
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_classified_from_last_report() {
        let uncited = json!({
            "app": {"name": "notes", "one_liner": "x",
                    "core_loop": {"summary": "y"}},
            "screens": [{"name": "home", "purpose": "p"}],
            "rust_commands": [{"name": "save", "purpose": "p",
                               "input": {"t": "string"}, "output": {"ok": "boolean"}}],
            "data_model": {"tables": [{"name": "items",
                "columns": [{"name": "id", "type": "INTEGER"}]}]},
            "mvp_plan": ["week 1: scaffold"],
            "acceptance_tests": ["works"]
        })
        .to_string();
        let synth = ScriptedSynth::new(vec![Ok(uncited.clone()), Ok(uncited)]);
        let enricher = CountingEnricher::new(1);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(2), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(!outcome.success);
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(
            outcome.failure.unwrap().kind,
            FailureKind::QualityGateEmptyCitations
        );
    }

    #[tokio::test]
    async fn test_synthesis_errors_burn_iterations() {
        let synth = ScriptedSynth::new(vec![
            Err("rate limited".to_string()),
            Ok(doc_citing("E-RD-001")),
        ]);
        let enricher = CountingEnricher::new(1);
        let budget = CappedBudget::new(10);
        let repair = no_repair();
        let controller = GapLoopController::new(config(3), &synth, &enricher, &budget, &repair);

        let mut card = test_card();
        let outcome = controller.process_repo(&mut card).await;

        assert!(outcome.success);
        assert_eq!(outcome.state.iterations_used, 2);
        // The failed call produced no report.
        assert_eq!(outcome.reports.len(), 1);
    }

    // ---- focus hints ----

    #[test]
    fn test_focus_hint_keeps_record_names_drops_vocabulary() {
        let report = BridgeReport {
            repo_id: "acme/notes".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![StageResult::failed(
                StageName::QualityGate,
                "empty_citations",
                "uncited fields: screen:editor_pane, command:save_note, table:notebooks",
            )],
            outcome: FinalReport::failure("repair attempts exhausted", 2),
        };
        let hint = derive_focus_hint(&report);
        assert_eq!(hint.keywords, vec!["editor_pane", "save_note", "notebooks"]);
        assert!(hint.need_tables);
        assert!(hint.need_commands);
    }

    #[test]
    fn test_focus_hint_caps_and_dedups_keywords() {
        let detail: Vec<String> = (0..20).map(|i| format!("widget_{:02} widget_{:02}", i, i)).collect();
        let report = BridgeReport {
            repo_id: "acme/notes".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![StageResult::failed(
                StageName::CanonicalValidate,
                "canonical_invalid",
                detail.join(" "),
            )],
            outcome: FinalReport::failure("canonical validation failed", 0),
        };
        let hint = derive_focus_hint(&report);
        assert_eq!(hint.keywords.len(), MAX_FOCUS_KEYWORDS);
        assert_eq!(hint.keywords[0], "widget_00");
        assert!(!hint.need_commands);
    }
}
