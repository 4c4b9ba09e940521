//! Bridge orchestrator
//!
//! Runs one raw model response through the full pipeline:
//!
//! ```text
//! parse -> wire_validate -> normalize -> canonical_validate
//!       -> [evidence_gate, quality_gate]
//!       -> (repair -> canonical_validate -> gates)*
//! ```
//!
//! Structural failures (parse, wire shape, canonical validation) are
//! terminal: the attempt is unsalvageable and the gap loop decides
//! what happens next. Gate failures trigger citations-only repair, at
//! most `max_repair_attempts` applied patches. A patch the model gets
//! wrong is retried once within the same attempt slot; the second
//! rejection consumes the slot, so the model is called at most twice
//! per attempt. Every stage execution lands in the report, including
//! repeated gate runs after a failed repair.

use crate::canonical::{validate_canonical, violations_summary};
use crate::error::BridgeError;
use crate::gates::{
    evidence_gate, keys_to_repair, quality_gate, EvidenceGateReport, QualityGateReport,
};
use crate::normalize::normalize;
use crate::parse::{parse_value, wire_from_value};
use crate::repair::{apply_patch, build_repair_prompt, parse_patch, RepairFn};
use chrono::Utc;
use specforge_protocol::defaults::DEFAULT_MAX_REPAIR_ATTEMPTS;
use specforge_protocol::document::{CanonicalDocument, CitationKey, CitationsPatch};
use specforge_protocol::report::{
    BridgeReport, FinalReport, QualityConfig, StageName, StageResult,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Everything one bridge invocation needs. The allow-list and the
/// evidence lines come from the same repo card, so ids mentioned in
/// the prompt are exactly the ids the gate accepts.
#[derive(Debug, Clone)]
pub struct BridgeInput {
    pub repo_id: String,
    pub raw_model_text: String,
    pub allowed_evidence_ids: Vec<String>,
    pub evidence_lines: Vec<String>,
    pub max_repair_attempts: u32,
    pub quality: QualityConfig,
}

impl BridgeInput {
    pub fn new(repo_id: impl Into<String>, raw_model_text: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            raw_model_text: raw_model_text.into(),
            allowed_evidence_ids: Vec::new(),
            evidence_lines: Vec::new(),
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            quality: QualityConfig::default(),
        }
    }
}

/// What the bridge hands back. `run_bridge` never errors; failures are
/// encoded in the report.
#[derive(Debug, Clone)]
pub struct BridgeOutcome {
    pub ok: bool,
    pub canonical: Option<CanonicalDocument>,
    pub report: BridgeReport,
}

/// Run the bridge on one raw model response.
pub async fn run_bridge(input: BridgeInput, repair_fn: &RepairFn) -> BridgeOutcome {
    let mut run = BridgeRun::start(&input.repo_id);
    let allowed: BTreeSet<String> = input.allowed_evidence_ids.iter().cloned().collect();

    // ---- parse ----
    let value = match parse_value(&input.raw_model_text) {
        Ok(value) => {
            run.stage(StageResult::passed(StageName::Parse));
            value
        }
        Err(e) => {
            run.stage(StageResult::failed(StageName::Parse, "parse_error", e.to_string()));
            return run.fail(format!("parse failed: {}", e), 0, None, None);
        }
    };

    // ---- wire validate ----
    let wire = match wire_from_value(value) {
        Ok(wire) => {
            run.stage(StageResult::passed(StageName::WireValidate));
            wire
        }
        Err(e) => {
            run.stage(StageResult::failed(StageName::WireValidate, "wire_invalid", e.to_string()));
            return run.fail(format!("wire validation failed: {}", e), 0, None, None);
        }
    };

    // ---- normalize (total, cannot fail) ----
    let normalized = normalize(wire);
    run.stage(
        StageResult::passed(StageName::Normalize)
            .with_stat("fixes", normalized.fixes.len())
            .with_stat("warnings", normalized.warnings.len()),
    );
    let mut doc = normalized.doc;

    // ---- canonical validate ----
    match validate_canonical(&doc) {
        Ok(()) => run.stage(StageResult::passed(StageName::CanonicalValidate)),
        Err(violations) => {
            let summary = violations_summary(&violations);
            run.stage(StageResult::failed(
                StageName::CanonicalValidate,
                "canonical_invalid",
                summary.clone(),
            ));
            return run.fail(format!("canonical validation failed: {}", summary), 0, None, None);
        }
    }

    // ---- gate / repair loop ----
    let mut attempt: u32 = 0;
    loop {
        let evidence = evidence_gate(&doc, &allowed);
        run.stage(evidence_stage(&evidence));
        let quality = quality_gate(&doc, &input.quality);
        run.stage(quality_stage(&quality, &input.quality));

        if evidence.ok && quality.ok {
            return run.succeed(doc, attempt, &evidence, &quality);
        }

        let keys = keys_to_repair(&evidence, &quality);
        if keys.is_empty() {
            return run.fail(
                "gates failed with no repairable citation keys".to_string(),
                attempt,
                Some(&evidence),
                Some(&quality),
            );
        }
        if attempt >= input.max_repair_attempts {
            return run.fail(
                "repair attempts exhausted".to_string(),
                attempt,
                Some(&evidence),
                Some(&quality),
            );
        }

        let patch = run
            .obtain_patch(repair_fn, &keys, &input.evidence_lines, &doc, &allowed)
            .await;
        attempt += 1;

        if let Some(patch) = patch {
            apply_patch(&mut doc, &patch);
            match validate_canonical(&doc) {
                Ok(()) => run.stage(StageResult::passed(StageName::CanonicalValidate)),
                Err(violations) => {
                    let summary = violations_summary(&violations);
                    run.stage(StageResult::failed(
                        StageName::CanonicalValidate,
                        "canonical_invalid",
                        summary.clone(),
                    ));
                    return run.fail(
                        format!("canonical validation failed after repair: {}", summary),
                        attempt,
                        Some(&evidence),
                        Some(&quality),
                    );
                }
            }
        }
        // On a twice-rejected patch the slot is spent; the gates run
        // again on the unchanged document and the loop either retries
        // or exhausts.
    }
}

// ============================================================================
// Internals
// ============================================================================

struct BridgeRun {
    repo_id: String,
    started_at: chrono::DateTime<Utc>,
    stages: Vec<StageResult>,
}

impl BridgeRun {
    fn start(repo_id: &str) -> Self {
        Self { repo_id: repo_id.to_string(), started_at: Utc::now(), stages: Vec::new() }
    }

    fn stage(&mut self, result: StageResult) {
        if result.ok {
            debug!(repo = %self.repo_id, stage = %result.name, "stage passed");
        } else {
            warn!(
                repo = %self.repo_id,
                stage = %result.name,
                code = result.error_code.as_deref().unwrap_or("error"),
                detail = result.error_detail.as_deref().unwrap_or(""),
                "stage failed"
            );
        }
        self.stages.push(result);
    }

    /// Ask the model for a patch, tolerating one bad response: the
    /// second rejection gives up on this attempt slot.
    async fn obtain_patch(
        &mut self,
        repair_fn: &RepairFn,
        keys: &[CitationKey],
        evidence_lines: &[String],
        doc: &CanonicalDocument,
        allowed: &BTreeSet<String>,
    ) -> Option<CitationsPatch> {
        let prompt = build_repair_prompt(keys, evidence_lines);
        for call in 1..=2u32 {
            match repair_fn(prompt.clone()).await {
                Ok(raw) => match parse_patch(&raw, doc, allowed) {
                    Ok(patch) => {
                        self.stage(
                            StageResult::passed(StageName::Repair)
                                .with_stat("keys_patched", patch_key_count(&patch))
                                .with_stat("call", call),
                        );
                        return Some(patch);
                    }
                    Err(e) => {
                        let code = match e {
                            BridgeError::PatchUnknownIds(_) => "patch_unknown_ids",
                            _ => "patch_invalid",
                        };
                        self.stage(
                            StageResult::failed(StageName::Repair, code, e.to_string())
                                .with_stat("call", call),
                        );
                    }
                },
                Err(message) => {
                    self.stage(
                        StageResult::failed(StageName::Repair, "repair_call_failed", message)
                            .with_stat("call", call),
                    );
                }
            }
        }
        None
    }

    fn succeed(
        self,
        doc: CanonicalDocument,
        attempts: u32,
        evidence: &EvidenceGateReport,
        quality: &QualityGateReport,
    ) -> BridgeOutcome {
        let mut outcome = FinalReport::success(attempts);
        outcome.unknown_ids_count = Some(evidence.unknown_ids.len());
        outcome.empty_fields_count = Some(quality.empty_fields.len());
        outcome.coverage_ratio = Some(quality.coverage.ratio);
        self.finish(true, Some(doc), outcome)
    }

    fn fail(
        self,
        reason: String,
        attempts: u32,
        evidence: Option<&EvidenceGateReport>,
        quality: Option<&QualityGateReport>,
    ) -> BridgeOutcome {
        let mut outcome = FinalReport::failure(reason, attempts);
        outcome.unknown_ids_count = evidence.map(|e| e.unknown_ids.len());
        outcome.empty_fields_count = quality.map(|q| q.empty_fields.len());
        outcome.coverage_ratio = quality.map(|q| q.coverage.ratio);
        self.finish(false, None, outcome)
    }

    fn finish(
        self,
        ok: bool,
        canonical: Option<CanonicalDocument>,
        outcome: FinalReport,
    ) -> BridgeOutcome {
        let report = BridgeReport {
            repo_id: self.repo_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stages: self.stages,
            outcome,
        };
        BridgeOutcome { ok, canonical, report }
    }
}

fn evidence_stage(report: &EvidenceGateReport) -> StageResult {
    if report.ok {
        StageResult::passed(StageName::EvidenceGate).with_stat("cited_total", report.cited_total)
    } else {
        StageResult::failed(
            StageName::EvidenceGate,
            "unknown_ids",
            format!("unknown evidence ids: {}", report.unknown_ids.join(", ")),
        )
        .with_stat("unknown_count", report.unknown_ids.len())
    }
}

fn quality_stage(report: &QualityGateReport, config: &QualityConfig) -> StageResult {
    let base = if report.ok {
        StageResult::passed(StageName::QualityGate)
    } else if config.require_non_empty && !report.empty_fields.is_empty() {
        let listed: Vec<String> = report.empty_fields.iter().map(|k| k.to_string()).collect();
        StageResult::failed(
            StageName::QualityGate,
            "empty_citations",
            format!("uncited fields: {}", listed.join(", ")),
        )
    } else {
        StageResult::failed(
            StageName::QualityGate,
            "low_coverage",
            format!(
                "coverage {:.2} below minimum {:.2}",
                report.coverage.ratio, config.min_coverage_ratio
            ),
        )
    };
    base.with_stat("cited", report.coverage.cited)
        .with_stat("total", report.coverage.total)
        .with_stat("coverage_ratio", report.coverage.ratio)
}

fn patch_key_count(patch: &CitationsPatch) -> usize {
    let mut count = 0;
    count += usize::from(patch.app.is_some());
    count += usize::from(patch.core_loop.is_some());
    count += patch.screens.as_ref().map_or(0, |m| m.len());
    count += patch.commands.as_ref().map_or(0, |m| m.len());
    count += patch.tables.as_ref().map_or(0, |m| m.len());
    count += patch.acceptance_tests.as_ref().map_or(0, |m| m.len());
    count
}
