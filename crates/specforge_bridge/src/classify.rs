//! Failure classification
//!
//! Collapses whatever went wrong for a repo into one [`FailureKind`]
//! for the run summary. Precedence is fixed: run-level conditions
//! (budget, fetch, thin evidence) outrank bridge-structural failures,
//! which outrank gate failures, which outrank plain repair
//! exhaustion. A repo that exhausted repairs while still citing
//! unknown ids is an unknown-id problem, not an exhaustion problem.

use specforge_protocol::report::{BridgeReport, FailureKind};

/// Classifier input: run-level flags plus the last bridge report, when
/// one exists. Fetch failures never produce a report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyInput<'a> {
    pub budget_cutoff: bool,
    pub fetch_failed: bool,
    pub evidence_insufficient: bool,
    pub report: Option<&'a BridgeReport>,
}

impl<'a> ClassifyInput<'a> {
    pub fn from_report(report: &'a BridgeReport) -> Self {
        Self { report: Some(report), ..Default::default() }
    }
}

/// Classify a failed repo. First matching rung wins.
pub fn classify_failure(input: &ClassifyInput) -> FailureKind {
    if input.budget_cutoff {
        return FailureKind::BudgetCutoff;
    }
    if input.fetch_failed {
        return FailureKind::FetchFailed;
    }
    if input.evidence_insufficient {
        return FailureKind::EvidenceInsufficient;
    }
    let Some(report) = input.report else {
        return FailureKind::Unknown;
    };
    if has_code(report, "parse_error") || has_code(report, "wire_invalid") {
        return FailureKind::BridgeWireInvalid;
    }
    if has_code(report, "canonical_invalid") {
        return FailureKind::BridgeCanonicalInvalid;
    }
    if report.outcome.unknown_ids_count.unwrap_or(0) > 0 {
        return FailureKind::EvidenceGateUnknownId;
    }
    if report.outcome.empty_fields_count.unwrap_or(0) > 0 {
        return FailureKind::QualityGateEmptyCitations;
    }
    if has_code(report, "low_coverage") {
        return FailureKind::QualityGateLowCoverage;
    }
    if report
        .outcome
        .reason
        .as_deref()
        .is_some_and(|r| r.starts_with("repair attempts exhausted"))
    {
        return FailureKind::RepairExhausted;
    }
    FailureKind::Unknown
}

fn has_code(report: &BridgeReport, code: &str) -> bool {
    report.stages.iter().any(|stage| stage.error_code.as_deref() == Some(code))
}
