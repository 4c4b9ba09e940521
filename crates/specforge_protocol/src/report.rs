//! Bridge reports and failure classification vocabulary
//!
//! One [`BridgeReport`] is produced per bridge invocation: the ordered
//! stage list plus the final block. Reports are immutable once the
//! bridge returns and are persisted for audit/replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Stages
// ============================================================================

/// Bridge pipeline stage names, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Parse,
    WireValidate,
    Normalize,
    CanonicalValidate,
    EvidenceGate,
    QualityGate,
    Repair,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Parse => "parse",
            StageName::WireValidate => "wire_validate",
            StageName::Normalize => "normalize",
            StageName::CanonicalValidate => "canonical_validate",
            StageName::EvidenceGate => "evidence_gate",
            StageName::QualityGate => "quality_gate",
            StageName::Repair => "repair",
        }
    }

    /// Structural stages fail the whole attempt; gate stages are
    /// candidates for citation repair.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            StageName::Parse
                | StageName::WireValidate
                | StageName::Normalize
                | StageName::CanonicalValidate
        )
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub name: StageName,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, Value>,
}

impl StageResult {
    pub fn passed(name: StageName) -> Self {
        Self {
            name,
            ok: true,
            error_code: None,
            error_detail: None,
            stats: BTreeMap::new(),
        }
    }

    pub fn failed(name: StageName, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            error_code: Some(code.into()),
            error_detail: Some(detail.into()),
            stats: BTreeMap::new(),
        }
    }

    pub fn with_stat(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.stats.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Bridge report
// ============================================================================

/// Summary block closing a bridge report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_ids_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_fields_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_ratio: Option<f64>,
    pub attempts_used: u32,
}

impl FinalReport {
    pub fn success(attempts_used: u32) -> Self {
        Self {
            ok: true,
            reason: None,
            unknown_ids_count: None,
            empty_fields_count: None,
            coverage_ratio: None,
            attempts_used,
        }
    }

    pub fn failure(reason: impl Into<String>, attempts_used: u32) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            unknown_ids_count: None,
            empty_fields_count: None,
            coverage_ratio: None,
            attempts_used,
        }
    }
}

/// Full audit record of one bridge invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReport {
    pub repo_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageResult>,
    #[serde(rename = "final")]
    pub outcome: FinalReport,
}

impl BridgeReport {
    /// Last failed stage, if any. The classifier keys off this.
    pub fn last_failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().rev().find(|stage| !stage.ok)
    }

    /// Concatenated error text of all failed stages, newest first.
    /// Feeds focus-hint derivation in the gap loop.
    pub fn failure_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for stage in self.stages.iter().rev().filter(|stage| !stage.ok) {
            let code = stage.error_code.as_deref().unwrap_or("error");
            let detail = stage.error_detail.as_deref().unwrap_or("");
            parts.push(format!("{} {}: {}", stage.name, code, detail));
        }
        parts.join("; ")
    }
}

// ============================================================================
// Failure kinds
// ============================================================================

/// Fixed failure taxonomy for classified repo outcomes. Serialized
/// names are stable; downstream tooling matches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    FetchFailed,
    EvidenceInsufficient,
    BridgeWireInvalid,
    BridgeCanonicalInvalid,
    EvidenceGateUnknownId,
    QualityGateEmptyCitations,
    QualityGateLowCoverage,
    RepairExhausted,
    BudgetCutoff,
    #[default]
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FetchFailed => "FETCH_FAILED",
            FailureKind::EvidenceInsufficient => "EVIDENCE_INSUFFICIENT",
            FailureKind::BridgeWireInvalid => "BRIDGE_WIRE_INVALID",
            FailureKind::BridgeCanonicalInvalid => "BRIDGE_CANONICAL_INVALID",
            FailureKind::EvidenceGateUnknownId => "EVIDENCE_GATE_UNKNOWN_ID",
            FailureKind::QualityGateEmptyCitations => "QUALITY_GATE_EMPTY_CITATIONS",
            FailureKind::QualityGateLowCoverage => "QUALITY_GATE_LOW_COVERAGE",
            FailureKind::RepairExhausted => "REPAIR_EXHAUSTED",
            FailureKind::BudgetCutoff => "BUDGET_CUTOFF",
            FailureKind::Unknown => "UNKNOWN",
        }
    }

    /// Operator-facing remediation hint for triage output.
    pub fn remediation(&self) -> &'static str {
        match self {
            FailureKind::FetchFailed => {
                "Check network access and GITHUB_TOKEN, then re-run this repo"
            }
            FailureKind::EvidenceInsufficient => {
                "Repo exposes too little public material; lower the evidence floor or skip it"
            }
            FailureKind::BridgeWireInvalid => {
                "Model returned non-JSON or out-of-shape output; try a different model or raise max_iters"
            }
            FailureKind::BridgeCanonicalInvalid => {
                "Normalized document failed strict validation; inspect the iteration reports"
            }
            FailureKind::EvidenceGateUnknownId => {
                "Model cited ids outside the evidence pack; enrichment usually fixes this on re-run"
            }
            FailureKind::QualityGateEmptyCitations => {
                "Fields were left uncited after repair; raise max_repair_attempts"
            }
            FailureKind::QualityGateLowCoverage => {
                "Coverage stayed below the configured ratio; lower min_citation_coverage or add evidence"
            }
            FailureKind::RepairExhausted => {
                "Repair budget spent without passing both gates; raise max_repair_attempts"
            }
            FailureKind::BudgetCutoff => {
                "Run budget exhausted before this repo finished; re-run with a larger budget"
            }
            FailureKind::Unknown => "Inspect the iteration reports and logs for this repo",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FETCH_FAILED" => Ok(FailureKind::FetchFailed),
            "EVIDENCE_INSUFFICIENT" => Ok(FailureKind::EvidenceInsufficient),
            "BRIDGE_WIRE_INVALID" => Ok(FailureKind::BridgeWireInvalid),
            "BRIDGE_CANONICAL_INVALID" => Ok(FailureKind::BridgeCanonicalInvalid),
            "EVIDENCE_GATE_UNKNOWN_ID" => Ok(FailureKind::EvidenceGateUnknownId),
            "QUALITY_GATE_EMPTY_CITATIONS" => Ok(FailureKind::QualityGateEmptyCitations),
            "QUALITY_GATE_LOW_COVERAGE" => Ok(FailureKind::QualityGateLowCoverage),
            "REPAIR_EXHAUSTED" => Ok(FailureKind::RepairExhausted),
            "BUDGET_CUTOFF" => Ok(FailureKind::BudgetCutoff),
            "UNKNOWN" => Ok(FailureKind::Unknown),
            _ => Err(format!("Invalid failure kind: '{}'", s)),
        }
    }
}

// ============================================================================
// Per-repo outcome
// ============================================================================

/// Gate thresholds handed to each bridge invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    pub require_non_empty: bool,
    pub min_coverage_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            require_non_empty: true,
            min_coverage_ratio: crate::defaults::DEFAULT_MIN_CITATION_COVERAGE,
        }
    }
}

/// Mutable per-repo gap loop state; discarded once the repo's outcome
/// is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapLoopState {
    pub iterations_used: u32,
    pub evidence_total_initial: usize,
    pub evidence_total_final: usize,
    pub evidence_added_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A classified failure, written as `failure.json` for the repo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub kind: FailureKind,
    pub reason: String,
    pub remediation: String,
}

impl FailureEntry {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            remediation: kind.remediation().to_string(),
        }
    }
}

/// Everything a repo's processing produced: at most one canonical
/// document or one classified failure, plus per-iteration reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoOutcome {
    pub repo_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<crate::document::CanonicalDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureEntry>,
    pub state: GapLoopState,
    pub reports: Vec<BridgeReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_structural_split() {
        assert!(StageName::Parse.is_structural());
        assert!(StageName::CanonicalValidate.is_structural());
        assert!(!StageName::EvidenceGate.is_structural());
        assert!(!StageName::Repair.is_structural());
    }

    #[test]
    fn test_stage_result_builders() {
        let ok = StageResult::passed(StageName::Normalize).with_stat("fixes", 3);
        assert!(ok.ok);
        assert_eq!(ok.stats.get("fixes"), Some(&serde_json::json!(3)));

        let failed = StageResult::failed(StageName::EvidenceGate, "unknown_ids", "E-IS-099");
        assert!(!failed.ok);
        assert_eq!(failed.error_code.as_deref(), Some("unknown_ids"));
    }

    #[test]
    fn test_report_final_key_is_renamed() {
        let report = BridgeReport {
            repo_id: "acme/notes".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![StageResult::passed(StageName::Parse)],
            outcome: FinalReport::success(0),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("final").is_some());
        assert!(value.get("outcome").is_none());
    }

    #[test]
    fn test_last_failed_stage_and_failure_text() {
        let report = BridgeReport {
            repo_id: "acme/notes".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![
                StageResult::passed(StageName::Parse),
                StageResult::failed(StageName::EvidenceGate, "unknown_ids", "unknown: E-IS-099"),
                StageResult::failed(StageName::Repair, "patch_invalid", "bad key"),
            ],
            outcome: FinalReport::failure("gates failed", 2),
        };
        assert_eq!(report.last_failed_stage().unwrap().name, StageName::Repair);
        let text = report.failure_text();
        assert!(text.starts_with("repair patch_invalid"));
        assert!(text.contains("unknown: E-IS-099"));
    }

    #[test]
    fn test_failure_kind_roundtrip_and_serde() {
        for kind in [
            FailureKind::FetchFailed,
            FailureKind::EvidenceInsufficient,
            FailureKind::BridgeWireInvalid,
            FailureKind::BridgeCanonicalInvalid,
            FailureKind::EvidenceGateUnknownId,
            FailureKind::QualityGateEmptyCitations,
            FailureKind::QualityGateLowCoverage,
            FailureKind::RepairExhausted,
            FailureKind::BudgetCutoff,
            FailureKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<FailureKind>().unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&FailureKind::EvidenceGateUnknownId).unwrap(),
            "\"EVIDENCE_GATE_UNKNOWN_ID\""
        );
    }

    #[test]
    fn test_failure_entry_carries_remediation() {
        let entry = FailureEntry::new(FailureKind::BudgetCutoff, "budget exhausted");
        assert_eq!(entry.kind, FailureKind::BudgetCutoff);
        assert!(entry.remediation.contains("budget"));
    }
}
