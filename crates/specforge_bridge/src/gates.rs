//! Evidence and quality gates
//!
//! Both gates walk the flattened per-key citation view of a canonical
//! document. The evidence gate enforces the closed world: every cited
//! id must be in the caller's allow-list. The quality gate enforces
//! grounding density: no empty citation lists (when required) and a
//! minimum fraction of cited keys. Gate failures are repairable, which
//! is why both reports name the offending keys.

use specforge_protocol::document::{collect_citations, CanonicalDocument, CitationKey};
use specforge_protocol::report::QualityConfig;
use std::collections::BTreeSet;

// ============================================================================
// Evidence gate
// ============================================================================

/// Outcome of the closed-world check.
#[derive(Debug, Clone, Default)]
pub struct EvidenceGateReport {
    pub ok: bool,
    /// Every cited id not in the allow-list, sorted, deduplicated.
    pub unknown_ids: Vec<String>,
    /// Total citations inspected across all keys.
    pub cited_total: usize,
    /// Keys that cite at least one unknown id.
    pub offending_keys: Vec<CitationKey>,
}

/// Check every citation in the document against the allow-list.
pub fn evidence_gate(doc: &CanonicalDocument, allowed: &BTreeSet<String>) -> EvidenceGateReport {
    let mut unknown: BTreeSet<String> = BTreeSet::new();
    let mut offending: Vec<CitationKey> = Vec::new();
    let mut cited_total = 0usize;

    for (key, citations) in collect_citations(doc) {
        cited_total += citations.len();
        let mut key_offends = false;
        for id in &citations {
            if !allowed.contains(id) {
                unknown.insert(id.clone());
                key_offends = true;
            }
        }
        if key_offends {
            offending.push(key);
        }
    }

    EvidenceGateReport {
        ok: unknown.is_empty(),
        unknown_ids: unknown.into_iter().collect(),
        cited_total,
        offending_keys: offending,
    }
}

// ============================================================================
// Quality gate
// ============================================================================

/// Citation coverage over the document's citation-bearing keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageStats {
    pub total: usize,
    pub cited: usize,
    pub ratio: f64,
}

impl CoverageStats {
    fn from_counts(total: usize, cited: usize) -> Self {
        let ratio = if total == 0 { 1.0 } else { cited as f64 / total as f64 };
        Self { total, cited, ratio }
    }
}

/// Outcome of the grounding-density check.
#[derive(Debug, Clone, Default)]
pub struct QualityGateReport {
    pub ok: bool,
    /// Keys with an empty citation list.
    pub empty_fields: Vec<CitationKey>,
    pub coverage: CoverageStats,
}

/// Check citation density against the configured thresholds.
pub fn quality_gate(doc: &CanonicalDocument, config: &QualityConfig) -> QualityGateReport {
    let citations = collect_citations(doc);
    let total = citations.len();
    let mut empty_fields: Vec<CitationKey> = Vec::new();
    let mut cited = 0usize;

    for (key, list) in citations {
        if list.is_empty() {
            empty_fields.push(key);
        } else {
            cited += 1;
        }
    }

    let coverage = CoverageStats::from_counts(total, cited);
    let empties_ok = !config.require_non_empty || empty_fields.is_empty();
    let coverage_ok = coverage.ratio >= config.min_coverage_ratio;

    QualityGateReport { ok: empties_ok && coverage_ok, empty_fields, coverage }
}

/// Union of the keys both gates flagged, sorted and deduplicated. This
/// is the repair target list.
pub fn keys_to_repair(
    evidence: &EvidenceGateReport,
    quality: &QualityGateReport,
) -> Vec<CitationKey> {
    let mut keys: BTreeSet<CitationKey> = BTreeSet::new();
    keys.extend(evidence.offending_keys.iter().cloned());
    keys.extend(quality.empty_fields.iter().cloned());
    keys.into_iter().collect()
}
