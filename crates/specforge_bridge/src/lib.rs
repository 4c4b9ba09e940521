//! Spec Bridge: loose model output to validated canonical documents
//!
//! The bridge is the trust boundary between an LLM and the persisted
//! spec artifact:
//!
//! ```text
//!           raw model text
//!                |
//!   parse -> wire_validate -> normalize -> canonical_validate
//!                                               |
//!                              [evidence_gate, quality_gate]
//!                                 |                    |
//!                               pass                 fail
//!                                 |                    |
//!                          CanonicalDocument    citations repair
//!                                               (bounded retries)
//! ```
//!
//! [`orchestrator::run_bridge`] executes that pipeline once and always
//! returns a [`report::BridgeReport`](specforge_protocol::report::BridgeReport)-carrying
//! outcome. [`gaploop::GapLoopController`] wraps it in the iterative
//! synthesize/enrich/retry loop and [`classify::classify_failure`]
//! names whatever finally went wrong. Everything in this crate is
//! deterministic given the model's responses; all model and network
//! I/O is injected through callbacks and traits.

pub mod canonical;
pub mod classify;
pub mod error;
pub mod gaploop;
pub mod gates;
pub mod normalize;
pub mod orchestrator;
pub mod parse;
pub mod repair;

pub use canonical::{validate_canonical, violations_summary, SchemaViolation};
pub use classify::{classify_failure, ClassifyInput};
pub use error::{BridgeError, Result};
pub use gaploop::{
    derive_focus_hint, BudgetOracle, EvidenceEnricher, GapLoopConfig, GapLoopController,
    SynthesisClient,
};
pub use gates::{
    evidence_gate, keys_to_repair, quality_gate, CoverageStats, EvidenceGateReport,
    QualityGateReport,
};
pub use normalize::{normalize, Normalized};
pub use orchestrator::{run_bridge, BridgeInput, BridgeOutcome};
pub use parse::{extract_json, parse_value, wire_from_value};
pub use repair::{apply_patch, build_repair_prompt, parse_patch, RepairFn};
