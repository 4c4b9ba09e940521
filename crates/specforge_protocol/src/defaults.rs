//! Canonical default values shared across the bridge and the CLI.

/// Citation-repair rounds per bridge invocation.
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 2;

/// Minimum acceptable citation-coverage ratio.
pub const DEFAULT_MIN_CITATION_COVERAGE: f64 = 0.6;

/// Gap loop iterations per repository.
pub const DEFAULT_MAX_GAP_ITERS: u32 = 3;

/// Evidence items a pack must hold before a repair-exhausted failure
/// is treated as model instability rather than an evidence gap.
pub const DEFAULT_STABILITY_EVIDENCE_FLOOR: usize = 6;

/// Longest excerpt stored on a single evidence item.
pub const DEFAULT_EXCERPT_MAX_CHARS: usize = 700;
