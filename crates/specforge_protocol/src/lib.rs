//! Shared Specforge vocabulary: documents, evidence, reports.
//!
//! The type boundary at the heart of the pipeline lives here:
//!
//! ```text
//! raw model text --parse--> WireDocument --normalize--> CanonicalDocument
//!                 (loose, all-optional)      (strict, persisted)
//! ```
//!
//! [`wire::WireDocument`] holds whatever loose shape the model emitted;
//! [`document::CanonicalDocument`] is the strict artifact written to
//! disk. [`report::BridgeReport`] is the audit trail of one bridge
//! invocation and [`evidence::RepoCard`] is the closed world citations
//! are checked against. The bridge crate owns the transforms between
//! them; this crate is pure data.

pub mod defaults;
pub mod document;
pub mod evidence;
pub mod report;
pub mod wire;

// Re-export types for convenience
pub use document::{
    collect_citations,
    AcceptanceTest,
    AppInfo,
    // Canonical vocabulary (use these everywhere)
    BaseType,
    CanonicalDocument,
    CitationKey,
    CitationsPatch,
    Column,
    ColumnType,
    CoreLoop,
    DataModel,
    FieldType,
    RustCommand,
    Screen,
    Table,
    SCHEMA_VERSION,
};

pub use evidence::{
    EnrichmentReport,
    EvidenceIdAllocator,
    EvidenceItem,
    EvidenceKind,
    FocusHint,
    RepoCard,
    RepoMeta,
};

pub use report::{
    BridgeReport,
    FailureEntry,
    FailureKind,
    FinalReport,
    GapLoopState,
    QualityConfig,
    RepoOutcome,
    StageName,
    StageResult,
};

pub use wire::{
    LooseBool,
    StringOr,
    WireAcceptanceTest,
    WireApp,
    WireColumn,
    WireCommand,
    WireCoreLoop,
    WireDataModel,
    WireDataModelBlock,
    WireDocument,
    WireMilestone,
    WireScreen,
    WireTable,
};
