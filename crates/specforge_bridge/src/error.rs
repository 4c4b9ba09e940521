//! Error types for the Spec Bridge

use thiserror::Error;

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No JSON object found in model output")]
    NoJsonObject,

    #[error("Wire document out of shape: {0}")]
    WireShape(String),

    #[error("Invalid citations patch: {0}")]
    PatchInvalid(String),

    #[error("Patch cites unknown evidence ids: {0}")]
    PatchUnknownIds(String),

    #[error("Repair call failed: {0}")]
    RepairCall(String),

    #[error("Synthesis call failed: {0}")]
    Synthesis(String),

    #[error("Evidence enrichment failed: {0}")]
    Enrichment(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BridgeError>;
