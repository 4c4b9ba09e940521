//! Classify command - triage a saved bridge report
//!
//! Reads a `report_iter_N.json` written by a run and answers the
//! operator question: what kind of failure was this, and what should
//! I change before re-running?

use crate::cli::error::HelpfulError;
use crate::cli::output::{clip_cell, print_table};
use anyhow::Context;
use serde::Serialize;
use specforge_bridge::{classify_failure, ClassifyInput};
use specforge_protocol::report::BridgeReport;
use std::fs;
use std::path::PathBuf;

/// Arguments for the classify command
#[derive(Debug)]
pub struct ClassifyArgs {
    pub report: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Classification {
    repo_id: String,
    kind: String,
    failed_stage: Option<String>,
    reason: Option<String>,
    remediation: String,
}

/// Execute the classify command
pub fn run(args: ClassifyArgs) -> anyhow::Result<()> {
    if !args.report.exists() {
        return Err(HelpfulError::file_not_found(&args.report).into());
    }
    let text = fs::read_to_string(&args.report)
        .with_context(|| format!("failed to read {}", args.report.display()))?;
    let report: BridgeReport = serde_json::from_str(&text)
        .map_err(|e| HelpfulError::invalid_json_file(&args.report, &e.to_string()))?;

    if report.outcome.ok {
        if args.json {
            println!("{}", serde_json::json!({ "repo_id": report.repo_id, "ok": true }));
        } else {
            println!("{}: report is successful, nothing to classify", report.repo_id);
        }
        return Ok(());
    }

    let kind = classify_failure(&ClassifyInput::from_report(&report));
    let classification = Classification {
        repo_id: report.repo_id.clone(),
        kind: kind.as_str().to_string(),
        failed_stage: report.last_failed_stage().map(|s| s.name.as_str().to_string()),
        reason: report.outcome.reason.clone(),
        remediation: kind.remediation().to_string(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(());
    }

    let mut rows = vec![
        vec!["Repo".to_string(), classification.repo_id],
        vec!["Kind".to_string(), classification.kind],
    ];
    if let Some(stage) = classification.failed_stage {
        rows.push(vec!["Failed stage".to_string(), stage]);
    }
    if let Some(reason) = classification.reason {
        rows.push(vec!["Reason".to_string(), clip_cell(&reason, 80)]);
    }
    rows.push(vec!["Remediation".to_string(), classification.remediation]);
    print_table(&["Field", "Value"], rows);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use specforge_protocol::report::{FinalReport, StageName, StageResult};
    use tempfile::TempDir;

    fn failed_report() -> BridgeReport {
        BridgeReport {
            repo_id: "acme/notekeep".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![
                StageResult::passed(StageName::Parse),
                StageResult::failed(StageName::WireValidate, "wire_invalid", "app: invalid type"),
            ],
            outcome: FinalReport::failure("wire validation failed: app: invalid type", 0),
        }
    }

    #[test]
    fn test_classify_reads_report_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report_iter_1.json");
        fs::write(&path, serde_json::to_string(&failed_report()).unwrap()).unwrap();

        let result = run(ClassifyArgs { report: path, json: true });
        assert!(result.is_ok());
    }

    #[test]
    fn test_classify_missing_file_is_helpful() {
        let err = run(ClassifyArgs { report: PathBuf::from("/no/such/report.json"), json: false })
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_classify_garbage_file_is_helpful() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        fs::write(&path, "not json at all").unwrap();
        let err = run(ClassifyArgs { report: path, json: false }).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
