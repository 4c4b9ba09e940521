//! Artifact writing
//!
//! Everything a run leaves on disk, under one output directory:
//!
//! ```text
//! <out>/
//!   <owner>__<repo>/
//!     spec.json             canonical document (success only)
//!     report_iter_1.json    one bridge report per gap-loop iteration
//!     report_iter_2.json
//!     failure.json          classified failure (failure only)
//!   index.jsonl             one line per processed repo
//! ```
//!
//! The bridge never writes files; this module is the only place the
//! run touches the artifact tree, always after a repo completes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_protocol::document::CanonicalDocument;
use specforge_protocol::report::{BridgeReport, FailureEntry, RepoOutcome};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const INDEX_FILE: &str = "index.jsonl";

/// One line of `index.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub run_id: String,
    pub repo_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    pub iterations_used: u32,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(out_dir: &Path) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;
        Ok(Self { out_dir: out_dir.to_path_buf() })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write every artifact for one finished repo and append its index
    /// line. Returns the entry that was appended.
    pub fn write_outcome(&self, run_id: &str, outcome: &RepoOutcome) -> Result<IndexEntry> {
        for (idx, report) in outcome.reports.iter().enumerate() {
            self.write_report(&outcome.repo_id, idx + 1, report)?;
        }

        let spec_path = match &outcome.canonical {
            Some(doc) => Some(self.write_spec(&outcome.repo_id, doc)?),
            None => None,
        };
        if let Some(failure) = &outcome.failure {
            self.write_failure(&outcome.repo_id, failure)?;
        }

        let entry = IndexEntry {
            run_id: run_id.to_string(),
            repo_id: outcome.repo_id.clone(),
            success: outcome.success,
            spec_path: spec_path.map(|p| p.display().to_string()),
            failure_kind: outcome.failure.as_ref().map(|f| f.kind.as_str().to_string()),
            iterations_used: outcome.state.iterations_used,
            finished_at: Utc::now(),
        };
        self.append_index(&entry)?;
        info!(repo = %outcome.repo_id, success = outcome.success, "artifacts written");
        Ok(entry)
    }

    pub fn write_spec(&self, repo_id: &str, doc: &CanonicalDocument) -> Result<PathBuf> {
        let path = self.repo_dir(repo_id)?.join("spec.json");
        let json = serde_json::to_string_pretty(doc).context("failed to serialize spec")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_report(
        &self,
        repo_id: &str,
        iteration: usize,
        report: &BridgeReport,
    ) -> Result<PathBuf> {
        let path = self.repo_dir(repo_id)?.join(format!("report_iter_{}.json", iteration));
        let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_failure(&self, repo_id: &str, failure: &FailureEntry) -> Result<PathBuf> {
        let path = self.repo_dir(repo_id)?.join("failure.json");
        let json = serde_json::to_string_pretty(failure).context("failed to serialize failure")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn append_index(&self, entry: &IndexEntry) -> Result<()> {
        let path = self.out_dir.join(INDEX_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let line = serde_json::to_string(entry).context("failed to serialize index entry")?;
        writeln!(file, "{}", line)
            .with_context(|| format!("failed to append to {}", path.display()))?;
        Ok(())
    }

    fn repo_dir(&self, repo_id: &str) -> Result<PathBuf> {
        let dir = self.out_dir.join(repo_slug(repo_id));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}

/// `owner/name` -> `owner__name`, safe as a directory name.
pub fn repo_slug(repo_id: &str) -> String {
    repo_id
        .replace('/', "__")
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
