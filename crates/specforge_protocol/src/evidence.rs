//! Evidence pack types
//!
//! One Evidence Item is one citable fact pulled from a repository.
//! Ids follow `E-<KIND>-<NNN>` and are handed out by the repo card's
//! allocator; the id set of a card is the closed world the evidence
//! gate checks citations against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Evidence items
// ============================================================================

/// Kind of evidence extracted from a repository.
/// This is the CANONICAL definition - use this everywhere.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    #[default]
    Readme,
    Issue,
    Release,
    FileListing,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Readme => "readme",
            EvidenceKind::Issue => "issue",
            EvidenceKind::Release => "release",
            EvidenceKind::FileListing => "file_listing",
        }
    }

    /// Two-letter id prefix, as in `E-RD-001`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EvidenceKind::Readme => "RD",
            EvidenceKind::Issue => "IS",
            EvidenceKind::Release => "RL",
            EvidenceKind::FileListing => "FL",
        }
    }

    pub fn all() -> [EvidenceKind; 4] {
        [
            EvidenceKind::Readme,
            EvidenceKind::Issue,
            EvidenceKind::Release,
            EvidenceKind::FileListing,
        ]
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "readme" => Ok(EvidenceKind::Readme),
            "issue" => Ok(EvidenceKind::Issue),
            "release" => Ok(EvidenceKind::Release),
            "file_listing" => Ok(EvidenceKind::FileListing),
            _ => Err(format!(
                "Invalid evidence kind: '{}'. Expected: readme, issue, release, or file_listing",
                s
            )),
        }
    }
}

/// One citable fact extracted from a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub source_url: String,
    pub title: String,
    pub excerpt: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl EvidenceItem {
    /// Single-line rendering used in synthesis and repair prompts.
    pub fn prompt_line(&self) -> String {
        let excerpt = self.excerpt.split_whitespace().collect::<Vec<_>>().join(" ");
        format!("[{}] ({}) {}: {}", self.id, self.kind, self.title, excerpt)
    }
}

/// Per-repo-session id counters. Scoped to one repo card on purpose:
/// enrichment appends through the same allocator, so ids never collide
/// within the card's closed world and runs stay reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceIdAllocator {
    readme: u32,
    issue: u32,
    release: u32,
    file_listing: u32,
}

impl EvidenceIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id for a kind, e.g. `E-RD-001`.
    pub fn next_id(&mut self, kind: EvidenceKind) -> String {
        let counter = match kind {
            EvidenceKind::Readme => &mut self.readme,
            EvidenceKind::Issue => &mut self.issue,
            EvidenceKind::Release => &mut self.release,
            EvidenceKind::FileListing => &mut self.file_listing,
        };
        *counter += 1;
        format!("E-{}-{:03}", kind.id_prefix(), counter)
    }

    pub fn issued(&self, kind: EvidenceKind) -> u32 {
        match kind {
            EvidenceKind::Readme => self.readme,
            EvidenceKind::Issue => self.issue,
            EvidenceKind::Release => self.release,
            EvidenceKind::FileListing => self.file_listing,
        }
    }
}

// ============================================================================
// Repo card
// ============================================================================

/// Repository identity and metadata as fetched from the mining stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoMeta {
    /// `owner/name`.
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    pub url: String,
}

impl RepoMeta {
    pub fn owner(&self) -> &str {
        self.full_name.split('/').next().unwrap_or(&self.full_name)
    }

    pub fn name(&self) -> &str {
        self.full_name.split('/').nth(1).unwrap_or(&self.full_name)
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// A repository's evidence pack plus the allocator that feeds it. The
/// gap loop owns one card per repo and mutates it only through
/// [`RepoCard::add_evidence`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoCard {
    pub repo: RepoMeta,
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub allocator: EvidenceIdAllocator,
}

impl RepoCard {
    pub fn new(repo: RepoMeta) -> Self {
        Self {
            repo,
            evidence: Vec::new(),
            allocator: EvidenceIdAllocator::new(),
        }
    }

    /// Append one evidence item, allocating its id. Returns the id.
    pub fn add_evidence(
        &mut self,
        kind: EvidenceKind,
        source_url: impl Into<String>,
        title: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> String {
        let id = self.allocator.next_id(kind);
        self.evidence.push(EvidenceItem {
            id: id.clone(),
            kind,
            source_url: source_url.into(),
            title: title.into(),
            excerpt: excerpt.into(),
            fetched_at: Utc::now(),
            meta: BTreeMap::new(),
        });
        id
    }

    /// The closed world handed to each bridge invocation.
    pub fn allowed_ids(&self) -> Vec<String> {
        self.evidence.iter().map(|item| item.id.clone()).collect()
    }

    /// Human-readable lines for synthesis/repair prompting.
    pub fn evidence_lines(&self) -> Vec<String> {
        self.evidence.iter().map(EvidenceItem::prompt_line).collect()
    }

    pub fn evidence_total(&self) -> usize {
        self.evidence.len()
    }

    pub fn count_of(&self, kind: EvidenceKind) -> usize {
        self.evidence.iter().filter(|item| item.kind == kind).count()
    }
}

// ============================================================================
// Focus hints and enrichment
// ============================================================================

/// What the next synthesis/enrichment round should chase, derived from
/// a failed bridge report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusHint {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub need_tables: bool,
    #[serde(default)]
    pub need_commands: bool,
}

impl FocusHint {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && !self.need_tables && !self.need_commands
    }
}

/// What an enrichment round added, per evidence kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    #[serde(default)]
    pub added: BTreeMap<EvidenceKind, usize>,
}

impl EnrichmentReport {
    pub fn record(&mut self, kind: EvidenceKind, count: usize) {
        if count > 0 {
            *self.added.entry(kind).or_insert(0) += count;
        }
    }

    pub fn total_added(&self) -> usize {
        self.added.values().sum()
    }
}
