//! Evidence pack assembly and focused enrichment
//!
//! The initial pack per repo: README excerpt windows, a handful of
//! issues, releases, and a root file listing, each becoming one
//! `EvidenceItem` with an allocator-assigned id. Enrichment runs
//! between gap-loop iterations and chases the focus hint: more issues
//! ranked by keyword overlap, further README windows, schema- or
//! command-flavored files from the listing.
//!
//! Every fetch is independent and best-effort; a section that fails
//! is logged and skipped so one flaky endpoint does not sink the repo.

use crate::cache::{cache_scope, FetchCache};
use crate::config::GithubSection;
use crate::github::{ContentEntry, GithubClient, Issue, Release};
use async_trait::async_trait;
use regex::Regex;
use specforge_bridge::{BridgeError, EvidenceEnricher};
use specforge_protocol::defaults::DEFAULT_EXCERPT_MAX_CHARS;
use specforge_protocol::evidence::{EnrichmentReport, EvidenceKind, FocusHint, RepoCard, RepoMeta};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// README windows added when the pack is first built; the rest are
/// held back for enrichment.
const INITIAL_README_WINDOWS: usize = 2;
const MAX_README_WINDOWS: usize = 6;

/// Listing-name fragments that smell like persistent data.
const TABLE_HINTS: &[&str] = &["schema", "migration", "model", "db", "sql", "store"];
/// Listing-name fragments that smell like an API/command surface.
const COMMAND_HINTS: &[&str] = &["command", "api", "cli", "handler", "server", "rpc"];

/// What the initial build saw, so the caller can tell "nothing there"
/// from "could not look".
#[derive(Debug)]
pub struct BuiltCard {
    pub card: RepoCard,
    pub fetch_errors: Vec<String>,
}

// ============================================================================
// Initial pack
// ============================================================================

/// Assemble the starting evidence pack for one repository.
pub async fn build_repo_card(
    github: &GithubClient,
    cache: &FetchCache,
    repo: RepoMeta,
    config: &GithubSection,
) -> BuiltCard {
    let repo_id = repo.full_name.clone();
    let scope = cache_scope(&repo_id);
    let mut card = RepoCard::new(repo);
    let mut fetch_errors = Vec::new();

    match readme_text(github, cache, &scope, &repo_id).await {
        Ok(Some(text)) => {
            for (idx, window) in
                readme_windows(&text).into_iter().take(INITIAL_README_WINDOWS).enumerate()
            {
                card.add_evidence(
                    EvidenceKind::Readme,
                    format!("https://github.com/{}#readme", repo_id),
                    readme_title(idx),
                    window,
                );
            }
        }
        Ok(None) => debug!(repo = %repo_id, "no README"),
        Err(e) => fetch_errors.push(format!("readme: {}", e)),
    }

    match cached_issues(github, cache, &scope, &repo_id, config.issues_per_repo).await {
        Ok(issues) => {
            for issue in issues.iter().take(config.issues_per_repo) {
                add_issue(&mut card, issue);
            }
        }
        Err(e) => fetch_errors.push(format!("issues: {}", e)),
    }

    match cached_releases(github, cache, &scope, &repo_id, config.releases_per_repo).await {
        Ok(releases) => {
            for release in releases.iter().take(config.releases_per_repo) {
                add_release(&mut card, release);
            }
        }
        Err(e) => fetch_errors.push(format!("releases: {}", e)),
    }

    match cached_listing(github, cache, &scope, &repo_id).await {
        Ok(entries) if !entries.is_empty() => {
            let names = listing_names(&entries, config.listing_max_entries);
            card.add_evidence(
                EvidenceKind::FileListing,
                format!("https://github.com/{}", repo_id),
                "root files",
                names.join(", "),
            );
        }
        Ok(_) => debug!(repo = %repo_id, "empty root listing"),
        Err(e) => fetch_errors.push(format!("contents: {}", e)),
    }

    for error in &fetch_errors {
        warn!(repo = %repo_id, error, "evidence fetch failed");
    }
    info!(
        repo = %repo_id,
        evidence = card.evidence_total(),
        errors = fetch_errors.len(),
        "evidence pack built"
    );
    BuiltCard { card, fetch_errors }
}

// ============================================================================
// Enricher
// ============================================================================

/// Focused enrichment over the same GitHub client and cache.
pub struct GithubEnricher {
    github: GithubClient,
    cache: FetchCache,
    config: GithubSection,
}

impl GithubEnricher {
    pub fn new(github: GithubClient, cache: FetchCache, config: GithubSection) -> Self {
        Self { github, cache, config }
    }
}

#[async_trait]
impl EvidenceEnricher for GithubEnricher {
    async fn enrich(
        &self,
        card: &mut RepoCard,
        focus: &FocusHint,
    ) -> specforge_bridge::Result<EnrichmentReport> {
        let repo_id = card.repo.full_name.clone();
        let scope = cache_scope(&repo_id);
        let mut report = EnrichmentReport::default();
        let mut first_error: Option<String> = None;

        // Wider issue sweep, ranked by keyword overlap with the focus.
        let wide = self.config.issues_per_repo.saturating_mul(3);
        match cached_wide_issues(&self.github, &self.cache, &scope, &repo_id, wide).await {
            Ok(mut issues) => {
                rank_issues(&mut issues, &focus.keywords);
                let existing = existing_urls(card);
                let fresh = pick_new_issues(&issues, &existing, self.config.issues_per_repo);
                for issue in fresh {
                    add_issue(card, issue);
                    report.record(EvidenceKind::Issue, 1);
                }
            }
            Err(e) => {
                first_error.get_or_insert(format!("issues: {}", e));
            }
        };

        // Next README window, if any are held back.
        let readme_have = card.count_of(EvidenceKind::Readme);
        if readme_have < MAX_README_WINDOWS {
            match readme_text(&self.github, &self.cache, &scope, &repo_id).await {
                Ok(Some(text)) => {
                    if let Some(window) = readme_windows(&text).into_iter().nth(readme_have) {
                        card.add_evidence(
                            EvidenceKind::Readme,
                            format!("https://github.com/{}#readme", repo_id),
                            readme_title(readme_have),
                            window,
                        );
                        report.record(EvidenceKind::Readme, 1);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(format!("readme: {}", e));
                }
            };
        }

        // Focused slice of the file listing for table/command gaps.
        if focus.need_tables || focus.need_commands {
            match cached_listing(&self.github, &self.cache, &scope, &repo_id).await {
                Ok(entries) => {
                    let names = focused_listing(&entries, focus);
                    if !names.is_empty() && !already_listed(card, &names) {
                        card.add_evidence(
                            EvidenceKind::FileListing,
                            format!("https://github.com/{}", repo_id),
                            "files matching focus",
                            names.join(", "),
                        );
                        report.record(EvidenceKind::FileListing, 1);
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(format!("contents: {}", e));
                }
            };
        }

        // A deeper pull of releases than the initial pack took.
        let wide_releases = self.config.releases_per_repo.saturating_mul(2);
        match cached_wide_releases(&self.github, &self.cache, &scope, &repo_id, wide_releases).await
        {
            Ok(releases) => {
                let existing = existing_urls(card);
                let fresh: Vec<&Release> = releases
                    .iter()
                    .filter(|r| !existing.contains(r.html_url.as_str()))
                    .take(self.config.releases_per_repo)
                    .collect();
                for release in fresh {
                    add_release(card, release);
                    report.record(EvidenceKind::Release, 1);
                }
            }
            Err(e) => {
                first_error.get_or_insert(format!("releases: {}", e));
            }
        };

        if report.total_added() == 0 {
            if let Some(error) = first_error {
                return Err(BridgeError::Enrichment(error));
            }
        }
        info!(repo = %repo_id, added = report.total_added(), "enrichment round finished");
        Ok(report)
    }
}

// ============================================================================
// Fetch-through-cache helpers
// ============================================================================

async fn readme_text(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
) -> crate::github::Result<Option<String>> {
    if let Some(cached) = cache.get::<Option<String>>(scope, "readme") {
        return Ok(cached);
    }
    let fetched = github.fetch_readme(repo_id).await?;
    cache.put(scope, "readme", &fetched);
    Ok(fetched)
}

async fn cached_issues(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
    limit: usize,
) -> crate::github::Result<Vec<Issue>> {
    if let Some(cached) = cache.get::<Vec<Issue>>(scope, "issues") {
        return Ok(cached);
    }
    let fetched = github.fetch_issues(repo_id, limit).await?;
    cache.put(scope, "issues", &fetched);
    Ok(fetched)
}

async fn cached_wide_issues(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
    limit: usize,
) -> crate::github::Result<Vec<Issue>> {
    if let Some(cached) = cache.get::<Vec<Issue>>(scope, "issues_wide") {
        return Ok(cached);
    }
    let fetched = github.fetch_issues(repo_id, limit).await?;
    cache.put(scope, "issues_wide", &fetched);
    Ok(fetched)
}

async fn cached_releases(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
    limit: usize,
) -> crate::github::Result<Vec<Release>> {
    if let Some(cached) = cache.get::<Vec<Release>>(scope, "releases") {
        return Ok(cached);
    }
    let fetched = github.fetch_releases(repo_id, limit).await?;
    cache.put(scope, "releases", &fetched);
    Ok(fetched)
}

async fn cached_wide_releases(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
    limit: usize,
) -> crate::github::Result<Vec<Release>> {
    if let Some(cached) = cache.get::<Vec<Release>>(scope, "releases_wide") {
        return Ok(cached);
    }
    let fetched = github.fetch_releases(repo_id, limit).await?;
    cache.put(scope, "releases_wide", &fetched);
    Ok(fetched)
}

async fn cached_listing(
    github: &GithubClient,
    cache: &FetchCache,
    scope: &str,
    repo_id: &str,
) -> crate::github::Result<Vec<ContentEntry>> {
    if let Some(cached) = cache.get::<Vec<ContentEntry>>(scope, "contents") {
        return Ok(cached);
    }
    let fetched = github.fetch_root_listing(repo_id).await?;
    cache.put(scope, "contents", &fetched);
    Ok(fetched)
}

// ============================================================================
// Pure helpers
// ============================================================================

fn add_issue(card: &mut RepoCard, issue: &Issue) {
    let excerpt = issue
        .body
        .as_deref()
        .map(clean_excerpt)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| format!("{} issue #{}", issue.state, issue.number));
    card.add_evidence(
        EvidenceKind::Issue,
        issue.html_url.clone(),
        issue.title.clone(),
        clip(&excerpt, DEFAULT_EXCERPT_MAX_CHARS),
    );
}

fn add_release(card: &mut RepoCard, release: &Release) {
    let title = match release.name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) if name != release.tag_name => format!("{} ({})", release.tag_name, name),
        _ => release.tag_name.clone(),
    };
    let excerpt = release
        .body
        .as_deref()
        .map(clean_excerpt)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "release".to_string());
    card.add_evidence(
        EvidenceKind::Release,
        release.html_url.clone(),
        title,
        clip(&excerpt, DEFAULT_EXCERPT_MAX_CHARS),
    );
}

fn readme_title(window_idx: usize) -> String {
    if window_idx == 0 {
        "README".to_string()
    } else {
        format!("README (part {})", window_idx + 1)
    }
}

/// Strip markdown noise (badges, images, link targets, HTML) that
/// wastes excerpt budget without informing the model.
fn clean_excerpt(text: &str) -> String {
    static IMAGE: OnceLock<Regex> = OnceLock::new();
    static LINK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let image = IMAGE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
    let link = LINK.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());

    let text = image.replace_all(text, "");
    let text = link.replace_all(&text, "$1");
    let text = tag.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned README split into fixed-size character windows.
fn readme_windows(text: &str) -> Vec<String> {
    let cleaned = clean_excerpt(text);
    let chars: Vec<char> = cleaned.chars().collect();
    chars
        .chunks(DEFAULT_EXCERPT_MAX_CHARS)
        .take(MAX_README_WINDOWS)
        .map(|chunk| chunk.iter().collect::<String>().trim().to_string())
        .filter(|window| !window.is_empty())
        .collect()
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

fn listing_names(entries: &[ContentEntry], max: usize) -> Vec<String> {
    entries
        .iter()
        .take(max)
        .map(|e| {
            if e.entry_type == "dir" {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            }
        })
        .collect()
}

/// Sort issues by focus-keyword overlap, most matches first. Without
/// keywords the fetch order (most recent) stands.
fn rank_issues(issues: &mut [Issue], keywords: &[String]) {
    if keywords.is_empty() {
        return;
    }
    issues.sort_by_key(|issue| std::cmp::Reverse(focus_score(issue, keywords)));
}

fn focus_score(issue: &Issue, keywords: &[String]) -> usize {
    let haystack =
        format!("{} {}", issue.title, issue.body.as_deref().unwrap_or("")).to_lowercase();
    keywords.iter().filter(|k| haystack.contains(k.as_str())).count()
}

fn existing_urls(card: &RepoCard) -> BTreeSet<&str> {
    card.evidence.iter().map(|e| e.source_url.as_str()).collect()
}

fn pick_new_issues<'a>(
    issues: &'a [Issue],
    existing: &BTreeSet<&str>,
    limit: usize,
) -> Vec<&'a Issue> {
    issues
        .iter()
        .filter(|i| !existing.contains(i.html_url.as_str()))
        .take(limit)
        .collect()
}

/// Listing entries whose names look relevant to the focus gaps.
fn focused_listing(entries: &[ContentEntry], focus: &FocusHint) -> Vec<String> {
    let mut hints: Vec<&str> = Vec::new();
    if focus.need_tables {
        hints.extend_from_slice(TABLE_HINTS);
    }
    if focus.need_commands {
        hints.extend_from_slice(COMMAND_HINTS);
    }
    entries
        .iter()
        .filter(|e| {
            let name = e.name.to_lowercase();
            hints.iter().any(|h| name.contains(h))
                || focus.keywords.iter().any(|k| name.contains(k.as_str()))
        })
        .map(|e| e.name.clone())
        .collect()
}

fn already_listed(card: &RepoCard, names: &[String]) -> bool {
    let joined = names.join(", ");
    card.evidence
        .iter()
        .filter(|e| e.kind == EvidenceKind::FileListing)
        .any(|e| e.excerpt == joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(number: u64, title: &str, body: Option<&str>) -> Issue {
        serde_json::from_value(serde_json::json!({
            "number": number,
            "title": title,
            "body": body,
            "state": "open",
            "html_url": format!("https://github.com/acme/notekeep/issues/{}", number)
        }))
        .unwrap()
    }

    #[test]
    fn test_clean_excerpt_strips_markdown_noise() {
        let raw = "![build](https://img.shields.io/badge.svg) NoteKeep is a \
                   [notes app](https://example.test) <b>for</b> markdown.";
        assert_eq!(clean_excerpt(raw), "NoteKeep is a notes app for markdown.");
    }

    #[test]
    fn test_readme_windows_are_bounded() {
        let text = "word ".repeat(2000);
        let windows = readme_windows(&text);
        assert!(windows.len() <= MAX_README_WINDOWS);
        assert!(windows.iter().all(|w| w.chars().count() <= DEFAULT_EXCERPT_MAX_CHARS));
        assert!(windows.len() > 1);
    }

    #[test]
    fn test_rank_issues_prefers_keyword_matches() {
        let mut issues = vec![
            issue(1, "Crash on startup", None),
            issue(2, "Sync drops notebook tags", Some("the notebooks table loses rows")),
            issue(3, "Dark mode request", None),
        ];
        rank_issues(&mut issues, &["notebooks".to_string(), "sync".to_string()]);
        assert_eq!(issues[0].number, 2);
    }

    #[test]
    fn test_pick_new_issues_dedupes_by_url() {
        let issues = vec![issue(1, "a", None), issue(2, "b", None)];
        let mut existing = BTreeSet::new();
        existing.insert("https://github.com/acme/notekeep/issues/1");
        let fresh = pick_new_issues(&issues, &existing, 5);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].number, 2);
    }

    #[test]
    fn test_focused_listing_matches_hints_and_keywords() {
        let entries: Vec<ContentEntry> = serde_json::from_str(
            r#"[
                {"name": "migrations", "path": "migrations", "type": "dir"},
                {"name": "editor_pane.rs", "path": "src/editor_pane.rs", "type": "file"},
                {"name": "LICENSE", "path": "LICENSE", "type": "file"}
            ]"#,
        )
        .unwrap();
        let focus = FocusHint {
            keywords: vec!["editor_pane".to_string()],
            need_tables: true,
            need_commands: false,
        };
        let names = focused_listing(&entries, &focus);
        assert_eq!(names, vec!["migrations".to_string(), "editor_pane.rs".to_string()]);
    }

    #[test]
    fn test_release_title_combines_tag_and_name() {
        let release: Release = serde_json::from_value(serde_json::json!({
            "tag_name": "v1.2.0",
            "name": "Offline sync",
            "body": "Adds offline sync.",
            "html_url": "https://github.com/acme/notekeep/releases/v1.2.0"
        }))
        .unwrap();
        let mut card = RepoCard::new(RepoMeta {
            full_name: "acme/notekeep".to_string(),
            description: None,
            stars: 0,
            topics: Vec::new(),
            default_branch: "main".to_string(),
            url: "https://github.com/acme/notekeep".to_string(),
        });
        add_release(&mut card, &release);
        assert_eq!(card.evidence[0].title, "v1.2.0 (Offline sync)");
        assert_eq!(card.evidence[0].id, "E-RL-001");
    }
}
