//! Run command - mine GitHub for a topic and synthesize grounded specs
//!
//! One pass over the top search hits for a topic: evidence packs are
//! fetched with bounded concurrency, then each repo is driven through
//! the gap loop sequentially so the model budget is spent in repo
//! order. Every repo ends in either a written spec or a classified
//! failure; a partial run still leaves its artifacts behind.

use crate::cli::error::HelpfulError;
use crate::cli::output::{clip_cell, color_for_outcome, format_duration, print_table_colored};
use anyhow::Context;
use comfy_table::Color;
use indicatif::ProgressBar;
use serde::Serialize;
use specforge::artifact::{ArtifactWriter, IndexEntry};
use specforge::budget::RunBudget;
use specforge::cache::FetchCache;
use specforge::config::Config;
use specforge::evidence::{build_repo_card, BuiltCard, GithubEnricher};
use specforge::github::GithubClient;
use specforge::llm::{LlmClient, LlmError};
use specforge::synth::{citation_repair_fn, SpecSynthesizer};
use specforge_bridge::{classify_failure, ClassifyInput, GapLoopController};
use specforge_protocol::evidence::RepoCard;
use specforge_protocol::report::{FailureEntry, GapLoopState, RepoOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// Arguments for the run command
#[derive(Debug)]
pub struct RunArgs {
    pub topic: String,
    pub limit: usize,
    pub out: Option<PathBuf>,
    pub json: bool,
}

/// Machine-readable run summary for --json
#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    topic: String,
    repos: usize,
    succeeded: usize,
    failed: usize,
    llm_calls: u64,
    elapsed: String,
    out_dir: String,
    entries: Vec<IndexEntry>,
}

/// Execute the run command
pub fn run(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(args, config))
}

async fn run_async(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let started = Instant::now();
    let run_id = Uuid::new_v4().to_string();

    // Fail on a missing key before any network round trip.
    let llm = match LlmClient::new(&config.llm) {
        Ok(client) => client,
        Err(LlmError::MissingApiKey) => return Err(HelpfulError::missing_api_key().into()),
        Err(e) => return Err(e.into()),
    };
    let github = GithubClient::new(&config.github).context("failed to build GitHub client")?;
    let cache = FetchCache::for_home(&config.cache);
    let budget = Arc::new(RunBudget::new(config.run.deadline_minutes, config.run.max_llm_calls));

    let out_dir = args.out.clone().unwrap_or_else(|| PathBuf::from(&config.run.out_dir));
    let writer = ArtifactWriter::new(&out_dir)?;

    info!(topic = %args.topic, limit = args.limit, run = %run_id, "starting mining run");

    let repos = github
        .search_repos(&args.topic, args.limit)
        .await
        .context("GitHub topic search failed")?;
    if repos.is_empty() {
        return Err(HelpfulError::no_repos_found(&args.topic).into());
    }
    let total = repos.len();
    info!(found = total, "search complete, fetching evidence");

    // Evidence packs in parallel, bounded; slots keep search order.
    let semaphore = Arc::new(Semaphore::new(config.run.max_concurrent_fetches.max(1)));
    let mut handles = Vec::with_capacity(total);
    for (idx, repo) in repos.into_iter().enumerate() {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(p) => p,
            Err(_) => continue,
        };
        let meta = repo.clone();
        let github = github.clone();
        let cache = cache.clone();
        let section = config.github.clone();
        handles.push((
            idx,
            meta,
            tokio::spawn(async move {
                let _permit = permit;
                build_repo_card(&github, &cache, repo, &section).await
            }),
        ));
    }
    let mut built: Vec<Option<BuiltCard>> = std::iter::repeat_with(|| None).take(total).collect();
    for (idx, meta, handle) in handles {
        built[idx] = Some(match handle.await {
            Ok(card) => card,
            Err(e) => {
                // A panicked fetch task costs that repo, not the run.
                warn!(repo = %meta.full_name, error = %e, "evidence fetch task failed");
                BuiltCard {
                    card: RepoCard::new(meta),
                    fetch_errors: vec![format!("evidence fetch task failed: {}", e)],
                }
            }
        });
    }

    // One controller for the whole run; the budget oracle spans repos.
    let synthesizer = SpecSynthesizer::new(llm.clone(), Arc::clone(&budget));
    let enricher = GithubEnricher::new(github.clone(), cache.clone(), config.github.clone());
    let repair = citation_repair_fn(llm, Arc::clone(&budget));
    let controller = GapLoopController::new(
        config.gap_loop(),
        &synthesizer,
        &enricher,
        budget.as_ref(),
        &repair,
    );

    let progress = if args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };

    let mut entries: Vec<IndexEntry> = Vec::with_capacity(total);
    let mut rows: Vec<Vec<(String, Option<Color>)>> = Vec::with_capacity(total);
    for item in built.into_iter().flatten() {
        let BuiltCard { mut card, fetch_errors } = item;
        let repo_id = card.repo.full_name.clone();
        progress.set_message(repo_id.clone());

        let outcome = if card.evidence.is_empty() {
            // Nothing to ground a spec in. Classify without running
            // the bridge at all.
            let fetch_failed = !fetch_errors.is_empty();
            let kind = classify_failure(&ClassifyInput {
                fetch_failed,
                evidence_insufficient: !fetch_failed,
                ..Default::default()
            });
            let reason = fetch_errors
                .into_iter()
                .next()
                .unwrap_or_else(|| "no usable evidence found".to_string());
            warn!(repo = %repo_id, %reason, "skipping synthesis");
            RepoOutcome {
                repo_id: repo_id.clone(),
                success: false,
                canonical: None,
                failure: Some(FailureEntry::new(kind, reason)),
                state: GapLoopState::default(),
                reports: Vec::new(),
            }
        } else {
            controller.process_repo(&mut card).await
        };

        let entry = writer.write_outcome(&run_id, &outcome)?;
        rows.push(summary_row(&outcome, &entry));
        entries.push(entry);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let succeeded = entries.iter().filter(|e| e.success).count();
    let summary = RunSummary {
        run_id,
        topic: args.topic,
        repos: entries.len(),
        succeeded,
        failed: entries.len() - succeeded,
        llm_calls: budget.llm_calls_used(),
        elapsed: format_duration(started.elapsed()),
        out_dir: writer.out_dir().display().to_string(),
        entries,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_table_colored(&["Repo", "Outcome", "Iterations", "Detail"], rows);
        println!(
            "{} of {} repos produced a spec in {} ({} model calls). Artifacts in {}",
            summary.succeeded, summary.repos, summary.elapsed, summary.llm_calls, summary.out_dir
        );
    }

    Ok(())
}

fn summary_row(outcome: &RepoOutcome, entry: &IndexEntry) -> Vec<(String, Option<Color>)> {
    let kind = entry.failure_kind.as_deref();
    let status = if outcome.success {
        "OK".to_string()
    } else {
        kind.unwrap_or("FAILED").to_string()
    };
    let color = color_for_outcome(outcome.success, kind);
    let detail = match &entry.spec_path {
        Some(path) => path.clone(),
        None => outcome
            .failure
            .as_ref()
            .map(|f| clip_cell(&f.reason, 60))
            .unwrap_or_default(),
    };

    vec![
        (outcome.repo_id.clone(), None),
        (status, Some(color)),
        (outcome.state.iterations_used.to_string(), None),
        (detail, None),
    ]
}
