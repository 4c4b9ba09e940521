//! Bridge command - replay the validation pipeline on a saved response
//!
//! Takes a raw model response from a file plus the evidence pack it
//! was synthesized against, and runs the full parse/normalize/gate
//! pipeline on it. Deterministic with repair disabled, which makes it
//! the tool for debugging why a particular response was rejected.

use crate::cli::error::HelpfulError;
use crate::cli::output::{clip_cell, print_table_colored};
use anyhow::Context;
use comfy_table::Color;
use specforge::config::Config;
use specforge::llm::{LlmClient, LlmError};
use specforge::synth::{citation_repair_fn, offline_repair_fn};
use specforge_bridge::{run_bridge, BridgeInput};
use specforge_protocol::evidence::{EvidenceItem, RepoCard};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments for the bridge command
#[derive(Debug)]
pub struct BridgeArgs {
    pub input: PathBuf,
    pub evidence: PathBuf,
    pub repair: bool,
    pub out: Option<PathBuf>,
    pub json: bool,
}

/// Execute the bridge command
pub fn run(args: BridgeArgs, config: Config) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(args, config))
}

async fn run_async(args: BridgeArgs, config: Config) -> anyhow::Result<()> {
    if !args.input.exists() {
        return Err(HelpfulError::file_not_found(&args.input).into());
    }
    if !args.evidence.exists() {
        return Err(HelpfulError::file_not_found(&args.evidence).into());
    }

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let card = load_card(&args.evidence)?;

    let repair_fn = if args.repair {
        let llm = match LlmClient::new(&config.llm) {
            Ok(client) => client,
            Err(LlmError::MissingApiKey) => return Err(HelpfulError::missing_api_key().into()),
            Err(e) => return Err(e.into()),
        };
        let budget = Arc::new(specforge::budget::RunBudget::new(None, None));
        citation_repair_fn(llm, budget)
    } else {
        offline_repair_fn()
    };

    let input = BridgeInput {
        repo_id: card.repo.full_name.clone(),
        raw_model_text: raw,
        allowed_evidence_ids: card.allowed_ids(),
        evidence_lines: card.evidence_lines(),
        max_repair_attempts: if args.repair { config.run.max_repair_attempts } else { 0 },
        quality: config.quality(),
    };
    info!(
        repo = %input.repo_id,
        evidence = card.evidence.len(),
        repair = args.repair,
        "replaying bridge"
    );

    let outcome = run_bridge(input, &repair_fn).await;

    if let (true, Some(doc), Some(out)) = (outcome.ok, &outcome.canonical, &args.out) {
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(out, json).with_context(|| format!("failed to write {}", out.display()))?;
        info!(path = %out.display(), "canonical spec written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        return Ok(());
    }

    let rows = outcome
        .report
        .stages
        .iter()
        .map(|stage| {
            let status = if stage.ok { "pass" } else { "FAIL" };
            let color = if stage.ok { Color::Green } else { Color::Red };
            let detail = stage
                .error_detail
                .as_deref()
                .map(|d| clip_cell(d, 70))
                .unwrap_or_else(|| render_stats(&stage.stats));
            vec![
                (stage.name.as_str().to_string(), None),
                (status.to_string(), Some(color)),
                (detail, None),
            ]
        })
        .collect();
    print_table_colored(&["Stage", "Status", "Detail"], rows);

    if outcome.ok {
        println!(
            "Accepted after {} repair attempt(s)",
            outcome.report.outcome.attempts_used
        );
    } else {
        let reason = outcome.report.outcome.reason.as_deref().unwrap_or("unknown");
        println!("Rejected: {}", reason);
    }

    Ok(())
}

/// The evidence file is either a full repo card as written by a run,
/// or a bare evidence array.
fn load_card(path: &PathBuf) -> anyhow::Result<RepoCard> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if let Ok(card) = serde_json::from_str::<RepoCard>(&text) {
        return Ok(card);
    }
    match serde_json::from_str::<Vec<EvidenceItem>>(&text) {
        Ok(items) => {
            let mut card = RepoCard::default();
            card.repo.full_name = "offline/bridge".to_string();
            card.evidence = items;
            Ok(card)
        }
        Err(e) => Err(HelpfulError::invalid_json_file(path, &e.to_string()).into()),
    }
}

fn render_stats(stats: &std::collections::BTreeMap<String, serde_json::Value>) -> String {
    stats
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use specforge_protocol::evidence::EvidenceKind;
    use tempfile::TempDir;

    fn item(id: &str) -> EvidenceItem {
        EvidenceItem {
            id: id.to_string(),
            kind: EvidenceKind::Readme,
            source_url: "https://github.com/acme/notekeep#readme".to_string(),
            title: "README".to_string(),
            excerpt: "A note keeping app".to_string(),
            fetched_at: Utc::now(),
            meta: Default::default(),
        }
    }

    #[test]
    fn test_load_card_accepts_full_card() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("card.json");
        let mut card = RepoCard::default();
        card.repo.full_name = "acme/notekeep".to_string();
        card.evidence.push(item("E-RD-001"));
        fs::write(&path, serde_json::to_string(&card).unwrap()).unwrap();

        let loaded = load_card(&path).unwrap();
        assert_eq!(loaded.repo.full_name, "acme/notekeep");
        assert_eq!(loaded.evidence.len(), 1);
    }

    #[test]
    fn test_load_card_accepts_bare_evidence_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evidence.json");
        fs::write(&path, serde_json::to_string(&vec![item("E-RD-001"), item("E-IS-001")]).unwrap())
            .unwrap();

        let loaded = load_card(&path).unwrap();
        assert_eq!(loaded.repo.full_name, "offline/bridge");
        assert_eq!(loaded.evidence.len(), 2);
    }

    #[test]
    fn test_load_card_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"not\": \"evidence\"").unwrap();
        assert!(load_card(&path).is_err());
    }

    #[test]
    fn test_render_stats() {
        let mut stats = std::collections::BTreeMap::new();
        stats.insert("fixes".to_string(), serde_json::json!(3));
        stats.insert("coverage".to_string(), serde_json::json!(0.75));
        assert_eq!(render_stats(&stats), "coverage=0.75 fixes=3");
    }
}
