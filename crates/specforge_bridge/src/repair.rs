//! Citations-only repair
//!
//! When a canonical document fails a gate, the bridge asks the model
//! for a Citations Patch: a partial document that may set citation
//! lists and nothing else. Parsing is deliberately strict. A patch
//! naming an unexpected key, an unknown record, an out-of-range test
//! index, or an id outside the allow-list is rejected whole; there is
//! no salvaging of the valid parts. Applying a valid patch can only
//! ever replace citation lists.

use crate::error::{BridgeError, Result};
use crate::parse::parse_value;
use serde_json::Value;
use specforge_protocol::document::{CanonicalDocument, CitationKey, CitationsPatch};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

/// Async repair callback: prompt in, raw model text out. The bridge
/// owns retry policy; implementations should make exactly one model
/// call per invocation.
pub type RepairFn = Box<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send>>
        + Send
        + Sync,
>;

/// Ceiling on raw patch text. Anything larger is not a citations
/// patch, whatever else it is.
pub const MAX_PATCH_BYTES: usize = 16 * 1024;

/// Ceiling on ids cited for a single key.
pub const MAX_IDS_PER_KEY: usize = 32;

// ============================================================================
// Prompt
// ============================================================================

/// Build the repair prompt: the keys needing citations plus the
/// evidence menu, with strict output-format instructions.
pub fn build_repair_prompt(missing_keys: &[CitationKey], evidence_lines: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are repairing citations in an app specification document.\n");
    prompt.push_str("Each field must cite the evidence ids that support it.\n\n");
    prompt.push_str("Fields currently missing valid citations:\n");
    for key in missing_keys {
        prompt.push_str("- ");
        prompt.push_str(&key.to_string());
        prompt.push('\n');
    }
    prompt.push_str("\nAvailable evidence (cite by id):\n");
    for line in evidence_lines {
        prompt.push_str(line);
        prompt.push('\n');
    }
    prompt.push_str("\nRespond with a single JSON object and nothing else.\n");
    prompt.push_str(
        "Allowed top-level keys: app, core_loop, screens, commands, tables, acceptance_tests.\n",
    );
    prompt.push_str("app and core_loop take an array of evidence ids. ");
    prompt.push_str("screens, commands and tables map record names to arrays of evidence ids. ");
    prompt.push_str(
        "acceptance_tests maps a test index (as a string) to an array of evidence ids.\n",
    );
    prompt.push_str("Cite only ids from the evidence list above. Do not change any other field.\n\n");
    prompt.push_str("Example:\n");
    prompt.push_str(
        "{\"app\": [\"E-RD-001\"], \"screens\": {\"home\": [\"E-RD-001\", \"E-IS-002\"]}, \
         \"acceptance_tests\": {\"0\": [\"E-RL-001\"]}}\n",
    );
    prompt
}

// ============================================================================
// Parse
// ============================================================================

/// Parse and validate a patch against the document it targets and the
/// evidence allow-list. All-or-nothing: the first violation rejects
/// the whole patch.
pub fn parse_patch(
    raw: &str,
    doc: &CanonicalDocument,
    allowed: &BTreeSet<String>,
) -> Result<CitationsPatch> {
    if raw.len() > MAX_PATCH_BYTES {
        return Err(BridgeError::PatchInvalid(format!(
            "patch is {} bytes, limit is {}",
            raw.len(),
            MAX_PATCH_BYTES
        )));
    }
    let value = parse_value(raw).map_err(|e| BridgeError::PatchInvalid(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(BridgeError::PatchInvalid("patch must be a JSON object".to_string()));
    };

    let mut patch = CitationsPatch::default();
    for (key, entry) in &map {
        match key.as_str() {
            "app" => patch.app = Some(id_list(entry, "app")?),
            "core_loop" => patch.core_loop = Some(id_list(entry, "core_loop")?),
            "screens" => {
                patch.screens = Some(named_lists(
                    entry,
                    "screens",
                    doc.screens.iter().map(|s| s.name.as_str()),
                )?);
            }
            "commands" | "rust_commands" => {
                if patch.commands.is_some() {
                    return Err(BridgeError::PatchInvalid(
                        "patch repeats the commands block".to_string(),
                    ));
                }
                patch.commands = Some(named_lists(
                    entry,
                    "commands",
                    doc.rust_commands.iter().map(|c| c.name.as_str()),
                )?);
            }
            "tables" => {
                patch.tables = Some(named_lists(
                    entry,
                    "tables",
                    doc.data_model.tables.iter().map(|t| t.name.as_str()),
                )?);
            }
            "acceptance_tests" => {
                patch.acceptance_tests = Some(indexed_lists(entry, doc.acceptance_tests.len())?);
            }
            other => {
                return Err(BridgeError::PatchInvalid(format!(
                    "unexpected key '{}'; a patch may only set citations",
                    other
                )));
            }
        }
    }

    if patch.is_empty() {
        return Err(BridgeError::PatchInvalid("patch names no keys".to_string()));
    }

    let unknown: BTreeSet<&str> =
        patch.cited_ids().into_iter().filter(|id| !allowed.contains(*id)).collect();
    if !unknown.is_empty() {
        return Err(BridgeError::PatchUnknownIds(
            unknown.into_iter().collect::<Vec<_>>().join(", "),
        ));
    }

    Ok(patch)
}

fn id_list(value: &Value, path: &str) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(BridgeError::PatchInvalid(format!("{} must be an array of ids", path)));
    };
    if items.len() > MAX_IDS_PER_KEY {
        return Err(BridgeError::PatchInvalid(format!(
            "{} cites {} ids, limit is {}",
            path,
            items.len(),
            MAX_IDS_PER_KEY
        )));
    }
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if !s.trim().is_empty() => ids.push(s.trim().to_string()),
            _ => {
                return Err(BridgeError::PatchInvalid(format!(
                    "{} entries must be non-empty id strings",
                    path
                )));
            }
        }
    }
    Ok(ids)
}

fn named_lists<'a>(
    value: &Value,
    path: &str,
    known: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let known: BTreeSet<&str> = known.collect();
    let Value::Object(entries) = value else {
        return Err(BridgeError::PatchInvalid(format!(
            "{} must map record names to id arrays",
            path
        )));
    };
    let mut out = BTreeMap::new();
    for (name, ids) in entries {
        if !known.contains(name.as_str()) {
            return Err(BridgeError::PatchInvalid(format!(
                "{} names unknown record '{}'",
                path, name
            )));
        }
        out.insert(name.clone(), id_list(ids, &format!("{}.{}", path, name))?);
    }
    Ok(out)
}

fn indexed_lists(value: &Value, len: usize) -> Result<BTreeMap<usize, Vec<String>>> {
    let Value::Object(entries) = value else {
        return Err(BridgeError::PatchInvalid(
            "acceptance_tests must map test indexes to id arrays".to_string(),
        ));
    };
    let mut out = BTreeMap::new();
    for (key, ids) in entries {
        let idx: usize = key.trim().parse().map_err(|_| {
            BridgeError::PatchInvalid(format!("acceptance_tests key '{}' is not an index", key))
        })?;
        if idx >= len {
            return Err(BridgeError::PatchInvalid(format!(
                "acceptance_tests index {} out of range (document has {})",
                idx, len
            )));
        }
        out.insert(idx, id_list(ids, &format!("acceptance_tests.{}", idx))?);
    }
    Ok(out)
}

// ============================================================================
// Apply
// ============================================================================

/// Apply a validated patch. Present keys replace their citation list
/// wholesale (deduplicated, sorted); absent keys are untouched.
/// Business fields are unreachable from here by construction.
pub fn apply_patch(doc: &mut CanonicalDocument, patch: &CitationsPatch) {
    if let Some(ids) = &patch.app {
        doc.app.citations = normalized_ids(ids);
    }
    if let Some(ids) = &patch.core_loop {
        doc.app.core_loop.citations = normalized_ids(ids);
    }
    if let Some(map) = &patch.screens {
        for screen in &mut doc.screens {
            if let Some(ids) = map.get(&screen.name) {
                screen.citations = normalized_ids(ids);
            }
        }
    }
    if let Some(map) = &patch.commands {
        for command in &mut doc.rust_commands {
            if let Some(ids) = map.get(&command.name) {
                command.citations = normalized_ids(ids);
            }
        }
    }
    if let Some(map) = &patch.tables {
        for table in &mut doc.data_model.tables {
            if let Some(ids) = map.get(&table.name) {
                table.citations = normalized_ids(ids);
            }
        }
    }
    if let Some(map) = &patch.acceptance_tests {
        for (idx, ids) in map {
            if let Some(test) = doc.acceptance_tests.get_mut(*idx) {
                test.citations = normalized_ids(ids);
            }
        }
    }
}

fn normalized_ids(ids: &[String]) -> Vec<String> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
