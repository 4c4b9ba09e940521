//! End-to-end bridge flows over realistic messy model output.

use serde_json::json;
use specforge_bridge::{run_bridge, BridgeInput, RepairFn};
use specforge_protocol::report::StageName;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn scripted_repair(responses: Vec<&str>) -> (RepairFn, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let responses: Arc<Vec<String>> =
        Arc::new(responses.into_iter().map(String::from).collect());
    let f: RepairFn = Box::new(move |_prompt| {
        let idx = seen.fetch_add(1, Ordering::SeqCst);
        let responses = responses.clone();
        Box::pin(async move {
            responses
                .get(idx)
                .cloned()
                .ok_or_else(|| "script exhausted".to_string())
        })
    });
    (f, calls)
}

/// The kind of response a chatty model actually produces: prose, a
/// fenced block, loose shapes everywhere.
const MESSY_RESPONSE: &str = r#"Sure! Here's the specification you asked for:

```json
{
  "schema_version": "2",
  "app": {
    "name": "  ClipStash  ",
    "one_liner": "Clipboard history manager",
    "core_loop": "Copy, browse history, paste",
    "citations": ["E-RD-001", "E-RD-001"]
  },
  "screens": [
    "history",
    {"name": "settings", "purpose": "Tune retention", "citations": ["E-RD-002"]}
  ],
  "commands": [
    {"name": "paste_item", "purpose": "Paste an entry", "async": "yes",
     "input": {"request": {"id": "int"}, "todo": "string"}, "output": null,
     "citations": ["E-IS-001"]},
    {"name": "list_items", "purpose": "List entries", "citations": ["E-RD-001"]}
  ],
  "data_model": [
    {"name": "clips", "columns": [
      {"name": "id", "type": "serial"},
      {"name": "content", "type": "text"},
      {"name": "copied_at", "type": "timestamptz"}
    ], "citations": ["E-FL-001"]}
  ],
  "mvp_plan": [
    {"week": 1, "tasks": ["scaffold", "clipboard watcher"]},
    {"week": 2, "tasks": ["history ui"]}
  ],
  "acceptance_tests": [
    {"description": "copying text adds a history entry", "citations": ["E-IS-001"]}
  ],
  "monetization": "none"
}
```

Hope this helps!"#;

fn messy_input() -> BridgeInput {
    let mut input = BridgeInput::new("acme/clipstash", MESSY_RESPONSE);
    input.allowed_evidence_ids = vec![
        "E-RD-001".to_string(),
        "E-RD-002".to_string(),
        "E-IS-001".to_string(),
        "E-FL-001".to_string(),
    ];
    input.evidence_lines = vec![
        "[E-RD-001] (readme) ClipStash: clipboard history for the desktop".to_string(),
        "[E-RD-002] (readme) Settings: retention window is configurable".to_string(),
        "[E-IS-001] (issue) Paste loses rich text formatting".to_string(),
        "[E-FL-001] (file_listing) src/clips.rs, src/watcher.rs".to_string(),
    ];
    input
}

#[tokio::test]
async fn test_messy_response_normalizes_repairs_and_passes() -> anyhow::Result<()> {
    // Two fields come out uncited (the bare-string screen and the
    // string-form core loop); one patch fixes both.
    let (repair, calls) = scripted_repair(vec![
        r#"{"core_loop": ["E-RD-001"], "screens": {"history": ["E-RD-002"]}}"#,
    ]);
    let outcome = run_bridge(messy_input(), &repair).await;

    assert!(outcome.ok, "reason: {:?}", outcome.report.outcome.reason);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.report.outcome.attempts_used, 1);

    let doc = outcome.canonical.expect("canonical document");
    assert_eq!(doc.schema_version, 3);
    assert_eq!(doc.app.name, "ClipStash");
    assert_eq!(doc.app.core_loop.summary, "Copy, browse history, paste");
    assert_eq!(doc.app.citations, vec!["E-RD-001".to_string()]);

    // Screens sorted; the bare-string screen got the default purpose
    // and the patched citation.
    let screen_names: Vec<&str> = doc.screens.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(screen_names, vec!["history", "settings"]);
    assert_eq!(doc.screens[0].purpose, "Primary screen");
    assert_eq!(doc.screens[0].citations, vec!["E-RD-002".to_string()]);

    // Commands sorted; the request wrapper was unwrapped, the todo
    // placeholder dropped, the null output template-filled, the verb
    // template applied to list_items.
    let command_names: Vec<&str> = doc.rust_commands.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(command_names, vec!["list_items", "paste_item"]);
    let paste = &doc.rust_commands[1];
    assert!(paste.is_async);
    assert_eq!(paste.input.keys().collect::<Vec<_>>(), vec!["id"]);
    assert!(paste.output.contains_key("ok"));
    let list = &doc.rust_commands[0];
    assert!(!list.is_async);
    assert!(list.input.contains_key("filter"));
    assert!(list.output.contains_key("total"));

    // Column order preserved, loose SQL-ish types canonicalized.
    let clips = &doc.data_model.tables[0];
    let columns: Vec<(String, String)> = clips
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.column_type.to_string()))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("content".to_string(), "TEXT".to_string()),
            ("copied_at".to_string(), "DATETIME".to_string()),
        ]
    );

    // Milestones flattened and sorted.
    assert_eq!(
        doc.mvp_plan,
        vec![
            "week 1: clipboard watcher".to_string(),
            "week 1: scaffold".to_string(),
            "week 2: history ui".to_string(),
        ]
    );

    // The description alias landed in text.
    assert_eq!(doc.acceptance_tests[0].text, "copying text adds a history entry");

    // The artifact keeps exactly the seven canonical keys.
    let value = serde_json::to_value(&doc)?;
    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "acceptance_tests",
            "app",
            "data_model",
            "mvp_plan",
            "rust_commands",
            "schema_version",
            "screens",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_canonical_output_is_a_fixed_point() -> anyhow::Result<()> {
    let (repair, _) = scripted_repair(vec![
        r#"{"core_loop": ["E-RD-001"], "screens": {"history": ["E-RD-002"]}}"#,
    ]);
    let outcome = run_bridge(messy_input(), &repair).await;
    let doc = outcome.canonical.expect("canonical document");

    // Feeding the artifact back through the bridge changes nothing and
    // needs no repair.
    let (no_repair, calls) = scripted_repair(vec![]);
    let mut second = messy_input();
    second.raw_model_text = serde_json::to_string_pretty(&doc)?;
    let outcome = run_bridge(second, &no_repair).await;

    assert!(outcome.ok);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.report.outcome.attempts_used, 0);
    assert_eq!(outcome.canonical.unwrap(), doc);

    // And the normalize stage recorded zero fixes.
    let normalize_stage = outcome
        .report
        .stages
        .iter()
        .find(|s| s.name == StageName::Normalize)
        .unwrap();
    assert_eq!(normalize_stage.stats.get("fixes"), Some(&json!(0)));
    Ok(())
}

#[tokio::test]
async fn test_out_of_shape_document_fails_terminally() {
    let (repair, calls) = scripted_repair(vec![]);
    let mut input = messy_input();
    input.raw_model_text = r#"{"app": [1, 2], "screens": "none"}"#.to_string();
    let outcome = run_bridge(input, &repair).await;

    assert!(!outcome.ok);
    assert!(outcome.canonical.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let last = outcome.report.last_failed_stage().unwrap();
    assert_eq!(last.name, StageName::WireValidate);
}

#[tokio::test]
async fn test_patch_touching_business_fields_is_rejected_whole() {
    // First patch tries to smuggle in an mvp_plan rewrite next to a
    // perfectly good citation fix; the whole thing must be discarded.
    let (repair, calls) = scripted_repair(vec![
        r#"{"core_loop": ["E-RD-001"], "mvp_plan": ["week 9: rewrite in a weekend"]}"#,
        r#"{"core_loop": ["E-RD-001"], "screens": {"history": ["E-RD-002"]}}"#,
    ]);
    let outcome = run_bridge(messy_input(), &repair).await;

    assert!(outcome.ok);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.report.outcome.attempts_used, 1);

    let doc = outcome.canonical.unwrap();
    // The smuggled plan never landed.
    assert_eq!(doc.mvp_plan.len(), 3);
    assert!(doc.mvp_plan.iter().all(|task| !task.contains("rewrite")));

    // The rejected try is on the record.
    assert!(outcome
        .report
        .stages
        .iter()
        .any(|s| s.name == StageName::Repair && !s.ok));
}

#[tokio::test]
async fn test_report_serializes_with_final_block() -> anyhow::Result<()> {
    let (repair, _) = scripted_repair(vec![]);
    let mut input = messy_input();
    input.raw_model_text = "no json here".to_string();
    let outcome = run_bridge(input, &repair).await;

    let value = serde_json::to_value(&outcome.report)?;
    assert_eq!(value["repo_id"], json!("acme/clipstash"));
    assert_eq!(value["final"]["ok"], json!(false));
    assert_eq!(value["stages"][0]["name"], json!("parse"));
    assert_eq!(value["stages"][0]["error_code"], json!("parse_error"));
    Ok(())
}
