//! Canonical Document validator
//!
//! Structural checks only: shape, non-emptiness, ordering, uniqueness.
//! Whether citations point at real evidence is the evidence gate's
//! business, not this module's. The normalizer is written so its
//! output always passes here; a violation after normalization is a
//! bug, a violation after patch application is a terminal bridge
//! failure.

use crate::normalize::PLACEHOLDER_KEYS;
use specforge_protocol::document::{CanonicalDocument, FieldType, SCHEMA_VERSION};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;

/// One structural violation, located by a JSON-ish path.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Render a violation list as a single diagnostic line.
pub fn violations_summary(violations: &[SchemaViolation]) -> String {
    violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ")
}

/// Validate a canonical document. Returns every violation found, not
/// just the first.
pub fn validate_canonical(doc: &CanonicalDocument) -> Result<(), Vec<SchemaViolation>> {
    let mut violations: Vec<SchemaViolation> = Vec::new();

    if doc.schema_version != SCHEMA_VERSION {
        violations.push(SchemaViolation::new(
            "schema_version",
            format!("expected {}, found {}", SCHEMA_VERSION, doc.schema_version),
        ));
    }

    // ---- app ----
    check_non_empty(&mut violations, "app.name", &doc.app.name);
    check_non_empty(&mut violations, "app.one_liner", &doc.app.one_liner);
    check_non_empty(&mut violations, "app.core_loop.summary", &doc.app.core_loop.summary);
    check_citations(&mut violations, "app.citations", &doc.app.citations);
    check_citations(&mut violations, "app.core_loop.citations", &doc.app.core_loop.citations);

    // ---- screens ----
    if doc.screens.is_empty() {
        violations.push(SchemaViolation::new("screens", "must not be empty"));
    }
    check_sorted_unique_names(
        &mut violations,
        "screens",
        doc.screens.iter().map(|s| s.name.as_str()),
    );
    for (idx, screen) in doc.screens.iter().enumerate() {
        let path = format!("screens[{}]", idx);
        check_non_empty(&mut violations, &format!("{}.name", path), &screen.name);
        check_non_empty(&mut violations, &format!("{}.purpose", path), &screen.purpose);
        check_citations(&mut violations, &format!("{}.citations", path), &screen.citations);
    }

    // ---- rust_commands ----
    if doc.rust_commands.is_empty() {
        violations.push(SchemaViolation::new("rust_commands", "must not be empty"));
    }
    check_sorted_unique_names(
        &mut violations,
        "rust_commands",
        doc.rust_commands.iter().map(|c| c.name.as_str()),
    );
    for (idx, command) in doc.rust_commands.iter().enumerate() {
        let path = format!("rust_commands[{}]", idx);
        check_non_empty(&mut violations, &format!("{}.name", path), &command.name);
        check_non_empty(&mut violations, &format!("{}.purpose", path), &command.purpose);
        check_io(&mut violations, &format!("{}.input", path), &command.input);
        check_io(&mut violations, &format!("{}.output", path), &command.output);
        check_citations(&mut violations, &format!("{}.citations", path), &command.citations);
    }

    // ---- data_model ----
    if doc.data_model.tables.is_empty() {
        violations.push(SchemaViolation::new("data_model.tables", "must not be empty"));
    }
    check_sorted_unique_names(
        &mut violations,
        "data_model.tables",
        doc.data_model.tables.iter().map(|t| t.name.as_str()),
    );
    for (idx, table) in doc.data_model.tables.iter().enumerate() {
        let path = format!("data_model.tables[{}]", idx);
        check_non_empty(&mut violations, &format!("{}.name", path), &table.name);
        if table.columns.is_empty() {
            violations.push(SchemaViolation::new(
                format!("{}.columns", path),
                "must have at least one column",
            ));
        }
        // Column order is free; names still have to be unique.
        let mut seen: HashSet<&str> = HashSet::new();
        for (col_idx, column) in table.columns.iter().enumerate() {
            let col_path = format!("{}.columns[{}]", path, col_idx);
            check_non_empty(&mut violations, &format!("{}.name", col_path), &column.name);
            if !seen.insert(column.name.as_str()) {
                violations.push(SchemaViolation::new(
                    col_path,
                    format!("duplicate column name '{}'", column.name),
                ));
            }
        }
        check_citations(&mut violations, &format!("{}.citations", path), &table.citations);
    }

    // ---- mvp_plan ----
    if doc.mvp_plan.is_empty() {
        violations.push(SchemaViolation::new("mvp_plan", "must not be empty"));
    }
    for (idx, task) in doc.mvp_plan.iter().enumerate() {
        check_non_empty(&mut violations, &format!("mvp_plan[{}]", idx), task);
    }
    if !is_sorted(doc.mvp_plan.iter().map(String::as_str)) {
        violations.push(SchemaViolation::new("mvp_plan", "entries must be sorted"));
    }

    // ---- acceptance_tests ----
    if doc.acceptance_tests.is_empty() {
        violations.push(SchemaViolation::new("acceptance_tests", "must not be empty"));
    }
    for (idx, test) in doc.acceptance_tests.iter().enumerate() {
        let path = format!("acceptance_tests[{}]", idx);
        check_non_empty(&mut violations, &format!("{}.text", path), &test.text);
        check_citations(&mut violations, &format!("{}.citations", path), &test.citations);
    }
    if !is_sorted(doc.acceptance_tests.iter().map(|t| t.text.as_str())) {
        violations.push(SchemaViolation::new(
            "acceptance_tests",
            "entries must be sorted by text",
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_non_empty(violations: &mut Vec<SchemaViolation>, path: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(SchemaViolation::new(path, "must not be empty"));
    }
}

fn check_citations(violations: &mut Vec<SchemaViolation>, path: &str, citations: &[String]) {
    for (idx, citation) in citations.iter().enumerate() {
        if citation.trim().is_empty() {
            violations.push(SchemaViolation::new(
                format!("{}[{}]", path, idx),
                "citation must not be an empty string",
            ));
        }
    }
    if !is_sorted(citations.iter().map(String::as_str)) {
        violations.push(SchemaViolation::new(path, "citations must be sorted"));
    }
    let unique: HashSet<&str> = citations.iter().map(String::as_str).collect();
    if unique.len() != citations.len() {
        violations.push(SchemaViolation::new(path, "citations must not repeat"));
    }
}

fn check_io(
    violations: &mut Vec<SchemaViolation>,
    path: &str,
    io: &BTreeMap<String, FieldType>,
) {
    if io.is_empty() {
        violations.push(SchemaViolation::new(path, "must not be empty"));
    }
    for key in io.keys() {
        if key.trim().is_empty() {
            violations.push(SchemaViolation::new(path, "field name must not be empty"));
        }
        if PLACEHOLDER_KEYS.contains(&key.trim().to_lowercase().as_str()) {
            violations.push(SchemaViolation::new(
                format!("{}.{}", path, key),
                "placeholder field names are not allowed",
            ));
        }
    }
}

fn check_sorted_unique_names<'a>(
    violations: &mut Vec<SchemaViolation>,
    path: &str,
    names: impl Iterator<Item = &'a str>,
) {
    let collected: Vec<&str> = names.collect();
    if !is_sorted(collected.iter().copied()) {
        violations.push(SchemaViolation::new(path, "entries must be sorted by name"));
    }
    let unique: HashSet<&str> = collected.iter().copied().collect();
    if unique.len() != collected.len() {
        violations.push(SchemaViolation::new(path, "entry names must be unique"));
    }
}

fn is_sorted<'a>(mut items: impl Iterator<Item = &'a str>) -> bool {
    let mut previous = match items.next() {
        Some(first) => first,
        None => return true,
    };
    for item in items {
        if item < previous {
            return false;
        }
        previous = item;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use specforge_protocol::document::{BaseType, Screen};
    use specforge_protocol::WireDocument;

    fn valid_doc() -> CanonicalDocument {
        // The normalizer's contract is that its output validates.
        normalize(WireDocument::default()).doc
    }

    #[test]
    fn test_normalized_default_document_validates() {
        assert!(validate_canonical(&valid_doc()).is_ok());
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let mut doc = valid_doc();
        doc.schema_version = 2;
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.path == "schema_version"));
    }

    #[test]
    fn test_empty_scalars_rejected() {
        let mut doc = valid_doc();
        doc.app.name = "   ".to_string();
        doc.screens[0].purpose = String::new();
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.path == "app.name"));
        assert!(violations.iter().any(|v| v.path == "screens[0].purpose"));
    }

    #[test]
    fn test_unsorted_and_duplicate_names_rejected() {
        let mut doc = valid_doc();
        doc.screens = vec![
            Screen {
                name: "zeta".to_string(),
                purpose: "p".to_string(),
                primary_actions: vec![],
                citations: vec![],
            },
            Screen {
                name: "alpha".to_string(),
                purpose: "p".to_string(),
                primary_actions: vec![],
                citations: vec![],
            },
            Screen {
                name: "alpha".to_string(),
                purpose: "p".to_string(),
                primary_actions: vec![],
                citations: vec![],
            },
        ];
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations
            .iter()
            .any(|v| v.path == "screens" && v.message.contains("sorted")));
        assert!(violations
            .iter()
            .any(|v| v.path == "screens" && v.message.contains("unique")));
    }

    #[test]
    fn test_empty_io_and_placeholder_keys_rejected() {
        let mut doc = valid_doc();
        doc.rust_commands[0].input.clear();
        doc.rust_commands[0]
            .output
            .insert("TODO".to_string(), FieldType::required(BaseType::String));
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.path == "rust_commands[0].input"));
        assert!(violations
            .iter()
            .any(|v| v.path.contains("output.TODO") && v.message.contains("placeholder")));
    }

    #[test]
    fn test_table_without_columns_rejected() {
        let mut doc = valid_doc();
        doc.data_model.tables[0].columns.clear();
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.path.ends_with(".columns")));
    }

    #[test]
    fn test_duplicate_columns_rejected_but_order_is_free() {
        let mut doc = valid_doc();
        // Reverse-ordered column names are fine.
        doc.data_model.tables[0].columns.reverse();
        assert!(validate_canonical(&doc).is_ok());

        let first = doc.data_model.tables[0].columns[0].clone();
        doc.data_model.tables[0].columns.push(first);
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.message.contains("duplicate column")));
    }

    #[test]
    fn test_unsorted_plan_and_tests_rejected() {
        let mut doc = valid_doc();
        doc.mvp_plan = vec!["week 2: polish".to_string(), "week 1: scaffold".to_string()];
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations
            .iter()
            .any(|v| v.path == "mvp_plan" && v.message.contains("sorted")));
    }

    #[test]
    fn test_unsorted_citations_rejected() {
        let mut doc = valid_doc();
        doc.app.citations = vec!["E-RD-002".to_string(), "E-RD-001".to_string()];
        let violations = validate_canonical(&doc).unwrap_err();
        assert!(violations.iter().any(|v| v.path == "app.citations"));
    }

    #[test]
    fn test_violations_summary_joins_paths() {
        let mut doc = valid_doc();
        doc.schema_version = 1;
        doc.app.name = String::new();
        let violations = validate_canonical(&doc).unwrap_err();
        let summary = violations_summary(&violations);
        assert!(summary.contains("schema_version"));
        assert!(summary.contains("app.name"));
    }
}
