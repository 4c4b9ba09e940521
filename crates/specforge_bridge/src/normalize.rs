//! Normalizer: deterministic Wire Document to Canonical Document
//!
//! A total function: whatever loose shape survived wire validation
//! comes out as a strict canonical document, with defaults substituted
//! for everything missing or malformed. Every correction lands in the
//! `fixes` log and every ignored oddity in `warnings`; neither drives
//! control flow.
//!
//! Rule summary:
//! - scalars: accept a non-empty string, otherwise a documented default
//! - collection entries: bare string or structured object; an empty
//!   collection gets exactly one default entry
//! - sibling names are uniqued in input order (`_2`, `_3`, ...)
//! - screens/commands/tables sort by name, `mvp_plan` and
//!   `acceptance_tests` lexicographically; columns keep input order
//! - column types canonicalize through a synonym map, unknown -> TEXT
//! - command I/O: unwrap `request` wrappers, drop placeholder keys,
//!   coerce values by JSON type, then fall back to verb templates and
//!   the first table's columns so the result is never empty

use serde_json::Value;
use specforge_protocol::document::{
    AcceptanceTest, AppInfo, BaseType, CanonicalDocument, Column, ColumnType, CoreLoop, DataModel,
    FieldType, RustCommand, Screen, Table, SCHEMA_VERSION,
};
use specforge_protocol::wire::{
    LooseBool, StringOr, WireAcceptanceTest, WireApp, WireColumn, WireCommand, WireCoreLoop,
    WireDataModel, WireDocument, WireMilestone, WireScreen, WireTable,
};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_APP_NAME: &str = "untitled_app";
pub const DEFAULT_ONE_LINER: &str = "A small desktop application";
pub const DEFAULT_CORE_LOOP: &str = "Open the app, work with items, save changes";
pub const DEFAULT_SCREEN_NAME: &str = "home";
pub const DEFAULT_SCREEN_PURPOSE: &str = "Primary screen";
pub const DEFAULT_COMMAND_NAME: &str = "get_status";
pub const DEFAULT_COMMAND_PURPOSE: &str = "Report application status";
pub const DEFAULT_TABLE_NAME: &str = "items";
pub const DEFAULT_COLUMN_NAME: &str = "column";
pub const DEFAULT_MVP_TASK: &str = "week 1: project scaffold and data model";
pub const DEFAULT_ACCEPTANCE_TEST: &str = "App launches and the primary screen renders";

/// Keys the model pads I/O dictionaries with instead of real fields.
/// The canonical validator rejects them too, so the normalizer must
/// leave none behind.
pub(crate) const PLACEHOLDER_KEYS: [&str; 6] =
    ["placeholder", "todo", "tbd", "example", "dummy", "mock"];

/// Output of normalization: the strict document plus the correction
/// log.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub doc: CanonicalDocument,
    pub fixes: Vec<String>,
    pub warnings: Vec<String>,
}

/// Normalize a wire document. Total: never fails, never panics.
pub fn normalize(wire: WireDocument) -> Normalized {
    Normalizer::default().run(wire)
}

#[derive(Default)]
struct Normalizer {
    fixes: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum IoDirection {
    Input,
    Output,
}

impl IoDirection {
    fn as_str(self) -> &'static str {
        match self {
            IoDirection::Input => "input",
            IoDirection::Output => "output",
        }
    }
}

impl Normalizer {
    fn run(mut self, wire: WireDocument) -> Normalized {
        for key in wire.extra.keys() {
            self.warnings.push(format!("ignored unknown top-level key '{}'", key));
        }

        let schema_version = self.schema_version(wire.schema_version);
        let app = self.app(wire.app);
        let screens = self.screens(wire.screens);
        let tables = self.tables(wire.data_model);
        let rust_commands = self.commands(wire.rust_commands, tables.first());
        let mvp_plan = self.mvp_plan(wire.mvp_plan);
        let acceptance_tests = self.acceptance_tests(wire.acceptance_tests);

        Normalized {
            doc: CanonicalDocument {
                schema_version,
                app,
                screens,
                rust_commands,
                data_model: DataModel { tables },
                mvp_plan,
                acceptance_tests,
            },
            fixes: self.fixes,
            warnings: self.warnings,
        }
    }

    fn fix(&mut self, message: String) {
        self.fixes.push(message);
    }

    // ------------------------------------------------------------------
    // Scalars
    // ------------------------------------------------------------------

    fn scalar(&mut self, value: Option<Value>, field: &str, default: &str) -> String {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => {
                self.fix(format!("{} was {}; defaulted to '{}'", field, json_kind(&other), default));
                default.to_string()
            }
            None => {
                self.fix(format!("{} missing; defaulted to '{}'", field, default));
                default.to_string()
            }
        }
    }

    fn schema_version(&mut self, value: Option<Value>) -> u32 {
        let parsed = match &value {
            Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v == SCHEMA_VERSION => SCHEMA_VERSION,
            Some(v) => {
                self.fix(format!("schema_version {} normalized to {}", v, SCHEMA_VERSION));
                SCHEMA_VERSION
            }
            None => {
                if value.is_some() {
                    self.fix(format!("schema_version unreadable; set to {}", SCHEMA_VERSION));
                } else {
                    self.fix(format!("schema_version missing; set to {}", SCHEMA_VERSION));
                }
                SCHEMA_VERSION
            }
        }
    }

    fn citations(&mut self, raw: Option<Vec<Value>>, owner: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut dropped = 0usize;
        for value in raw.unwrap_or_default() {
            match value {
                Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            self.fix(format!("dropped {} non-string citation(s) on {}", dropped, owner));
        }
        let before = out.len();
        out.sort_unstable();
        out.dedup();
        if out.len() < before {
            self.fix(format!("deduplicated citations on {}", owner));
        }
        out
    }

    fn string_list(&mut self, raw: Option<Vec<Value>>, field: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut dropped = 0usize;
        for value in raw.unwrap_or_default() {
            match value {
                Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            self.fix(format!("dropped {} non-string entries in {}", dropped, field));
        }
        out
    }

    // ------------------------------------------------------------------
    // App
    // ------------------------------------------------------------------

    fn app(&mut self, raw: Option<StringOr<WireApp>>) -> AppInfo {
        let wire = match raw {
            Some(StringOr::Record(app)) => app,
            Some(StringOr::Text(name)) => {
                self.fix("app given as bare string; filled defaults".to_string());
                WireApp {
                    name: Some(Value::String(name)),
                    ..Default::default()
                }
            }
            None => {
                self.fix("app missing; synthesized defaults".to_string());
                WireApp::default()
            }
        };
        let name = self.scalar(wire.name, "app.name", DEFAULT_APP_NAME);
        let one_liner = self.scalar(wire.one_liner, "app.one_liner", DEFAULT_ONE_LINER);
        let core_loop = self.core_loop(wire.core_loop);
        let citations = self.citations(wire.citations, "app");
        AppInfo { name, one_liner, core_loop, citations }
    }

    fn core_loop(&mut self, raw: Option<StringOr<WireCoreLoop>>) -> CoreLoop {
        let wire = match raw {
            Some(StringOr::Record(core)) => core,
            Some(StringOr::Text(summary)) => WireCoreLoop {
                summary: Some(Value::String(summary)),
                ..Default::default()
            },
            None => {
                self.fix("app.core_loop missing; synthesized default".to_string());
                WireCoreLoop::default()
            }
        };
        let summary = self.scalar(wire.summary, "app.core_loop.summary", DEFAULT_CORE_LOOP);
        let citations = self.citations(wire.citations, "core_loop");
        CoreLoop { summary, citations }
    }

    // ------------------------------------------------------------------
    // Screens
    // ------------------------------------------------------------------

    fn screens(&mut self, raw: Option<Vec<StringOr<WireScreen>>>) -> Vec<Screen> {
        let entries = raw.unwrap_or_default();
        let mut screens: Vec<Screen> = Vec::new();
        for entry in entries {
            let wire = match entry {
                StringOr::Record(screen) => screen,
                StringOr::Text(name) => {
                    self.fix(format!("screen '{}' given as bare string; filled defaults", name));
                    WireScreen {
                        name: Some(Value::String(name)),
                        purpose: Some(Value::String(DEFAULT_SCREEN_PURPOSE.to_string())),
                        ..Default::default()
                    }
                }
            };
            let name = self.scalar(wire.name, "screen.name", DEFAULT_SCREEN_NAME);
            let purpose =
                self.scalar(wire.purpose, &format!("screen '{}'.purpose", name), DEFAULT_SCREEN_PURPOSE);
            let primary_actions =
                self.string_list(wire.primary_actions, &format!("screen '{}'.primary_actions", name));
            let citations = self.citations(wire.citations, &format!("screen:{}", name));
            screens.push(Screen { name, purpose, primary_actions, citations });
        }
        if screens.is_empty() {
            self.fix(format!("screens empty; synthesized default screen '{}'", DEFAULT_SCREEN_NAME));
            screens.push(Screen {
                name: DEFAULT_SCREEN_NAME.to_string(),
                purpose: DEFAULT_SCREEN_PURPOSE.to_string(),
                primary_actions: Vec::new(),
                citations: Vec::new(),
            });
        }
        self.unique_names(&mut screens, "screen", |s| &mut s.name);
        screens.sort_by(|a, b| a.name.cmp(&b.name));
        screens
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    fn tables(&mut self, raw: Option<WireDataModel>) -> Vec<Table> {
        let entries = match raw {
            Some(WireDataModel::Block(block)) => block.tables.unwrap_or_default(),
            Some(WireDataModel::Tables(tables)) => tables,
            None => Vec::new(),
        };
        let mut tables: Vec<Table> = Vec::new();
        for entry in entries {
            let wire = match entry {
                StringOr::Record(table) => table,
                StringOr::Text(name) => {
                    self.fix(format!("table '{}' given as bare string; filled default columns", name));
                    WireTable {
                        name: Some(Value::String(name)),
                        ..Default::default()
                    }
                }
            };
            let name = self.scalar(wire.name, "table.name", DEFAULT_TABLE_NAME);
            let columns = self.columns(wire.columns, &name);
            let citations = self.citations(wire.citations, &format!("table:{}", name));
            tables.push(Table { name, columns, citations });
        }
        if tables.is_empty() {
            self.fix(format!("data_model empty; synthesized default table '{}'", DEFAULT_TABLE_NAME));
            tables.push(Table {
                name: DEFAULT_TABLE_NAME.to_string(),
                columns: default_columns(),
                citations: Vec::new(),
            });
        }
        self.unique_names(&mut tables, "table", |t| &mut t.name);
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    fn columns(&mut self, raw: Option<Vec<StringOr<WireColumn>>>, table: &str) -> Vec<Column> {
        let mut columns: Vec<Column> = Vec::new();
        for entry in raw.unwrap_or_default() {
            let (name_value, type_value) = match entry {
                StringOr::Record(column) => (column.name, column.column_type),
                StringOr::Text(name) => (Some(Value::String(name)), None),
            };
            let name = self.scalar(name_value, &format!("column in table '{}'", table), DEFAULT_COLUMN_NAME);
            let column_type = match type_value {
                Some(Value::String(raw_type)) => {
                    let mapped = ColumnType::from_loose(&raw_type);
                    if !raw_type.trim().eq_ignore_ascii_case(mapped.as_str()) {
                        self.fix(format!(
                            "canonicalized column type '{}' to {} for '{}.{}'",
                            raw_type.trim(),
                            mapped,
                            table,
                            name
                        ));
                    }
                    mapped
                }
                Some(other) => {
                    self.fix(format!(
                        "column type for '{}.{}' was {}; defaulted to TEXT",
                        table,
                        name,
                        json_kind(&other)
                    ));
                    ColumnType::Text
                }
                None => {
                    self.fix(format!("column type missing for '{}.{}'; defaulted to TEXT", table, name));
                    ColumnType::Text
                }
            };
            columns.push(Column { name, column_type });
        }
        if columns.is_empty() {
            self.fix(format!("table '{}' has no columns; synthesized id/name", table));
            columns = default_columns();
        }
        self.unique_names(&mut columns, &format!("column in '{}'", table), |c| &mut c.name);
        // Column order is meaningful; no sorting here.
        columns
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn commands(
        &mut self,
        raw: Option<Vec<StringOr<WireCommand>>>,
        first_table: Option<&Table>,
    ) -> Vec<RustCommand> {
        let entries = raw.unwrap_or_default();
        let mut commands: Vec<RustCommand> = Vec::new();
        for entry in entries {
            let wire = match entry {
                StringOr::Record(command) => command,
                StringOr::Text(name) => {
                    self.fix(format!("command '{}' given as bare string; filled defaults", name));
                    WireCommand {
                        name: Some(Value::String(name)),
                        purpose: Some(Value::String(DEFAULT_COMMAND_PURPOSE.to_string())),
                        ..Default::default()
                    }
                }
            };
            let name = self.scalar(wire.name, "command.name", DEFAULT_COMMAND_NAME);
            let purpose = self.scalar(
                wire.purpose,
                &format!("command '{}'.purpose", name),
                DEFAULT_COMMAND_PURPOSE,
            );
            let is_async = self.command_async(wire.is_async, &name);
            let input = self.command_io(wire.input, IoDirection::Input, &name, first_table);
            let output = self.command_io(wire.output, IoDirection::Output, &name, first_table);
            let citations = self.citations(wire.citations, &format!("command:{}", name));
            commands.push(RustCommand { name, purpose, is_async, input, output, citations });
        }
        if commands.is_empty() {
            self.fix(format!(
                "rust_commands empty; synthesized default command '{}'",
                DEFAULT_COMMAND_NAME
            ));
            let input = self.command_io(None, IoDirection::Input, DEFAULT_COMMAND_NAME, first_table);
            let output = self.command_io(None, IoDirection::Output, DEFAULT_COMMAND_NAME, first_table);
            commands.push(RustCommand {
                name: DEFAULT_COMMAND_NAME.to_string(),
                purpose: DEFAULT_COMMAND_PURPOSE.to_string(),
                is_async: false,
                input,
                output,
                citations: Vec::new(),
            });
        }
        self.unique_names(&mut commands, "command", |c| &mut c.name);
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }

    fn command_async(&mut self, raw: Option<LooseBool>, name: &str) -> bool {
        match raw {
            Some(LooseBool::Flag(b)) => b,
            Some(LooseBool::Token(token)) => match token.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                other => {
                    self.fix(format!(
                        "command '{}' async token '{}' unreadable; defaulted to false",
                        name, other
                    ));
                    false
                }
            },
            None => {
                self.fix(format!("command '{}' async missing; defaulted to false", name));
                false
            }
        }
    }

    /// Steps: unwrap `request` wrapper, drop placeholder keys, coerce
    /// values by token then JSON type, template-fill anything left
    /// empty. Post-condition: non-empty and placeholder-free.
    fn command_io(
        &mut self,
        raw: Option<Value>,
        direction: IoDirection,
        name: &str,
        first_table: Option<&Table>,
    ) -> BTreeMap<String, FieldType> {
        let mut source: BTreeMap<String, Value> = BTreeMap::new();
        match raw {
            Some(Value::Object(map)) => {
                source.extend(map);
            }
            Some(Value::Array(items)) => {
                let mut named = 0usize;
                for item in &items {
                    if let Value::String(s) = item {
                        if !s.trim().is_empty() {
                            source.insert(s.trim().to_string(), Value::String("json".to_string()));
                            named += 1;
                        }
                    }
                }
                self.fix(format!(
                    "{} for command '{}' given as array; kept {} named field(s)",
                    direction.as_str(),
                    name,
                    named
                ));
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                self.fix(format!(
                    "{} for command '{}' was {}; discarded",
                    direction.as_str(),
                    name,
                    json_kind(&other)
                ));
            }
        }

        // (a) unwrap a request wrapper, siblings win on conflict
        if let Some(Value::Object(inner)) = source.get("request").cloned() {
            source.remove("request");
            let mut merged: BTreeMap<String, Value> = inner.into_iter().collect();
            merged.extend(std::mem::take(&mut source));
            source = merged;
            self.fix(format!(
                "unwrapped request wrapper in {} of command '{}'",
                direction.as_str(),
                name
            ));
        }

        // (b) drop placeholder keys
        let placeholder: Vec<String> = source
            .keys()
            .filter(|key| PLACEHOLDER_KEYS.contains(&key.trim().to_lowercase().as_str()))
            .cloned()
            .collect();
        for key in placeholder {
            source.remove(&key);
            self.fix(format!(
                "dropped placeholder key '{}' from {} of command '{}'",
                key,
                direction.as_str(),
                name
            ));
        }

        // (c) coerce values: recognized type tokens pass through, the
        // rest map by JSON type
        let mut io: BTreeMap<String, FieldType> = BTreeMap::new();
        for (key, value) in source {
            let field = match &value {
                Value::String(token) => match FieldType::from_loose(token) {
                    Some(field) => {
                        if field.to_string() != token.trim() {
                            self.fix(format!(
                                "canonicalized {} field '{}' of command '{}' from '{}' to {}",
                                direction.as_str(),
                                key,
                                name,
                                token.trim(),
                                field
                            ));
                        }
                        field
                    }
                    None => {
                        self.fix(format!(
                            "typed {} field '{}' of command '{}' as string (token '{}' unrecognized)",
                            direction.as_str(),
                            key,
                            name,
                            token.trim()
                        ));
                        FieldType::required(BaseType::String)
                    }
                },
                Value::Bool(_) => {
                    self.fix(format!(
                        "typed {} field '{}' of command '{}' as boolean from example value",
                        direction.as_str(),
                        key,
                        name
                    ));
                    FieldType::required(BaseType::Boolean)
                }
                Value::Number(n) => {
                    let base = if n.is_i64() || n.is_u64() { BaseType::Int } else { BaseType::Float };
                    self.fix(format!(
                        "typed {} field '{}' of command '{}' as {} from example value",
                        direction.as_str(),
                        key,
                        name,
                        base
                    ));
                    FieldType::required(base)
                }
                Value::Array(_) | Value::Object(_) => {
                    self.fix(format!(
                        "typed {} field '{}' of command '{}' as json from nested value",
                        direction.as_str(),
                        key,
                        name
                    ));
                    FieldType::required(BaseType::Json)
                }
                Value::Null => {
                    self.fix(format!(
                        "dropped null {} field '{}' of command '{}'",
                        direction.as_str(),
                        key,
                        name
                    ));
                    continue;
                }
            };
            io.insert(key, field);
        }

        // (d)/(e) template fill
        if io.is_empty() {
            io = self.template_io(direction, name, first_table);
        }
        io
    }

    fn template_io(
        &mut self,
        direction: IoDirection,
        name: &str,
        first_table: Option<&Table>,
    ) -> BTreeMap<String, FieldType> {
        let lowered = name.to_lowercase();
        let mut io = BTreeMap::new();
        let source: &str;
        if lowered.starts_with("lint_") {
            source = "verb template";
            match direction {
                IoDirection::Input => {
                    io.insert("path".to_string(), FieldType::required(BaseType::String));
                }
                IoDirection::Output => {
                    io.insert("ok".to_string(), FieldType::required(BaseType::Boolean));
                    io.insert("issues".to_string(), FieldType::required(BaseType::Json));
                }
            }
        } else if lowered.starts_with("apply_") || lowered.starts_with("fix_") {
            source = "verb template";
            match direction {
                IoDirection::Input => {
                    io.insert("path".to_string(), FieldType::required(BaseType::String));
                    io.insert("dry_run".to_string(), FieldType::nullable(BaseType::Boolean));
                }
                IoDirection::Output => {
                    io.insert("ok".to_string(), FieldType::required(BaseType::Boolean));
                    io.insert("changed".to_string(), FieldType::required(BaseType::Int));
                }
            }
        } else if lowered.starts_with("connect_") {
            source = "verb template";
            match direction {
                IoDirection::Input => {
                    io.insert("url".to_string(), FieldType::required(BaseType::String));
                    io.insert("token".to_string(), FieldType::nullable(BaseType::String));
                }
                IoDirection::Output => {
                    io.insert("ok".to_string(), FieldType::required(BaseType::Boolean));
                    io.insert("session".to_string(), FieldType::required(BaseType::String));
                }
            }
        } else if lowered.starts_with("list_") {
            source = "verb template";
            match direction {
                IoDirection::Input => {
                    io.insert("filter".to_string(), FieldType::nullable(BaseType::String));
                    io.insert("limit".to_string(), FieldType::nullable(BaseType::Int));
                }
                IoDirection::Output => {
                    io.insert("items".to_string(), FieldType::required(BaseType::Json));
                    io.insert("total".to_string(), FieldType::required(BaseType::Int));
                }
            }
        } else {
            match direction {
                IoDirection::Input => {
                    if let Some(table) = first_table {
                        for column in &table.columns {
                            let lowered_col = column.name.to_lowercase();
                            if lowered_col == "id" || lowered_col.ends_with("_id") {
                                continue;
                            }
                            io.insert(
                                column.name.clone(),
                                FieldType::required(column.column_type.field_type()),
                            );
                        }
                    }
                    if io.is_empty() {
                        source = "fallback";
                        io.insert("payload".to_string(), FieldType::required(BaseType::Json));
                    } else {
                        source = "first table's columns";
                    }
                }
                IoDirection::Output => {
                    source = "fallback";
                    io.insert("ok".to_string(), FieldType::required(BaseType::Boolean));
                    io.insert("result".to_string(), FieldType::nullable(BaseType::Json));
                }
            }
            self.fix(format!(
                "synthesized {} for command '{}' from {}",
                direction.as_str(),
                name,
                source
            ));
            return io;
        }
        self.fix(format!(
            "synthesized {} for command '{}' from {}",
            direction.as_str(),
            name,
            source
        ));
        io
    }

    // ------------------------------------------------------------------
    // MVP plan
    // ------------------------------------------------------------------

    fn mvp_plan(&mut self, raw: Option<Vec<StringOr<WireMilestone>>>) -> Vec<String> {
        let mut plan: Vec<String> = Vec::new();
        for (idx, entry) in raw.unwrap_or_default().into_iter().enumerate() {
            match entry {
                StringOr::Text(task) => {
                    if !task.trim().is_empty() {
                        plan.push(task.trim().to_string());
                    }
                }
                StringOr::Record(milestone) => {
                    let week = milestone_week(&milestone, idx);
                    let mut kept = 0usize;
                    for task in milestone.tasks.unwrap_or_default() {
                        if let Value::String(s) = task {
                            if !s.trim().is_empty() {
                                plan.push(format!("week {}: {}", week, s.trim()));
                                kept += 1;
                            }
                        }
                    }
                    self.fix(format!(
                        "flattened mvp_plan milestone (week {}) into {} task string(s)",
                        week, kept
                    ));
                }
            }
        }
        if plan.is_empty() {
            self.fix("mvp_plan empty; synthesized default task".to_string());
            plan.push(DEFAULT_MVP_TASK.to_string());
        }
        plan.sort_unstable();
        let before = plan.len();
        plan.dedup();
        if plan.len() < before {
            self.fix(format!("removed {} duplicate mvp_plan task(s)", before - plan.len()));
        }
        plan
    }

    // ------------------------------------------------------------------
    // Acceptance tests
    // ------------------------------------------------------------------

    fn acceptance_tests(
        &mut self,
        raw: Option<Vec<StringOr<WireAcceptanceTest>>>,
    ) -> Vec<AcceptanceTest> {
        let mut tests: Vec<AcceptanceTest> = Vec::new();
        for entry in raw.unwrap_or_default() {
            match entry {
                StringOr::Text(text) => {
                    if !text.trim().is_empty() {
                        tests.push(AcceptanceTest { text: text.trim().to_string(), citations: Vec::new() });
                    }
                }
                StringOr::Record(test) => match test.text {
                    Some(Value::String(text)) if !text.trim().is_empty() => {
                        let citations = self.citations(test.citations, "acceptance_test");
                        tests.push(AcceptanceTest { text: text.trim().to_string(), citations });
                    }
                    _ => {
                        self.fix("dropped acceptance test without text".to_string());
                    }
                },
            }
        }
        if tests.is_empty() {
            self.fix("acceptance_tests empty; synthesized default test".to_string());
            tests.push(AcceptanceTest {
                text: DEFAULT_ACCEPTANCE_TEST.to_string(),
                citations: Vec::new(),
            });
        }
        tests.sort_by(|a, b| a.text.cmp(&b.text));
        // Merge exact duplicates, unioning their citations.
        let mut merged: Vec<AcceptanceTest> = Vec::new();
        let mut duplicates = 0usize;
        for test in tests {
            match merged.last_mut() {
                Some(last) if last.text == test.text => {
                    last.citations.extend(test.citations);
                    last.citations.sort_unstable();
                    last.citations.dedup();
                    duplicates += 1;
                }
                _ => merged.push(test),
            }
        }
        if duplicates > 0 {
            self.fix(format!("merged {} duplicate acceptance test(s)", duplicates));
        }
        merged
    }

    // ------------------------------------------------------------------
    // Name uniquing
    // ------------------------------------------------------------------

    /// Assign names in input order; on collision append `_2`, `_3`, ...
    /// until unique, recording each rename.
    fn unique_names<T>(&mut self, items: &mut [T], kind: &str, name_of: impl Fn(&mut T) -> &mut String) {
        let mut seen: HashSet<String> = HashSet::new();
        for item in items.iter_mut() {
            let name = name_of(item);
            if seen.insert(name.clone()) {
                continue;
            }
            let base = name.clone();
            let mut suffix = 2usize;
            loop {
                let candidate = format!("{}_{}", base, suffix);
                if seen.insert(candidate.clone()) {
                    self.fix(format!("renamed duplicate {} '{}' to '{}'", kind, base, candidate));
                    *name = candidate;
                    break;
                }
                suffix += 1;
            }
        }
    }
}

fn default_columns() -> Vec<Column> {
    vec![
        Column { name: "id".to_string(), column_type: ColumnType::Integer },
        Column { name: "name".to_string(), column_type: ColumnType::Text },
    ]
}

fn milestone_week(milestone: &WireMilestone, idx: usize) -> String {
    match &milestone.week {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => (idx + 1).to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "an empty string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
