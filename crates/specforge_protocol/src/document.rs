//! Canonical Document types (the strict, persisted artifact)
//!
//! A Canonical Document is the end product of the bridge: a strictly
//! shaped JSON object with exactly the top-level keys
//! `schema_version, app, screens, rust_commands, data_model, mvp_plan,
//! acceptance_tests`. Citations live inline on each record; the gates
//! consume them through the flattened view built by
//! [`collect_citations`].

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Current canonical schema version. Documents at earlier versions are
/// normalized up; the validator rejects anything else.
pub const SCHEMA_VERSION: u32 = 3;

// ============================================================================
// Command I/O field types
// ============================================================================

/// Base type vocabulary for command input/output fields.
/// This is the CANONICAL definition - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BaseType {
    #[default]
    String,
    Boolean,
    Int,
    Float,
    Timestamp,
    Json,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::String => "string",
            BaseType::Boolean => "boolean",
            BaseType::Int => "int",
            BaseType::Float => "float",
            BaseType::Timestamp => "timestamp",
            BaseType::Json => "json",
        }
    }

    /// Map a loose model-emitted token onto the vocabulary, accepting
    /// common synonyms. Returns `None` for anything unrecognized.
    pub fn from_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" | "text" | "utf8" => Some(BaseType::String),
            "boolean" | "bool" => Some(BaseType::Boolean),
            "int" | "integer" | "i32" | "i64" | "u32" | "u64" => Some(BaseType::Int),
            "float" | "double" | "number" | "f32" | "f64" | "real" | "decimal" => {
                Some(BaseType::Float)
            }
            "timestamp" | "datetime" | "date" | "time" => Some(BaseType::Timestamp),
            "json" | "object" | "dict" | "map" | "array" | "list" | "any" => Some(BaseType::Json),
            _ => None,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(BaseType::String),
            "boolean" => Ok(BaseType::Boolean),
            "int" => Ok(BaseType::Int),
            "float" => Ok(BaseType::Float),
            "timestamp" => Ok(BaseType::Timestamp),
            "json" => Ok(BaseType::Json),
            _ => Err(format!(
                "Invalid field type: '{}'. Expected: string, boolean, int, float, timestamp, or json",
                s
            )),
        }
    }
}

/// A command I/O field type: one of the six base types, optionally
/// nullable. Serialized as the bare token with a `?` suffix when
/// optional (`"int"`, `"int?"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldType {
    pub base: BaseType,
    pub optional: bool,
}

impl FieldType {
    pub fn required(base: BaseType) -> Self {
        Self { base, optional: false }
    }

    pub fn nullable(base: BaseType) -> Self {
        Self { base, optional: true }
    }

    /// Parse a loose token (synonyms allowed, `?` suffix honored).
    /// Returns `None` when the base token is unrecognized.
    pub fn from_loose(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let (token, optional) = match trimmed.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        BaseType::from_loose(token).map(|base| Self { base, optional })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "{}?", self.base)
        } else {
            write!(f, "{}", self.base)
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, optional) = match s.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let base = BaseType::from_str(token)?;
        Ok(Self { base, optional })
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FieldType::from_str(&raw).map_err(de::Error::custom)
    }
}

// ============================================================================
// Column types
// ============================================================================

/// Column type vocabulary for data-model tables.
/// This is the CANONICAL definition - use this everywhere.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Real,
    Boolean,
    Blob,
    Json,
    Datetime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Blob => "BLOB",
            ColumnType::Json => "JSON",
            ColumnType::Datetime => "DATETIME",
        }
    }

    /// Canonicalize a loose model-emitted type token. Total: anything
    /// unrecognized (including a trailing `?`) falls back to `TEXT`.
    pub fn from_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "int" | "integer" | "i32" | "i64" | "u32" | "u64" | "bigint" | "smallint"
            | "serial" => ColumnType::Integer,
            "float" | "double" | "real" | "decimal" | "number" | "numeric" | "f32" | "f64" => {
                ColumnType::Real
            }
            "bool" | "boolean" => ColumnType::Boolean,
            "blob" | "binary" | "bytes" | "bytea" => ColumnType::Blob,
            "json" | "jsonb" | "object" | "map" | "dict" | "array" | "list" | "set" | "any"
            | "enum" => ColumnType::Json,
            "datetime" | "timestamp" | "date" | "time" | "timestamptz" => ColumnType::Datetime,
            _ => ColumnType::Text,
        }
    }

    /// Matching command I/O type for a column, used when inferring a
    /// command input from table columns.
    pub fn field_type(&self) -> BaseType {
        match self {
            ColumnType::Text => BaseType::String,
            ColumnType::Integer => BaseType::Int,
            ColumnType::Real => BaseType::Float,
            ColumnType::Boolean => BaseType::Boolean,
            ColumnType::Blob => BaseType::String,
            ColumnType::Json => BaseType::Json,
            ColumnType::Datetime => BaseType::Timestamp,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEXT" => Ok(ColumnType::Text),
            "INTEGER" => Ok(ColumnType::Integer),
            "REAL" => Ok(ColumnType::Real),
            "BOOLEAN" => Ok(ColumnType::Boolean),
            "BLOB" => Ok(ColumnType::Blob),
            "JSON" => Ok(ColumnType::Json),
            "DATETIME" => Ok(ColumnType::Datetime),
            _ => Err(format!(
                "Invalid column type: '{}'. Expected: TEXT, INTEGER, REAL, BOOLEAN, BLOB, JSON, or DATETIME",
                s
            )),
        }
    }
}

// ============================================================================
// Canonical Document
// ============================================================================

/// App identity block. `core_loop` nests here so the document keeps
/// exactly seven top-level keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub one_liner: String,
    pub core_loop: CoreLoop,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// The app's central interaction loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreLoop {
    pub summary: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A user-facing screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub name: String,
    pub purpose: String,
    #[serde(default)]
    pub primary_actions: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A backend command exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RustCommand {
    pub name: String,
    pub purpose: String,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub input: BTreeMap<String, FieldType>,
    pub output: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// The persisted data model: an ordered list of tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// One table in the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// One column within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// One acceptance test, cited like every other record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceTest {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// The strict, persisted specification artifact. On disk this is a
/// JSON object with exactly these seven keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub schema_version: u32,
    pub app: AppInfo,
    pub screens: Vec<Screen>,
    pub rust_commands: Vec<RustCommand>,
    pub data_model: DataModel,
    pub mvp_plan: Vec<String>,
    pub acceptance_tests: Vec<AcceptanceTest>,
}

// ============================================================================
// Citation keys
// ============================================================================

/// Logical key of a citation-bearing field. Rendered as `app`,
/// `core_loop`, `screen:<name>`, `command:<name>`, `table:<name>`, or
/// `acceptance_test:<index>` (index into the sorted test list).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CitationKey {
    App,
    CoreLoop,
    Screen(String),
    Command(String),
    Table(String),
    AcceptanceTest(usize),
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CitationKey::App => write!(f, "app"),
            CitationKey::CoreLoop => write!(f, "core_loop"),
            CitationKey::Screen(name) => write!(f, "screen:{}", name),
            CitationKey::Command(name) => write!(f, "command:{}", name),
            CitationKey::Table(name) => write!(f, "table:{}", name),
            CitationKey::AcceptanceTest(idx) => write!(f, "acceptance_test:{}", idx),
        }
    }
}

impl FromStr for CitationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => return Ok(CitationKey::App),
            "core_loop" => return Ok(CitationKey::CoreLoop),
            _ => {}
        }
        let (prefix, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid citation key: '{}'", s))?;
        match prefix {
            "screen" => Ok(CitationKey::Screen(rest.to_string())),
            "command" => Ok(CitationKey::Command(rest.to_string())),
            "table" => Ok(CitationKey::Table(rest.to_string())),
            "acceptance_test" => rest
                .parse::<usize>()
                .map(CitationKey::AcceptanceTest)
                .map_err(|_| format!("Invalid acceptance test index: '{}'", rest)),
            _ => Err(format!("Invalid citation key: '{}'", s)),
        }
    }
}

/// Flatten a document's inline citations into the per-key view walked
/// by the evidence and quality gates. Every citation-bearing key is
/// present, empty lists included.
pub fn collect_citations(doc: &CanonicalDocument) -> BTreeMap<CitationKey, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(CitationKey::App, doc.app.citations.clone());
    map.insert(CitationKey::CoreLoop, doc.app.core_loop.citations.clone());
    for screen in &doc.screens {
        map.insert(CitationKey::Screen(screen.name.clone()), screen.citations.clone());
    }
    for command in &doc.rust_commands {
        map.insert(CitationKey::Command(command.name.clone()), command.citations.clone());
    }
    for table in &doc.data_model.tables {
        map.insert(CitationKey::Table(table.name.clone()), table.citations.clone());
    }
    for (idx, test) in doc.acceptance_tests.iter().enumerate() {
        map.insert(CitationKey::AcceptanceTest(idx), test.citations.clone());
    }
    map
}

// ============================================================================
// Citations Patch
// ============================================================================

/// A strict partial document carrying only citation corrections. The
/// repair step may emit nothing else; applying a patch can never touch
/// business content. `screens`/`commands`/`tables` key by record name,
/// `acceptance_tests` by index into the sorted test list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_loop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screens: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_tests: Option<BTreeMap<usize, Vec<String>>>,
}

impl CitationsPatch {
    /// True when the patch corrects nothing at all.
    pub fn is_empty(&self) -> bool {
        self.app.is_none()
            && self.core_loop.is_none()
            && self.screens.as_ref().map_or(true, |m| m.is_empty())
            && self.commands.as_ref().map_or(true, |m| m.is_empty())
            && self.tables.as_ref().map_or(true, |m| m.is_empty())
            && self.acceptance_tests.as_ref().map_or(true, |m| m.is_empty())
    }

    /// Every evidence id referenced anywhere in the patch.
    pub fn cited_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        if let Some(list) = &self.app {
            ids.extend(list.iter().map(String::as_str));
        }
        if let Some(list) = &self.core_loop {
            ids.extend(list.iter().map(String::as_str));
        }
        for map in [&self.screens, &self.commands, &self.tables].into_iter().flatten() {
            for list in map.values() {
                ids.extend(list.iter().map(String::as_str));
            }
        }
        if let Some(map) = &self.acceptance_tests {
            for list in map.values() {
                ids.extend(list.iter().map(String::as_str));
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc() -> CanonicalDocument {
        CanonicalDocument {
            schema_version: SCHEMA_VERSION,
            app: AppInfo {
                name: "demo".to_string(),
                one_liner: "A demo app".to_string(),
                core_loop: CoreLoop {
                    summary: "open, edit, save".to_string(),
                    citations: vec!["E-RD-001".to_string()],
                },
                citations: vec!["E-RD-001".to_string()],
            },
            screens: vec![Screen {
                name: "home".to_string(),
                purpose: "Primary screen".to_string(),
                primary_actions: vec!["open".to_string()],
                citations: vec![],
            }],
            rust_commands: vec![RustCommand {
                name: "get_status".to_string(),
                purpose: "Report status".to_string(),
                is_async: true,
                input: BTreeMap::from([(
                    "payload".to_string(),
                    FieldType::required(BaseType::Json),
                )]),
                output: BTreeMap::from([(
                    "ok".to_string(),
                    FieldType::required(BaseType::Boolean),
                )]),
                citations: vec!["E-IS-001".to_string()],
            }],
            data_model: DataModel {
                tables: vec![Table {
                    name: "items".to_string(),
                    columns: vec![
                        Column {
                            name: "id".to_string(),
                            column_type: ColumnType::Integer,
                        },
                        Column {
                            name: "name".to_string(),
                            column_type: ColumnType::Text,
                        },
                    ],
                    citations: vec![],
                }],
            },
            mvp_plan: vec!["week 1: scaffold".to_string()],
            acceptance_tests: vec![AcceptanceTest {
                text: "saving an item persists it".to_string(),
                citations: vec!["E-RD-001".to_string()],
            }],
        }
    }

    #[test]
    fn test_field_type_roundtrip() {
        for raw in ["string", "boolean?", "int", "float?", "timestamp", "json?"] {
            let parsed: FieldType = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        assert!("varchar".parse::<FieldType>().is_err());
        assert!("int??".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_type_serde_as_token() {
        let ft = FieldType::nullable(BaseType::Int);
        assert_eq!(serde_json::to_string(&ft).unwrap(), "\"int?\"");
        let back: FieldType = serde_json::from_str("\"int?\"").unwrap();
        assert_eq!(back, ft);
    }

    #[test]
    fn test_base_type_from_loose() {
        assert_eq!(BaseType::from_loose("Integer"), Some(BaseType::Int));
        assert_eq!(BaseType::from_loose("number"), Some(BaseType::Float));
        assert_eq!(BaseType::from_loose("datetime"), Some(BaseType::Timestamp));
        assert_eq!(BaseType::from_loose("dict"), Some(BaseType::Json));
        assert_eq!(BaseType::from_loose("widget"), None);
    }

    #[test]
    fn test_field_type_from_loose() {
        assert_eq!(
            FieldType::from_loose("Integer?"),
            Some(FieldType::nullable(BaseType::Int))
        );
        assert_eq!(
            FieldType::from_loose("str"),
            Some(FieldType::required(BaseType::String))
        );
        assert_eq!(FieldType::from_loose("widget"), None);
    }

    #[test]
    fn test_column_type_from_loose() {
        assert_eq!(ColumnType::from_loose("i64"), ColumnType::Integer);
        assert_eq!(ColumnType::from_loose("double"), ColumnType::Real);
        assert_eq!(ColumnType::from_loose("jsonb"), ColumnType::Json);
        assert_eq!(ColumnType::from_loose("timestamp"), ColumnType::Datetime);
        assert_eq!(ColumnType::from_loose("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_loose("int?"), ColumnType::Text);
    }

    #[test]
    fn test_column_type_serde() {
        assert_eq!(
            serde_json::to_string(&ColumnType::Datetime).unwrap(),
            "\"DATETIME\""
        );
        assert_eq!(
            serde_json::from_str::<ColumnType>("\"INTEGER\"").unwrap(),
            ColumnType::Integer
        );
        assert!(serde_json::from_str::<ColumnType>("\"VARCHAR\"").is_err());
    }

    #[test]
    fn test_citation_key_display_parse() {
        let keys = [
            CitationKey::App,
            CitationKey::CoreLoop,
            CitationKey::Screen("home".to_string()),
            CitationKey::Command("save".to_string()),
            CitationKey::Table("items".to_string()),
            CitationKey::AcceptanceTest(3),
        ];
        for key in keys {
            let rendered = key.to_string();
            let parsed: CitationKey = rendered.parse().unwrap();
            assert_eq!(parsed, key);
        }
        assert!("widget:home".parse::<CitationKey>().is_err());
        assert!("acceptance_test:x".parse::<CitationKey>().is_err());
    }

    #[test]
    fn test_collect_citations_covers_every_key() {
        let doc = minimal_doc();
        let map = collect_citations(&doc);
        assert_eq!(map.len(), 6);
        assert_eq!(
            map.get(&CitationKey::App).unwrap(),
            &vec!["E-RD-001".to_string()]
        );
        // Uncited keys are present with empty lists.
        assert!(map
            .get(&CitationKey::Screen("home".to_string()))
            .unwrap()
            .is_empty());
        assert!(map.contains_key(&CitationKey::AcceptanceTest(0)));
    }

    #[test]
    fn test_canonical_document_top_level_keys() {
        let doc = minimal_doc();
        let value = serde_json::to_value(&doc).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
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
    }

    #[test]
    fn test_canonical_document_roundtrip() {
        let doc = minimal_doc();
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: CanonicalDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn test_command_async_serialized_as_keyword() {
        let doc = minimal_doc();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["rust_commands"][0]["async"], serde_json::json!(true));
    }

    #[test]
    fn test_patch_is_empty_and_cited_ids() {
        let mut patch = CitationsPatch::default();
        assert!(patch.is_empty());

        patch.screens = Some(BTreeMap::from([(
            "home".to_string(),
            vec!["E-RD-001".to_string(), "E-IS-002".to_string()],
        )]));
        patch.app = Some(vec!["E-RD-001".to_string()]);
        assert!(!patch.is_empty());

        let mut ids = patch.cited_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec!["E-IS-002", "E-RD-001", "E-RD-001"]);
    }
}
