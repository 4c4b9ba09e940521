//! Wire Document types (loose model output)
//!
//! The wire side of the bridge boundary. Every field is optional and
//! the common string-or-object unions are modeled explicitly; scalar
//! leaves stay `serde_json::Value` so the normalizer can apply its
//! coercion rules instead of the deserializer rejecting the document.
//! A document that does not even fit these loose shapes (a number
//! where a collection belongs, an array for `app`) fails wire
//! validation, which is terminal for the bridge attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A collection entry the model emitted either as a bare string or as
/// a structured object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOr<T> {
    Text(String),
    Record(T),
}

/// A boolean the model emitted either as a JSON bool or as a token
/// string ("true", "yes", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseBool {
    Flag(bool),
    Token(String),
}

/// Loose app block; a bare string is treated as the app name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireApp {
    pub name: Option<Value>,
    pub one_liner: Option<Value>,
    pub core_loop: Option<StringOr<WireCoreLoop>>,
    pub citations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireCoreLoop {
    pub summary: Option<Value>,
    pub citations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireScreen {
    pub name: Option<Value>,
    pub purpose: Option<Value>,
    pub primary_actions: Option<Vec<Value>>,
    pub citations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireCommand {
    pub name: Option<Value>,
    pub purpose: Option<Value>,
    #[serde(rename = "async")]
    pub is_async: Option<LooseBool>,
    /// Kept raw: often null, an array, or a `request`-wrapped object.
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub citations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireColumn {
    pub name: Option<Value>,
    #[serde(rename = "type", alias = "column_type")]
    pub column_type: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireTable {
    pub name: Option<Value>,
    pub columns: Option<Vec<StringOr<WireColumn>>>,
    pub citations: Option<Vec<Value>>,
}

/// `data_model` arrives either as `{tables: [...]}` or as the bare
/// table array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireDataModel {
    Block(WireDataModelBlock),
    Tables(Vec<StringOr<WireTable>>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireDataModelBlock {
    pub tables: Option<Vec<StringOr<WireTable>>>,
}

/// An `mvp_plan` milestone object; flattened to `"week <n>: <task>"`
/// strings during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireMilestone {
    pub week: Option<Value>,
    pub tasks: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireAcceptanceTest {
    #[serde(alias = "description")]
    pub text: Option<Value>,
    pub citations: Option<Vec<Value>>,
}

/// The loose document as a whole. No invariants hold here; it exists
/// purely to be normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireDocument {
    pub schema_version: Option<Value>,
    pub app: Option<StringOr<WireApp>>,
    pub screens: Option<Vec<StringOr<WireScreen>>>,
    #[serde(alias = "commands")]
    pub rust_commands: Option<Vec<StringOr<WireCommand>>>,
    pub data_model: Option<WireDataModel>,
    pub mvp_plan: Option<Vec<StringOr<WireMilestone>>>,
    pub acceptance_tests: Option<Vec<StringOr<WireAcceptanceTest>>>,
    /// Unrecognized top-level keys, surfaced as warnings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_a_valid_wire_document() {
        let doc: WireDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.app.is_none());
        assert!(doc.screens.is_none());
        assert!(doc.extra.is_empty());
    }

    #[test]
    fn test_string_or_object_screen_entries() {
        let raw = json!({
            "screens": ["home", {"name": "settings", "purpose": "Tune things"}]
        });
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        let screens = doc.screens.unwrap();
        assert!(matches!(&screens[0], StringOr::Text(s) if s == "home"));
        assert!(matches!(&screens[1], StringOr::Record(_)));
    }

    #[test]
    fn test_app_as_bare_string() {
        let doc: WireDocument = serde_json::from_value(json!({"app": "notes"})).unwrap();
        assert!(matches!(doc.app, Some(StringOr::Text(ref s)) if s == "notes"));
    }

    #[test]
    fn test_commands_alias_and_raw_io() {
        let raw = json!({
            "commands": [{"name": "save", "input": null, "output": {}, "async": "true"}]
        });
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        let commands = doc.rust_commands.unwrap();
        let StringOr::Record(cmd) = &commands[0] else {
            panic!("expected structured command");
        };
        assert_eq!(cmd.input, Some(Value::Null));
        assert!(matches!(cmd.is_async, Some(LooseBool::Token(_))));
    }

    #[test]
    fn test_data_model_as_bare_table_array() {
        let raw = json!({"data_model": [{"name": "items", "columns": []}]});
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        assert!(matches!(doc.data_model, Some(WireDataModel::Tables(_))));

        let raw = json!({"data_model": {"tables": []}});
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        assert!(matches!(doc.data_model, Some(WireDataModel::Block(_))));
    }

    #[test]
    fn test_unknown_top_level_keys_collect_into_extra() {
        let raw = json!({"app": {"name": "x"}, "monetization": "ads"});
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        assert!(doc.extra.contains_key("monetization"));
    }

    #[test]
    fn test_out_of_shape_collection_is_rejected() {
        assert!(serde_json::from_value::<WireDocument>(json!({"screens": 42})).is_err());
        assert!(serde_json::from_value::<WireDocument>(json!({"app": [1, 2]})).is_err());
    }

    #[test]
    fn test_canonical_document_parses_as_wire() {
        // The strict artifact fed back through the loose type must
        // survive untouched, which is what makes normalization
        // idempotent end to end.
        let raw = json!({
            "schema_version": 3,
            "app": {
                "name": "demo",
                "one_liner": "A demo",
                "core_loop": {"summary": "loop", "citations": ["E-RD-001"]},
                "citations": ["E-RD-001"]
            },
            "screens": [{"name": "home", "purpose": "p", "primary_actions": [], "citations": []}],
            "rust_commands": [{
                "name": "get_status", "purpose": "p", "async": true,
                "input": {"payload": "json"}, "output": {"ok": "boolean"},
                "citations": []
            }],
            "data_model": {"tables": [{"name": "items", "columns": [{"name": "id", "type": "INTEGER"}], "citations": []}]},
            "mvp_plan": ["week 1: scaffold"],
            "acceptance_tests": [{"text": "it works", "citations": []}]
        });
        let doc: WireDocument = serde_json::from_value(raw).unwrap();
        assert!(doc.extra.is_empty());
        assert!(doc.schema_version.is_some());
    }
}
