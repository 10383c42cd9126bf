//! Component schemas and the catalog that holds them.
//!
//! The catalog is plain data: category name -> component name -> schema. It is
//! loaded once and only read afterwards; synthesis deep-copies whatever it
//! needs out of it.

use crate::error::SchemaError;
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSchema {
    /// Filled from the catalog key when omitted in the entry itself.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub doc: String,
    /// Whether instances are written as `name "label" { ... }`.
    #[serde(default)]
    pub has_label: bool,
    #[serde(default)]
    pub arguments: Vec<ArgumentSchema>,
    #[serde(default)]
    pub exports: Vec<ExportSchema>,
    #[serde(default)]
    pub blocks: Vec<BlockSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArgumentSchema {
    pub name: String,
    /// Type tag such as `string`, `list(string)` or `string or secret`.
    #[serde(rename = "type")]
    pub arg_type: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub required: bool,
    /// Default as raw configuration text. Catalog numbers and booleans are
    /// stored in their textual form.
    #[serde(default, deserialize_with = "raw_default")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub export_type: String,
    #[serde(default)]
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockSchema {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub required: bool,
    /// Repeatable blocks may occur any number of times under one parent.
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub arguments: Vec<ArgumentSchema>,
    #[serde(default)]
    pub blocks: Vec<BlockSchema>,
}

fn raw_default<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }))
}

impl ComponentSchema {
    pub fn argument(&self, name: &str) -> Option<&ArgumentSchema> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&ExportSchema> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn block(&self, name: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

impl BlockSchema {
    pub fn argument(&self, name: &str) -> Option<&ArgumentSchema> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn block(&self, name: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

/// Read-only lookup of component schemas across all categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    categories: BTreeMap<String, BTreeMap<String, ComponentSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON catalog of the form `{ category: { name: schema } }`.
    ///
    /// # Errors
    /// Returns [`SchemaError::Json`] when the text is not a valid catalog.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let mut registry: SchemaRegistry =
            serde_json::from_str(text).map_err(|e| SchemaError::Json {
                message: e.to_string(),
                line: e.line(),
                column: e.column(),
            })?;
        for components in registry.categories.values_mut() {
            for (key, schema) in components.iter_mut() {
                if schema.name.is_empty() {
                    schema.name = key.clone();
                }
            }
        }
        debug!(
            "loaded {} component schemas in {} categories",
            registry.len(),
            registry.categories.len()
        );
        Ok(registry)
    }

    /// Reads and parses a JSON catalog file.
    ///
    /// # Errors
    /// Returns [`SchemaError::Io`] if the file cannot be read and
    /// [`SchemaError::Json`] if it is not a valid catalog.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!("reading schema catalog {}", path.display());
        Self::from_json(&text)
    }

    pub fn insert(&mut self, category: impl Into<String>, schema: ComponentSchema) {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(schema.name.clone(), schema);
    }

    /// Looks a component up by name in every category.
    pub fn get(&self, name: &str) -> Option<&ComponentSchema> {
        self.categories
            .values()
            .find_map(|components| components.get(name))
    }

    pub fn category_of(&self, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, components)| components.contains_key(name))
            .map(|(category, _)| category.as_str())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentSchema> {
        self.categories.values().flat_map(|c| c.values())
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
