//! Owner model declarations for embedded fragment collections.
//!
//! # Responsibility
//! - Declare, per owner model, which payload keys hold embedded collections.
//! - Load declarations from JSON and validate them before use.
//!
//! # Invariants
//! - Names that flow into fragment ids never contain the id separator.
//! - Collection keys are unique per owner model.

use crate::model::fragment_id::ID_SEPARATOR;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const DEFAULT_ID_KEY: &str = "id";

/// Schema declaration and lookup errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must not be blank")]
    EmptyName { field: &'static str },
    #[error("{field} `{value}` must not contain `:`")]
    SeparatorInName { field: &'static str, value: String },
    #[error("model `{model}` declares collection `{key}` more than once")]
    DuplicateCollection { model: String, key: String },
    #[error("model `{0}` is not declared")]
    UnknownModel(String),
}

/// Full set of owner model declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    models: BTreeMap<String, ModelSchema>,
}

/// Declaration for one owner model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelSchema {
    /// Payload key that holds the owner id.
    #[serde(default = "default_id_key")]
    pub id_key: String,
    /// Embedded collections in declaration order.
    #[serde(default)]
    pub embedded: Vec<EmbeddedCollection>,
}

/// One embedded collection on an owner model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbeddedCollection {
    /// Payload key holding the plain array, e.g. `addresses`.
    pub key: String,
    /// Model name assigned to synthesized fragments, e.g. `address`.
    pub fragment_type: String,
    /// Attribute allow-list. `None` copies every element attribute.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    /// Element key whose string value becomes the variant type.
    #[serde(default)]
    pub variant_key: Option<String>,
}

impl Default for ModelSchema {
    fn default() -> Self {
        Self {
            id_key: default_id_key(),
            embedded: Vec::new(),
        }
    }
}

impl ModelSchema {
    /// Adds one collection that copies every element attribute.
    pub fn with_collection(
        mut self,
        key: impl Into<String>,
        fragment_type: impl Into<String>,
    ) -> Self {
        self.embedded.push(EmbeddedCollection {
            key: key.into(),
            fragment_type: fragment_type.into(),
            attributes: None,
            variant_key: None,
        });
        self
    }

    pub fn with_embedded(mut self, collection: EmbeddedCollection) -> Self {
        self.embedded.push(collection);
        self
    }

    pub fn collection(&self, key: &str) -> Option<&EmbeddedCollection> {
        self.embedded.iter().find(|collection| collection.key == key)
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON schema document.
    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(raw)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Registers one owner model, replacing an earlier declaration.
    pub fn with_model(mut self, model_type: impl Into<String>, model: ModelSchema) -> Self {
        self.models.insert(model_type.into(), model);
        self
    }

    pub fn model(&self, model_type: &str) -> Result<&ModelSchema, SchemaError> {
        self.models
            .get(model_type)
            .ok_or_else(|| SchemaError::UnknownModel(model_type.to_string()))
    }

    /// Declared owner model names, sorted.
    pub fn model_types(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (model_type, model) in &self.models {
            require_id_segment(model_type, "model type")?;
            if model.id_key.trim().is_empty() {
                return Err(SchemaError::EmptyName { field: "id_key" });
            }

            let mut keys = BTreeSet::new();
            for collection in &model.embedded {
                require_id_segment(&collection.key, "collection key")?;
                if collection.fragment_type.trim().is_empty() {
                    return Err(SchemaError::EmptyName {
                        field: "fragment_type",
                    });
                }
                if !keys.insert(collection.key.as_str()) {
                    return Err(SchemaError::DuplicateCollection {
                        model: model_type.clone(),
                        key: collection.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn default_id_key() -> String {
    DEFAULT_ID_KEY.to_string()
}

fn require_id_segment(value: &str, field: &'static str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        return Err(SchemaError::EmptyName { field });
    }
    if value.contains(ID_SEPARATOR) {
        return Err(SchemaError::SeparatorInName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
