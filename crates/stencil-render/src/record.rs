/*
 * record.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The record store seam.
//!
//! Rendering reads records and their field schemas through [`RecordStore`].
//! The store owns persistence and relationship storage; this crate only needs
//! batch lookup by id and schema metadata.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Storage type of a field, which decides how its value is exposed to templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Char,
    Text,
    Html,
    Selection,
    Integer,
    Float,
    Monetary,
    Boolean,
    Date,
    Datetime,
    Many2one,
    One2many,
    Many2many,
}

impl FieldType {
    /// Whether the field points at records of another model.
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            FieldType::Many2one | FieldType::One2many | FieldType::Many2many
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Char => "char",
            FieldType::Text => "text",
            FieldType::Html => "html",
            FieldType::Selection => "selection",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Monetary => "monetary",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Many2one => "many2one",
            FieldType::One2many => "one2many",
            FieldType::Many2many => "many2many",
        }
    }
}

fn default_public() -> bool {
    true
}

/// Schema entry for one field of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Target model of a relational field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Whether templates may read the field.
    #[serde(default = "default_public")]
    pub public: bool,
    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            relation: None,
            public: true,
            label: None,
        }
    }

    /// A relational field targeting `model`.
    pub fn relation(
        name: impl Into<String>,
        field_type: FieldType,
        model: impl Into<String>,
    ) -> Self {
        Self {
            relation: Some(model.into()),
            ..Self::new(name, field_type)
        }
    }

    /// Mark the field as hidden from templates.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Raw stored values of one record, keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    pub id: i64,
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl RecordData {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            values: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }
}

/// Record lookup and schema metadata.
///
/// Implementations must be reentrant: batches may be evaluated on a thread
/// pool, and related records are fetched lazily while templates run.
pub trait RecordStore: Send + Sync {
    fn has_model(&self, model: &str) -> bool;

    /// Every field of `model`, in schema order.
    fn fields(&self, model: &str) -> Result<Vec<FieldSchema>, StoreError>;

    /// Records of `model` for `ids`, in the order requested.
    ///
    /// An id that does not exist is a [`StoreError::MissingRecord`].
    fn fetch_records(&self, model: &str, ids: &[i64]) -> Result<Vec<RecordData>, StoreError>;

    /// Schema of a single field.
    fn field_schema(&self, model: &str, field: &str) -> Result<FieldSchema, StoreError> {
        self.fields(model)?
            .into_iter()
            .find(|schema| schema.name == field)
            .ok_or_else(|| StoreError::UnknownField {
                model: model.to_string(),
                field: field.to_string(),
            })
    }
}
