/*
 * memory.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! In-memory [`RecordStore`].
//!
//! Models, schemas and records can be built in code or loaded from a JSON
//! document of the form:
//!
//! ```json
//! {
//!   "models": {
//!     "res.partner": {
//!       "fields": [{"name": "name", "type": "char"}],
//!       "records": [{"id": 1, "name": "Azure Interior"}]
//!     }
//!   }
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::StoreError;
use crate::record::{FieldSchema, RecordData, RecordStore};

#[derive(Debug, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    models: IndexMap<String, ModelDocument>,
}

#[derive(Debug, Deserialize)]
struct ModelDocument {
    #[serde(default)]
    fields: Vec<FieldSchema>,
    #[serde(default)]
    records: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryModel {
    fields: Vec<FieldSchema>,
    records: IndexMap<i64, RecordData>,
}

/// A record store holding everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    models: IndexMap<String, MemoryModel>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a model with its schema, replacing any previous declaration.
    pub fn with_model(mut self, model: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        self.models.insert(
            model.into(),
            MemoryModel {
                fields,
                records: IndexMap::new(),
            },
        );
        self
    }

    /// Add a record to a declared model; an existing record with the same id is replaced.
    pub fn insert_record(&mut self, model: &str, record: RecordData) -> Result<(), StoreError> {
        let entry = self.model_mut(model)?;
        entry.records.insert(record.id, record);
        Ok(())
    }

    /// Builder form of [`insert_record`](Self::insert_record).
    pub fn with_record(mut self, model: &str, record: RecordData) -> Result<Self, StoreError> {
        self.insert_record(model, record)?;
        Ok(self)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Parse a JSON store document.
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let document: StoreDocument = serde_json::from_str(json).map_err(|e| StoreError::Load {
            message: e.to_string(),
        })?;

        let mut store = Self::new();
        for (name, model) in document.models {
            store = store.with_model(name.clone(), model.fields);
            for (position, mut values) in model.records.into_iter().enumerate() {
                let id = values
                    .remove("id")
                    .and_then(|id| id.as_i64())
                    .ok_or_else(|| StoreError::Load {
                        message: format!(
                            "record {position} of '{name}' has no integer 'id'"
                        ),
                    })?;
                store.insert_record(&name, RecordData { id, values })?;
            }
        }
        Ok(store)
    }

    /// Load a JSON store document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| StoreError::Load {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    fn model(&self, model: &str) -> Result<&MemoryModel, StoreError> {
        self.models.get(model).ok_or_else(|| StoreError::UnknownModel {
            model: model.to_string(),
        })
    }

    fn model_mut(&mut self, model: &str) -> Result<&mut MemoryModel, StoreError> {
        self.models
            .get_mut(model)
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.to_string(),
            })
    }
}

impl RecordStore for MemoryRecordStore {
    fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    fn fields(&self, model: &str) -> Result<Vec<FieldSchema>, StoreError> {
        Ok(self.model(model)?.fields.clone())
    }

    fn fetch_records(&self, model: &str, ids: &[i64]) -> Result<Vec<RecordData>, StoreError> {
        let entry = self.model(model)?;
        ids.iter()
            .map(|id| {
                entry
                    .records
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::MissingRecord {
                        model: model.to_string(),
                        id: *id,
                    })
            })
            .collect()
    }
}
