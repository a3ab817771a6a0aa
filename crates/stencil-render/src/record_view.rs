/*
 * record_view.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Schema-scoped record accessor exposed to templates.
//!
//! A [`RecordView`] answers the sandbox's field reads from stored data,
//! converting each value according to its declared [`FieldType`]. Relational
//! fields are resolved lazily through the store, so only paths a template
//! actually reads are fetched.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as Json;
use stencil_template::{FieldVisibility, SandboxObject, TemplateError, TemplateResult, Value};

use crate::error::StoreError;
use crate::record::{FieldSchema, FieldType, RecordData, RecordStore};

/// Name of the pseudo-field holding the record id.
pub const ID_FIELD: &str = "id";

pub struct RecordView {
    store: Arc<dyn RecordStore>,
    model: String,
    schema: Arc<Vec<FieldSchema>>,
    data: RecordData,
}

impl fmt::Debug for RecordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("model", &self.model)
            .field("id", &self.data.id)
            .finish()
    }
}

impl RecordView {
    /// Fetch `ids` of `model` and wrap each record, in the order requested.
    pub fn load(
        store: &Arc<dyn RecordStore>,
        model: &str,
        ids: &[i64],
    ) -> Result<Vec<Arc<RecordView>>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let schema = Arc::new(store.fields(model)?);
        let records = store.fetch_records(model, ids)?;
        Ok(records
            .into_iter()
            .map(|data| {
                Arc::new(RecordView {
                    store: Arc::clone(store),
                    model: model.to_string(),
                    schema: Arc::clone(&schema),
                    data,
                })
            })
            .collect())
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    fn schema_of(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.iter().find(|field| field.name == name)
    }

    fn invalid(&self, field: &FieldSchema, message: impl Into<String>) -> StoreError {
        StoreError::InvalidValue {
            model: self.model.clone(),
            field: field.name.clone(),
            message: message.into(),
        }
    }

    fn convert(&self, field: &FieldSchema, raw: Option<&Json>) -> Result<Value, StoreError> {
        let raw = match raw {
            None | Some(Json::Null) => {
                return Ok(empty_value(field.field_type));
            }
            Some(Json::Bool(false)) if field.field_type != FieldType::Boolean => {
                return Ok(empty_value(field.field_type));
            }
            Some(raw) => raw,
        };

        match field.field_type {
            FieldType::Char | FieldType::Text | FieldType::Html | FieldType::Selection => raw
                .as_str()
                .map(Value::str)
                .ok_or_else(|| self.invalid(field, format!("expected a string, found {raw}"))),
            FieldType::Integer => json_int(raw)
                .map(Value::Int)
                .ok_or_else(|| self.invalid(field, format!("expected an integer, found {raw}"))),
            FieldType::Float | FieldType::Monetary => raw
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| self.invalid(field, format!("expected a number, found {raw}"))),
            FieldType::Boolean => raw
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| self.invalid(field, format!("expected a boolean, found {raw}"))),
            FieldType::Date => raw
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Value::Date)
                .ok_or_else(|| self.invalid(field, format!("expected a date, found {raw}"))),
            FieldType::Datetime => raw
                .as_str()
                .and_then(parse_datetime)
                .map(Value::DateTime)
                .ok_or_else(|| self.invalid(field, format!("expected a datetime, found {raw}"))),
            FieldType::Many2one => {
                // Either a bare id or an `[id, display_name]` pair.
                let id = match raw {
                    Json::Array(pair) => pair.first().and_then(json_int),
                    other => json_int(other),
                }
                .ok_or_else(|| self.invalid(field, format!("expected a record id, found {raw}")))?;
                let related = self.related(field, &[id])?;
                Ok(related.into_iter().next().map_or(Value::None, Value::Object))
            }
            FieldType::One2many | FieldType::Many2many => {
                let ids = raw
                    .as_array()
                    .and_then(|items| items.iter().map(json_int).collect::<Option<Vec<_>>>())
                    .ok_or_else(|| {
                        self.invalid(field, format!("expected record ids, found {raw}"))
                    })?;
                let related = self.related(field, &ids)?;
                Ok(Value::List(related.into_iter().map(Value::Object).collect()))
            }
        }
    }

    fn related(
        &self,
        field: &FieldSchema,
        ids: &[i64],
    ) -> Result<Vec<Arc<dyn SandboxObject>>, StoreError> {
        let model = field
            .relation
            .as_deref()
            .ok_or_else(|| self.invalid(field, "relational field without a target model"))?;
        Ok(RecordView::load(&self.store, model, ids)?
            .into_iter()
            .map(|view| view as Arc<dyn SandboxObject>)
            .collect())
    }
}

impl SandboxObject for RecordView {
    fn model(&self) -> &str {
        &self.model
    }

    fn id(&self) -> Option<i64> {
        Some(self.data.id)
    }

    fn visibility(&self, name: &str) -> Option<FieldVisibility> {
        if name == ID_FIELD {
            return Some(FieldVisibility::Public);
        }
        self.schema_of(name).map(|field| {
            if field.public {
                FieldVisibility::Public
            } else {
                FieldVisibility::Private
            }
        })
    }

    fn get(&self, name: &str) -> TemplateResult<Value> {
        if name == ID_FIELD {
            return Ok(Value::Int(self.data.id));
        }
        let field = self.schema_of(name).ok_or_else(|| TemplateError::UnknownAttribute {
            type_name: self.model.clone(),
            name: name.to_string(),
        })?;
        self.convert(field, self.data.get(name))
            .map_err(|e| TemplateError::ObjectAccess {
                name: name.to_string(),
                message: e.to_string(),
            })
    }
}

/// What an unset field reads as.
fn empty_value(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Boolean => Value::Bool(false),
        FieldType::One2many | FieldType::Many2many => Value::List(Vec::new()),
        _ => Value::None,
    }
}

fn json_int(value: &Json) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stencil_template::{BindingContext, Environment};

    fn store() -> Arc<dyn RecordStore> {
        let store = MemoryRecordStore::new()
            .with_model(
                "res.partner",
                vec![
                    FieldSchema::new("name", FieldType::Char),
                    FieldSchema::new("is_company", FieldType::Boolean),
                    FieldSchema::new("credit", FieldType::Monetary),
                    FieldSchema::new("color", FieldType::Integer),
                    FieldSchema::new("birthday", FieldType::Date),
                    FieldSchema::new("create_date", FieldType::Datetime),
                    FieldSchema::relation("parent_id", FieldType::Many2one, "res.partner"),
                    FieldSchema::relation("child_ids", FieldType::One2many, "res.partner"),
                    FieldSchema::new("password", FieldType::Char).private(),
                ],
            )
            .with_record(
                "res.partner",
                RecordData::new(1)
                    .with("name", json!("Azure Interior"))
                    .with("is_company", json!(true))
                    .with("credit", json!(1250.5))
                    .with("color", json!(3))
                    .with("child_ids", json!([2, 3]))
                    .with("password", json!("hunter2")),
            )
            .and_then(|s| {
                s.with_record(
                    "res.partner",
                    RecordData::new(2)
                        .with("name", json!("Brandon Freeman"))
                        .with("parent_id", json!([1, "Azure Interior"]))
                        .with("birthday", json!("1990-04-12"))
                        .with("create_date", json!("2024-03-05 14:30:00"))
                        .with("color", json!(false)),
                )
            })
            .and_then(|s| {
                s.with_record(
                    "res.partner",
                    RecordData::new(3)
                        .with("name", json!("Colleen Diaz"))
                        .with("parent_id", json!(1)),
                )
            })
            .unwrap();
        Arc::new(store)
    }

    fn view(id: i64) -> Arc<RecordView> {
        RecordView::load(&store(), "res.partner", &[id])
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_scalar_conversions() {
        let company = view(1);
        assert_eq!(company.get("name").unwrap(), Value::str("Azure Interior"));
        assert_eq!(company.get("is_company").unwrap(), Value::Bool(true));
        assert_eq!(company.get("credit").unwrap(), Value::Float(1250.5));
        assert_eq!(company.get("color").unwrap(), Value::Int(3));
        assert_eq!(company.get("id").unwrap(), Value::Int(1));
        assert_eq!(company.get("birthday").unwrap(), Value::None);

        let contact = view(2);
        assert_eq!(contact.get("is_company").unwrap(), Value::Bool(false));
        assert_eq!(contact.get("color").unwrap(), Value::None);
        assert_eq!(
            contact.get("birthday").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(1990, 4, 12).unwrap())
        );
        assert_eq!(
            contact.get("create_date").unwrap().to_string(),
            "2024-03-05 14:30:00"
        );
    }

    #[test]
    fn test_relations_resolve_through_the_store() {
        let env = Environment::new(false);
        let mut bindings = BindingContext::new();
        bindings.insert("object", Value::Object(view(1)));
        assert_eq!(
            env.render_str(
                "<% for child in object.child_ids %>\
                 ${child.name} (${child.parent_id.name})\n<% endfor %>",
                &bindings
            )
            .unwrap(),
            "Brandon Freeman (Azure Interior)\nColleen Diaz (Azure Interior)\n"
        );
        assert_eq!(
            env.render_str("${object.parent_id.name or '''none'''}", &bindings)
                .unwrap(),
            "none"
        );
    }

    #[test]
    fn test_visibility_follows_schema() {
        let company = view(1);
        assert_eq!(company.visibility("id"), Some(FieldVisibility::Public));
        assert_eq!(company.visibility("name"), Some(FieldVisibility::Public));
        assert_eq!(company.visibility("password"), Some(FieldVisibility::Private));
        assert_eq!(company.visibility("write"), None);

        let env = Environment::new(true);
        let mut bindings = BindingContext::new();
        bindings.insert("object", Value::Object(company));
        assert!(matches!(
            env.render_str("${object.password}", &bindings),
            Err(TemplateError::ForbiddenAttribute { .. })
        ));
    }

    #[test]
    fn test_invalid_stored_value_is_an_access_error() {
        let store: Arc<dyn RecordStore> = Arc::new(
            MemoryRecordStore::new()
                .with_model("m", vec![FieldSchema::new("day", FieldType::Date)])
                .with_record("m", RecordData::new(1).with("day", json!("yesterday")))
                .unwrap(),
        );
        let record = RecordView::load(&store, "m", &[1]).unwrap().remove(0);
        assert!(matches!(
            record.get("day"),
            Err(TemplateError::ObjectAccess { .. })
        ));
    }

    #[test]
    fn test_display_as_record_reference() {
        assert_eq!(Value::Object(view(2)).to_string(), "res.partner(2,)");
    }
}
