/*
 * placeholder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Placeholder expressions for template authors.
//!
//! [`build_expression`] turns a field path and optional default into a
//! template expression such as `${object.partner_id.email or '''N/A'''}`.
//! [`PlaceholderForm`] is the assistant around it: a pure reducer over the
//! field, sub-model, sub-field and default selections.

use crate::error::StoreError;
use crate::record::{FieldSchema, RecordStore};

/// Escape `literal` for embedding inside a `'''…'''` string.
fn escape_literal(literal: &str) -> String {
    literal.replace('\\', "\\\\").replace('\'', "\\'")
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Build the placeholder expression for `field`, optionally traversing one
/// relation to `sub_field` and falling back to `default`.
///
/// Returns an empty string when `field` is empty.
pub fn build_expression(field: &str, sub_field: Option<&str>, default: Option<&str>) -> String {
    if field.is_empty() {
        return String::new();
    }
    let mut expression = format!("${{object.{field}");
    if let Some(sub_field) = present(sub_field) {
        expression.push('.');
        expression.push_str(sub_field);
    }
    if let Some(default) = present(default) {
        expression.push_str(" or '''");
        expression.push_str(&escape_literal(default));
        expression.push_str("'''");
    }
    expression.push('}');
    expression
}

/// Public fields of `model` whose name starts with `prefix`, in schema order.
pub fn suggest_fields(
    store: &dyn RecordStore,
    model: &str,
    prefix: &str,
) -> Result<Vec<FieldSchema>, StoreError> {
    Ok(store
        .fields(model)?
        .into_iter()
        .filter(|field| field.public && field.name.starts_with(prefix))
        .collect())
}

/// Coarse state of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistState {
    Empty,
    ScalarSelected,
    RelationSelected,
}

/// A change made by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistEvent {
    SelectField(Option<String>),
    SelectSubField(Option<String>),
    SetDefault(Option<String>),
}

/// The assistant's fields. Every transition recomputes `expression`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderForm {
    pub field: Option<String>,
    pub sub_model: Option<String>,
    pub sub_field: Option<String>,
    pub default: Option<String>,
    pub expression: String,
}

impl PlaceholderForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AssistState {
        match (&self.field, &self.sub_model) {
            (None, _) => AssistState::Empty,
            (Some(_), None) => AssistState::ScalarSelected,
            (Some(_), Some(_)) => AssistState::RelationSelected,
        }
    }

    fn recompute(&mut self) {
        self.expression = build_expression(
            self.field.as_deref().unwrap_or(""),
            self.sub_field.as_deref(),
            self.default.as_deref(),
        );
    }

    /// Apply `event` to the form for fields of `model`.
    pub fn reduce(
        mut self,
        store: &dyn RecordStore,
        model: &str,
        event: AssistEvent,
    ) -> Result<Self, StoreError> {
        match event {
            AssistEvent::SelectField(None) => return Ok(Self::default()),
            AssistEvent::SelectField(Some(name)) if name.is_empty() => {
                return Ok(Self::default());
            }
            AssistEvent::SelectField(Some(name)) => {
                let schema = store.field_schema(model, &name)?;
                self.field = Some(name);
                match schema.relation.filter(|_| schema.field_type.is_relational()) {
                    Some(target) if store.has_model(&target) => {
                        if self.sub_model.as_deref() != Some(target.as_str()) {
                            self.sub_field = None;
                        }
                        self.sub_model = Some(target);
                    }
                    Some(target) => {
                        tracing::debug!(%target, "relation target is not a known model");
                        return Ok(self);
                    }
                    None => {
                        self.sub_model = None;
                        self.sub_field = None;
                    }
                }
            }
            AssistEvent::SelectSubField(sub_field) => {
                let sub_field = sub_field.filter(|s| !s.is_empty());
                match (&self.sub_model, sub_field) {
                    (Some(sub_model), Some(name)) => {
                        store.field_schema(sub_model, &name)?;
                        self.sub_field = Some(name);
                    }
                    _ => self.sub_field = None,
                }
            }
            AssistEvent::SetDefault(default) => {
                self.default = default.filter(|s| !s.is_empty());
            }
        }
        self.recompute();
        Ok(self)
    }

    /// Completions for the selector currently being filled in.
    pub fn suggestions(
        &self,
        store: &dyn RecordStore,
        model: &str,
        prefix: &str,
    ) -> Result<Vec<FieldSchema>, StoreError> {
        match (self.state(), &self.sub_model) {
            (AssistState::RelationSelected, Some(sub_model)) => {
                suggest_fields(store, sub_model, prefix)
            }
            _ => suggest_fields(store, model, prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use crate::record::FieldType;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use stencil_template::{BindingContext, Environment, Value};

    #[test]
    fn test_build_expression() {
        assert_eq!(build_expression("name", None, None), "${object.name}");
        assert_eq!(
            build_expression("partner_id", Some("email"), None),
            "${object.partner_id.email}"
        );
        assert_eq!(
            build_expression("name", None, Some("N/A")),
            "${object.name or '''N/A'''}"
        );
        assert_eq!(build_expression("", Some("email"), Some("N/A")), "");
        assert_eq!(build_expression("name", Some(""), Some("")), "${object.name}");
    }

    #[test]
    fn test_default_is_escaped() {
        assert_eq!(
            build_expression("name", None, Some(r"it's a\b")),
            r"${object.name or '''it\'s a\\b'''}"
        );
    }

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::new()
            .with_model(
                "sale.order",
                vec![
                    FieldSchema::new("name", FieldType::Char),
                    FieldSchema::relation("partner_id", FieldType::Many2one, "res.partner"),
                    FieldSchema::relation("team_id", FieldType::Many2one, "crm.team"),
                    FieldSchema::new("note", FieldType::Html),
                    FieldSchema::new("access_token", FieldType::Char).private(),
                ],
            )
            .with_model(
                "res.partner",
                vec![
                    FieldSchema::new("name", FieldType::Char),
                    FieldSchema::new("email", FieldType::Char),
                    FieldSchema::new("signup_token", FieldType::Char).private(),
                ],
            )
    }

    #[test]
    fn test_assistant_transitions() {
        let store = store();
        let form = PlaceholderForm::new();
        assert_eq!(form.state(), AssistState::Empty);

        let form = form
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("partner_id".into())))
            .unwrap();
        assert_eq!(form.state(), AssistState::RelationSelected);
        assert_eq!(form.sub_model.as_deref(), Some("res.partner"));
        assert_eq!(form.expression, "${object.partner_id}");

        let form = form
            .reduce(&store, "sale.order", AssistEvent::SelectSubField(Some("email".into())))
            .unwrap();
        let form = form
            .reduce(&store, "sale.order", AssistEvent::SetDefault(Some("nobody".into())))
            .unwrap();
        assert_eq!(form.expression, "${object.partner_id.email or '''nobody'''}");

        let form = form
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("name".into())))
            .unwrap();
        assert_eq!(form.state(), AssistState::ScalarSelected);
        assert_eq!(form.sub_model, None);
        assert_eq!(form.sub_field, None);
        assert_eq!(form.expression, "${object.name or '''nobody'''}");

        let form = form
            .reduce(&store, "sale.order", AssistEvent::SelectField(None))
            .unwrap();
        assert_eq!(form, PlaceholderForm::default());
    }

    #[test]
    fn test_unknown_relation_target_keeps_previous_state() {
        let store = store();
        let form = PlaceholderForm::new()
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("name".into())))
            .unwrap();
        let form = form
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("team_id".into())))
            .unwrap();
        assert_eq!(form.field.as_deref(), Some("team_id"));
        assert_eq!(form.sub_model, None);
        assert_eq!(form.expression, "${object.name}");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let store = store();
        let err = PlaceholderForm::new()
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("amount".into())))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[test]
    fn test_suggestions_hide_private_fields() {
        let store = store();
        let names = |fields: Vec<FieldSchema>| -> Vec<String> {
            fields.into_iter().map(|f| f.name).collect()
        };
        assert_eq!(
            names(suggest_fields(&store, "sale.order", "").unwrap()),
            vec!["name", "partner_id", "team_id", "note"]
        );
        assert_eq!(
            names(suggest_fields(&store, "sale.order", "n").unwrap()),
            vec!["name", "note"]
        );

        let form = PlaceholderForm::new()
            .reduce(&store, "sale.order", AssistEvent::SelectField(Some("partner_id".into())))
            .unwrap();
        assert_eq!(
            names(form.suggestions(&store, "sale.order", "").unwrap()),
            vec!["name", "email"]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// With an empty field, the generated expression yields exactly the default.
        #[test]
        fn default_round_trips(default in "[ -~]{1,30}") {
            let expression = build_expression("email", None, Some(&default));
            let mut record = std::collections::BTreeMap::new();
            record.insert("email".to_string(), Value::None);
            let mut bindings = BindingContext::new();
            bindings.insert("object", Value::Map(record));
            let rendered = Environment::new(false)
                .render_str(&expression, &bindings)
                .expect("placeholder expressions always compile");
            prop_assert_eq!(rendered, default);
        }
    }
}
