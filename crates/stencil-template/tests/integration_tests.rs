/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for stencil-template using test fixtures.
 */

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use stencil_template::{
    BindingContext, Environment, FieldVisibility, SandboxObject, Template, TemplateError,
    TemplateResult, Value,
};

/// Helper to get the path to test fixtures
fn fixture_path(name: &str) -> std::path::PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir).join("test-fixtures").join(name)
}

/// Helper to load a template source from fixtures
fn load_source(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load template: {}", name))
}

/// A record with a declared schema that remembers which fields were read.
#[derive(Debug)]
struct Record {
    id: i64,
    fields: HashMap<&'static str, (FieldVisibility, Value)>,
    reads: Mutex<Vec<String>>,
}

impl Record {
    fn new(id: i64, fields: Vec<(&'static str, FieldVisibility, Value)>) -> Self {
        Self {
            id,
            fields: fields
                .into_iter()
                .map(|(name, visibility, value)| (name, (visibility, value)))
                .collect(),
            reads: Mutex::new(Vec::new()),
        }
    }

    fn reads(&self) -> Vec<String> {
        self.reads.lock().expect("lock").clone()
    }
}

impl SandboxObject for Record {
    fn model(&self) -> &str {
        "res.partner"
    }

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn visibility(&self, name: &str) -> Option<FieldVisibility> {
        self.fields.get(name).map(|(visibility, _)| *visibility)
    }

    fn get(&self, name: &str) -> TemplateResult<Value> {
        self.reads.lock().expect("lock").push(name.to_string());
        Ok(self
            .fields
            .get(name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default())
    }
}

fn partner() -> std::sync::Arc<Record> {
    std::sync::Arc::new(Record::new(
        7,
        vec![
            ("name", FieldVisibility::Public, Value::str("Azure Interior")),
            ("email", FieldVisibility::Public, Value::None),
            ("password", FieldVisibility::Private, Value::str("hunter2")),
        ],
    ))
}

fn bind_object(object: Value) -> BindingContext {
    let mut bindings = BindingContext::new();
    bindings.insert("object", object);
    bindings
}

#[test]
fn test_greeting_fixture() {
    let env = Environment::new(true);
    let template = env.from_string(&load_source("greeting.tmpl")).unwrap();

    let named = bind_object(Value::Object(partner()));
    assert_eq!(
        env.render(&template, &named).unwrap(),
        "Dear Azure Interior,\n"
    );

    let anonymous = bind_object(Value::from(json!({"name": null})));
    assert_eq!(
        env.render(&template, &anonymous).unwrap(),
        "Dear Customer,\n"
    );
}

#[test]
fn test_order_lines_fixture() {
    let env = Environment::new(false);
    let template = env.from_string(&load_source("order_lines.tmpl")).unwrap();

    let order = bind_object(Value::from(json!({
        "lines": [
            {"product": "Desk", "qty": 2},
            {"product": "Lamp", "qty": 1}
        ],
        "total": 349.5
    })));
    assert_eq!(
        env.render(&template, &order).unwrap(),
        "- Desk x 2\n- Lamp x 1 (last)\nTotal: 349.50\n"
    );

    let empty = bind_object(Value::from(json!({"lines": [], "total": 0})));
    assert_eq!(
        env.render(&template, &empty).unwrap(),
        "No lines.\nTotal: 0.00\n"
    );
}

#[test]
fn test_conditional_fixture() {
    let env = Environment::new(true);
    let template = env.from_string(&load_source("conditional.tmpl")).unwrap();

    let cases = [
        ("paid", "Paid in full.\n"),
        ("partial", "Partially paid.\n"),
        ("draft", "Awaiting payment.\n"),
    ];
    for (state, expected) in cases {
        let bindings = bind_object(Value::from(json!({ "state": state })));
        assert_eq!(env.render(&template, &bindings).unwrap(), expected);
    }
}

#[test]
fn test_private_field_is_forbidden_and_never_read() {
    let record = partner();
    let env = Environment::new(true);
    let bindings = bind_object(Value::Object(record.clone()));

    let err = env.render_str("${object.password}", &bindings).unwrap_err();
    assert_eq!(
        err,
        TemplateError::ForbiddenAttribute {
            name: "password".to_string()
        }
    );

    let err = env.render_str("${object['password']}", &bindings).unwrap_err();
    assert!(matches!(err, TemplateError::ForbiddenAttribute { .. }));

    assert!(record.reads().is_empty());
}

#[test]
fn test_underscore_names_are_forbidden() {
    let env = Environment::new(true);
    let bindings = bind_object(Value::Object(partner()));

    for source in [
        "${object._name}",
        "${object.__class__}",
        "${''.__class__}",
        "${ctx._secret}",
        "${object['_cache']}",
    ] {
        let mut bindings = bindings.clone();
        bindings.insert("ctx", Value::from(json!({"_secret": 1})));
        let err = env.render_str(source, &bindings).unwrap_err();
        assert!(
            matches!(err, TemplateError::ForbiddenAttribute { .. }),
            "{source} should be forbidden, got {err:?}"
        );
    }
}

#[test]
fn test_undeclared_member_is_unknown() {
    let env = Environment::new(true);
    let bindings = bind_object(Value::Object(partner()));
    let err = env.render_str("${object.unlink()}", &bindings).unwrap_err();
    assert_eq!(
        err,
        TemplateError::UnknownAttribute {
            type_name: "res.partner".to_string(),
            name: "unlink".to_string()
        }
    );
}

#[test]
fn test_statement_constructs_outside_grammar_do_not_compile() {
    for source in [
        "<% import os %>",
        "% set x = 1\n",
        "<% include 'other' %>",
        "<% macro m() %><% endmacro %>",
        "${x = 1}",
        "${lambda: 1}",
    ] {
        let err = Template::compile(source).unwrap_err();
        assert!(err.is_compile_error(), "{source} should fail to compile");
    }
}

#[test]
fn test_record_display_and_none_relation() {
    let env = Environment::new(true);
    let mut bindings = bind_object(Value::Object(partner()));
    bindings.insert("nothing", Value::None);
    assert_eq!(
        env.render_str("${object}|${nothing.email}|${object.email}", &bindings)
            .unwrap(),
        "res.partner(7,)||"
    );
}

#[test]
fn test_helpers_with_keyword_arguments() {
    let env = Environment::builder()
        .require_helper("format_amount")
        .build();
    let mut bindings = BindingContext::new();
    bindings.insert_helper("format_amount", |args| {
        let amount = args.get(0, "amount").and_then(Value::as_float).unwrap_or(0.0);
        let currency = args
            .get(1, "currency")
            .map(Value::to_string)
            .unwrap_or_default();
        Ok(Value::Str(format!("{amount:.2} {currency}")))
    });
    assert_eq!(
        env.render_str("${format_amount(12, currency='EUR')}", &bindings)
            .unwrap(),
        "12.00 EUR"
    );
}
