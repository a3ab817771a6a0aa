/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Binding context for template evaluation.
//!
//! A [`BindingContext`] maps names to values for one render call. Callers
//! build a fresh context per record, so nothing a template reads can leak
//! from one record's render into the next.

use std::collections::HashMap;

use crate::error::TemplateResult;
use crate::value::{Args, Helper, Value};

/// Variable bindings for one render call.
#[derive(Debug, Clone, Default)]
pub struct BindingContext {
    variables: HashMap<String, Value>,
}

impl BindingContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Register a helper function under `name`.
    pub fn insert_helper<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Args) -> TemplateResult<Value> + Send + Sync + 'static,
    {
        self.variables
            .insert(name.to_string(), Value::Function(Helper::new(name, func)));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Whether `name` is bound to a helper function.
    pub fn has_helper(&self, name: &str) -> bool {
        matches!(self.variables.get(name), Some(Value::Function(_)))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for BindingContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = BindingContext::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}
