/*
 * binding.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render context and per-record binding contexts.
//!
//! A [`RenderContext`] carries the ambient settings of one render call. The
//! [`ContextBuilder`] turns it into a fresh [`BindingContext`] for every
//! record: `object`, `user`, `ctx` and the formatting helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use stencil_template::{BindingContext, Helper, Value};

/// Ambient settings of one render call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    /// Acting user, bound as `user` (a `res.users` record).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Key/value settings, bound as `ctx`.
    #[serde(default)]
    pub values: serde_json::Map<String, Json>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Json) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Build from a JSON object; anything else is rejected.
    pub fn from_json(user_id: Option<i64>, json: Json) -> Option<Self> {
        match json {
            Json::Object(values) => Some(Self { user_id, values }),
            Json::Null => Some(Self {
                user_id,
                values: serde_json::Map::new(),
            }),
            _ => None,
        }
    }

    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Json::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Formatting locale requested by the caller.
    pub fn lang(&self) -> Option<&str> {
        self.non_empty_str("lang")
    }

    /// Default timezone requested by the caller.
    pub fn tz(&self) -> Option<&str> {
        self.non_empty_str("tz")
    }

    /// Whether the caller asked for unescaped output.
    pub fn is_safe(&self) -> bool {
        self.values
            .get("safe")
            .is_some_and(|safe| Value::from(safe.clone()).is_truthy())
    }

    /// The `ctx` binding.
    pub fn to_value(&self) -> Value {
        Value::from(Json::Object(self.values.clone()))
    }
}

/// Shared ingredients of the per-record binding contexts of one batch.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    user: Value,
    ctx: Value,
    helpers: Vec<Helper>,
}

impl ContextBuilder {
    pub fn new(user: Value, ctx: Value, helpers: impl IntoIterator<Item = Helper>) -> Self {
        Self {
            user,
            ctx,
            helpers: helpers.into_iter().collect(),
        }
    }

    /// A fresh binding context with `object` bound to `record`.
    pub fn bind(&self, record: Value) -> BindingContext {
        let mut bindings = BindingContext::new();
        bindings.insert("object", record);
        bindings.insert("user", self.user.clone());
        bindings.insert("ctx", self.ctx.clone());
        for helper in &self.helpers {
            bindings.insert(helper.name(), Value::Function(helper.clone()));
        }
        bindings
    }
}
