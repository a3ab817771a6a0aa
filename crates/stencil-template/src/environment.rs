/*
 * environment.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template environments.
//!
//! An [`Environment`] is an immutable configuration: the autoescape mode, the
//! built-in globals, the names of helpers every binding context must provide,
//! and its own compile cache. Build one with [`Environment::builder`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::TemplateCache;
use crate::context::BindingContext;
use crate::error::TemplateResult;
use crate::globals::builtin_globals;
use crate::parser::Template;
use crate::value::{Args, Helper, Value};

/// Immutable rendering configuration plus its compile cache.
#[derive(Debug)]
pub struct Environment {
    autoescape: bool,
    globals: BTreeMap<String, Value>,
    required_helpers: Vec<String>,
    cache: TemplateCache,
}

impl Environment {
    /// An environment with the built-in globals and no required helpers.
    pub fn new(autoescape: bool) -> Self {
        Self::builder().autoescape(autoescape).build()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Whether interpolated values are HTML-escaped.
    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    /// Helpers that must be bound before a template is rendered.
    pub fn required_helpers(&self) -> &[String] {
        &self.required_helpers
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Compile `source`, reusing a cached compilation when available.
    pub fn from_string(&self, source: &str) -> TemplateResult<Arc<Template>> {
        self.cache.get_or_compile(source)
    }

    /// Render a compiled template against `bindings`.
    pub fn render(&self, template: &Template, bindings: &BindingContext) -> TemplateResult<String> {
        template.render(self, bindings)
    }

    /// Compile (through the cache) and render in one step.
    pub fn render_str(&self, source: &str, bindings: &BindingContext) -> TemplateResult<String> {
        let template = self.from_string(source)?;
        self.render(&template, bindings)
    }
}

/// Builder for [`Environment`].
#[derive(Debug)]
pub struct EnvironmentBuilder {
    autoescape: bool,
    globals: BTreeMap<String, Value>,
    required_helpers: Vec<String>,
    cache_capacity: Option<usize>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            autoescape: true,
            globals: builtin_globals(),
            required_helpers: Vec::new(),
            cache_capacity: None,
        }
    }
}

impl EnvironmentBuilder {
    pub fn autoescape(mut self, autoescape: bool) -> Self {
        self.autoescape = autoescape;
        self
    }

    /// Add or replace a global value.
    pub fn global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Add a global helper function.
    pub fn helper<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&Args) -> TemplateResult<Value> + Send + Sync + 'static,
    {
        self.global(name, Value::Function(Helper::new(name, func)))
    }

    /// Require every binding context to provide a helper named `name`.
    pub fn require_helper(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.required_helpers.contains(&name) {
            self.required_helpers.push(name);
        }
        self
    }

    pub fn cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Environment {
        let cache = match self.cache_capacity {
            Some(capacity) => TemplateCache::with_capacity(capacity),
            None => TemplateCache::new(),
        };
        Environment {
            autoescape: self.autoescape,
            globals: self.globals,
            required_helpers: self.required_helpers,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_autoescape_modes() {
        let mut bindings = BindingContext::new();
        bindings.insert("name", "<b>Tom & Jerry</b>");

        let escaped = Environment::new(true);
        assert_eq!(
            escaped.render_str("${name}", &bindings).unwrap(),
            "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;"
        );
        assert_eq!(
            escaped.render_str("${name | safe}", &bindings).unwrap(),
            "<b>Tom & Jerry</b>"
        );

        let raw = Environment::new(false);
        assert_eq!(
            raw.render_str("${name}", &bindings).unwrap(),
            "<b>Tom & Jerry</b>"
        );
    }

    #[test]
    fn test_missing_required_helper_fails_fast() {
        let env = Environment::builder()
            .require_helper("format_date")
            .build();
        let err = env
            .render_str("no helpers used", &BindingContext::new())
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingHelper {
                name: "format_date".to_string()
            }
        );

        let mut bindings = BindingContext::new();
        bindings.insert_helper("format_date", |_| Ok(Value::str("today")));
        assert_eq!(
            env.render_str("${format_date()}", &bindings).unwrap(),
            "today"
        );
    }

    #[test]
    fn test_custom_global_helper() {
        let env = Environment::builder()
            .autoescape(false)
            .helper("shout", |args| {
                let text = args.get(0, "text").map(Value::to_string).unwrap_or_default();
                Ok(Value::Str(format!("{}!", text.to_uppercase())))
            })
            .build();
        assert_eq!(
            env.render_str("${shout('hi')}", &BindingContext::new()).unwrap(),
            "HI!"
        );
    }

    #[test]
    fn test_from_string_uses_cache() {
        let env = Environment::builder().cache_capacity(Some(4)).build();
        let a = env.from_string("${1}").unwrap();
        let b = env.from_string("${1}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(env.cache().capacity(), Some(4));
    }
}
