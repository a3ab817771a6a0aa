/*
 * eval_context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Evaluation context for template rendering.
//!
//! [`EvalContext`] is threaded through all evaluation functions. It resolves
//! names (loop locals first, then the caller's bindings, then the
//! environment's globals) and carries the autoescape mode of the environment
//! that is rendering.

use std::collections::HashMap;

use crate::context::BindingContext;
use crate::environment::Environment;
use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

/// Maximum number of nested loop scopes.
pub const MAX_SCOPE_DEPTH: usize = 32;

/// Context for template evaluation.
pub struct EvalContext<'a> {
    /// Caller bindings (`object`, `user`, `ctx`, helpers).
    pub bindings: &'a BindingContext,

    /// Environment providing globals and the autoescape mode.
    pub env: &'a Environment,

    /// Loop-local scopes, innermost last.
    scopes: Vec<HashMap<String, Value>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(env: &'a Environment, bindings: &'a BindingContext) -> Self {
        Self {
            bindings,
            env,
            scopes: Vec::new(),
        }
    }

    pub fn autoescape(&self) -> bool {
        self.env.autoescape()
    }

    /// Resolve a name.
    pub fn lookup(&self, name: &str) -> TemplateResult<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.env.global(name) {
            return Ok(value.clone());
        }
        Err(TemplateError::UndefinedName {
            name: name.to_string(),
        })
    }

    /// Enter a new loop scope.
    pub fn push_scope(&mut self) -> TemplateResult<()> {
        if self.scopes.len() >= MAX_SCOPE_DEPTH {
            return Err(TemplateError::LimitExceeded {
                what: "loop nesting".to_string(),
                limit: MAX_SCOPE_DEPTH,
            });
        }
        self.scopes.push(HashMap::new());
        Ok(())
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a name in the innermost scope.
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }
}
