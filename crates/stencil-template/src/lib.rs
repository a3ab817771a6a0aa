/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Sandboxed template engine for rendering records.
//!
//! This crate provides a small template language whose expressions can only
//! read data. It supports:
//!
//! - Expression interpolation: `${object.partner_id.name}`
//! - Defaults: `${object.email or '''N/A'''}`
//! - Block statements: `<% if cond %>...<% elif other %>...<% else %>...<% endif %>`
//! - Loops: `<% for line in object.line_ids %>...<% else %>...<% endfor %>`
//! - Line statements: `% if cond:` / `% endif`
//! - Comments: `<%doc>...</%doc>` and `## ...`
//! - Filters: `${name | trim | upper}`
//! - Helper calls with keyword arguments: `${format_date(object.date, lang_code='fr_FR')}`
//!
//! # Architecture
//!
//! The grammar has no assignment, import or definition constructs, so a
//! compiled template cannot mutate anything. At runtime every attribute read
//! goes through [`sandbox`]: names starting with `_` are rejected, and bound
//! records are read through the [`SandboxObject`] capability trait only for
//! fields their schema declares public. The only callables are the built-in
//! globals and the helpers the host binds.
//!
//! # Example
//!
//! ```ignore
//! use stencil_template::{BindingContext, Environment};
//!
//! let env = Environment::new(true);
//! let template = env.from_string("Hello, ${name}!")?;
//!
//! let mut bindings = BindingContext::new();
//! bindings.insert("name", "World");
//!
//! let output = env.render(&template, &bindings)?;
//! assert_eq!(output, "Hello, World!");
//! ```

pub mod ast;
pub mod cache;
pub mod context;
pub mod delta;
pub mod environment;
pub mod error;
pub mod eval_context;
pub mod evaluator;
pub mod filters;
pub mod globals;
pub mod lexer;
pub mod parser;
pub mod sandbox;
pub mod value;

// Re-export main types at crate root
pub use ast::{Comment, Conditional, Expr, ForLoop, Literal, Print, TemplateNode};
pub use cache::TemplateCache;
pub use context::BindingContext;
pub use delta::RelativeDelta;
pub use environment::{Environment, EnvironmentBuilder};
pub use error::{TemplateError, TemplateResult};
pub use eval_context::EvalContext;
pub use parser::Template;
pub use value::{Args, FieldVisibility, Helper, SandboxObject, Value, escape_html};
