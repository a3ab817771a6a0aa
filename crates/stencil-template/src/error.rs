/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and sandboxed evaluation.

use thiserror::Error;

/// Errors that can occur during template operations.
///
/// [`TemplateError::ParseError`] is the only compile-time failure; every other
/// variant is raised while evaluating a compiled template against bindings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Error parsing the template syntax.
    #[error("Parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Access to a private attribute was attempted.
    #[error("access to attribute '{name}' is forbidden")]
    ForbiddenAttribute { name: String },

    /// A name that is neither bound nor a global.
    #[error("'{name}' is undefined")]
    UndefinedName { name: String },

    /// A required helper is absent from the binding context.
    #[error("helper '{name}' is missing from the binding context")]
    MissingHelper { name: String },

    /// The value has no readable attribute of that name.
    #[error("'{type_name}' object has no attribute '{name}'")]
    UnknownAttribute { type_name: String, name: String },

    /// A call was attempted on something that is not a registered helper.
    #[error("'{type_name}' object is not callable")]
    NotCallable { type_name: String },

    /// Unknown filter name.
    #[error("no filter named '{name}'")]
    UnknownFilter { name: String },

    /// Operand or argument of the wrong type.
    #[error("{message}")]
    TypeError { message: String },

    /// Index outside of a list or string.
    #[error("index {index} out of range")]
    IndexOutOfRange { index: i64 },

    #[error("division by zero")]
    DivisionByZero,

    /// A size-multiplying operation would exceed the sandbox limit.
    #[error("{what} exceeds the sandbox limit of {limit}")]
    LimitExceeded { what: String, limit: usize },

    /// A helper function reported a failure.
    #[error("{name}: {message}")]
    HelperError { name: String, message: String },

    /// A bound object failed to produce a field value.
    #[error("cannot read '{name}': {message}")]
    ObjectAccess { name: String, message: String },
}

impl TemplateError {
    /// Whether this error was raised while compiling (as opposed to evaluating).
    pub fn is_compile_error(&self) -> bool {
        matches!(self, TemplateError::ParseError { .. })
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        TemplateError::TypeError {
            message: message.into(),
        }
    }

    /// Build a [`TemplateError::HelperError`]; used by helper implementations.
    pub fn helper(name: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::HelperError {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
