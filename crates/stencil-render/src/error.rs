/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for batch rendering.

use std::path::PathBuf;

use stencil_template::TemplateError;
use thiserror::Error;

/// A malformed render request. These are caller bugs and are never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputValidationError {
    /// A single identifier was passed where a list is required.
    #[error("Template rendering should be called only using on a list of IDs.")]
    NotAList,

    /// The identifier list contains a null entry.
    #[error("Unsuspected None (record id at position {position})")]
    NullId { position: usize },

    #[error("Template rendering supports only jinja.")]
    UnsupportedEngine { engine: String },
}

/// Failures reported by a record store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("record {model}({id},) does not exist")]
    MissingRecord { model: String, id: i64 },

    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    /// Stored data does not match the declared schema.
    #[error("invalid data for {model}.{field}: {message}")]
    InvalidValue {
        model: String,
        field: String,
        message: String,
    },

    /// The store's backing document could not be loaded.
    #[error("cannot load record store: {message}")]
    Load { message: String },
}

/// Failures loading [`RenderSettings`](crate::config::RenderSettings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid base_url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors surfaced by [`Renderer::render`](crate::renderer::Renderer::render).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Validation(#[from] InputValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Evaluation failed for one record; the whole batch is aborted.
    #[error("Failed to render template : {source}")]
    Evaluation {
        model: String,
        id: i64,
        #[source]
        source: TemplateError,
    },
}

impl RenderError {
    /// The record whose evaluation failed, if any.
    pub fn record_id(&self) -> Option<i64> {
        match self {
            RenderError::Evaluation { id, .. } => Some(*id),
            _ => None,
        }
    }
}
