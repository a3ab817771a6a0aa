/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Batch rendering of sandboxed templates against stored records.
//!
//! A [`Renderer`] takes one template source, a model name and a list of
//! record ids, and returns the rendered text for each id. Records are read
//! from a [`RecordStore`] and exposed to templates as `object` through a
//! schema-scoped [`RecordView`], so only public fields are reachable.
//!
//! Every per-record binding context holds:
//!
//! - `object`: the record being rendered
//! - `user`: the acting user from the render context
//! - `ctx`: the caller's key/value settings
//! - `format_date`, `format_datetime`, `format_amount`, `format_duration`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stencil_render::{MemoryRecordStore, RenderRequest, RenderSettings, Renderer};
//!
//! let store = MemoryRecordStore::from_path("store.json")?;
//! let renderer = Renderer::new(Arc::new(store), RenderSettings::default())?;
//! let request = RenderRequest::new("Dear ${object.name}", "res.partner", vec![7_i64]);
//! let results = renderer.render(&request)?;
//! assert_eq!(results[&7], "Dear Deco Addict");
//! ```

pub mod binding;
pub mod config;
pub mod environments;
pub mod error;
pub mod formatting;
pub mod memory;
pub mod placeholder;
pub mod postprocess;
pub mod record;
pub mod record_view;
pub mod renderer;

pub use binding::{ContextBuilder, RenderContext};
pub use config::RenderSettings;
pub use error::{ConfigError, InputValidationError, RenderError, StoreError};
pub use formatting::{BasicFormatter, Currency, DateTimeStyle, Formatted, LocaleFormatter};
pub use memory::MemoryRecordStore;
pub use placeholder::{AssistEvent, AssistState, PlaceholderForm, build_expression, suggest_fields};
pub use postprocess::{BaseUrlLinkRewriter, LinkRewriter, post_process};
pub use record::{FieldSchema, FieldType, RecordData, RecordStore};
pub use record_view::RecordView;
pub use renderer::{ENGINE, IdSelection, RenderRequest, RenderResult, Renderer};
