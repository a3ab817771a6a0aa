/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled template cache.
//!
//! Templates are keyed by their source text. The map lock is held only long
//! enough to find or insert the entry's [`OnceCell`]; compilation happens
//! inside the cell, so concurrent requests for the same source compile it
//! exactly once and all observe the same `Arc<Template>`. Parse failures are
//! cached too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;

use crate::error::TemplateResult;
use crate::parser::Template;

type Entry = Arc<OnceCell<TemplateResult<Arc<Template>>>>;

/// Source-keyed cache of compiled templates.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: Option<usize>,
}

impl TemplateCache {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache holding at most `capacity` entries.
    ///
    /// When full, the cache is cleared before the next insertion.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::default(),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn entry(&self, source: &str) -> Entry {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(source) {
            return Arc::clone(entry);
        }
        if self.capacity.is_some_and(|cap| entries.len() >= cap) {
            tracing::debug!(evicted = entries.len(), "template cache full, clearing");
            entries.clear();
        }
        let entry = Entry::default();
        entries.insert(source.to_string(), Arc::clone(&entry));
        entry
    }

    /// Fetch the compiled form of `source`, compiling it on first use.
    pub fn get_or_compile(&self, source: &str) -> TemplateResult<Arc<Template>> {
        let entry = self.entry(source);
        entry
            .get_or_init(|| {
                tracing::debug!(len = source.len(), "compiling template");
                Template::compile(source).map(Arc::new)
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
