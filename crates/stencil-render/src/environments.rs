/*
 * environments.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Process-wide template environments.
//!
//! Two immutable environments exist per process: one escaping interpolated
//! values and one emitting them raw. Both are built lazily on first use and
//! require the formatting helpers, so a binding context missing one of them
//! fails before anything is evaluated. Each owns its compile cache.

use once_cell::sync::{Lazy, OnceCell};
use stencil_template::Environment;

use crate::formatting::HELPER_NAMES;

static CACHE_CAPACITY: OnceCell<Option<usize>> = OnceCell::new();

static ESCAPED: Lazy<Environment> = Lazy::new(|| build(true));
static RAW: Lazy<Environment> = Lazy::new(|| build(false));

fn build(autoescape: bool) -> Environment {
    let capacity = CACHE_CAPACITY.get().copied().flatten();
    tracing::debug!(autoescape, ?capacity, "building template environment");
    HELPER_NAMES
        .iter()
        .fold(Environment::builder().autoescape(autoescape), |builder, name| {
            builder.require_helper(*name)
        })
        .cache_capacity(capacity)
        .build()
}

/// Set the compile cache capacity of both environments.
///
/// Only the first call has an effect, and only if it happens before either
/// environment is built. Returns whether the capacity was applied.
pub fn configure_cache_capacity(capacity: Option<usize>) -> bool {
    if Lazy::get(&ESCAPED).is_some() || Lazy::get(&RAW).is_some() {
        return false;
    }
    CACHE_CAPACITY.set(capacity).is_ok()
}

/// The HTML-escaping environment (the default).
pub fn escaped() -> &'static Environment {
    &ESCAPED
}

/// The environment emitting interpolated values unescaped.
pub fn raw() -> &'static Environment {
    &RAW
}

/// The raw environment when `safe` is requested, the escaped one otherwise.
pub fn select(safe: bool) -> &'static Environment {
    if safe { raw() } else { escaped() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_template::{BindingContext, TemplateError};

    #[test]
    fn test_environments_are_shared_and_distinct() {
        assert!(std::ptr::eq(escaped(), select(false)));
        assert!(std::ptr::eq(raw(), select(true)));
        assert!(escaped().autoescape());
        assert!(!raw().autoescape());
    }

    #[test]
    fn test_helpers_are_required() {
        for env in [escaped(), raw()] {
            assert_eq!(env.required_helpers().len(), HELPER_NAMES.len());
            let err = env
                .render_str("static text", &BindingContext::new())
                .unwrap_err();
            assert!(matches!(err, TemplateError::MissingHelper { .. }));
        }
    }

    #[test]
    fn test_capacity_cannot_change_after_first_use() {
        let _ = escaped();
        assert!(!configure_cache_capacity(Some(8)));
    }
}
