/*
 * postprocess.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output post-processing: turning site-relative links into absolute ones.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::error::ConfigError;
use crate::renderer::RenderResult;

/// Rewrites links in rendered HTML.
pub trait LinkRewriter: Send + Sync + fmt::Debug {
    fn absolutize_links(&self, html: &str) -> String;
}

// Only paths starting with a single `/` match, so absolute URLs and
// protocol-relative `//host` links are left alone and rewriting is idempotent.
static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<img\s(?:[^>]*\s)?src=")(/(?:[^/"][^"]*)?)(")"#).expect("valid img regex")
});
static A_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<a\s(?:[^>]*\s)?href=")(/(?:[^/"][^"]*)?)(")"#).expect("valid href regex")
});
static STYLE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<[^>]+\bstyle="[^"]*\burl\('?)(/(?:[^/'")][^'")]*)?)(['")])"#)
        .expect("valid style regex")
});

/// Resolves site-relative links against a base URL.
#[derive(Debug, Clone, Default)]
pub struct BaseUrlLinkRewriter {
    base: Option<Url>,
}

impl BaseUrlLinkRewriter {
    /// A rewriter for `base_url`; without one, [`absolutize_links`](LinkRewriter::absolutize_links)
    /// returns its input.
    pub fn new(base_url: Option<&str>) -> Result<Self, ConfigError> {
        let base = base_url
            .map(|url| {
                Url::parse(url).map_err(|source| ConfigError::InvalidBaseUrl {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()?;
        Ok(Self { base })
    }

    pub fn from_url(base: Url) -> Self {
        Self { base: Some(base) }
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    fn rewrite<'a>(&self, base: &Url, regex: &Regex, html: &'a str) -> Cow<'a, str> {
        regex.replace_all(html, |caps: &Captures<'_>| {
            let path = &caps[2];
            match base.join(path) {
                Ok(absolute) => format!("{}{}{}", &caps[1], absolute, &caps[3]),
                Err(error) => {
                    tracing::debug!(path, %error, "leaving unresolvable link unchanged");
                    caps[0].to_string()
                }
            }
        })
    }
}

impl LinkRewriter for BaseUrlLinkRewriter {
    fn absolutize_links(&self, html: &str) -> String {
        let Some(base) = &self.base else {
            return html.to_string();
        };
        let html = self.rewrite(base, &IMG_SRC, html);
        let html = self.rewrite(base, &A_HREF, &html).into_owned();
        self.rewrite(base, &STYLE_URL, &html).into_owned()
    }
}

/// Apply `rewriter` to every rendered string, keeping ids and order.
pub fn post_process(results: RenderResult, rewriter: &dyn LinkRewriter) -> RenderResult {
    results
        .into_iter()
        .map(|(id, html)| {
            let rewritten = rewriter.absolutize_links(&html);
            (id, rewritten)
        })
        .collect()
}
