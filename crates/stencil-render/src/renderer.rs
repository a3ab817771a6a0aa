/*
 * renderer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Batch rendering of one template against many records.
//!
//! [`Renderer::render`] validates the request, compiles the template once
//! through the selected environment, fetches the records in one store call
//! and evaluates the template per record with a fresh binding context. A
//! template that fails to compile yields empty output for every record; an
//! evaluation failure aborts the whole batch.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use stencil_template::{Environment, Template, TemplateError, Value};

use crate::binding::{ContextBuilder, RenderContext};
use crate::config::RenderSettings;
use crate::environments;
use crate::error::{ConfigError, InputValidationError, RenderError};
use crate::formatting::{BasicFormatter, FormatDefaults, LocaleFormatter, format_helpers};
use crate::postprocess::{BaseUrlLinkRewriter, LinkRewriter, post_process};
use crate::record::RecordStore;
use crate::record_view::RecordView;

/// The only supported engine name.
pub const ENGINE: &str = "jinja";

/// Model of the acting user bound as `user`.
pub const USER_MODEL: &str = "res.users";

/// Rendered output keyed by record id, in first-occurrence order.
pub type RenderResult = IndexMap<i64, String>;

/// The record ids of a request, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelection {
    /// A bare id. Always rejected: rendering requires a list.
    One(i64),
    Many(Vec<Option<i64>>),
}

impl IdSelection {
    /// Interpret a JSON value: an array of ids or nulls, or a single id.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, InputValidationError> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Null => Ok(None),
                    other => other.as_i64().map(Some).ok_or(InputValidationError::NotAList),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(IdSelection::Many),
            other => other
                .as_i64()
                .map(IdSelection::One)
                .ok_or(InputValidationError::NotAList),
        }
    }

    /// The ids with duplicates removed, keeping first occurrences.
    pub fn validate(&self) -> Result<Vec<i64>, InputValidationError> {
        let ids = match self {
            IdSelection::One(_) => return Err(InputValidationError::NotAList),
            IdSelection::Many(ids) => ids,
        };
        let mut unique = IndexSet::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            let id = id.ok_or(InputValidationError::NullId { position })?;
            unique.insert(id);
        }
        Ok(unique.into_iter().collect())
    }
}

impl From<Vec<i64>> for IdSelection {
    fn from(ids: Vec<i64>) -> Self {
        IdSelection::Many(ids.into_iter().map(Some).collect())
    }
}

impl From<&[i64]> for IdSelection {
    fn from(ids: &[i64]) -> Self {
        IdSelection::Many(ids.iter().copied().map(Some).collect())
    }
}

impl From<Vec<Option<i64>>> for IdSelection {
    fn from(ids: Vec<Option<i64>>) -> Self {
        IdSelection::Many(ids)
    }
}

impl From<i64> for IdSelection {
    fn from(id: i64) -> Self {
        IdSelection::One(id)
    }
}

/// One render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub template: String,
    pub model: String,
    pub ids: IdSelection,
    pub engine: String,
    pub post_process: bool,
    pub context: RenderContext,
}

impl RenderRequest {
    pub fn new(
        template: impl Into<String>,
        model: impl Into<String>,
        ids: impl Into<IdSelection>,
    ) -> Self {
        Self {
            template: template.into(),
            model: model.into(),
            ids: ids.into(),
            engine: ENGINE.to_string(),
            post_process: false,
            context: RenderContext::default(),
        }
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn post_process(mut self, post_process: bool) -> Self {
        self.post_process = post_process;
        self
    }

    pub fn context(mut self, context: RenderContext) -> Self {
        self.context = context;
        self
    }
}

/// Renders templates against records of a [`RecordStore`].
#[derive(Clone)]
pub struct Renderer {
    store: Arc<dyn RecordStore>,
    formatter: Arc<dyn LocaleFormatter>,
    link_rewriter: Arc<dyn LinkRewriter>,
    settings: RenderSettings,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("formatter", &self.formatter)
            .field("link_rewriter", &self.link_rewriter)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Renderer {
    /// A renderer using the built-in formatter and a base-URL link rewriter.
    pub fn new(store: Arc<dyn RecordStore>, settings: RenderSettings) -> Result<Self, ConfigError> {
        let link_rewriter = BaseUrlLinkRewriter::new(settings.base_url.as_deref())?;
        if settings.cache_capacity.is_some()
            && !environments::configure_cache_capacity(settings.cache_capacity)
        {
            tracing::debug!("template environments already built, cache capacity unchanged");
        }
        Ok(Self {
            store,
            formatter: Arc::new(BasicFormatter),
            link_rewriter: Arc::new(link_rewriter),
            settings,
        })
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn LocaleFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_link_rewriter(mut self, link_rewriter: Arc<dyn LinkRewriter>) -> Self {
        self.link_rewriter = link_rewriter;
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Render `request.template` for every requested record.
    ///
    /// The result holds exactly one entry per distinct id. Invalid requests
    /// and store failures are returned as errors; a template that does not
    /// compile is logged and rendered as empty strings; the first evaluation
    /// failure in input order aborts the batch.
    pub fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let ids = request.ids.validate()?;
        if request.engine != ENGINE {
            return Err(InputValidationError::UnsupportedEngine {
                engine: request.engine.clone(),
            }
            .into());
        }

        let empty = || ids.iter().map(|id| (*id, String::new())).collect::<RenderResult>();
        if request.template.is_empty() {
            return Ok(empty());
        }

        let env = environments::select(request.context.is_safe());
        let template = match env.from_string(&request.template) {
            Ok(template) => template,
            Err(error) => {
                tracing::warn!(
                    model = %request.model,
                    template = %request.template,
                    %error,
                    "failed to compile template"
                );
                return Ok(empty());
            }
        };
        if ids.is_empty() {
            return Ok(RenderResult::new());
        }

        tracing::debug!(model = %request.model, records = ids.len(), "rendering batch");
        let records = RecordView::load(&self.store, &request.model, &ids)?;
        let builder = self.context_builder(&request.context)?;

        let rendered = self.evaluate(env, &template, &builder, &records);
        let mut results = RenderResult::with_capacity(ids.len());
        for (id, outcome) in ids.iter().zip(rendered) {
            match outcome {
                Ok(text) => {
                    results.insert(*id, text);
                }
                Err(error) => {
                    tracing::warn!(
                        model = %request.model,
                        record_id = id,
                        %error,
                        "failed to render template"
                    );
                    return Err(RenderError::Evaluation {
                        model: request.model.clone(),
                        id: *id,
                        source: error,
                    });
                }
            }
        }

        if request.post_process {
            results = post_process(results, self.link_rewriter.as_ref());
        }
        tracing::debug!(model = %request.model, records = results.len(), "batch rendered");
        Ok(results)
    }

    fn context_builder(&self, context: &RenderContext) -> Result<ContextBuilder, RenderError> {
        let user = match context.user_id {
            Some(user_id) => RecordView::load(&self.store, USER_MODEL, &[user_id])?
                .into_iter()
                .next()
                .map_or(Value::None, |user| Value::Object(user)),
            None => Value::None,
        };
        let defaults = FormatDefaults {
            lang: context.lang().unwrap_or(&self.settings.default_lang).to_string(),
            tz: context.tz().unwrap_or(&self.settings.default_tz).to_string(),
        };
        let helpers = format_helpers(Arc::clone(&self.formatter), defaults);
        Ok(ContextBuilder::new(user, context.to_value(), helpers))
    }

    /// Evaluate every record, in parallel for large batches. Results are in
    /// record order.
    fn evaluate(
        &self,
        env: &Environment,
        template: &Template,
        builder: &ContextBuilder,
        records: &[Arc<RecordView>],
    ) -> Vec<Result<String, TemplateError>> {
        let render_one = |record: &Arc<RecordView>| {
            let bindings = builder.bind(Value::Object(record.clone()));
            env.render(template, &bindings).map(collapse_false)
        };
        let parallel = self
            .settings
            .parallel_threshold
            .is_some_and(|threshold| records.len() >= threshold.max(1));
        if parallel {
            records.par_iter().map(render_one).collect()
        } else {
            records.iter().map(render_one).collect()
        }
    }
}

/// A template whose whole output is `False` renders as empty.
fn collapse_false(rendered: String) -> String {
    if rendered == "False" {
        String::new()
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryRecordStore;
    use crate::record::{FieldSchema, FieldType, RecordData};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn renderer() -> Renderer {
        let store = MemoryRecordStore::new()
            .with_model(
                "res.partner",
                vec![
                    FieldSchema::new("name", FieldType::Char),
                    FieldSchema::new("is_company", FieldType::Boolean),
                    FieldSchema::new("website", FieldType::Char),
                    FieldSchema::new("password", FieldType::Char).private(),
                ],
            )
            .with_model("res.users", vec![FieldSchema::new("login", FieldType::Char)])
            .with_record(
                "res.partner",
                RecordData::new(1)
                    .with("name", json!("Azure <Interior>"))
                    .with("is_company", json!(true))
                    .with("website", json!("/contactus")),
            )
            .and_then(|s| {
                s.with_record(
                    "res.partner",
                    RecordData::new(2).with("name", json!("Deco Addict")),
                )
            })
            .and_then(|s| {
                s.with_record("res.users", RecordData::new(7).with("login", json!("admin")))
            })
            .unwrap();
        Renderer::new(Arc::new(store), RenderSettings::default()).unwrap()
    }

    fn render(request: RenderRequest) -> Result<RenderResult, RenderError> {
        renderer().render(&request)
    }

    fn expected(pairs: &[(i64, &str)]) -> RenderResult {
        pairs.iter().map(|(id, s)| (*id, s.to_string())).collect()
    }

    #[test]
    fn test_renders_each_record() {
        let request = RenderRequest::new("Dear ${object.name}", "res.partner", vec![2_i64, 1]);
        let out = render(request).unwrap();
        assert_eq!(
            out,
            expected(&[(2, "Dear Deco Addict"), (1, "Dear Azure &lt;Interior&gt;")])
        );
    }

    #[test]
    fn test_safe_context_selects_raw_environment() {
        let request = RenderRequest::new("${object.name}", "res.partner", vec![1_i64])
            .context(RenderContext::new().with_value("safe", json!(true)));
        assert_eq!(render(request).unwrap(), expected(&[(1, "Azure <Interior>")]));
    }

    #[test]
    fn test_scalar_id_is_rejected_before_fetching() {
        let err = render(RenderRequest::new("${object.name}", "no.such.model", 1_i64)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Validation(InputValidationError::NotAList)
        ));
        assert_eq!(
            err.to_string(),
            "Template rendering should be called only using on a list of IDs."
        );
    }

    #[test]
    fn test_null_id_is_rejected() {
        let ids: Vec<Option<i64>> = vec![Some(1), None];
        let err = render(RenderRequest::new("x", "res.partner", ids)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Validation(InputValidationError::NullId { position: 1 })
        ));
    }

    #[test]
    fn test_unsupported_engine() {
        let request = RenderRequest::new("x", "res.partner", vec![1_i64]).engine("qweb");
        let err = render(request).unwrap_err();
        assert_eq!(err.to_string(), "Template rendering supports only jinja.");
    }

    #[test]
    fn test_empty_template_and_empty_ids() {
        assert_eq!(
            render(RenderRequest::new("", "res.partner", vec![1_i64, 2])).unwrap(),
            expected(&[(1, ""), (2, "")])
        );
        assert_eq!(
            render(RenderRequest::new("${object.name}", "res.partner", Vec::<i64>::new())).unwrap(),
            RenderResult::new()
        );
    }

    #[test]
    fn test_compile_failure_yields_empty_results() {
        let out = render(RenderRequest::new("<% if %>", "res.partner", vec![1_i64, 2])).unwrap();
        assert_eq!(out, expected(&[(1, ""), (2, "")]));

        let chain = format!("${{1{}}}", "+1".repeat(50_000));
        let out = render(RenderRequest::new(chain, "res.partner", vec![1_i64])).unwrap();
        assert_eq!(out, expected(&[(1, "")]));
    }

    #[test]
    fn test_evaluation_failure_aborts_batch() {
        let err = render(RenderRequest::new("${object.password}", "res.partner", vec![2_i64, 1]))
            .unwrap_err();
        assert_eq!(err.record_id(), Some(2));
        assert_eq!(
            err.to_string(),
            "Failed to render template : access to attribute 'password' is forbidden"
        );
    }

    #[test]
    fn test_false_collapses_to_empty() {
        let out = render(RenderRequest::new("${object.is_company}", "res.partner", vec![1_i64, 2]))
            .unwrap();
        assert_eq!(out, expected(&[(1, "True"), (2, "")]));
    }

    #[test]
    fn test_duplicates_collapse_in_first_occurrence_order() {
        let request = RenderRequest::new("${object.id}", "res.partner", vec![2_i64, 1, 2]);
        let out = render(request).unwrap();
        assert_eq!(out, expected(&[(2, "2"), (1, "1")]));
    }

    #[test]
    fn test_missing_record_is_a_store_error() {
        let request = RenderRequest::new("${object.name}", "res.partner", vec![1_i64, 42]);
        let err = render(request).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Store(StoreError::MissingRecord { id: 42, .. })
        ));
    }

    #[test]
    fn test_user_and_ctx_bindings() {
        let request = RenderRequest::new(
            "${user.login}/${ctx.get('origin', 'none')}/${ctx.lang}",
            "res.partner",
            vec![1_i64],
        )
        .context(
            RenderContext::new()
                .with_user(7)
                .with_value("lang", json!("fr_FR")),
        );
        assert_eq!(render(request).unwrap(), expected(&[(1, "admin/none/fr_FR")]));

        let user_id = RenderRequest::new("${user.id}", "res.partner", vec![1_i64])
            .context(RenderContext::new().with_user(7));
        assert_eq!(render(user_id).unwrap(), expected(&[(1, "7")]));

        let anonymous = RenderRequest::new("[${user.login}]", "res.partner", vec![1_i64]);
        assert_eq!(render(anonymous).unwrap(), expected(&[(1, "[]")]));
    }

    #[test]
    fn test_post_processing_rewrites_links() {
        let store = renderer().store().clone();
        let settings = RenderSettings {
            base_url: Some("https://www.example.com".to_string()),
            ..RenderSettings::default()
        };
        let renderer = Renderer::new(store, settings).unwrap();
        let template = r#"<a href="${object.website}">site</a>"#;

        let request = RenderRequest::new(template, "res.partner", vec![1_i64]).post_process(true);
        assert_eq!(
            renderer.render(&request).unwrap(),
            expected(&[(1, r#"<a href="https://www.example.com/contactus">site</a>"#)])
        );

        let request = RenderRequest::new(template, "res.partner", vec![1_i64]);
        assert_eq!(
            renderer.render(&request).unwrap(),
            expected(&[(1, r#"<a href="/contactus">site</a>"#)])
        );
    }

    #[test]
    fn test_parallel_batches_match_sequential() {
        let sequential = renderer();
        let parallel = Renderer::new(
            sequential.store().clone(),
            RenderSettings {
                parallel_threshold: Some(1),
                ..RenderSettings::default()
            },
        )
        .unwrap();
        let request =
            RenderRequest::new("${object.name}|${object.id}", "res.partner", vec![1_i64, 2]);
        assert_eq!(
            parallel.render(&request).unwrap(),
            sequential.render(&request).unwrap()
        );
    }

    #[test]
    fn test_id_selection_from_json() {
        assert_eq!(
            IdSelection::from_json(&json!([1, null, 3])).unwrap(),
            IdSelection::Many(vec![Some(1), None, Some(3)])
        );
        assert_eq!(IdSelection::from_json(&json!(5)).unwrap(), IdSelection::One(5));
        assert_eq!(
            IdSelection::from_json(&json!("1,2")).unwrap_err(),
            InputValidationError::NotAList
        );
    }
}
