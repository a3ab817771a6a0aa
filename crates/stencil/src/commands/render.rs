/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render command implementation
 */

//! Render command implementation.
//!
//! Loads the record store and settings, renders the template for every
//! requested id and prints a JSON object mapping ids to rendered text.
//! Flags given on the command line take precedence over the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use stencil_render::{
    IdSelection, MemoryRecordStore, RenderContext, RenderRequest, RenderResult, RenderSettings,
    Renderer,
};

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    /// JSON record store
    pub store: PathBuf,
    /// Model of the rendered records
    pub model: String,
    /// Record ids, as JSON
    pub ids: String,
    /// Template file
    pub template: PathBuf,
    /// Render context, as a JSON object
    pub context: Option<String>,
    /// Acting user id
    pub user: Option<i64>,
    pub post_process: bool,
    pub base_url: Option<String>,
    pub engine: String,
    /// TOML settings file
    pub config: Option<PathBuf>,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    let results = run(&args)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&results).context("Failed to serialize results")?
    );
    Ok(())
}

fn settings(args: &RenderArgs) -> Result<RenderSettings> {
    let mut settings = match &args.config {
        Some(path) => RenderSettings::from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => RenderSettings::default(),
    };
    if let Some(base_url) = &args.base_url {
        settings.base_url = Some(base_url.clone());
        settings.validate().context("Invalid --base-url")?;
    }
    Ok(settings)
}

fn context(args: &RenderArgs) -> Result<RenderContext> {
    let json = match &args.context {
        Some(source) => serde_json::from_str(source).context("--context is not valid JSON")?,
        None => serde_json::Value::Null,
    };
    RenderContext::from_json(args.user, json)
        .ok_or_else(|| anyhow::anyhow!("--context must be a JSON object"))
}

fn run(args: &RenderArgs) -> Result<RenderResult> {
    let settings = settings(args)?;
    let store = MemoryRecordStore::from_path(&args.store)
        .with_context(|| format!("Failed to load record store {}", args.store.display()))?;
    let template = std::fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let ids: serde_json::Value =
        serde_json::from_str(&args.ids).context("--ids is not valid JSON")?;
    let ids = IdSelection::from_json(&ids)?;

    let request = RenderRequest::new(template, args.model.as_str(), ids)
        .engine(args.engine.as_str())
        .post_process(args.post_process)
        .context(context(args)?);
    debug!(model = %args.model, template = %args.template.display(), "rendering");

    let renderer = Renderer::new(Arc::new(store), settings)?;
    let results = renderer.render(&request)?;
    info!(model = %args.model, records = results.len(), "rendered");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const STORE: &str = r#"{
        "models": {
            "res.partner": {
                "fields": [
                    {"name": "name", "type": "char"},
                    {"name": "website", "type": "char"}
                ],
                "records": [
                    {"id": 1, "name": "Azure Interior", "website": "/contactus"},
                    {"id": 2, "name": "Deco Addict", "website": false}
                ]
            }
        }
    }"#;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    fn args(store: &NamedTempFile, template: &NamedTempFile, ids: &str) -> RenderArgs {
        RenderArgs {
            store: store.path().to_path_buf(),
            model: "res.partner".to_string(),
            ids: ids.to_string(),
            template: template.path().to_path_buf(),
            context: None,
            user: None,
            post_process: false,
            base_url: None,
            engine: stencil_render::ENGINE.to_string(),
            config: None,
        }
    }

    #[test]
    fn test_run_renders_in_request_order() {
        let store = write_temp(STORE);
        let template = write_temp("Hello ${object.name}");
        let results = run(&args(&store, &template, "[2, 1]")).unwrap();
        assert_eq!(
            serde_json::to_string(&results).unwrap(),
            r#"{"2":"Hello Deco Addict","1":"Hello Azure Interior"}"#
        );
    }

    #[test]
    fn test_base_url_flag_overrides_config() {
        let store = write_temp(STORE);
        let template = write_temp(r#"<a href="${object.website}">site</a>"#);
        let config = write_temp("base_url = \"https://config.example.com\"\n");
        let mut args = args(&store, &template, "[1]");
        args.config = Some(config.path().to_path_buf());
        args.post_process = true;

        let results = run(&args).unwrap();
        assert_eq!(
            results[&1],
            r#"<a href="https://config.example.com/contactus">site</a>"#
        );

        args.base_url = Some("https://flag.example.com".to_string());
        let results = run(&args).unwrap();
        assert_eq!(
            results[&1],
            r#"<a href="https://flag.example.com/contactus">site</a>"#
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let store = write_temp(STORE);
        let template = write_temp("${object.name}");

        let err = run(&args(&store, &template, "1")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Template rendering should be called only using on a list of IDs."
        );

        let mut bad_context = args(&store, &template, "[1]");
        bad_context.context = Some("[1]".to_string());
        assert!(run(&bad_context).is_err());

        let mut bad_engine = args(&store, &template, "[1]");
        bad_engine.engine = "qweb".to_string();
        assert!(run(&bad_engine).is_err());
    }
}
