/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Renders sandboxed templates against a JSON record store
 */

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(version)]
#[command(about = "Render sandboxed templates against stored records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template for a batch of records and print the results as JSON
    Render {
        /// JSON record store
        #[arg(long)]
        store: PathBuf,

        /// Model the records belong to
        #[arg(long)]
        model: String,

        /// Record ids as a JSON array, e.g. '[1, 2, 3]'
        #[arg(long)]
        ids: String,

        /// Template file
        #[arg(long)]
        template: PathBuf,

        /// Render context as a JSON object, e.g. '{"lang": "fr_FR"}'
        #[arg(long)]
        context: Option<String>,

        /// Acting user id, bound as `user`
        #[arg(long)]
        user: Option<i64>,

        /// Resolve site-relative links against the base URL
        #[arg(long)]
        post_process: bool,

        /// Base URL for post-processing (overrides the config file)
        #[arg(long)]
        base_url: Option<String>,

        /// Template engine
        #[arg(long, default_value = stencil_render::ENGINE)]
        engine: String,

        /// TOML settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Build a placeholder expression for a field path
    Placeholder {
        /// Field of the rendered record
        field: String,

        /// Field of the related record, for relational fields
        #[arg(long)]
        sub_field: Option<String>,

        /// Text used when the value is empty
        #[arg(long)]
        default: Option<String>,
    },

    /// List the fields of a model templates may read
    Fields {
        /// JSON record store
        #[arg(long)]
        store: PathBuf,

        /// Model to list
        #[arg(long)]
        model: String,

        /// Only list fields starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stencil=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            store,
            model,
            ids,
            template,
            context,
            user,
            post_process,
            base_url,
            engine,
            config,
        } => commands::render::execute(commands::render::RenderArgs {
            store,
            model,
            ids,
            template,
            context,
            user,
            post_process,
            base_url,
            engine,
            config,
        }),
        Commands::Placeholder {
            field,
            sub_field,
            default,
        } => commands::placeholder::execute(commands::placeholder::PlaceholderArgs {
            field,
            sub_field,
            default,
        }),
        Commands::Fields {
            store,
            model,
            prefix,
        } => commands::fields::execute(commands::fields::FieldsArgs {
            store,
            model,
            prefix,
        }),
    }
}
