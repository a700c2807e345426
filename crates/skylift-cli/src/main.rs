//! skylift - signed iOS app distribution

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use skylift_cli::cmd;
use skylift_cli::{CertCommands, Cli, Commands, NewsCommands};
use skylift_core::{ArtifactPatch, Config, Engine, NewArtifact};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let engine = Engine::start(Config::from_env()).context("failed to start engine")?;
    let caller = engine.authenticate(&cli.token)?;

    match cli.command {
        Commands::Upload {
            file,
            name,
            bundle_id,
            version,
            developer,
            support_email,
            description,
            changelog,
            icon_url,
            sync,
        } => {
            let meta = NewArtifact {
                app_name: name,
                bundle_id,
                version,
                developer,
                support_email,
                description,
                changelog,
                icon_url,
                screenshot_urls: None,
            };
            cmd::upload::upload(&engine, &caller, &file, meta, sync).await
        }
        Commands::Edit {
            id,
            file,
            name,
            version,
            developer,
            support_email,
            description,
            changelog,
            icon_url,
        } => {
            let patch = ArtifactPatch {
                app_name: name,
                version,
                developer,
                support_email,
                description,
                changelog,
                icon_url,
                screenshot_urls: None,
            };
            cmd::edit::edit(&engine, &caller, id.parse()?, patch, file.as_deref()).await
        }
        Commands::Remove { id } => cmd::remove::remove(&engine, &caller, id.parse()?).await,
        Commands::List { json } => cmd::list::list(&engine, json).await,
        Commands::Sign { id, cert } => cmd::sign::sign(&engine, &caller, id.parse()?, cert).await,
        Commands::Cert { command } => match command {
            CertCommands::Add {
                name,
                key,
                profile,
                password,
                description,
            } => cmd::cert::add(&engine, &caller, &name, &key, &profile, password, description)
                .await,
            CertCommands::List { all } => cmd::cert::list(&engine, all).await,
            CertCommands::Deactivate { id } => cmd::cert::deactivate(&engine, &caller, id).await,
            CertCommands::Remove { id } => cmd::cert::remove(&engine, &caller, id).await,
        },
        Commands::Sync { id } => cmd::sync::sync(&engine, &caller, id.parse()?).await,
        Commands::News { command } => match command {
            NewsCommands::Add {
                identifier,
                title,
                caption,
                app_id,
                image_url,
                notify,
            } => {
                cmd::news::add(
                    &engine, &caller, identifier, title, caption, app_id, image_url, notify,
                )
                .await
            }
            NewsCommands::Remove { identifier } => {
                cmd::news::remove(&engine, &caller, &identifier).await
            }
        },
        Commands::Render => cmd::render::render(&engine).await,
    }
}
