//! skylift - signed iOS app distribution
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Operator CLI over the skylift engine: upload and edit artifacts,
//! manage signing certificates, run the signing pipeline, and keep the
//! published repository manifest in sync.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "skylift")]
#[command(author, version, about = "skylift - signed iOS app distribution")]
pub struct Cli {
    /// Caller token presented to the engine's verifier
    #[arg(long, global = true, env = "SKYLIFT_TOKEN", default_value = "")]
    pub token: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a binary and register it as an artifact
    Upload {
        /// Path to the .ipa file
        file: PathBuf,
        /// Display name (read from the package when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Bundle identifier, cross-checked against the package
        #[arg(long)]
        bundle_id: Option<String>,
        /// Version string (read from the package when omitted)
        #[arg(long)]
        version: Option<String>,
        /// Developer name
        #[arg(long)]
        developer: Option<String>,
        /// Support contact
        #[arg(long)]
        support_email: Option<String>,
        /// Description shown on the app page
        #[arg(long)]
        description: Option<String>,
        /// Changelog for this upload
        #[arg(long)]
        changelog: Option<String>,
        /// Icon URL
        #[arg(long)]
        icon_url: Option<String>,
        /// Also merge the new artifact into the repository manifest
        #[arg(long)]
        sync: bool,
    },
    /// Edit artifact metadata and/or replace its binary
    Edit {
        /// Artifact id
        id: String,
        /// Replacement .ipa file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        developer: Option<String>,
        #[arg(long)]
        support_email: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        changelog: Option<String>,
        #[arg(long)]
        icon_url: Option<String>,
    },
    /// Delete an artifact (blob, record, and manifest entries)
    Remove {
        /// Artifact id
        id: String,
    },
    /// List artifacts with links and storage totals
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Re-sign an artifact with a certificate
    Sign {
        /// Artifact id
        id: String,
        /// Certificate id
        #[arg(long)]
        cert: i64,
    },
    /// Manage signing certificates
    Cert {
        #[command(subcommand)]
        command: CertCommands,
    },
    /// Merge an artifact snapshot into the repository manifest
    Sync {
        /// Artifact id
        id: String,
    },
    /// Manage repository news items
    News {
        #[command(subcommand)]
        command: NewsCommands,
    },
    /// Render the repository manifest and per-artifact install manifests
    Render,
}

#[derive(Debug, Subcommand)]
pub enum CertCommands {
    /// Register a signing identity from its credential files
    Add {
        /// Operator-facing name
        name: String,
        /// Private-key bundle (.p12)
        #[arg(long)]
        key: PathBuf,
        /// Provisioning profile (.mobileprovision)
        #[arg(long)]
        profile: PathBuf,
        /// Password for the key bundle
        #[arg(long)]
        password: Option<String>,
        /// Free-form notes
        #[arg(long)]
        description: Option<String>,
    },
    /// List certificates
    List {
        /// Include deactivated certificates
        #[arg(long)]
        all: bool,
    },
    /// Deactivate a certificate without deleting its credentials
    Deactivate {
        /// Certificate id
        id: i64,
    },
    /// Delete a certificate and its credential files (irreversible)
    Remove {
        /// Certificate id
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum NewsCommands {
    /// Add or replace a news item
    Add {
        /// Unique identifier of the item
        identifier: String,
        /// Headline
        #[arg(long)]
        title: String,
        /// Subheadline
        #[arg(long, default_value = "")]
        caption: String,
        /// Associated app bundle identifier
        #[arg(long)]
        app_id: Option<String>,
        /// Banner image URL
        #[arg(long)]
        image_url: Option<String>,
        /// Ask installer clients to push-notify this item
        #[arg(long)]
        notify: bool,
    },
    /// Remove a news item
    Remove {
        /// Identifier of the item
        identifier: String,
    },
}
