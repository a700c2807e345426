//! skylift-schema - Shared types and wire formats for skylift
//!
//! This crate defines everything that crosses a process or network
//! boundary: the artifact identifier, the installer-facing repository
//! manifest (and the tagged operations that mutate it), and the
//! per-artifact OTA install manifest.
//!
//! The repository manifest is served verbatim to third-party installer
//! clients, so its field names follow that ecosystem's `camelCase` JSON
//! convention rather than Rust's.

pub mod ids;
pub mod install;
pub mod repo;

pub use ids::ArtifactId;
pub use install::InstallManifest;
pub use repo::{AppEntry, AppVersion, ManifestOp, NewsItem, RepoError, RepositoryManifest};
