//! Engine configuration.
//!
//! Everything is environment-driven (`SKYLIFT_*`), with the data
//! directory defaulting to `~/.skylift`:
//!
//! ```text
//! ~/.skylift/
//! ├── blobs/           # Stored binaries, one file per artifact id
//! ├── certs/           # Signing credentials, one directory per certificate
//! ├── tmp/             # Scratch space (same volume as blobs)
//! ├── public/          # Rendered repository + install manifests
//! ├── repository.json  # The owned repository manifest document
//! └── registry.db      # SQLite catalog
//! ```

use std::path::PathBuf;

/// Engine configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all on-disk state.
    pub data_dir: PathBuf,
    /// Public base URL every published link is derived from.
    pub base_url: String,
    /// Display name of the published repository.
    pub repo_name: String,
    /// Reverse-DNS identifier of the published repository.
    pub repo_identifier: String,
    /// Upload ceiling enforced at the public edge.
    pub max_upload_bytes: u64,
    /// Total storage quota reported against `list()`.
    pub storage_quota_bytes: u64,
    /// External re-signing command (zsign-compatible flag surface).
    pub signer_program: String,
    /// Bound on one signer invocation.
    pub signer_timeout_secs: u64,
    /// URL-shortening service endpoint; `None` disables shortening.
    pub shortener_endpoint: Option<String>,
    /// Bound on one shortening call.
    pub shortener_timeout_secs: u64,
    /// Shared caller token; `None` trusts the local operator.
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from `SKYLIFT_*` environment variables,
    /// falling back to defaults suitable for a single-operator setup.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("SKYLIFT_HOME").map_or_else(
            |_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".skylift")
            },
            PathBuf::from,
        );

        Self {
            data_dir,
            base_url: env_string("SKYLIFT_BASE_URL", "http://127.0.0.1:8040"),
            repo_name: env_string("SKYLIFT_REPO_NAME", "Skylift"),
            repo_identifier: env_string("SKYLIFT_REPO_ID", "dev.skylift.repo"),
            max_upload_bytes: env_u64("SKYLIFT_MAX_UPLOAD_BYTES", 512 * 1024 * 1024),
            storage_quota_bytes: env_u64("SKYLIFT_QUOTA_BYTES", 20 * 1024 * 1024 * 1024),
            signer_program: env_string("SKYLIFT_SIGNER_CMD", "zsign"),
            signer_timeout_secs: env_u64("SKYLIFT_SIGNER_TIMEOUT_SECS", 120),
            shortener_endpoint: std::env::var("SKYLIFT_SHORTENER_URL").ok(),
            shortener_timeout_secs: env_u64("SKYLIFT_SHORTENER_TIMEOUT_SECS", 5),
            api_token: std::env::var("SKYLIFT_API_TOKEN").ok(),
        }
    }

    /// A configuration rooted at an explicit directory (for testing).
    pub fn for_dir(data_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            base_url: base_url.into(),
            repo_name: "Skylift".to_string(),
            repo_identifier: "dev.skylift.repo".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
            storage_quota_bytes: 20 * 1024 * 1024 * 1024,
            signer_program: "zsign".to_string(),
            signer_timeout_secs: 120,
            shortener_endpoint: None,
            shortener_timeout_secs: 5,
            api_token: None,
        }
    }

    /// Stored binaries: `<data_dir>/blobs`.
    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    /// Signing credentials: `<data_dir>/certs`.
    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir.join("certs")
    }

    /// Scratch space, guaranteed same volume as the blob store.
    pub fn tmp_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    /// Rendered documents for serving: `<data_dir>/public`.
    pub fn public_dir(&self) -> PathBuf {
        self.data_dir.join("public")
    }

    /// The owned repository manifest document.
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("repository.json")
    }

    /// SQLite catalog.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }

    /// Create the on-disk layout.
    ///
    /// # Errors
    ///
    /// Returns the first directory creation failure.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.blobs_dir(),
            self.certs_dir(),
            self.tmp_dir(),
            self.public_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_data_dir() {
        let config = Config::for_dir("/tmp/skylift-test", "https://repo.test");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/skylift-test/registry.db"));
        assert_eq!(config.blobs_dir(), PathBuf::from("/tmp/skylift-test/blobs"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("/tmp/skylift-test/repository.json")
        );
    }
}
