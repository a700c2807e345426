//! Domain records shared across the engine.

use serde::{Deserialize, Serialize};
use skylift_schema::ArtifactId;

/// One uploaded binary generation plus its metadata.
///
/// The `id` and `slug` are minted at upload time and never change;
/// every published link embeds them. Metadata edits, binary replacement,
/// and re-signs all mutate the record in place under the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable identifier, derived from the upload timestamp.
    pub id: ArtifactId,
    /// URL slug derived once from the initial app name.
    pub slug: String,
    /// Display name.
    pub app_name: String,
    /// Bundle identifier of the packaged app.
    pub bundle_id: String,
    /// Version string as uploaded (free-form).
    pub version: String,
    /// Developer shown on the app page.
    pub developer: String,
    /// Support contact.
    pub support_email: String,
    /// Full description.
    pub description: String,
    /// Changelog for this generation.
    pub changelog: String,
    /// App icon URL.
    pub icon_url: String,
    /// Screenshot gallery.
    pub screenshot_urls: Vec<String>,
    /// Minimum OS requirement read from the package.
    pub min_os_version: String,
    /// Size of the stored binary in bytes.
    pub size_bytes: u64,
    /// blake3 fingerprint of the stored binary.
    pub checksum: String,
    /// Unix milliseconds of upload.
    pub created_at: i64,
    /// Unix milliseconds of the last mutation.
    pub updated_at: i64,
    /// Unix milliseconds of the last successful sign, if any.
    pub signed_at: Option<i64>,
}

/// Metadata supplied alongside an uploaded binary.
///
/// Fields left `None` are filled from the package's own `Info.plist`
/// where possible.
#[derive(Debug, Clone, Default)]
pub struct NewArtifact {
    /// Display name; falls back to the package's own.
    pub app_name: Option<String>,
    /// Bundle identifier, cross-checked against the package.
    pub bundle_id: Option<String>,
    /// Version string; falls back to the package's own.
    pub version: Option<String>,
    /// Developer shown on the app page.
    pub developer: Option<String>,
    /// Support contact.
    pub support_email: Option<String>,
    /// Full description.
    pub description: Option<String>,
    /// Changelog for this upload.
    pub changelog: Option<String>,
    /// App icon URL.
    pub icon_url: Option<String>,
    /// Screenshot gallery.
    pub screenshot_urls: Option<Vec<String>>,
}

/// Partial metadata update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPatch {
    /// New display name.
    pub app_name: Option<String>,
    /// New version string.
    pub version: Option<String>,
    /// New developer name.
    pub developer: Option<String>,
    /// New support contact.
    pub support_email: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New changelog.
    pub changelog: Option<String>,
    /// New icon URL.
    pub icon_url: Option<String>,
    /// New screenshot gallery (replaces the whole list).
    pub screenshot_urls: Option<Vec<String>>,
}

impl ArtifactPatch {
    /// Merge the patch into a record. The id, slug, bundle id, and
    /// timestamps are never touched here.
    pub fn apply(&self, artifact: &mut Artifact) {
        let fields = [
            (&self.app_name, &mut artifact.app_name),
            (&self.version, &mut artifact.version),
            (&self.developer, &mut artifact.developer),
            (&self.support_email, &mut artifact.support_email),
            (&self.description, &mut artifact.description),
            (&self.changelog, &mut artifact.changelog),
            (&self.icon_url, &mut artifact.icon_url),
        ];
        for (patch, field) in fields {
            if let Some(value) = patch {
                field.clone_from(value);
            }
        }
        if let Some(urls) = &self.screenshot_urls {
            artifact.screenshot_urls.clone_from(urls);
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.app_name.is_none()
            && self.version.is_none()
            && self.developer.is_none()
            && self.support_email.is_none()
            && self.description.is_none()
            && self.changelog.is_none()
            && self.icon_url.is_none()
            && self.screenshot_urls.is_none()
    }
}

/// A signing identity: a private-key bundle plus a provisioning profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// Catalog id.
    pub id: i64,
    /// Operator-facing name.
    pub name: String,
    /// Path to the private-key bundle on disk.
    pub key_path: String,
    /// Path to the provisioning profile on disk.
    pub profile_path: String,
    /// Password for the key bundle, if it has one.
    pub password: Option<String>,
    /// Only active certificates are offered for signing.
    pub is_active: bool,
    /// Free-form notes.
    pub description: String,
    /// Unix milliseconds of creation.
    pub created_at: i64,
}

/// Partial certificate update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CertificatePatch {
    /// New operator-facing name.
    pub name: Option<String>,
    /// New notes.
    pub description: Option<String>,
    /// New key-bundle password.
    pub password: Option<String>,
    /// Activate or deactivate the certificate.
    pub is_active: Option<bool>,
}

/// Storage accounting reported by `list()`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StorageTotals {
    /// Bytes consumed by stored binaries.
    pub used_bytes: u64,
    /// Configured ceiling.
    pub quota_bytes: u64,
}

/// Result of listing the registry: records plus storage accounting.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryListing {
    /// All artifact records, oldest first.
    pub artifacts: Vec<Artifact>,
    /// Used-vs-quota totals.
    pub totals: StorageTotals,
}
