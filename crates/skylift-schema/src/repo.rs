//! Installer repository manifest.
//!
//! The repository manifest is the published catalog that third-party
//! installer clients fetch to discover available apps, versions, and news.
//! It is a single owned document: every mutation goes through a tagged
//! [`ManifestOp`] applied by [`RepositoryManifest::apply`], and the
//! document must pass [`RepositoryManifest::validate`] before it is ever
//! written or served. A partially-written manifest is never observable.
//!
//! Within an app, `versions` is kept sorted descending by date with at
//! most one entry per version string (exact-match replace is
//! last-write-wins).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from manifest mutation or validation.
#[derive(Error, Debug)]
pub enum RepoError {
    /// A field the installer schema requires is empty or absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Two apps share a bundle identifier.
    #[error("duplicate bundle identifier: {0}")]
    DuplicateApp(String),

    /// Two news items share an identifier.
    #[error("duplicate news identifier: {0}")]
    DuplicateNews(String),

    /// An app entry has two versions with the same version string.
    #[error("duplicate version {version} for {bundle_identifier}")]
    DuplicateVersion {
        /// The app the duplicate belongs to.
        bundle_identifier: String,
        /// The duplicated version string.
        version: String,
    },

    /// An app's version list is not sorted descending by date.
    #[error("versions for {0} are out of order")]
    OutOfOrder(String),

    /// An operation referenced an app that is not in the manifest.
    #[error("no app with bundle identifier {0}")]
    UnknownApp(String),

    /// An operation referenced a news item that is not in the manifest.
    #[error("no news item with identifier {0}")]
    UnknownNews(String),
}

/// The published catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryManifest {
    /// Display name of the repository.
    pub name: String,
    /// Reverse-DNS identifier of the repository.
    pub identifier: String,
    /// One-line tagline shown under the name.
    pub subtitle: String,
    /// Longer repository description.
    pub description: String,
    /// Repository icon.
    #[serde(rename = "iconURL")]
    pub icon_url: String,
    /// Banner image shown at the top of the repository page.
    #[serde(rename = "headerURL")]
    pub header_url: String,
    /// Repository website.
    pub website: String,
    /// Accent color, hex without `#`.
    #[serde(rename = "tintColor")]
    pub tint_color: String,
    /// Published apps, keyed by unique bundle identifier.
    #[serde(default)]
    pub apps: Vec<AppEntry>,
    /// Dated news items.
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

/// One app in the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    /// Display name.
    pub name: String,
    /// Unique key of this entry across the manifest.
    #[serde(rename = "bundleIdentifier")]
    pub bundle_identifier: String,
    /// Developer shown on the app page.
    #[serde(rename = "developerName")]
    pub developer_name: String,
    /// One-line tagline.
    pub subtitle: String,
    /// Full description shown on the app page.
    #[serde(rename = "localizedDescription")]
    pub localized_description: String,
    /// App icon.
    #[serde(rename = "iconURL")]
    pub icon_url: String,
    /// Accent color, hex without `#`.
    #[serde(rename = "tintColor")]
    pub tint_color: String,
    /// Screenshot gallery.
    #[serde(rename = "screenshotURLs", default)]
    pub screenshot_urls: Vec<String>,
    /// Available versions, newest first.
    #[serde(default)]
    pub versions: Vec<AppVersion>,
    /// Declared entitlements and privacy usage strings.
    #[serde(rename = "appPermissions", skip_serializing_if = "Option::is_none")]
    pub app_permissions: Option<AppPermissions>,
}

/// One downloadable version of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersion {
    /// Version string as uploaded (free-form, not semver-enforced).
    pub version: String,
    /// RFC 3339 release date; the sort key within an app.
    pub date: String,
    /// Binary size in bytes.
    pub size: u64,
    /// Direct fetch URL for the binary.
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    /// Per-version changelog.
    #[serde(rename = "localizedDescription")]
    pub localized_description: String,
    /// Minimum OS requirement.
    #[serde(rename = "minOSVersion")]
    pub min_os_version: String,
}

/// Declared entitlements and privacy usage strings for an app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppPermissions {
    /// Entitlement identifiers the app requests.
    #[serde(default)]
    pub entitlements: Vec<String>,
    /// Privacy usage-description strings, keyed by Info.plist key.
    #[serde(default)]
    pub privacy: HashMap<String, String>,
}

/// A dated news item, optionally tied to an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Unique key of this item across the manifest.
    pub identifier: String,
    /// Headline.
    pub title: String,
    /// Subheadline.
    pub caption: String,
    /// RFC 3339 publication date.
    pub date: String,
    /// Accent color, hex without `#`.
    #[serde(rename = "tintColor")]
    pub tint_color: String,
    /// Optional banner image.
    #[serde(rename = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Whether installer clients should push-notify this item.
    pub notify: bool,
    /// Bundle identifier of the associated app, if any.
    #[serde(rename = "appID", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// A tagged mutation of the manifest document.
///
/// All edits are expressed this way rather than as free-form field
/// patches, so the invariants (unique keys, ordered versions) hold at
/// every commit point.
#[derive(Debug, Clone)]
pub enum ManifestOp {
    /// Insert an app, or refresh the display metadata of an existing one.
    ///
    /// On an existing app the version list is preserved and any versions
    /// carried by the new entry are upserted into it.
    AddApp(AppEntry),
    /// Insert or replace (exact version match) one version of an app.
    AddVersion {
        /// The app to add the version to; must already exist.
        bundle_identifier: String,
        /// The version entry.
        version: AppVersion,
    },
    /// Remove an app and all its versions.
    RemoveApp {
        /// The app to remove.
        bundle_identifier: String,
    },
    /// Insert an item, or replace the one with the same identifier.
    AddNews(NewsItem),
    /// Remove a news item.
    RemoveNews {
        /// Identifier of the item to remove.
        identifier: String,
    },
}

impl RepositoryManifest {
    /// An empty manifest with the given store metadata.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            subtitle: String::new(),
            description: String::new(),
            icon_url: String::new(),
            header_url: String::new(),
            website: String::new(),
            tint_color: String::new(),
            apps: Vec::new(),
            news: Vec::new(),
        }
    }

    /// Look up an app by bundle identifier.
    pub fn find_app(&self, bundle_identifier: &str) -> Option<&AppEntry> {
        self.apps
            .iter()
            .find(|a| a.bundle_identifier == bundle_identifier)
    }

    /// Apply one tagged mutation.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::UnknownApp`] / [`RepoError::UnknownNews`] when
    /// the target of a version or removal op does not exist.
    pub fn apply(&mut self, op: ManifestOp) -> Result<(), RepoError> {
        match op {
            ManifestOp::AddApp(entry) => {
                if let Some(existing) = self
                    .apps
                    .iter_mut()
                    .find(|a| a.bundle_identifier == entry.bundle_identifier)
                {
                    let incoming = entry.versions.clone();
                    let versions = std::mem::take(&mut existing.versions);
                    *existing = entry;
                    existing.versions = versions;
                    for v in incoming {
                        existing.upsert_version(v);
                    }
                } else {
                    let mut entry = entry;
                    entry.sort_versions();
                    self.apps.push(entry);
                }
                Ok(())
            }
            ManifestOp::AddVersion {
                bundle_identifier,
                version,
            } => {
                let app = self
                    .apps
                    .iter_mut()
                    .find(|a| a.bundle_identifier == bundle_identifier)
                    .ok_or(RepoError::UnknownApp(bundle_identifier))?;
                app.upsert_version(version);
                Ok(())
            }
            ManifestOp::RemoveApp { bundle_identifier } => {
                let before = self.apps.len();
                self.apps
                    .retain(|a| a.bundle_identifier != bundle_identifier);
                if self.apps.len() == before {
                    return Err(RepoError::UnknownApp(bundle_identifier));
                }
                Ok(())
            }
            ManifestOp::AddNews(item) => {
                if let Some(existing) =
                    self.news.iter_mut().find(|n| n.identifier == item.identifier)
                {
                    *existing = item;
                } else {
                    self.news.push(item);
                }
                Ok(())
            }
            ManifestOp::RemoveNews { identifier } => {
                let before = self.news.len();
                self.news.retain(|n| n.identifier != identifier);
                if self.news.len() == before {
                    return Err(RepoError::UnknownNews(identifier));
                }
                Ok(())
            }
        }
    }

    /// Check that the document is servable.
    ///
    /// Every field the installer schema lists as non-optional must be
    /// present, keys must be unique, and version lists must be ordered.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), RepoError> {
        if self.name.is_empty() {
            return Err(RepoError::MissingField("name".into()));
        }
        if self.identifier.is_empty() {
            return Err(RepoError::MissingField("identifier".into()));
        }

        let mut seen_bundles = Vec::with_capacity(self.apps.len());
        for app in &self.apps {
            if app.bundle_identifier.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "apps[{}].bundleIdentifier",
                    app.name
                )));
            }
            if seen_bundles.contains(&&app.bundle_identifier) {
                return Err(RepoError::DuplicateApp(app.bundle_identifier.clone()));
            }
            seen_bundles.push(&app.bundle_identifier);
            app.validate()?;
        }

        let mut seen_news = Vec::with_capacity(self.news.len());
        for item in &self.news {
            if item.identifier.is_empty() {
                return Err(RepoError::MissingField("news[].identifier".into()));
            }
            if seen_news.contains(&&item.identifier) {
                return Err(RepoError::DuplicateNews(item.identifier.clone()));
            }
            seen_news.push(&item.identifier);
            if item.title.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "news[{}].title",
                    item.identifier
                )));
            }
            if item.date.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "news[{}].date",
                    item.identifier
                )));
            }
        }

        Ok(())
    }
}

impl AppEntry {
    fn validate(&self) -> Result<(), RepoError> {
        let key = &self.bundle_identifier;
        let require = |value: &str, field: &str| {
            if value.is_empty() {
                Err(RepoError::MissingField(format!("apps[{key}].{field}")))
            } else {
                Ok(())
            }
        };
        require(&self.name, "name")?;
        require(&self.developer_name, "developerName")?;
        require(&self.localized_description, "localizedDescription")?;
        require(&self.icon_url, "iconURL")?;

        let mut seen = Vec::with_capacity(self.versions.len());
        for pair in self.versions.windows(2) {
            if compare_dates(&pair[0].date, &pair[1].date) == Ordering::Less {
                return Err(RepoError::OutOfOrder(key.clone()));
            }
        }
        for v in &self.versions {
            if v.version.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "apps[{key}].versions[].version"
                )));
            }
            if v.date.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "apps[{key}].versions[].date"
                )));
            }
            if v.download_url.is_empty() {
                return Err(RepoError::MissingField(format!(
                    "apps[{key}].versions[].downloadURL"
                )));
            }
            if seen.contains(&&v.version) {
                return Err(RepoError::DuplicateVersion {
                    bundle_identifier: key.clone(),
                    version: v.version.clone(),
                });
            }
            seen.push(&v.version);
        }
        Ok(())
    }

    /// Insert or replace (exact version match) a version, keeping the
    /// list sorted descending by date.
    pub fn upsert_version(&mut self, version: AppVersion) {
        if let Some(existing) = self.versions.iter_mut().find(|v| v.version == version.version) {
            *existing = version;
        } else {
            self.versions.push(version);
        }
        self.sort_versions();
    }

    /// Latest version, if any.
    pub fn latest(&self) -> Option<&AppVersion> {
        self.versions.first()
    }

    fn sort_versions(&mut self) {
        self.versions
            .sort_by(|a, b| compare_dates(&b.date, &a.date));
    }
}

/// Compare two RFC 3339 dates, falling back to a lexicographic compare
/// for strings chrono cannot parse.
fn compare_dates(a: &str, b: &str) -> Ordering {
    match (
        chrono::DateTime::parse_from_rfc3339(a),
        chrono::DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(da), Ok(db)) => da.cmp(&db),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str, date: &str) -> AppVersion {
        AppVersion {
            version: v.to_string(),
            date: date.to_string(),
            size: 1024,
            download_url: format!("https://repo.test/ipa/{v}.ipa"),
            localized_description: "fixes".to_string(),
            min_os_version: "12.0".to_string(),
        }
    }

    fn app(bundle: &str) -> AppEntry {
        AppEntry {
            name: "Clock".to_string(),
            bundle_identifier: bundle.to_string(),
            developer_name: "Acme".to_string(),
            subtitle: "tells time".to_string(),
            localized_description: "A clock.".to_string(),
            icon_url: "https://repo.test/icon.png".to_string(),
            tint_color: "4f46e5".to_string(),
            screenshot_urls: vec![],
            versions: vec![],
            app_permissions: None,
        }
    }

    #[test]
    fn test_add_version_sorts_descending() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        doc.apply(ManifestOp::AddApp(app("com.x.y"))).unwrap();
        doc.apply(ManifestOp::AddVersion {
            bundle_identifier: "com.x.y".to_string(),
            version: version("1.0.0", "2026-01-01T00:00:00Z"),
        })
        .unwrap();
        doc.apply(ManifestOp::AddVersion {
            bundle_identifier: "com.x.y".to_string(),
            version: version("1.0.1", "2026-02-01T00:00:00Z"),
        })
        .unwrap();

        let versions = &doc.find_app("com.x.y").unwrap().versions;
        assert_eq!(versions[0].version, "1.0.1");
        assert_eq!(versions[1].version, "1.0.0");
        doc.validate().unwrap();
    }

    #[test]
    fn test_exact_version_match_replaces() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        doc.apply(ManifestOp::AddApp(app("com.x.y"))).unwrap();
        for _ in 0..2 {
            doc.apply(ManifestOp::AddVersion {
                bundle_identifier: "com.x.y".to_string(),
                version: version("1.0.0", "2026-01-01T00:00:00Z"),
            })
            .unwrap();
        }
        assert_eq!(doc.find_app("com.x.y").unwrap().versions.len(), 1);
    }

    #[test]
    fn test_add_app_preserves_versions() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        let mut first = app("com.x.y");
        first.versions.push(version("1.0.0", "2026-01-01T00:00:00Z"));
        doc.apply(ManifestOp::AddApp(first)).unwrap();

        let mut refreshed = app("com.x.y");
        refreshed.name = "Clock Pro".to_string();
        doc.apply(ManifestOp::AddApp(refreshed)).unwrap();

        let entry = doc.find_app("com.x.y").unwrap();
        assert_eq!(entry.name, "Clock Pro");
        assert_eq!(entry.versions.len(), 1);
    }

    #[test]
    fn test_version_for_unknown_app_errors() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        let err = doc
            .apply(ManifestOp::AddVersion {
                bundle_identifier: "com.missing".to_string(),
                version: version("1.0.0", "2026-01-01T00:00:00Z"),
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::UnknownApp(_)));
    }

    #[test]
    fn test_news_upsert_and_remove() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        let item = NewsItem {
            identifier: "launch".to_string(),
            title: "We are live".to_string(),
            caption: "First release".to_string(),
            date: "2026-01-01T00:00:00Z".to_string(),
            tint_color: "4f46e5".to_string(),
            image_url: None,
            notify: true,
            app_id: None,
        };
        doc.apply(ManifestOp::AddNews(item.clone())).unwrap();
        doc.apply(ManifestOp::AddNews(item)).unwrap();
        assert_eq!(doc.news.len(), 1);

        doc.apply(ManifestOp::RemoveNews {
            identifier: "launch".to_string(),
        })
        .unwrap();
        assert!(matches!(
            doc.apply(ManifestOp::RemoveNews {
                identifier: "launch".to_string(),
            }),
            Err(RepoError::UnknownNews(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_store_name() {
        let doc = RepositoryManifest::new("", "com.test.repo");
        assert!(matches!(
            doc.validate(),
            Err(RepoError::MissingField(f)) if f == "name"
        ));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let mut doc = RepositoryManifest::new("Repo", "com.test.repo");
        let mut entry = app("com.x.y");
        entry.versions.push(version("1.0.0", "2026-01-01T00:00:00Z"));
        doc.apply(ManifestOp::AddApp(entry)).unwrap();

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"bundleIdentifier\""));
        assert!(json.contains("\"downloadURL\""));
        assert!(json.contains("\"minOSVersion\""));
        assert!(json.contains("\"tintColor\""));
        assert!(!json.contains("bundle_identifier"));
    }
}
