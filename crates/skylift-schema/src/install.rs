//! Per-artifact OTA install manifest.
//!
//! The install link published for an artifact is an installer-protocol
//! URL wrapping this document. A device fetches it, reads the
//! `software-package` asset, and pulls the binary from the direct
//! download URL. Field names follow the property-list schema the
//! installer expects (`bundle-identifier`, `software-package`, ...).

use serde::{Deserialize, Serialize};

/// The OTA install manifest served for one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallManifest {
    /// Installable items; always exactly one for an artifact.
    pub items: Vec<InstallItem>,
}

/// One installable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallItem {
    /// Downloadable assets (the package itself, plus display images).
    pub assets: Vec<InstallAsset>,
    /// Identity of the app being installed.
    pub metadata: InstallMetadata,
}

/// One downloadable asset of an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallAsset {
    /// Asset kind: `software-package` or `display-image`.
    pub kind: String,
    /// Fetch URL.
    pub url: String,
}

/// Identity block of an install item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallMetadata {
    /// Bundle identifier of the app.
    #[serde(rename = "bundle-identifier")]
    pub bundle_identifier: String,
    /// Version being installed.
    #[serde(rename = "bundle-version")]
    pub bundle_version: String,
    /// Always `software`.
    pub kind: String,
    /// Display title shown in the install prompt.
    pub title: String,
}

impl InstallManifest {
    /// Build the manifest for one artifact.
    pub fn new(
        bundle_identifier: impl Into<String>,
        bundle_version: impl Into<String>,
        title: impl Into<String>,
        package_url: impl Into<String>,
        display_image_url: Option<String>,
    ) -> Self {
        let mut assets = vec![InstallAsset {
            kind: "software-package".to_string(),
            url: package_url.into(),
        }];
        if let Some(url) = display_image_url {
            assets.push(InstallAsset {
                kind: "display-image".to_string(),
                url,
            });
        }
        Self {
            items: vec![InstallItem {
                assets,
                metadata: InstallMetadata {
                    bundle_identifier: bundle_identifier.into(),
                    bundle_version: bundle_version.into(),
                    kind: "software".to_string(),
                    title: title.into(),
                },
            }],
        }
    }

    /// Serialize to the XML property list the installer consumes.
    ///
    /// # Errors
    ///
    /// Returns the underlying plist serialization error.
    pub fn to_xml(&self) -> Result<Vec<u8>, plist::Error> {
        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, self)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_contains_package_asset() {
        let manifest = InstallManifest::new(
            "com.x.y",
            "1.0.0",
            "Clock",
            "https://repo.test/ipa/1700000000000/clock.ipa",
            Some("https://repo.test/icon.png".to_string()),
        );
        let xml = String::from_utf8(manifest.to_xml().unwrap()).unwrap();
        assert!(xml.contains("software-package"));
        assert!(xml.contains("bundle-identifier"));
        assert!(xml.contains("com.x.y"));
        assert!(xml.contains("display-image"));
    }

    #[test]
    fn test_plist_roundtrip() {
        let manifest =
            InstallManifest::new("com.x.y", "1.0.0", "Clock", "https://repo.test/a.ipa", None);
        let xml = manifest.to_xml().unwrap();
        let parsed: InstallManifest = plist::from_bytes(&xml).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].metadata.bundle_identifier, "com.x.y");
        assert_eq!(parsed.items[0].assets[0].kind, "software-package");
    }
}
