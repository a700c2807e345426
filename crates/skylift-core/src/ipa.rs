//! Uploaded package introspection.
//!
//! An IPA is a zip archive with a `Payload/<Name>.app/` bundle inside.
//! At upload time the engine reads the bundle's `Info.plist` to fill in
//! metadata the operator omitted and to cross-check what they supplied.

use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;

use crate::error::Error;

/// Identity read from a package's `Info.plist`.
#[derive(Debug, Clone)]
pub struct IpaInfo {
    /// `CFBundleIdentifier`.
    pub bundle_id: String,
    /// `CFBundleShortVersionString`, falling back to `CFBundleVersion`.
    pub version: String,
    /// `CFBundleDisplayName`, falling back to `CFBundleName`.
    pub name: Option<String>,
    /// `MinimumOSVersion`, if declared.
    pub min_os_version: Option<String>,
}

/// Why a package could not be introspected.
#[derive(Error, Debug)]
pub enum IpaError {
    /// Not a readable zip archive.
    #[error("not a zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O failure while reading the archive.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `Info.plist` is not a parseable property list.
    #[error("unreadable Info.plist: {0}")]
    Plist(#[from] plist::Error),

    /// The archive has no `Payload/<Name>.app/Info.plist`.
    #[error("no app bundle found in Payload/")]
    NoAppBundle,

    /// `Info.plist` is missing a key the engine needs.
    #[error("Info.plist is missing {0}")]
    MissingKey(&'static str),
}

impl From<IpaError> for Error {
    fn from(err: IpaError) -> Self {
        Self::Validation(format!("invalid application package: {err}"))
    }
}

/// Read the app identity out of an uploaded package.
///
/// # Errors
///
/// Returns an [`IpaError`] when the bytes are not a valid IPA or the
/// bundle's `Info.plist` lacks an identifier or version.
pub fn inspect(bytes: &[u8]) -> Result<IpaInfo, IpaError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let plist_name = archive
        .file_names()
        .find(|name| is_bundle_info_plist(name))
        .map(String::from)
        .ok_or(IpaError::NoAppBundle)?;

    let mut raw = Vec::new();
    archive.by_name(&plist_name)?.read_to_end(&mut raw)?;

    // from_reader auto-detects XML vs binary plists.
    let value = plist::Value::from_reader(Cursor::new(&raw))?;
    let dict = value
        .as_dictionary()
        .ok_or(IpaError::MissingKey("CFBundleIdentifier"))?;

    let string_key = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .map(str::to_string)
    };

    let bundle_id =
        string_key("CFBundleIdentifier").ok_or(IpaError::MissingKey("CFBundleIdentifier"))?;
    let version = string_key("CFBundleShortVersionString")
        .or_else(|| string_key("CFBundleVersion"))
        .ok_or(IpaError::MissingKey("CFBundleShortVersionString"))?;
    let name = string_key("CFBundleDisplayName").or_else(|| string_key("CFBundleName"));
    let min_os_version = string_key("MinimumOSVersion");

    Ok(IpaInfo {
        bundle_id,
        version,
        name,
        min_os_version,
    })
}

/// Matches exactly `Payload/<Name>.app/Info.plist` (not nested
/// frameworks or extensions, which carry their own plists).
fn is_bundle_info_plist(name: &str) -> bool {
    let mut parts = name.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("Payload"), Some(app), Some("Info.plist"), None) if app.ends_with(".app")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn stub_ipa(bundle_id: &str, version: &str, name: &str) -> Vec<u8> {
        let info = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key><string>{bundle_id}</string>
    <key>CFBundleShortVersionString</key><string>{version}</string>
    <key>CFBundleName</key><string>{name}</string>
    <key>MinimumOSVersion</key><string>13.0</string>
</dict>
</plist>"#
        );

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        writer
            .start_file(format!("Payload/{name}.app/Info.plist"), options)
            .unwrap();
        writer.write_all(info.as_bytes()).unwrap();
        writer
            .start_file(format!("Payload/{name}.app/{name}"), options)
            .unwrap();
        writer.write_all(b"\xca\xfe\xba\xbebinary").unwrap();
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_inspect_reads_identity() {
        let ipa = stub_ipa("com.x.y", "1.0.0", "Clock");
        let info = inspect(&ipa).unwrap();
        assert_eq!(info.bundle_id, "com.x.y");
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.name.as_deref(), Some("Clock"));
        assert_eq!(info.min_os_version.as_deref(), Some("13.0"));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(inspect(b"not a zip"), Err(IpaError::Zip(_))));
    }

    #[test]
    fn test_inspect_rejects_zip_without_bundle() {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("README.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            inspect(&cursor.into_inner()),
            Err(IpaError::NoAppBundle)
        ));
    }

    #[test]
    fn test_bundle_plist_matcher_skips_nested() {
        assert!(is_bundle_info_plist("Payload/Clock.app/Info.plist"));
        assert!(!is_bundle_info_plist(
            "Payload/Clock.app/Frameworks/X.framework/Info.plist"
        ));
        assert!(!is_bundle_info_plist("Payload/Info.plist"));
    }
}
