//! SQLite catalog.
//!
//! Tracks artifact records and signing certificates. Connections are not
//! `Sync`, so all access goes through the actor in [`super::actor`].

use std::path::Path;

use rusqlite::{Connection, params};
use thiserror::Error;

use crate::types::{Artifact, Certificate};
use skylift_schema::ArtifactId;

/// Catalog failures.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding of a list column failed.
    #[error("metadata encoding: {0}")]
    Encode(#[from] serde_json::Error),

    /// No artifact row with this id.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// No certificate row with this id.
    #[error("certificate not found: {0}")]
    CertificateNotFound(i64),

    /// The catalog actor thread is gone.
    #[error("registry database actor is gone")]
    ActorDied,
}

/// The catalog connection plus schema.
pub struct RegistryDb {
    conn: Connection,
}

impl RegistryDb {
    /// Open (or create) the catalog at a path.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite failure.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;

        // WAL so catalog reads never block behind a writer
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY,
                slug TEXT NOT NULL,
                app_name TEXT NOT NULL,
                bundle_id TEXT NOT NULL,
                version TEXT NOT NULL,
                developer TEXT NOT NULL DEFAULT '',
                support_email TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                changelog TEXT NOT NULL DEFAULT '',
                icon_url TEXT NOT NULL DEFAULT '',
                screenshot_urls TEXT NOT NULL DEFAULT '[]',
                min_os_version TEXT NOT NULL DEFAULT '',
                size_bytes INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                signed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_bundle ON artifacts(bundle_id);

            CREATE TABLE IF NOT EXISTS certificates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                key_path TEXT NOT NULL,
                profile_path TEXT NOT NULL,
                password TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                description TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Insert an artifact, bumping the id past same-millisecond
    /// collisions. Returns the record with the id actually used.
    pub fn insert_artifact(&self, mut artifact: Artifact) -> Result<Artifact, DbError> {
        let screenshots = serde_json::to_string(&artifact.screenshot_urls)?;
        loop {
            let result = self.conn.execute(
                "INSERT INTO artifacts (
                    id, slug, app_name, bundle_id, version, developer,
                    support_email, description, changelog, icon_url,
                    screenshot_urls, min_os_version, size_bytes, checksum,
                    created_at, updated_at, signed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    artifact.id.as_millis(),
                    artifact.slug,
                    artifact.app_name,
                    artifact.bundle_id,
                    artifact.version,
                    artifact.developer,
                    artifact.support_email,
                    artifact.description,
                    artifact.changelog,
                    artifact.icon_url,
                    screenshots,
                    artifact.min_os_version,
                    artifact.size_bytes,
                    artifact.checksum,
                    artifact.created_at,
                    artifact.updated_at,
                    artifact.signed_at,
                ],
            );
            match result {
                Ok(_) => return Ok(artifact),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    artifact.id = artifact.id.bumped();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch one artifact.
    pub fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, slug, app_name, bundle_id, version, developer, support_email,
                    description, changelog, icon_url, screenshot_urls, min_os_version,
                    size_bytes, checksum, created_at, updated_at, signed_at
             FROM artifacts WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.as_millis()])?;
        match rows.next()? {
            Some(row) => Ok(Some(artifact_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Rewrite an artifact row. The id is the immutable key.
    pub fn update_artifact(&self, artifact: &Artifact) -> Result<(), DbError> {
        let screenshots = serde_json::to_string(&artifact.screenshot_urls)?;
        let changed = self.conn.execute(
            "UPDATE artifacts SET
                slug = ?2, app_name = ?3, bundle_id = ?4, version = ?5,
                developer = ?6, support_email = ?7, description = ?8,
                changelog = ?9, icon_url = ?10, screenshot_urls = ?11,
                min_os_version = ?12, size_bytes = ?13, checksum = ?14,
                created_at = ?15, updated_at = ?16, signed_at = ?17
             WHERE id = ?1",
            params![
                artifact.id.as_millis(),
                artifact.slug,
                artifact.app_name,
                artifact.bundle_id,
                artifact.version,
                artifact.developer,
                artifact.support_email,
                artifact.description,
                artifact.changelog,
                artifact.icon_url,
                screenshots,
                artifact.min_os_version,
                artifact.size_bytes,
                artifact.checksum,
                artifact.created_at,
                artifact.updated_at,
                artifact.signed_at,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::ArtifactNotFound(artifact.id.to_string()));
        }
        Ok(())
    }

    /// Record a successful sign: new binary fingerprint, size, and
    /// `signed_at`. No other field changes.
    pub fn mark_signed(
        &self,
        id: ArtifactId,
        signed_at: i64,
        checksum: &str,
        size_bytes: u64,
    ) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE artifacts SET signed_at = ?2, checksum = ?3, size_bytes = ?4 WHERE id = ?1",
            params![id.as_millis(), signed_at, checksum, size_bytes],
        )?;
        if changed == 0 {
            return Err(DbError::ArtifactNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete one artifact row.
    pub fn delete_artifact(&self, id: ArtifactId) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM artifacts WHERE id = ?1", params![id.as_millis()])?;
        if deleted == 0 {
            return Err(DbError::ArtifactNotFound(id.to_string()));
        }
        Ok(())
    }

    /// All artifacts, oldest upload first.
    pub fn list_artifacts(&self) -> Result<Vec<Artifact>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, slug, app_name, bundle_id, version, developer, support_email,
                    description, changelog, icon_url, screenshot_urls, min_os_version,
                    size_bytes, checksum, created_at, updated_at, signed_at
             FROM artifacts ORDER BY created_at, id",
        )?;
        let mut rows = stmt.query([])?;
        let mut artifacts = Vec::new();
        while let Some(row) = rows.next()? {
            artifacts.push(artifact_from_row(row)?);
        }
        Ok(artifacts)
    }

    /// Insert a certificate; the catalog assigns the id.
    pub fn insert_certificate(&self, certificate: &Certificate) -> Result<Certificate, DbError> {
        self.conn.execute(
            "INSERT INTO certificates (name, key_path, profile_path, password, is_active, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                certificate.name,
                certificate.key_path,
                certificate.profile_path,
                certificate.password,
                certificate.is_active,
                certificate.description,
                certificate.created_at,
            ],
        )?;
        let mut created = certificate.clone();
        created.id = self.conn.last_insert_rowid();
        Ok(created)
    }

    /// Fetch one certificate.
    pub fn get_certificate(&self, id: i64) -> Result<Option<Certificate>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, key_path, profile_path, password, is_active, description, created_at
             FROM certificates WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(certificate_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Rewrite a certificate row.
    pub fn update_certificate(&self, certificate: &Certificate) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE certificates SET
                name = ?2, key_path = ?3, profile_path = ?4, password = ?5,
                is_active = ?6, description = ?7
             WHERE id = ?1",
            params![
                certificate.id,
                certificate.name,
                certificate.key_path,
                certificate.profile_path,
                certificate.password,
                certificate.is_active,
                certificate.description,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::CertificateNotFound(certificate.id));
        }
        Ok(())
    }

    /// Delete one certificate row.
    pub fn delete_certificate(&self, id: i64) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM certificates WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::CertificateNotFound(id));
        }
        Ok(())
    }

    /// All certificates, optionally only the active ones.
    pub fn list_certificates(&self, active_only: bool) -> Result<Vec<Certificate>, DbError> {
        let sql = if active_only {
            "SELECT id, name, key_path, profile_path, password, is_active, description, created_at
             FROM certificates WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT id, name, key_path, profile_path, password, is_active, description, created_at
             FROM certificates ORDER BY id"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut certificates = Vec::new();
        while let Some(row) = rows.next()? {
            certificates.push(certificate_from_row(row)?);
        }
        Ok(certificates)
    }
}

fn artifact_from_row(row: &rusqlite::Row<'_>) -> Result<Artifact, DbError> {
    let screenshots: String = row.get(10)?;
    Ok(Artifact {
        id: ArtifactId::from_millis(row.get(0)?),
        slug: row.get(1)?,
        app_name: row.get(2)?,
        bundle_id: row.get(3)?,
        version: row.get(4)?,
        developer: row.get(5)?,
        support_email: row.get(6)?,
        description: row.get(7)?,
        changelog: row.get(8)?,
        icon_url: row.get(9)?,
        screenshot_urls: serde_json::from_str(&screenshots)?,
        min_os_version: row.get(11)?,
        size_bytes: row.get(12)?,
        checksum: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        signed_at: row.get(16)?,
    })
}

fn certificate_from_row(row: &rusqlite::Row<'_>) -> Result<Certificate, DbError> {
    Ok(Certificate {
        id: row.get(0)?,
        name: row.get(1)?,
        key_path: row.get(2)?,
        profile_path: row.get(3)?,
        password: row.get(4)?,
        is_active: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stub_artifact(id: i64) -> Artifact {
        Artifact {
            id: ArtifactId::from_millis(id),
            slug: "clock".to_string(),
            app_name: "Clock".to_string(),
            bundle_id: "com.x.y".to_string(),
            version: "1.0.0".to_string(),
            developer: "Acme".to_string(),
            support_email: String::new(),
            description: String::new(),
            changelog: String::new(),
            icon_url: String::new(),
            screenshot_urls: vec!["https://repo.test/s1.png".to_string()],
            min_os_version: "13.0".to_string(),
            size_bytes: 42,
            checksum: "abc".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
            signed_at: None,
        }
    }

    #[test]
    fn test_insert_bumps_id_on_collision() {
        let dir = tempdir().unwrap();
        let db = RegistryDb::open_at(&dir.path().join("registry.db")).unwrap();

        let first = db.insert_artifact(stub_artifact(100)).unwrap();
        let second = db.insert_artifact(stub_artifact(100)).unwrap();

        assert_eq!(first.id.as_millis(), 100);
        assert_eq!(second.id.as_millis(), 101);
        assert_eq!(db.list_artifacts().unwrap().len(), 2);
    }

    #[test]
    fn test_roundtrip_screenshots() {
        let dir = tempdir().unwrap();
        let db = RegistryDb::open_at(&dir.path().join("registry.db")).unwrap();

        db.insert_artifact(stub_artifact(5)).unwrap();
        let loaded = db.get_artifact(ArtifactId::from_millis(5)).unwrap().unwrap();
        assert_eq!(loaded.screenshot_urls, vec!["https://repo.test/s1.png"]);
    }

    #[test]
    fn test_mark_signed_touches_nothing_else() {
        let dir = tempdir().unwrap();
        let db = RegistryDb::open_at(&dir.path().join("registry.db")).unwrap();
        let rec = db.insert_artifact(stub_artifact(7)).unwrap();

        db.mark_signed(rec.id, 1_700_000_100, "def", 43).unwrap();
        let loaded = db.get_artifact(rec.id).unwrap().unwrap();
        assert_eq!(loaded.signed_at, Some(1_700_000_100));
        assert_eq!(loaded.checksum, "def");
        assert_eq!(loaded.size_bytes, 43);
        assert_eq!(loaded.version, "1.0.0");
        assert_eq!(loaded.updated_at, rec.updated_at);
    }

    #[test]
    fn test_delete_missing_artifact_errors() {
        let dir = tempdir().unwrap();
        let db = RegistryDb::open_at(&dir.path().join("registry.db")).unwrap();
        assert!(matches!(
            db.delete_artifact(ArtifactId::from_millis(1)),
            Err(DbError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_certificate_crud() {
        let dir = tempdir().unwrap();
        let db = RegistryDb::open_at(&dir.path().join("registry.db")).unwrap();

        let cert = Certificate {
            id: 0,
            name: "Team A".to_string(),
            key_path: "/certs/1/key.p12".to_string(),
            profile_path: "/certs/1/profile.mobileprovision".to_string(),
            password: Some("pw".to_string()),
            is_active: true,
            description: String::new(),
            created_at: 1_700_000_000,
        };
        let created = db.insert_certificate(&cert).unwrap();
        assert!(created.id > 0);

        let mut deactivated = created.clone();
        deactivated.is_active = false;
        db.update_certificate(&deactivated).unwrap();

        assert_eq!(db.list_certificates(true).unwrap().len(), 0);
        assert_eq!(db.list_certificates(false).unwrap().len(), 1);

        db.delete_certificate(created.id).unwrap();
        assert!(matches!(
            db.delete_certificate(created.id),
            Err(DbError::CertificateNotFound(_))
        ));
    }
}
