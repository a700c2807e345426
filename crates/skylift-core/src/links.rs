//! Published links for an artifact.
//!
//! Every link is a pure function of `(artifact id, slug, base URL)` and
//! is derived on demand, never stored, so it cannot drift from the
//! canonical form. Links survive metadata edits and re-signs because
//! both inputs are immutable after upload; only deletion invalidates
//! them.
//!
//! Shortening is a convenience delegated to an external service and
//! fails soft: on any upstream failure the original long link is
//! returned and the surrounding operation still succeeds.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use skylift_schema::ArtifactId;

/// The five published links of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    /// Installer-protocol URL wrapping the OTA install manifest.
    pub install: String,
    /// Direct fetch URL for the binary.
    pub direct: String,
    /// Canonical short share URL (input to the shortening service).
    pub short: String,
    /// App landing page.
    pub page: String,
    /// Alternate distribution channel.
    pub testflight: String,
}

/// Derive all published links for an artifact.
pub fn derive(base_url: &str, id: ArtifactId, slug: &str) -> Links {
    let base = base_url.trim_end_matches('/');
    let manifest_url = format!("{base}/install/{id}/manifest.plist");
    Links {
        install: format!(
            "itms-services://?action=download-manifest&url={}",
            percent_encode(&manifest_url)
        ),
        direct: format!("{base}/ipa/{id}/{slug}.ipa"),
        short: format!("{base}/s/{id}"),
        page: format!("{base}/app/{slug}/{id}"),
        testflight: format!("{base}/testflight/{id}"),
    }
}

/// Derive the URL slug for an app name.
///
/// Computed once at upload time and stored with the artifact; deriving
/// it again after a rename would move every published page link.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("app");
    }
    slug
}

/// Percent-encode a URL for embedding as a query parameter value.
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Failures of best-effort upstream collaborators.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Transport-level failure.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// The service did not answer within the bound.
    #[error("shortener timed out after {0}s")]
    Timeout(u64),

    /// The service answered with something that is not a URL.
    #[error("shortener returned an unusable response: {0}")]
    BadResponse(String),
}

/// External URL-shortening collaborator.
#[async_trait]
pub trait Shortener: Send + Sync {
    /// Shorten a long URL.
    ///
    /// # Errors
    ///
    /// Any [`UpstreamError`]; callers are expected to degrade to the
    /// long URL via [`shorten_or_fallback`].
    async fn shorten(&self, long_url: &str) -> Result<String, UpstreamError>;
}

/// Shortener speaking the common `GET <endpoint>?url=<long>` protocol
/// where the response body is the shortened URL.
#[derive(Debug, Clone)]
pub struct HttpShortener {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpShortener {
    /// Client for the given endpoint, bounded per call.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl Shortener for HttpShortener {
    async fn shorten(&self, long_url: &str) -> Result<String, UpstreamError> {
        let request = async {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("url", long_url)])
                .send()
                .await?
                .error_for_status()?;
            Ok::<String, UpstreamError>(response.text().await?)
        };

        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout.as_secs()))??;

        let short = body.trim();
        if short.starts_with("http") && !short.contains(char::is_whitespace) {
            Ok(short.to_string())
        } else {
            let mut preview: String = short.chars().take(80).collect();
            if short.len() > 80 {
                preview.push_str("...");
            }
            Err(UpstreamError::BadResponse(preview))
        }
    }
}

/// Shorten a link, degrading to the original on any upstream failure.
pub async fn shorten_or_fallback(shortener: &dyn Shortener, long_url: &str) -> String {
    match shortener.shorten(long_url).await {
        Ok(short) => short,
        Err(err) => {
            warn!(error = %err, url = long_url, "link shortening failed, using long link");
            long_url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_are_deterministic() {
        let id = ArtifactId::from_millis(1_700_000_000_000);
        let a = derive("https://repo.test/", id, "clock");
        let b = derive("https://repo.test", id, "clock");
        assert_eq!(a, b);
        assert_eq!(a.direct, "https://repo.test/ipa/1700000000000/clock.ipa");
        assert_eq!(a.page, "https://repo.test/app/clock/1700000000000");
        assert!(a.install.starts_with("itms-services://?action=download-manifest&url="));
        assert!(a.install.contains("manifest.plist"));
    }

    #[test]
    fn test_install_link_encodes_manifest_url() {
        let id = ArtifactId::from_millis(7);
        let links = derive("https://repo.test", id, "clock");
        assert!(links.install.contains("https%3A%2F%2Frepo.test%2Finstall%2F7%2Fmanifest.plist"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Clock App 2"), "clock-app-2");
        assert_eq!(slugify("  Ünïcode!! "), "n-code");
        assert_eq!(slugify("---"), "app");
    }

    #[tokio::test]
    async fn test_shorten_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("https://sho.rt/abc")
            .create_async()
            .await;

        let shortener = HttpShortener::new(server.url(), 5);
        let short = shortener.shorten("https://repo.test/s/7").await.unwrap();
        assert_eq!(short, "https://sho.rt/abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_shorten_falls_back_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let shortener = HttpShortener::new(server.url(), 5);
        let long = "https://repo.test/s/7";
        assert_eq!(shorten_or_fallback(&shortener, long).await, long);
    }

    #[tokio::test]
    async fn test_shorten_falls_back_on_garbage_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("<html>not a url</html>")
            .create_async()
            .await;

        let shortener = HttpShortener::new(server.url(), 5);
        let long = "https://repo.test/s/7";
        assert_eq!(shorten_or_fallback(&shortener, long).await, long);
    }
}
