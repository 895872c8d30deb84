//! Upload client for the third-party music service.
//!
//! Authentication uses a captured browser-headers JSON file (cookie, user
//! agent, authorization and friends), the same material a logged-in web
//! session sends. Uploads follow the service's resumable protocol: an
//! initial `start` request yields a one-shot upload URL, then the file body
//! is sent with `upload, finalize`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const UPLOAD_ENDPOINT: &str = "https://upload.youtube.com/upload/usermusic/http?authuser=0";

/// Delivers one local file to the remote music library. Returns an opaque
/// confirmation string on success.
#[async_trait]
pub trait UploadClient: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// YouTube Music uploader authenticated with a browser-headers file.
pub struct YtMusicUploader {
    client: reqwest::Client,
    auth_headers: HeaderMap,
}

impl YtMusicUploader {
    /// Load the browser-auth headers file and build the client.
    ///
    /// The file is a flat JSON object of header name to value, as captured
    /// from an authenticated browser session.
    pub fn from_auth_file(path: &Path, timeout_sec: u64) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read auth headers file {:?}", path))?;
        let headers: HashMap<String, String> =
            serde_json::from_str(&raw).context("Auth headers file is not a JSON object")?;

        let mut auth_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name in auth file: {}", name))?;
            let value = HeaderValue::from_str(&value)
                .with_context(|| format!("Invalid value for auth header {}", name))?;
            auth_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth_headers,
        })
    }
}

#[async_trait]
impl UploadClient for YtMusicUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file for upload: {:?}", path))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.m4a")
            .to_string();

        let start = self
            .client
            .post(UPLOAD_ENDPOINT)
            .headers(self.auth_headers.clone())
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Header-Content-Length", data.len())
            .body(format!("filename={}", filename))
            .send()
            .await
            .context("Upload start request failed")?;

        if !start.status().is_success() {
            bail!("Upload start rejected with status {}", start.status());
        }

        let upload_url = start
            .headers()
            .get("X-Goog-Upload-URL")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("Upload start response did not carry an upload URL")?;

        let finalize = self
            .client
            .post(&upload_url)
            .headers(self.auth_headers.clone())
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(data)
            .send()
            .await
            .context("Upload body request failed")?;

        let status = finalize.status();
        if !status.is_success() {
            bail!("Upload of {} failed with status {}", filename, status);
        }

        let body = finalize.text().await.unwrap_or_default();
        if body.is_empty() {
            Ok(format!("{}", status))
        } else {
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_headers_from_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cookie": "SAPISID=abc", "user-agent": "Mozilla/5.0"}}"#
        )
        .unwrap();

        let uploader = YtMusicUploader::from_auth_file(file.path(), 30).unwrap();
        assert_eq!(
            uploader.auth_headers.get("cookie").unwrap(),
            &HeaderValue::from_static("SAPISID=abc")
        );
    }

    #[test]
    fn rejects_non_object_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(YtMusicUploader::from_auth_file(file.path(), 30).is_err());
    }

    #[test]
    fn rejects_missing_auth_file() {
        assert!(
            YtMusicUploader::from_auth_file(Path::new("/nonexistent/auth.json"), 30).is_err()
        );
    }
}
