//! Upload dispatch between a single PUT and an upload session.

use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Body, Method, Response, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::client::{status_error, DriveClient};
use crate::error::{DriveError, Result};
use crate::models::{RemoteItem, UploadSession};
use crate::path;

/// Largest file sent with a single PUT (4 MiB).
pub const SIMPLE_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

/// How a file of a given size is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One PUT of the whole content to `:/content`.
    Simple,
    /// `createUploadSession` followed by a ranged PUT to the session URL.
    Session,
}

impl UploadStrategy {
    pub fn for_size(size: u64) -> Self {
        if size <= SIMPLE_UPLOAD_LIMIT {
            UploadStrategy::Simple
        } else {
            UploadStrategy::Session
        }
    }
}

impl DriveClient {
    /// Upload a local file into the remote folder `dirs`, keeping its base name.
    ///
    /// # Arguments
    /// * `local_path` - Path to the local file
    /// * `dirs` - Destination folder segments below the drive root
    pub async fn upload<P: AsRef<Path>, S: AsRef<str>>(
        &self,
        local_path: P,
        dirs: &[S],
    ) -> Result<RemoteItem> {
        let local_path = local_path.as_ref();
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DriveError::InvalidLocalPath(local_path.display().to_string()))?;

        let size = tokio::fs::metadata(local_path).await?.len();
        let strategy = UploadStrategy::for_size(size);
        debug!("Uploading {} ({} bytes) via {:?}", filename, size, strategy);

        let item = match strategy {
            UploadStrategy::Simple => self.upload_simple(local_path, dirs, filename, size).await?,
            UploadStrategy::Session => {
                self.upload_with_session(local_path, dirs, filename, size)
                    .await?
            }
        };

        info!("Uploaded {} as item {}", filename, item.id);
        Ok(item)
    }

    async fn upload_simple<S: AsRef<str>>(
        &self,
        local_path: &Path,
        dirs: &[S],
        filename: &str,
        size: u64,
    ) -> Result<RemoteItem> {
        let url = self.endpoint(&path::upload_address(dirs, filename));

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));

        let response = self
            .execute(Method::PUT, &url, Some(file_body(local_path).await?), headers)
            .await?;
        decode_uploaded_item(response).await
    }

    /// Create an upload session for `filename` in `dirs`.
    pub async fn create_upload_session<S: AsRef<str>>(
        &self,
        dirs: &[S],
        filename: &str,
    ) -> Result<UploadSession> {
        let url = self.endpoint(&path::upload_session_address(dirs, filename));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .execute(Method::POST, &url, Some(Body::from("{}")), headers)
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Sends the whole file as one range; the session URL is pre-authenticated
    /// and must not carry the bearer token.
    async fn upload_with_session<S: AsRef<str>>(
        &self,
        local_path: &Path,
        dirs: &[S],
        filename: &str,
        size: u64,
    ) -> Result<RemoteItem> {
        let session = self.create_upload_session(dirs, filename).await?;
        debug!(
            "Upload session created, expecting ranges {:?}",
            session.next_expected_ranges
        );

        let response = self
            .http()
            .put(&session.upload_url)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_RANGE, content_range(size))
            .body(file_body(local_path).await?)
            .send()
            .await?;
        decode_uploaded_item(response).await
    }
}

/// `Content-Range` value covering a whole file of `size` bytes.
pub fn content_range(size: u64) -> String {
    format!("bytes 0-{}/{}", size.saturating_sub(1), size)
}

async fn file_body(local_path: &Path) -> Result<Body> {
    let file = tokio::fs::File::open(local_path).await?;
    Ok(Body::wrap_stream(ReaderStream::new(file)))
}

async fn decode_uploaded_item(response: Response) -> Result<RemoteItem> {
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Err(status_error(status, body));
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(UploadStrategy::for_size(0), UploadStrategy::Simple);
        assert_eq!(
            UploadStrategy::for_size(SIMPLE_UPLOAD_LIMIT),
            UploadStrategy::Simple
        );
        assert_eq!(
            UploadStrategy::for_size(SIMPLE_UPLOAD_LIMIT + 1),
            UploadStrategy::Session
        );
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(10), "bytes 0-9/10");
        assert_eq!(content_range(4194305), "bytes 0-4194304/4194305");
    }
}
