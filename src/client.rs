//! Authenticated OneDrive API client.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Body, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::RemoteItem;
use crate::path;

/// Client bound to a single access token.
pub struct DriveClient {
    http: Client,
    access_token: String,
    api_base: String,
}

impl DriveClient {
    /// Load the stored credential, refreshing it first when it has expired.
    ///
    /// Any failure to obtain a valid token aborts construction.
    pub async fn connect(auth: &Authenticator) -> Result<Self> {
        let mut credential = auth.store().load()?;
        if !credential.is_valid() {
            info!("Access token expired at {}, refreshing", credential.expiry);
            auth.refresh().await?;
            credential = auth.store().load()?;
        }

        Ok(Self::with_token(
            credential.access_token,
            auth.endpoints().api_base.clone(),
        ))
    }

    /// Create a client from a raw access token.
    ///
    /// # Arguments
    /// * `access_token` - Bearer token attached to every request
    /// * `api_base` - Drive root URL, e.g. `https://graph.microsoft.com/v1.0/me/drive`
    pub fn with_token(access_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            access_token: access_token.into(),
            api_base: api_base.into(),
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Absolute URL for an address produced by [`crate::path`].
    pub fn endpoint(&self, address: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), address)
    }

    /// Send an authenticated request and return the raw response.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<Body>,
        headers: HeaderMap,
    ) -> Result<Response> {
        debug!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.access_token)
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    /// GET `url` and decode a 200 response body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .execute(Method::GET, url, None, HeaderMap::new())
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(status_error(status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Look up an item by its path segments.
    pub async fn get_item<S: AsRef<str>>(&self, segments: &[S]) -> Result<RemoteItem> {
        let url = self.endpoint(&path::item_address(segments));
        self.get_json(&url).await
    }

    /// Delete an item by ID. Only `204 No Content` counts as success.
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&path::item_by_id(id));
        let response = self
            .execute(Method::DELETE, &url, None, HeaderMap::new())
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        info!("Deleted item {}", id);
        Ok(())
    }

    /// Download the file at `segments` into `dest_dir`, named after the remote item.
    ///
    /// Returns the item metadata and the local path written.
    pub async fn download<S: AsRef<str>, P: AsRef<Path>>(
        &self,
        segments: &[S],
        dest_dir: P,
    ) -> Result<(RemoteItem, PathBuf)> {
        let item = self.get_item(segments).await?;
        if !item.is_file() {
            return Err(DriveError::NotAFile(item.name));
        }

        let url = self.endpoint(&path::content_by_id(&item.id));
        let response = self
            .execute(Method::GET, &url, None, HeaderMap::new())
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        // Stream into a sibling and rename, so a failed transfer leaves nothing
        // under the item's name.
        let final_path = dest_dir.as_ref().join(&item.name);
        let partial = dest_dir.as_ref().join(format!("{}.part", item.name));

        if let Err(e) = write_body(response, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, &final_path).await?;

        info!("Downloaded {} to {}", item.name, final_path.display());
        Ok((item, final_path))
    }
}

async fn write_body(response: Response, dest: &Path) -> Result<()> {
    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(())
}

/// Graph API error body.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: String,
    message: String,
}

/// Build a status error, preferring the structured Graph error message.
pub(crate) fn status_error(status: StatusCode, body: String) -> DriveError {
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_error) => format!("{}: {}", api_error.error.code, api_error.error.message),
        Err(_) => body,
    };
    DriveError::Status {
        status: status.as_u16(),
        message,
    }
}
