//! OAuth2 authorization-code and refresh flows for the Microsoft identity platform.
//!
//! Authorization runs a short-lived local HTTP listener on the redirect URI.
//! The listener resolves with the first authorization code it receives, or
//! gives up after a timeout, and the caller decides what happens next.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Router;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Endpoints};
use crate::error::{DriveError, Result};
use crate::models::TokenResponse;
use crate::token_store::{Credential, TokenStore};

/// How long the callback listener waits for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives the interactive authorization and token refresh.
pub struct Authenticator {
    config: ClientConfig,
    endpoints: Endpoints,
    store: TokenStore,
    http: Client,
}

impl Authenticator {
    pub fn new(config: ClientConfig, endpoints: Endpoints, store: TokenStore) -> Self {
        Self {
            config,
            endpoints,
            store,
            http: Client::new(),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// URL the user opens in a browser to grant access.
    pub fn authorization_url(&self) -> Result<String> {
        let scope = self.endpoints.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.endpoints.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| DriveError::InvalidConfig(format!("authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    /// Run the full authorization-code flow.
    ///
    /// `present` receives the authorization URL once the callback listener is
    /// bound. The obtained credential is persisted and returned.
    pub async fn authorize<F>(&self, timeout: Duration, present: F) -> Result<Credential>
    where
        F: FnOnce(&str),
    {
        let url = self.authorization_url()?;
        let listener = CallbackListener::bind(&self.endpoints.redirect_uri).await?;
        present(&url);

        let code = listener.wait(timeout).await?;
        self.exchange_code(&code).await
    }

    /// Exchange an authorization code for a credential and persist it.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        info!("Exchanging authorization code for tokens");

        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ])
            .await?;

        let credential = Credential::from_response(response, Utc::now())?;
        self.store.save(&credential)?;
        info!("Authorization complete, token expires at {}", credential.expiry);
        Ok(credential)
    }

    /// Refresh the stored credential and persist the result.
    pub async fn refresh(&self) -> Result<Credential> {
        let current = self.store.load()?;
        let refresh_token = current
            .refresh_token
            .ok_or(DriveError::MissingRefreshToken)?;

        info!("Refreshing access token");
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ])
            .await?;

        let mut credential = Credential::from_response(response, Utc::now())?;
        if credential.refresh_token.is_none() {
            credential.refresh_token = Some(refresh_token);
        }
        self.store.save(&credential)?;
        debug!("Refreshed token expires at {}", credential.expiry);
        Ok(credential)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::AuthFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>;

/// Query parameters of the redirect.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Single-use listener for the OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    /// Bind to the host and port of `redirect_uri`.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| DriveError::InvalidRedirectUri(format!("{}: {}", redirect_uri, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| DriveError::InvalidRedirectUri(redirect_uri.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DriveError::InvalidRedirectUri(redirect_uri.to_string()))?;

        let listener = TcpListener::bind((host, port)).await?;
        info!("Waiting for authorization callback on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until a request carrying `code` (or `error`) arrives, or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let tx: CodeSender = Arc::new(Mutex::new(Some(tx)));

        let app = Router::new().fallback(handle_callback).with_state(tx);
        let listener = self.listener;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Callback server error: {}", e);
            }
        });

        let received = tokio::time::timeout(timeout, rx).await;
        server.abort();

        match received {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DriveError::AuthCallback(
                "callback channel closed unexpectedly".to_string(),
            )),
            Err(_) => Err(DriveError::AuthTimeout(timeout.as_secs())),
        }
    }
}

async fn handle_callback(
    State(tx): State<CodeSender>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        warn!("Authorization was rejected: {} {}", error, description);
        if let Some(tx) = tx.lock().await.take() {
            let _ = tx.send(Err(DriveError::AuthCallback(format!(
                "{}: {}",
                error, description
            ))));
        }
        return (StatusCode::BAD_REQUEST, Html(FAILURE_HTML));
    }

    match params.code {
        Some(code) => {
            debug!("Authorization code received");
            if let Some(tx) = tx.lock().await.take() {
                let _ = tx.send(Ok(code));
            }
            (StatusCode::OK, Html(SUCCESS_HTML))
        }
        None => (StatusCode::BAD_REQUEST, Html(MISSING_CODE_HTML)),
    }
}

const SUCCESS_HTML: &str =
    "<html><body><h1>Authorized</h1><p>You can close this window.</p></body></html>";

const FAILURE_HTML: &str =
    "<html><body><h1>Authorization failed</h1><p>Check the terminal for details.</p></body></html>";

const MISSING_CODE_HTML: &str =
    "<html><body><h1>Missing code</h1><p>No authorization code in this request.</p></body></html>";
