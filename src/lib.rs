//! onedrive - A CLI tool for working with files on Microsoft OneDrive.
//!
//! This library provides functionality to:
//! - Authorize with OAuth2 and keep the access token fresh on disk
//! - List folders, following continuation cursors
//! - Upload files (single PUT or upload session, by size)
//! - Download and delete items
//!
//! # Example
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use onedrive::{Authenticator, ClientConfig, ConfigDir, DriveClient, Endpoints, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dir = ConfigDir::default_location()?;
//!     let config = ClientConfig::load(dir.config_file())?;
//!     let auth = Authenticator::new(config, Endpoints::default(), TokenStore::new(dir.token_file()));
//!     let client = DriveClient::connect(&auth).await?;
//!
//!     let items: Vec<_> = client.walk_all(&["Documents"]).try_collect().await?;
//!     for item in items {
//!         println!("{}", item);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
mod pagination;
pub mod path;
pub mod token_store;
pub mod upload;

// Re-exports for convenience
pub use auth::{Authenticator, CallbackListener, DEFAULT_CALLBACK_TIMEOUT};
pub use client::DriveClient;
pub use config::{ClientConfig, ConfigDir, Endpoints};
pub use error::{DriveError, Result};
pub use models::{ItemKind, ListPage, RemoteItem, UploadSession};
pub use token_store::{Credential, TokenStore};
pub use upload::{UploadStrategy, SIMPLE_UPLOAD_LIMIT};
