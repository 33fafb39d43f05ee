//! onedrive CLI - Work with files on Microsoft OneDrive.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use glob::glob;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use onedrive::path::split_segments;
use onedrive::{
    Authenticator, ClientConfig, ConfigDir, DriveClient, Endpoints, RemoteItem, TokenStore,
    DEFAULT_CALLBACK_TIMEOUT,
};

/// CLI tool for working with files on OneDrive.
#[derive(Parser)]
#[command(name = "onedrive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding config.json and access_token.json (default: ~/.onedrive).
    #[arg(long, env = "ONEDRIVE_HOME", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the OAuth2 application credentials.
    Config {
        #[arg(long = "client_id", env = "ONEDRIVE_CLIENT_ID")]
        client_id: String,

        #[arg(long = "client_secret", env = "ONEDRIVE_CLIENT_SECRET")]
        client_secret: String,
    },

    /// Authorize in a browser and store the resulting token.
    Auth {
        /// Seconds to wait for the browser redirect.
        #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT.as_secs())]
        timeout: u64,
    },

    /// Refresh the stored access token.
    Refresh,

    /// Upload files (glob patterns accepted).
    Upload {
        #[arg(required = true)]
        files: Vec<String>,

        /// Remote destination folder.
        #[arg(long, default_value = "upload")]
        path: String,
    },

    /// List a folder (drive root when no path is given).
    Ls {
        segments: Vec<String>,

        /// Follow continuation links and list every page.
        #[arg(long)]
        all: bool,
    },

    /// Download a file by its remote path.
    Download {
        #[arg(required = true)]
        segments: Vec<String>,

        /// Local destination directory.
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },

    /// Delete items by ID.
    Del {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let dir = match cli.config_dir {
        Some(root) => ConfigDir::new(root),
        None => ConfigDir::default_location()?,
    };

    match cli.command {
        Commands::Config {
            client_id,
            client_secret,
        } => {
            let config = ClientConfig::new(client_id, client_secret)?;
            config
                .save(dir.config_file())
                .with_context(|| format!("Failed to save config to {:?}", dir.config_file()))?;
            info!("Saved config to {}", dir.config_file().display());
        }

        Commands::Auth { timeout } => {
            let auth = authenticator(&dir)?;
            auth.authorize(Duration::from_secs(timeout), |url| {
                println!("Open this URL in a browser to authorize:");
                println!("{}", url);
            })
            .await
            .context("Authorization failed")?;
            println!("Authorized.");
        }

        Commands::Refresh => {
            let auth = authenticator(&dir)?;
            auth.refresh().await.context("Failed to refresh token")?;
        }

        Commands::Upload { files, path } => {
            connect_and_run(&dir, ClientCommand::Upload { files, path }).await?
        }

        Commands::Ls { segments, all } => {
            connect_and_run(&dir, ClientCommand::Ls { segments, all }).await?
        }

        Commands::Download { segments, to } => {
            connect_and_run(&dir, ClientCommand::Download { segments, to }).await?
        }

        Commands::Del { ids } => connect_and_run(&dir, ClientCommand::Del { ids }).await?,
    }

    Ok(())
}

/// Commands that need an authenticated client.
enum ClientCommand {
    Upload { files: Vec<String>, path: String },
    Ls { segments: Vec<String>, all: bool },
    Download { segments: Vec<String>, to: PathBuf },
    Del { ids: Vec<String> },
}

async fn connect_and_run(dir: &ConfigDir, command: ClientCommand) -> Result<()> {
    let auth = authenticator(dir)?;
    let client = DriveClient::connect(&auth)
        .await
        .context("Failed to obtain a valid access token")?;
    run(&client, command).await
}

fn authenticator(dir: &ConfigDir) -> Result<Authenticator> {
    let config = ClientConfig::load(dir.config_file())
        .with_context(|| format!("Failed to load config from {:?}", dir.config_file()))?;
    Ok(Authenticator::new(
        config,
        Endpoints::default(),
        TokenStore::new(dir.token_file()),
    ))
}

async fn run(client: &DriveClient, command: ClientCommand) -> Result<()> {
    match command {
        ClientCommand::Upload { files, path } => {
            let dirs = split_segments(&path);
            let files = resolve_upload_files(&files)?;
            upload_files(client, &files, &dirs).await?;
        }

        ClientCommand::Ls { segments, all } => {
            let segments = flatten_segments(&segments);
            println!("{:<20} {:>10} {:<48} {}", "ID", "SIZE", "URL", "NAME");

            if all {
                let items = client.walk_all(&segments);
                futures::pin_mut!(items);
                while let Some(item) = items.try_next().await.context("Failed to list folder")? {
                    println!("{}", item);
                }
            } else {
                let page = client
                    .list(&segments)
                    .await
                    .context("Failed to list folder")?;
                print_items(&page.items);
                if let Some(cursor) = page.next_cursor {
                    println!("next link: {}", cursor);
                }
            }
        }

        ClientCommand::Download { segments, to } => {
            let segments = flatten_segments(&segments);
            std::fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create directory: {:?}", to))?;

            let (_, saved) = client
                .download(&segments, &to)
                .await
                .with_context(|| format!("Failed to download {}", segments.join("/")))?;
            println!("Saved to: {:?}", saved);
        }

        ClientCommand::Del { ids } => {
            delete_items(client, &ids).await;
        }
    }

    Ok(())
}

/// Upload `files` in order, stopping at the first failure.
async fn upload_files(
    client: &DriveClient,
    files: &[PathBuf],
    dirs: &[String],
) -> Result<Vec<RemoteItem>> {
    let mut uploaded = Vec::with_capacity(files.len());

    for file in files {
        info!("Uploading {:?} to /{}", file, dirs.join("/"));
        let item = client
            .upload(file, dirs)
            .await
            .with_context(|| format!("Failed to upload {:?}", file))?;
        println!("{}", serde_json::to_string_pretty(&item)?);
        uploaded.push(item);
    }

    Ok(uploaded)
}

/// Delete every ID, logging failures and moving on. Returns the failure count.
async fn delete_items(client: &DriveClient, ids: &[String]) -> usize {
    let mut failed = 0;

    for id in ids {
        match client.delete_by_id(id).await {
            Ok(()) => info!("Deleted {}", id),
            Err(e) => {
                warn!("Failed to delete {}: {}", id, e);
                failed += 1;
            }
        }
    }

    failed
}

fn print_items(items: &[RemoteItem]) {
    for item in items {
        println!("{}", item);
    }
}

/// Accept both `a b c` and `a/b/c` for remote paths.
fn flatten_segments(args: &[String]) -> Vec<String> {
    args.iter().flat_map(|arg| split_segments(arg)).collect()
}

/// Expand upload arguments into files, keeping command-line order.
///
/// An argument naming an existing file is taken literally; anything else is
/// treated as a glob pattern that must match at least one file.
fn resolve_upload_files(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        let matches: Vec<PathBuf> = if literal.is_file() {
            vec![literal]
        } else {
            glob(pattern)
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect()
        };

        if matches.is_empty() {
            anyhow::bail!("No files matched: {}", pattern);
        }

        for path in matches {
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_flatten_segments() {
        let args = vec!["Documents/2024".to_string(), "report.pdf".to_string()];
        assert_eq!(
            flatten_segments(&args),
            vec!["Documents", "2024", "report.pdf"]
        );
    }

    #[test]
    fn test_resolve_literal_and_glob() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.log");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let patterns = vec![
            b.to_string_lossy().to_string(),
            format!("{}/*.txt", dir.path().display()),
            a.to_string_lossy().to_string(),
        ];
        let files = resolve_upload_files(&patterns).unwrap();
        assert_eq!(files, vec![b, a]);
    }

    #[test]
    fn test_resolve_missing_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.bin").to_string_lossy().to_string();
        assert!(resolve_upload_files(&[missing]).is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["onedrive", "ls", "--all", "Music"]);
        match cli.command {
            Commands::Ls { segments, all } => {
                assert!(all);
                assert_eq!(segments, vec!["Music"]);
            }
            _ => panic!("expected ls"),
        }

        let cli = Cli::parse_from(["onedrive", "config", "--client_id", "id", "--client_secret", "s"]);
        assert!(matches!(cli.command, Commands::Config { .. }));
    }

    #[tokio::test]
    async fn test_delete_continues_after_failure() {
        let mut server = Server::new_async().await;
        let missing = server
            .mock("DELETE", "/items/gone")
            .with_status(404)
            .with_body(r#"{"error":{"code":"itemNotFound","message":"Item not found"}}"#)
            .expect(1)
            .create_async()
            .await;
        let present = server
            .mock("DELETE", "/items/there")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let client = DriveClient::with_token("t", server.url());
        let ids = vec!["gone".to_string(), "there".to_string()];
        assert_eq!(delete_items(&client, &ids).await, 1);

        missing.assert_async().await;
        present.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_batch_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        std::fs::write(&first, "one").unwrap();
        std::fs::write(&second, "two").unwrap();

        let mut server = Server::new_async().await;
        let rejected = server
            .mock("PUT", "/root:/upload/first.bin:/content")
            .with_status(507)
            .with_body(r#"{"error":{"code":"quotaLimitReached","message":"Insufficient storage"}}"#)
            .expect(1)
            .create_async()
            .await;
        let skipped = server
            .mock("PUT", "/root:/upload/second.bin:/content")
            .with_status(201)
            .with_body(
                json!({"id": "S2", "name": "second.bin", "size": 3, "file": {}}).to_string(),
            )
            .expect(0)
            .create_async()
            .await;

        let client = DriveClient::with_token("t", server.url());
        let dirs = vec!["upload".to_string()];
        let err = upload_files(&client, &[first, second], &dirs)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("507"));
        rejected.assert_async().await;
        skipped.assert_async().await;
    }
}
