//! Persistence of the OAuth2 credential.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::TokenResponse;

/// Subtracted from relative lifetimes so a token is refreshed before the
/// provider starts rejecting it.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access/refresh token pair and its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token endpoint response received at `received_at`.
    pub fn from_response(response: TokenResponse, received_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            expiry: infer_expiry(received_at, response.expires_in)?,
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
        })
    }

    /// True iff `now` is strictly before the expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

fn infer_expiry(issued_at: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_seconds(expires_in.saturating_sub(EXPIRY_MARGIN_SECS))
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or(DriveError::InvalidExpiry(expires_in))
}

/// On-disk shape. Older files and raw token responses carry only `expires_in`.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    #[serde(default = "crate::models::default_token_type")]
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credential.
    ///
    /// When the file holds only a relative `expires_in`, the expiry is taken
    /// relative to the file's modification time. A file with neither field
    /// yields an already expired credential.
    pub fn load(&self) -> Result<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DriveError::CredentialNotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let stored: StoredCredential = serde_json::from_str(&content)?;

        let expiry = match (stored.expiry, stored.expires_in) {
            (Some(expiry), _) => expiry,
            (None, Some(expires_in)) => {
                let modified: DateTime<Utc> = fs::metadata(&self.path)?.modified()?.into();
                debug!("Inferring token expiry from file modification time {}", modified);
                infer_expiry(modified, expires_in)?
            }
            (None, None) => DateTime::<Utc>::UNIX_EPOCH,
        };

        Ok(Credential {
            access_token: stored.access_token,
            token_type: stored.token_type,
            refresh_token: stored.refresh_token,
            expiry,
        })
    }

    /// Persist the credential, replacing any previous file.
    ///
    /// The content is written to a sibling temp file and renamed into place.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredCredential {
            access_token: credential.access_token.clone(),
            token_type: credential.token_type.clone(),
            refresh_token: credential.refresh_token.clone(),
            expiry: Some(credential.expiry),
            expires_in: None,
        };
        let content = serde_json::to_string_pretty(&stored)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::{Duration as StdDuration, UNIX_EPOCH};
    use tempfile::tempdir;

    fn credential(expiry: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry,
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("sub").join("access_token.json"));

        let original = credential(Utc::now() + Duration::minutes(30));
        store.save(&original).unwrap();

        assert_eq!(store.load().unwrap(), original);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("access_token.json"));

        store.save(&credential(Utc::now())).unwrap();
        let mut newer = credential(Utc::now() + Duration::hours(1));
        newer.access_token = "second".to_string();
        store.save(&newer).unwrap();

        assert_eq!(store.load().unwrap().access_token, "second");
        assert!(!dir.path().join("access_token.json.tmp").exists());
    }

    #[test]
    fn test_validity_boundary() {
        let expiry = Utc::now();
        let c = credential(expiry);

        assert!(c.is_valid_at(expiry - Duration::nanoseconds(1)));
        assert!(!c.is_valid_at(expiry));
        assert!(!c.is_valid_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_expiry_inferred_from_modification_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_token.json");
        fs::write(
            &path,
            r#"{"access_token":"a","token_type":"bearer","refresh_token":"r","expires_in":3600}"#,
        )
        .unwrap();

        let modified = UNIX_EPOCH + StdDuration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();

        let loaded = TokenStore::new(&path).load().unwrap();
        let expected = DateTime::<Utc>::from(modified) + Duration::seconds(3540);
        assert_eq!(loaded.expiry, expected);
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_token.json");
        fs::write(
            &path,
            r#"{"access_token":"a","refresh_token":"r","expires_in":9223372036854775807}"#,
        )
        .unwrap();

        assert!(matches!(
            TokenStore::new(&path).load(),
            Err(DriveError::InvalidExpiry(i64::MAX))
        ));
    }

    #[test]
    fn test_absolute_expiry_preferred() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_token.json");
        fs::write(
            &path,
            r#"{"access_token":"a","token_type":"Bearer","expiry":"2030-01-01T00:00:00Z","expires_in":3600}"#,
        )
        .unwrap();

        let loaded = TokenStore::new(&path).load().unwrap();
        assert_eq!(loaded.expiry.to_rfc3339(), "2030-01-01T00:00:00+00:00");
        assert_eq!(loaded.refresh_token, None);
    }

    #[test]
    fn test_missing_expiry_is_expired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_token.json");
        fs::write(&path, r#"{"access_token":"a"}"#).unwrap();

        let loaded = TokenStore::new(&path).load().unwrap();
        assert!(!loaded.is_valid());
        assert_eq!(loaded.token_type, "Bearer");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nope.json"));
        assert!(matches!(store.load(), Err(DriveError::CredentialNotFound(_))));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_token.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(TokenStore::new(&path).load(), Err(DriveError::Decode(_))));
    }

    #[test]
    fn test_from_response_applies_margin() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "a".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };

        let c = Credential::from_response(response, now).unwrap();
        assert_eq!(c.expiry, now + Duration::seconds(3540));
    }

    #[test]
    fn test_from_response_rejects_extreme_lifetimes() {
        for expires_in in [i64::MAX, i64::MIN] {
            let response = TokenResponse {
                access_token: "a".to_string(),
                token_type: "Bearer".to_string(),
                refresh_token: None,
                expires_in,
            };
            assert!(matches!(
                Credential::from_response(response, Utc::now()),
                Err(DriveError::InvalidExpiry(v)) if v == expires_in
            ));
        }
    }
}
