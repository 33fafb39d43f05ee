//! Data models for OneDrive (Microsoft Graph) API payloads.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A file or folder in the drive.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub web_url: Option<String>,
    pub kind: ItemKind,
}

/// File-or-folder classification of a [`RemoteItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    File {
        hashes: HashMap<String, String>,
        mime_type: Option<String>,
    },
    Folder {
        child_count: u64,
    },
}

impl RemoteItem {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, ItemKind::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }
}

/// Wire shape of an item: the provider marks the kind with a `file` or a
/// `folder` facet object.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    web_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<FileFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder: Option<FolderFacet>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    #[serde(default)]
    hashes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    #[serde(default)]
    child_count: u64,
}

impl<'de> Deserialize<'de> for RemoteItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let payload = ItemPayload::deserialize(deserializer)?;
        let kind = match (payload.file, payload.folder) {
            (Some(file), None) => ItemKind::File {
                hashes: file.hashes,
                mime_type: file.mime_type,
            },
            (None, Some(folder)) => ItemKind::Folder {
                child_count: folder.child_count,
            },
            (Some(_), Some(_)) => {
                return Err(serde::de::Error::custom(format!(
                    "item {} has both a file and a folder facet",
                    payload.id
                )))
            }
            (None, None) => {
                return Err(serde::de::Error::custom(format!(
                    "item {} has neither a file nor a folder facet",
                    payload.id
                )))
            }
        };

        Ok(RemoteItem {
            id: payload.id,
            name: payload.name,
            size: payload.size,
            web_url: payload.web_url,
            kind,
        })
    }
}

impl Serialize for RemoteItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (file, folder) = match &self.kind {
            ItemKind::File { hashes, mime_type } => (
                Some(FileFacet {
                    hashes: hashes.clone(),
                    mime_type: mime_type.clone(),
                }),
                None,
            ),
            ItemKind::Folder { child_count } => (
                None,
                Some(FolderFacet {
                    child_count: *child_count,
                }),
            ),
        };

        ItemPayload {
            id: self.id.clone(),
            name: self.name.clone(),
            size: self.size,
            web_url: self.web_url.clone(),
            file,
            folder,
        }
        .serialize(serializer)
    }
}

impl std::fmt::Display for RemoteItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.kind {
            ItemKind::Folder { .. } => format!("{}/", self.name),
            ItemKind::File { .. } => self.name.clone(),
        };
        write!(
            f,
            "{:<20} {:>10} {:<48} {}",
            self.id,
            format_size(self.size),
            self.web_url.as_deref().unwrap_or("-"),
            name
        )
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One page of a children listing.
#[derive(Debug, Deserialize)]
pub struct ListPage {
    #[serde(rename = "value", default)]
    pub items: Vec<RemoteItem>,
    #[serde(
        rename = "@odata.nextLink",
        default,
        deserialize_with = "deserialize_cursor"
    )]
    pub next_cursor: Option<String>,
}

fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.is_empty()))
}

/// Resumable upload session returned by `createUploadSession`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

pub(crate) fn default_token_type() -> String {
    "Bearer".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_file_item_deserialize() {
        let json = r#"{
            "id": "01ABC",
            "name": "report.pdf",
            "size": 2048,
            "webUrl": "https://onedrive.live.com/?id=01ABC",
            "file": {
                "mimeType": "application/pdf",
                "hashes": { "sha1Hash": "DEADBEEF" }
            }
        }"#;

        let item: RemoteItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "01ABC");
        assert_eq!(item.size, 2048);
        match item.kind {
            ItemKind::File { hashes, mime_type } => {
                assert_eq!(mime_type.as_deref(), Some("application/pdf"));
                assert_eq!(hashes.get("sha1Hash").map(String::as_str), Some("DEADBEEF"));
            }
            ItemKind::Folder { .. } => panic!("expected a file"),
        }
    }

    #[test]
    fn test_folder_item_deserialize() {
        let json = r#"{"id": "02F", "name": "Photos", "folder": {"childCount": 7}}"#;

        let item: RemoteItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.kind, ItemKind::Folder { child_count: 7 });
        assert!(item.is_folder());
        assert_eq!(item.web_url, None);
    }

    #[test]
    fn test_item_with_both_facets_rejected() {
        let json = r#"{"id": "x", "name": "x", "file": {}, "folder": {"childCount": 0}}"#;
        let err = serde_json::from_str::<RemoteItem>(json).unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_item_with_no_facet_rejected() {
        let json = r#"{"id": "x", "name": "x"}"#;
        let err = serde_json::from_str::<RemoteItem>(json).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn test_item_serializes_single_facet() {
        let item = RemoteItem {
            id: "f1".to_string(),
            name: "docs".to_string(),
            size: 0,
            web_url: None,
            kind: ItemKind::Folder { child_count: 3 },
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["folder"]["childCount"], 3);
        assert!(value.get("file").is_none());
    }

    #[test]
    fn test_empty_cursor_is_terminal() {
        let json = r#"{"value": [], "@odata.nextLink": ""}"#;
        let page: ListPage = serde_json::from_str(json).unwrap();
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_item_display() {
        let item = RemoteItem {
            id: "abc123".to_string(),
            name: "Music".to_string(),
            size: 1024,
            web_url: None,
            kind: ItemKind::Folder { child_count: 1 },
        };

        let display = format!("{}", item);
        assert!(display.contains("abc123"));
        assert!(display.contains("1.00 KB"));
        assert!(display.ends_with("Music/"));
    }
}
