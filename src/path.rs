//! Remote path addressing.
//!
//! Items are named by a list of folder/file segments. The drive API expects
//! them relative to `/root` with colon delimiters marking where a path ends
//! and an operation begins:
//!
//! - children of the root: `/root/children`
//! - children of `a/b`: `/root:/a:/b:/children`
//! - the root item: `/root:`
//! - the item `a/b`: `/root:/a/b`
//! - upload content for `a/b/f.txt`: `/root:/a/b/f.txt:/content`

/// Split a slash-separated remote path into segments, dropping empty ones.
pub fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn encoded<S: AsRef<str>>(segments: &[S]) -> impl Iterator<Item = String> + '_ {
    segments
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
}

/// Address listing the children of a folder.
pub fn children_address<S: AsRef<str>>(segments: &[S]) -> String {
    let mut address = String::from("/root");
    let mut any = false;
    for segment in encoded(segments) {
        if !any {
            address.push(':');
            any = true;
        }
        address.push('/');
        address.push_str(&segment);
        address.push(':');
    }
    address.push_str("/children");
    address
}

/// Address of the item itself (metadata lookup).
pub fn item_address<S: AsRef<str>>(segments: &[S]) -> String {
    let mut address = String::from("/root:");
    for segment in encoded(segments) {
        address.push('/');
        address.push_str(&segment);
    }
    address
}

fn item_operation<S: AsRef<str>>(dirs: &[S], filename: &str, operation: &str) -> String {
    let mut address = item_address(dirs);
    address.push('/');
    address.push_str(&urlencoding::encode(filename));
    address.push_str(":/");
    address.push_str(operation);
    address
}

/// Address for a simple content upload of `filename` into `dirs`.
pub fn upload_address<S: AsRef<str>>(dirs: &[S], filename: &str) -> String {
    item_operation(dirs, filename, "content")
}

/// Address for creating a resumable upload session of `filename` into `dirs`.
pub fn upload_session_address<S: AsRef<str>>(dirs: &[S], filename: &str) -> String {
    item_operation(dirs, filename, "createUploadSession")
}

/// Address of an item by ID.
pub fn item_by_id(id: &str) -> String {
    format!("/items/{}", urlencoding::encode(id))
}

/// Address of an item's content by ID.
pub fn content_by_id(id: &str) -> String {
    format!("/items/{}/content", urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn test_root_children_and_root_item_differ() {
        assert_eq!(children_address(&NONE), "/root/children");
        assert_eq!(item_address(&NONE), "/root:");
    }

    #[test]
    fn test_nested_children() {
        assert_eq!(children_address(&["a"]), "/root:/a:/children");
        assert_eq!(children_address(&["a", "b"]), "/root:/a:/b:/children");
    }

    #[test]
    fn test_item_lookup() {
        assert_eq!(item_address(&["docs", "cv.pdf"]), "/root:/docs/cv.pdf");
    }

    #[test]
    fn test_upload_addresses() {
        assert_eq!(
            upload_address(&["upload"], "photo.jpg"),
            "/root:/upload/photo.jpg:/content"
        );
        assert_eq!(upload_address(&NONE, "a.txt"), "/root:/a.txt:/content");
        assert_eq!(
            upload_session_address(&["x", "y"], "big.iso"),
            "/root:/x/y/big.iso:/createUploadSession"
        );
    }

    #[test]
    fn test_segments_are_encoded() {
        assert_eq!(
            item_address(&["My Files", "a#1.txt"]),
            "/root:/My%20Files/a%231.txt"
        );
    }

    #[test]
    fn test_split_drops_empty_segments() {
        assert_eq!(split_segments("/a//b/"), vec!["a", "b"]);
        assert!(split_segments("").is_empty());
        assert_eq!(children_address(&split_segments("/")), "/root/children");
    }
}
