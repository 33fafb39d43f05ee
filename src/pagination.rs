//! Folder listing and continuation-cursor walking.

use futures::stream::{self, Stream, TryStreamExt};

use crate::client::DriveClient;
use crate::error::Result;
use crate::models::{ListPage, RemoteItem};
use crate::path;

impl DriveClient {
    /// Fetch the first page of a folder's children.
    pub async fn list<S: AsRef<str>>(&self, segments: &[S]) -> Result<ListPage> {
        let url = self.endpoint(&path::children_address(segments));
        self.get_json(&url).await
    }

    /// Fetch the page a continuation cursor points at.
    ///
    /// Cursors are absolute URLs and are requested as-is.
    pub async fn next_page(&self, cursor: &str) -> Result<ListPage> {
        self.get_json(cursor).await
    }

    /// Lazily yield every child of a folder, following cursors until a page
    /// has none. The first error ends the stream.
    pub fn walk_all<S: AsRef<str>>(
        &self,
        segments: &[S],
    ) -> impl Stream<Item = Result<RemoteItem>> + '_ {
        let first = self.endpoint(&path::children_address(segments));
        self.walk_from(first)
    }

    /// Lazily yield items starting from the page at `url`.
    pub fn walk_from(&self, url: String) -> impl Stream<Item = Result<RemoteItem>> + '_ {
        stream::try_unfold(Some(url), move |next| self.fetch_page(next))
            .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
            .try_flatten()
    }

    async fn fetch_page(
        &self,
        url: Option<String>,
    ) -> Result<Option<(Vec<RemoteItem>, Option<String>)>> {
        let url = match url {
            Some(url) => url,
            None => return Ok(None),
        };
        let page = self.next_page(&url).await?;
        Ok(Some((page.items, page.next_cursor)))
    }
}
