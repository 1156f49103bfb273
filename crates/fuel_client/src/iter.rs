//! Lazy sequences of models and worlds.
//!
//! An iterator is either positioned on an item or at its end. Items come from
//! memory (cache results, explicit lists) or from a remote listing fetched one
//! page at a time. A page that fails to load ends the sequence, exactly like
//! an empty page.

use crate::json;
use crate::rest::auth_request;

use fuel_core::prelude::*;
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Something a listing endpoint can return.
pub trait Listing: Sized + Send + 'static {
    fn parse_page(body: &[u8], server: &ServerConfig) -> Vec<Self>;
}

impl Listing for Model {
    fn parse_page(body: &[u8], server: &ServerConfig) -> Vec<Self> {
        json::parse_models(body, server)
            .into_iter()
            .map(Model::from)
            .collect()
    }
}

impl Listing for WorldIdentifier {
    fn parse_page(body: &[u8], server: &ServerConfig) -> Vec<Self> {
        json::parse_worlds(body, server)
    }
}

pub type ModelIter = ResourceIter<Model>;
pub type WorldIter = ResourceIter<WorldIdentifier>;

pub struct ResourceIter<R> {
    current: Option<R>,
    source: Source<R>,
}

enum Source<R> {
    Memory(VecDeque<R>),
    Remote(RemotePager<R>),
}

struct RemotePager<R> {
    transport: Arc<dyn Transport>,
    server: ServerConfig,
    path: String,
    page: u32,
    buffer: VecDeque<R>,
    exhausted: bool,
}

impl<R: Listing> RemotePager<R> {
    async fn next(&mut self) -> Option<R> {
        if let Some(item) = self.buffer.pop_front() {
            return Some(item);
        }
        if self.exhausted {
            return None;
        }

        self.page += 1;
        let page = self.fetch_page().await;
        if page.is_empty() {
            self.exhausted = true;
            return None;
        }
        self.buffer.extend(page);
        self.buffer.pop_front()
    }

    async fn fetch_page(&self) -> Vec<R> {
        let request = RestRequest::new(
            HttpMethod::Get,
            self.server.url_string(),
            self.server.version(),
            self.path.as_str(),
        )
        .query("page", self.page.to_string())
        .header("Accept", "application/json");

        match self.transport.request(auth_request(request, &self.server)).await {
            Ok(response) if response.is_ok() => {
                let text = response.text();
                if text.trim() == "null" {
                    debug!("Page {} of [{}] is empty", self.page, self.path);
                    return Vec::new();
                }
                R::parse_page(&response.body, &self.server)
            }
            Ok(response) => {
                debug!(
                    "Page {} of [{}] answered with status {}",
                    self.page, self.path, response.status
                );
                Vec::new()
            }
            Err(e) => {
                warn!("Unable to fetch page {} of [{}]: {e}", self.page, self.path);
                Vec::new()
            }
        }
    }
}

impl<R> Source<R>
where
    R: Listing,
{
    async fn next(&mut self) -> Option<R> {
        match self {
            Source::Memory(items) => items.pop_front(),
            Source::Remote(pager) => pager.next().await,
        }
    }
}

impl<R: Listing> ResourceIter<R> {
    /// An iterator over items already in memory.
    pub fn from_items(items: impl IntoIterator<Item = R>) -> Self {
        let mut items: VecDeque<R> = items.into_iter().collect();
        Self {
            current: items.pop_front(),
            source: Source::Memory(items),
        }
    }

    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    /// An iterator over the listing at `path`, positioned on the first item
    /// of its first page.
    pub async fn remote(
        transport: Arc<dyn Transport>,
        server: ServerConfig,
        path: impl Into<String>,
    ) -> Self {
        let mut source = Source::Remote(RemotePager {
            transport,
            server,
            path: path.into(),
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        });
        let current = source.next().await;
        Self { current, source }
    }

    /// Whether the iterator is positioned on an item.
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_end(&self) -> bool {
        self.current.is_none()
    }

    pub fn get(&self) -> Option<&R> {
        self.current.as_ref()
    }

    /// Moves to the next item, fetching the next page when needed. Does
    /// nothing once the end has been reached.
    pub async fn advance(&mut self) {
        if self.current.is_some() {
            self.current = self.source.next().await;
        }
    }

    /// Drains the remaining items, current one included.
    pub async fn collect_vec(mut self) -> Vec<R> {
        let mut items = Vec::new();
        while let Some(item) = self.current.take() {
            items.push(item);
            self.current = self.source.next().await;
        }
        items
    }

    pub fn into_stream(self) -> impl Stream<Item = R> {
        futures::stream::unfold(self, |mut iter| async move {
            let item = iter.current.take()?;
            iter.current = iter.source.next().await;
            Some((item, iter))
        })
    }
}

impl ResourceIter<Model> {
    /// An iterator over bare identifiers, without local paths.
    pub fn from_ids(ids: impl IntoIterator<Item = ModelIdentifier>) -> Self {
        Self::from_items(ids.into_iter().map(Model::from))
    }
}

impl<R: Listing> FromIterator<R> for ResourceIter<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn ids(names: &[&str]) -> Vec<ModelIdentifier> {
        names
            .iter()
            .map(|name| ModelIdentifier::new(ServerConfig::default(), "alice", name).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn empty_list_is_at_end() {
        let mut iter = ModelIter::from_ids(Vec::new());
        assert!(!iter.is_valid());
        assert!(iter.is_end());
        iter.advance().await;
        assert!(iter.get().is_none());
    }

    #[tokio::test]
    async fn walks_in_order_then_stays_at_end() {
        let mut iter = ModelIter::from_ids(ids(&["a", "b", "c"]));
        let mut seen = Vec::new();
        while let Some(model) = iter.get() {
            seen.push(model.identification().name().to_string());
            iter.advance().await;
        }
        assert_eq!(seen, ["a", "b", "c"]);

        for _ in 0..5 {
            iter.advance().await;
            assert!(iter.is_end());
        }
    }

    /// Serves `pages[n - 1]` for `page=n`, `null` afterwards.
    struct Pages {
        pages: Vec<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Pages {
        async fn request(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
            let query: HashMap<_, _> = request.query.iter().cloned().collect();
            let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);
            self.requested.lock().unwrap().push(format!("{}?page={page}", request.path));
            match self.pages.get(page.wrapping_sub(1)) {
                Some(body) => Ok(RestResponse::new(200, *body)),
                None => Ok(RestResponse::new(200, "null\n")),
            }
        }
    }

    #[tokio::test]
    async fn remote_pages_are_fetched_lazily() {
        let transport = Arc::new(Pages {
            pages: vec![
                r#"[{"name":"a","owner":"alice"},{"name":"b","owner":"alice"}]"#,
                r#"[{"name":"c","owner":"alice"}]"#,
            ],
            requested: Mutex::new(Vec::new()),
        });

        let mut iter = ModelIter::remote(transport.clone(), ServerConfig::default(), "models").await;
        assert!(iter.is_valid());
        assert_eq!(transport.requested.lock().unwrap().len(), 1);

        iter.advance().await;
        assert_eq!(iter.get().unwrap().identification().name(), "b");
        assert_eq!(transport.requested.lock().unwrap().len(), 1);

        iter.advance().await;
        assert_eq!(iter.get().unwrap().identification().name(), "c");
        iter.advance().await;
        assert!(iter.is_end());
        iter.advance().await;

        assert_eq!(
            *transport.requested.lock().unwrap(),
            ["models?page=1", "models?page=2", "models?page=3"]
        );
    }

    struct Failing;

    #[async_trait]
    impl Transport for Failing {
        async fn request(&self, _request: RestRequest) -> Result<RestResponse, TransportError> {
            Ok(RestResponse::new(500, "boom"))
        }
    }

    #[tokio::test]
    async fn failed_page_ends_the_sequence() {
        let iter = WorldIter::remote(Arc::new(Failing), ServerConfig::default(), "worlds").await;
        assert!(iter.is_end());
    }

    #[tokio::test]
    async fn streams_and_collects() {
        let names: Vec<String> = ModelIter::from_ids(ids(&["a", "b"]))
            .into_stream()
            .map(|m| m.identification().name().to_string())
            .collect()
            .await;
        assert_eq!(names, ["a", "b"]);

        let all = ModelIter::from_ids(ids(&["x", "y", "z"])).collect_vec().await;
        assert_eq!(all.len(), 3);
    }
}
