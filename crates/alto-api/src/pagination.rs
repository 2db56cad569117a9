// Collection walking.
//
// Listing endpoints return pages shaped `{ count, results, next }` where
// `next` is an opaque continuation URL. The pager is a non-restartable
// cursor over those pages: each `next_page` call issues exactly one
// request, and the walk ends when a page carries no continuation. Pages are
// fetched strictly sequentially -- each depends on the previous page's
// continuation -- and objects are delivered in response order, without
// client-side reordering or deduplication.

use futures_util::Stream;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::options::ApiOptions;
use crate::path::ApiPath;
use crate::session::{Session, decode_body, decode_value};

/// One page of a collection response.
#[derive(Debug, Deserialize)]
pub struct CollectionPage {
    /// Controller-reported total across all pages.
    #[serde(default)]
    pub count: i64,
    /// Objects on this page, in response order.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    /// Continuation URL; absent on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

/// A fully (or partially, if cancelled) walked collection.
#[derive(Debug, Default)]
pub struct Collection {
    /// Controller-reported total, or the accumulated length if the
    /// controller reported none.
    pub count: i64,
    /// All objects in fetch order.
    pub results: Vec<serde_json::Value>,
    /// False when the walk was cancelled before the last page.
    pub complete: bool,
}

enum PagerState {
    Start(String),
    Next(Url),
    Done,
}

/// Cursor over a paginated listing endpoint.
///
/// Each `next_page` call is a suspension point issuing one request.
/// Dropping the pager -- or cancelling via the options' token -- stops
/// further page fetches without touching pages already handed out.
pub struct CollectionPager<'a> {
    session: &'a Session,
    opts: ApiOptions,
    state: PagerState,
    pages_fetched: usize,
}

impl<'a> CollectionPager<'a> {
    /// `opts` must already be layered over the session defaults.
    pub(crate) fn new(session: &'a Session, uri: String, opts: ApiOptions) -> Self {
        Self {
            session,
            opts,
            state: PagerState::Start(uri),
            pages_fetched: 0,
        }
    }

    /// Fetch the next page, or `None` once the previous page carried no
    /// continuation. Returns [`Error::Cancelled`] instead of issuing a
    /// request once the cancellation token fires.
    pub async fn next_page(&mut self) -> Result<Option<CollectionPage>, Error> {
        let url = match &self.state {
            PagerState::Done => return Ok(None),
            PagerState::Start(uri) => self.session.build_url(uri, &self.opts, true)?,
            PagerState::Next(url) => url.clone(),
        };

        let raw = self
            .session
            .send_api(Method::GET, url, None, &self.opts)
            .await?;
        let page: CollectionPage = decode_body(&raw.body)?;

        self.pages_fetched += 1;
        trace!(
            "collection page {} carried {} objects",
            self.pages_fetched,
            page.results.len()
        );

        self.state = match &page.next {
            Some(next) => PagerState::Next(self.session.rebase(next)?),
            None => PagerState::Done,
        };
        Ok(Some(page))
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}

impl Session {
    /// Cursor over a listing endpoint, for callers that want page-at-a-time
    /// control (incremental rendering, early exit, cancellation with the
    /// already-fetched pages kept).
    pub fn pager(&self, path: &ApiPath, options: &ApiOptions) -> CollectionPager<'_> {
        CollectionPager::new(self, path.uri(), options.layered_over(&self.defaults))
    }

    /// Walk the whole collection and return the accumulated raw objects.
    ///
    /// If the options' cancellation token fires mid-walk, no further pages
    /// are requested and the accumulated result is returned with
    /// `complete == false` instead of being discarded.
    pub async fn get_collection_raw(
        &self,
        path: &ApiPath,
        options: &ApiOptions,
    ) -> Result<Collection, Error> {
        let mut pager = self.pager(path, options);
        let mut out = Collection {
            count: 0,
            results: Vec::new(),
            complete: true,
        };
        loop {
            match pager.next_page().await {
                Ok(Some(page)) => {
                    if pager.pages_fetched() == 1 {
                        out.count = page.count;
                    }
                    out.results.extend(page.results);
                }
                Ok(None) => break,
                Err(Error::Cancelled) => {
                    debug!(
                        "collection walk of {} cancelled after {} objects",
                        path,
                        out.results.len()
                    );
                    out.complete = false;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if out.count == 0 {
            out.count = i64::try_from(out.results.len()).unwrap_or(i64::MAX);
        }
        Ok(out)
    }

    /// Walk the whole collection into a typed `Vec<T>`, concatenating pages
    /// in fetch order.
    ///
    /// A cancelled walk is reported as [`Error::Cancelled`]; use
    /// [`Session::get_collection_raw`] or [`Session::pager`] when partial
    /// results should survive cancellation.
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &ApiPath,
        options: &ApiOptions,
    ) -> Result<Vec<T>, Error> {
        let collection = self.get_collection_raw(path, options).await?;
        if !collection.complete {
            return Err(Error::Cancelled);
        }
        collection.results.into_iter().map(decode_value).collect()
    }

    /// Lazily stream a collection's objects. Page fetches happen as the
    /// stream is polled; dropping the stream stops them.
    pub fn collection_stream<'a, T>(
        &'a self,
        path: &ApiPath,
        options: &ApiOptions,
    ) -> impl Stream<Item = Result<T, Error>> + 'a
    where
        T: DeserializeOwned + 'a,
    {
        let opts = options.layered_over(&self.defaults);
        let uri = path.uri();
        async_stream::try_stream! {
            let mut pager = CollectionPager::new(self, uri, opts);
            while let Some(page) = pager.next_page().await? {
                for value in page.results {
                    let item: T = decode_value(value)?;
                    yield item;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn collection_page_decodes_with_missing_fields() {
        let page: CollectionPage = serde_json::from_str(r#"{"results": [{}]}"#).unwrap();
        assert_eq!(page.count, 0);
        assert_eq!(page.results.len(), 1);
        assert!(page.next.is_none());
    }

    #[test]
    fn collection_page_keeps_continuation() {
        let page: CollectionPage = serde_json::from_str(
            r#"{"count": 5, "results": [], "next": "https://ctrl/api/pool?page=2"}"#,
        )
        .unwrap();
        assert_eq!(page.next.as_deref(), Some("https://ctrl/api/pool?page=2"));
    }
}
