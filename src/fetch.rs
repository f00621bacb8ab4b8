//! Cursor/token paginated retrieval from read-only provider catalogs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::http::send_json;
use crate::model::{Provider, RawCatalogItem};
use crate::retry::RetryPolicy;

/// One (service, region) slice of a provider catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceQuery {
    pub provider: Provider,
    pub service: String,
    pub region: String,
    /// Query parameters of the first request.
    pub params: Vec<(String, String)>,
}

impl SourceQuery {
    pub fn new(
        provider: Provider,
        service: impl Into<String>,
        region: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider,
            service: service.into(),
            region: region.into(),
            params,
        }
    }

    pub fn label(&self) -> String {
        format!("{}:{}@{}", self.provider, self.service, self.region)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RawCatalogItem>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Fetch a single page. `cursor` is `None` for the first request only.
    async fn fetch_page(
        &self,
        query: &SourceQuery,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError>;
}

/// How the cursor of one response is turned into the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// The cursor is an absolute URL, requested without the original parameters.
    NextLink,
    /// The cursor is sent as this query parameter alongside the original ones.
    QueryParam(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorStyle {
    pub items_field: &'static str,
    pub next_field: &'static str,
    pub mode: CursorMode,
}

impl CursorStyle {
    /// Azure Retail Prices API.
    pub const AZURE: CursorStyle = CursorStyle {
        items_field: "Items",
        next_field: "NextPageLink",
        mode: CursorMode::NextLink,
    };
    /// Google Cloud Billing Catalog API.
    pub const GCP: CursorStyle = CursorStyle {
        items_field: "skus",
        next_field: "nextPageToken",
        mode: CursorMode::QueryParam("pageToken"),
    };
    /// Plain `{ items, nextCursor }` endpoints.
    pub const GENERIC: CursorStyle = CursorStyle {
        items_field: "items",
        next_field: "nextCursor",
        mode: CursorMode::QueryParam("cursor"),
    };

    pub fn parse_page(&self, endpoint: &str, body: &Value) -> Result<Page, FetchError> {
        let Some(obj) = body.as_object() else {
            return Err(FetchError::permanent(
                endpoint,
                "unexpected response shape (expected object)",
            ));
        };
        let items = match obj.get(self.items_field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(arr)) => arr.iter().map(decode_item).collect(),
            Some(_) => {
                return Err(FetchError::permanent(
                    endpoint,
                    format!("`{}` is not an array", self.items_field),
                ))
            }
        };
        let next_cursor = obj
            .get(self.next_field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Page { items, next_cursor })
    }
}

/// AWS price lists embed each product as a JSON-encoded string.
fn decode_item(value: &Value) -> RawCatalogItem {
    if let Value::String(s) = value {
        if let Ok(inner @ Value::Object(_)) = serde_json::from_str::<Value>(s) {
            return RawCatalogItem::new(inner);
        }
    }
    RawCatalogItem::new(value.clone())
}

#[derive(Debug, Clone)]
pub struct HttpPageSource {
    http: Client,
    endpoint: String,
    style: CursorStyle,
}

impl HttpPageSource {
    pub fn new(http: Client, endpoint: impl Into<String>, style: CursorStyle) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            style,
        }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_page(
        &self,
        query: &SourceQuery,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let req = match (cursor, self.style.mode) {
            (None, _) => self.http.get(&self.endpoint).query(&query.params),
            (Some(link), CursorMode::NextLink) => self.http.get(link),
            (Some(token), CursorMode::QueryParam(param)) => self
                .http
                .get(&self.endpoint)
                .query(&query.params)
                .query(&[(param, token)]),
        };
        let body = send_json(req).await.map_err(|f| FetchError {
            class: f.class,
            endpoint: self.endpoint.clone(),
            reason: f.to_string(),
        })?;
        self.style.parse_page(&self.endpoint, &body)
    }
}

/// Drains every page of a query. All-or-nothing: if any page exhausts its
/// retries, pages already fetched are dropped and the error is returned.
#[derive(Clone)]
pub struct PaginatedFetcher {
    source: Arc<dyn PageSource>,
    retry: RetryPolicy,
    page_limit: u32,
    page_delay: Duration,
}

impl PaginatedFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        retry: RetryPolicy,
        page_limit: u32,
        page_delay: Duration,
    ) -> Self {
        Self {
            source,
            retry,
            page_limit: page_limit.max(1),
            page_delay,
        }
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    pub async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawCatalogItem>, FetchError> {
        let label = query.label();
        let mut items: Vec<RawCatalogItem> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .retry
                .run("fetch_page", |_| {
                    self.source.fetch_page(query, cursor.as_deref())
                })
                .await?;
            pages += 1;
            let page_len = page.items.len();
            items.extend(page.items);
            debug!(query = %label, page = pages, page_len, total = items.len(), "page fetched");

            let Some(next) = page.next_cursor else {
                break;
            };
            if pages >= self.page_limit {
                info!(
                    query = %label,
                    page_limit = self.page_limit,
                    total = items.len(),
                    "page limit reached; stopping pagination"
                );
                break;
            }
            cursor = Some(next);
            if page_len > 0 && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves canned pages; cursors are the page index as a string.
    struct ScriptedSource {
        pages: Vec<Vec<i64>>,
        seen_cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        fn endpoint(&self) -> &str {
            "scripted"
        }

        async fn fetch_page(
            &self,
            _query: &SourceQuery,
            cursor: Option<&str>,
        ) -> Result<Page, FetchError> {
            self.seen_cursors
                .lock()
                .unwrap()
                .push(cursor.map(str::to_string));
            let idx: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let items = self.pages[idx]
                .iter()
                .map(|n| RawCatalogItem::new(json!({ "n": n })))
                .collect();
            let next_cursor = (idx + 1 < self.pages.len()).then(|| (idx + 1).to_string());
            Ok(Page { items, next_cursor })
        }
    }

    fn query() -> SourceQuery {
        SourceQuery::new(Provider::Azure, "Storage", "eastus", vec![])
    }

    fn fetcher(source: Arc<ScriptedSource>, limit: u32) -> PaginatedFetcher {
        PaginatedFetcher::new(
            source,
            RetryPolicy::new(3, Duration::from_millis(1)),
            limit,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn follows_cursors_until_exhausted() {
        let source = Arc::new(ScriptedSource {
            pages: vec![vec![1, 2], vec![3, 4], vec![5]],
            seen_cursors: Mutex::new(Vec::new()),
        });
        let items = fetcher(source.clone(), 10).fetch(&query()).await.unwrap();
        assert_eq!(items.len(), 5);
        let cursors = source.seen_cursors.lock().unwrap().clone();
        assert_eq!(
            cursors,
            vec![None, Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let source = Arc::new(ScriptedSource {
            pages: vec![vec![1, 2], vec![3, 4], vec![5, 6]],
            seen_cursors: Mutex::new(Vec::new()),
        });
        let items = fetcher(source.clone(), 2).fetch(&query()).await.unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(source.seen_cursors.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_string_cursor_ends_pagination() {
        let page = CursorStyle::GCP
            .parse_page("gcp", &json!({"skus": [{"skuId": "A"}], "nextPageToken": ""}))
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn string_encoded_items_are_decoded() {
        let page = CursorStyle::GENERIC
            .parse_page(
                "aws",
                &json!({"items": ["{\"product\":{\"sku\":\"X\"}}"], "nextCursor": "abc"}),
            )
            .unwrap();
        assert_eq!(page.items[0].str_at(&["product", "sku"]), Some("X"));
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn non_array_items_are_permanent_errors() {
        let err = CursorStyle::AZURE
            .parse_page("azure", &json!({"Items": "nope"}))
            .unwrap_err();
        assert!(!crate::error::Retryable::is_transient(&err));
    }
}
