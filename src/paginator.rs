// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record pagination across opaque page tokens.
//!
//! The service caps pages at 500 records and links them with opaque
//! `page_token`s. [`Paginator`] pulls the full result set: filtered
//! queries go through the search endpoint (POST), unfiltered ones
//! through the list endpoint (GET). A page error propagates immediately
//! and no partial result is returned.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::protocol::{
    records_path, search_path, Envelope, FilterRequest, ListRecordsRequest, ListRecordsResponse,
    WireRecord, MAX_PAGE_SIZE,
};
use crate::transport::{ApiExecutor, ApiRequest};

/// Observer invoked after each fetched page with `(page_number,
/// records_so_far)`. Runs on a detached task so a slow observer cannot
/// stall the fetch loop.
pub type ProgressHook = Arc<dyn Fn(u32, usize) + Send + Sync>;

/// Pulls a complete record set page by page.
pub struct Paginator {
    executor: Arc<dyn ApiExecutor>,
    app_token: String,
    table_id: String,
    filter: Option<FilterRequest>,
    sort: Vec<String>,
    user_id_type: Option<String>,
    page_size: usize,
    limit: Option<usize>,
    progress: Option<ProgressHook>,
}

impl Paginator {
    #[must_use]
    pub fn new(
        executor: Arc<dyn ApiExecutor>,
        app_token: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            app_token: app_token.into(),
            table_id: table_id.into(),
            filter: None,
            sort: Vec::new(),
            user_id_type: None,
            page_size: MAX_PAGE_SIZE,
            limit: None,
            progress: None,
        }
    }

    /// Route through the search endpoint with this filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Option<FilterRequest>) -> Self {
        self.filter = filter;
        self
    }

    /// Sort keys (`-` prefix = descending).
    #[must_use]
    pub fn with_sort(mut self, sort: Vec<String>) -> Self {
        self.sort = sort;
        self
    }

    /// Forwarded `user_id_type`.
    #[must_use]
    pub fn with_user_id_type(mut self, user_id_type: Option<String>) -> Self {
        self.user_id_type = user_id_type;
        self
    }

    /// Stop after this many records. Caps the page size too when the
    /// limit is smaller than a full page.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Shrink the page size (clamped to the service maximum).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Register a progress observer.
    #[must_use]
    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Fetch every page until `has_more` is false or the limit is hit.
    pub async fn collect_all(&self) -> Result<Vec<WireRecord>> {
        let mut records: Vec<WireRecord> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page_number: u32 = 0;

        let effective_page_size = match self.limit {
            Some(limit) if limit < self.page_size => limit.max(1),
            _ => self.page_size,
        };

        loop {
            page_number += 1;
            let page = self.fetch_page(effective_page_size, page_token.take()).await?;
            let fetched = page.items.len();

            for record in page.items {
                records.push(record);
                if let Some(limit) = self.limit {
                    if records.len() >= limit {
                        break;
                    }
                }
            }

            debug!(
                page = page_number,
                fetched,
                total = records.len(),
                "fetched record page"
            );
            crate::metrics::record_page(fetched);
            if let Some(hook) = &self.progress {
                let hook = hook.clone();
                let total = records.len();
                if tokio::runtime::Handle::try_current().is_ok() {
                    tokio::spawn(async move { hook(page_number, total) });
                } else {
                    hook(page_number, total);
                }
            }

            if let Some(limit) = self.limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }
            if !page.has_more {
                break;
            }
            page_token = page.page_token.filter(|token| !token.is_empty());
            if page_token.is_none() {
                // has_more without a continuation token would loop forever.
                break;
            }
        }

        Ok(records)
    }

    async fn fetch_page(
        &self,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<ListRecordsResponse> {
        let request = if let Some(filter) = &self.filter {
            let body = ListRecordsRequest {
                filter: Some(filter.clone()),
                sort: self.sort.clone(),
                user_id_type: self.user_id_type.clone(),
                ..ListRecordsRequest::default()
            };
            body.validate()?;
            let mut request = ApiRequest::post(search_path(&self.app_token, &self.table_id))
                .with_query("page_size", page_size.to_string())
                .with_body(&body)?;
            if let Some(token) = page_token {
                request = request.with_query("page_token", token);
            }
            request
        } else {
            let mut request = ApiRequest::get(records_path(&self.app_token, &self.table_id))
                .with_query("page_size", page_size.to_string());
            if let Some(token) = page_token {
                request = request.with_query("page_token", token);
            }
            if let Some(user_id_type) = &self.user_id_type {
                request = request.with_query("user_id_type", user_id_type.clone());
            }
            request
        };

        let response = self.executor.execute(request).await?;
        response
            .parse_json::<Envelope<ListRecordsResponse>>()?
            .into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::transport::ApiResponse;

    /// Serves canned pages and records every request it sees.
    struct PagedStub {
        pages: Vec<serde_json::Value>,
        calls: AtomicU32,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl PagedStub {
        fn new(pages: Vec<serde_json::Value>) -> Self {
            Self {
                pages,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ApiExecutor for PagedStub {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.seen.lock().unwrap().push(request);
            let page = self
                .pages
                .get(index)
                .cloned()
                .unwrap_or_else(|| json!({"code": 0, "data": {"has_more": false, "items": []}}));
            Ok(ApiResponse {
                status: 200,
                body: serde_json::to_vec(&page).unwrap(),
            })
        }
    }

    fn record(id: &str) -> serde_json::Value {
        json!({"record_id": id, "fields": {}})
    }

    #[tokio::test]
    async fn test_collects_all_pages_in_order() {
        let stub = Arc::new(PagedStub::new(vec![
            json!({"code": 0, "data": {
                "has_more": true, "page_token": "p2",
                "items": [record("r1"), record("r2")]
            }}),
            json!({"code": 0, "data": {
                "has_more": true, "page_token": "p3",
                "items": [record("r3"), record("r4")]
            }}),
            json!({"code": 0, "data": {
                "has_more": false,
                "items": [record("r5")]
            }}),
        ]));

        let records = Paginator::new(stub.clone(), "app", "tbl")
            .collect_all()
            .await
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3", "r4", "r5"]);
        // ceil(5 / 500) with has_more chaining: exactly three requests.
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);

        // Page tokens only on follow-up requests.
        let seen = stub.seen.lock().unwrap();
        assert!(!seen[0].query.iter().any(|(k, _)| k == "page_token"));
        assert!(seen[1].query.contains(&("page_token".into(), "p2".into())));
        assert!(seen[2].query.contains(&("page_token".into(), "p3".into())));
    }

    #[tokio::test]
    async fn test_limit_truncates_and_stops_fetching() {
        let stub = Arc::new(PagedStub::new(vec![
            json!({"code": 0, "data": {
                "has_more": true, "page_token": "p2",
                "items": [record("r1"), record("r2"), record("r3")]
            }}),
            json!({"code": 0, "data": {"has_more": false, "items": [record("r4")]}}),
        ]));

        let records = Paginator::new(stub.clone(), "app", "tbl")
            .with_limit(Some(2))
            .collect_all()
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        // The limit also shrinks the requested page size.
        let seen = stub.seen.lock().unwrap();
        assert!(seen[0].query.contains(&("page_size".into(), "2".into())));
    }

    #[tokio::test]
    async fn test_filtered_queries_use_search_endpoint() {
        let stub = Arc::new(PagedStub::new(vec![json!({
            "code": 0, "data": {"has_more": false, "items": []}
        })]));

        let filter = FilterRequest::all(vec![crate::protocol::FilterCondition {
            field_name: "age".into(),
            operator: crate::protocol::FilterOperator::IsGreater,
            value: vec![json!(18)],
        }]);

        let _ = Paginator::new(stub.clone(), "app", "tbl")
            .with_filter(Some(filter))
            .collect_all()
            .await
            .unwrap();

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen[0].method, reqwest::Method::POST);
        assert!(seen[0].path.ends_with("/records/search"));
        assert!(seen[0].body.is_some());
    }

    #[tokio::test]
    async fn test_error_propagates_without_partial_result() {
        struct FailingStub;

        #[async_trait]
        impl ApiExecutor for FailingStub {
            async fn execute(&self, _request: ApiRequest) -> Result<ApiResponse> {
                Err(crate::error::Error::Network("connection reset".into()))
            }
        }

        let result = Paginator::new(Arc::new(FailingStub), "app", "tbl")
            .collect_all()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_progress_hook_fires_per_page() {
        let stub = Arc::new(PagedStub::new(vec![
            json!({"code": 0, "data": {
                "has_more": true, "page_token": "p2", "items": [record("r1")]
            }}),
            json!({"code": 0, "data": {"has_more": false, "items": [record("r2")]}}),
        ]));

        let pages_seen = Arc::new(AtomicU32::new(0));
        let pages_clone = pages_seen.clone();
        let _ = Paginator::new(stub, "app", "tbl")
            .with_progress(Arc::new(move |_page, _total| {
                pages_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .collect_all()
            .await
            .unwrap();

        // Hooks run detached; give them a beat.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(pages_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_token_with_has_more_stops() {
        let stub = Arc::new(PagedStub::new(vec![json!({
            "code": 0, "data": {"has_more": true, "items": [record("r1")]}
        })]));
        let records = Paginator::new(stub.clone(), "app", "tbl")
            .collect_all()
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }
}
