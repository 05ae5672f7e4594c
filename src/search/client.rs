//! Session client: executes one property search per unit of work
//!
//! The client owns backend-level auth-token acquisition and its own short
//! retry loop for backend-auth failures. Definitive non-auth rejections are
//! surfaced as `BackendUnavailable` and never retried here; transport-level
//! losses propagate unclassified for the orchestrator to recover.

use crate::search::params::SearchParams;
use crate::session::{SessionContext, TransportError};
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Attempts to obtain the backend account token before giving up
const TOKEN_ATTEMPTS: u32 = 5;
const TOKEN_BACKOFF: Duration = Duration::from_secs(1);

/// Whole-page retries after an authorization-denied response
const REFRESH_ATTEMPTS: u32 = 3;

/// Bounded wait for the warm-up page to yield an embedded payload
const WARMUP_WAIT: Duration = Duration::from_secs(10);

/// `<script>` element carrying the search payload on the results page
const EMBEDDED_STATE_SELECTOR: &str = "script#embedded-search-state";

/// Errors surfaced by the search client
#[derive(Debug, Error)]
pub enum SearchError {
    /// Auth-token refresh exhausted; systemic auth breakage
    #[error("Search request failed after refreshing session: {0}")]
    SessionRefresh(String),

    /// The backend rejected the request for non-auth reasons; a signal to
    /// the orchestrator, never retried by the client
    #[error("Properties API returned HTTP {status}")]
    BackendUnavailable { status: u16, body: String },

    /// Authorization denied; internal to the client's refresh loop
    #[error("Search request unauthorized ({status})")]
    Unauthorized { status: u16, body: String },

    #[error("Unable to retrieve account token from auth session endpoint")]
    TokenUnavailable,

    #[error("Malformed backend payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Aggregated (possibly multi-page) result of one property search
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub payload: Value,
}

impl SearchResults {
    pub fn hotels(&self) -> &[Value] {
        self.payload
            .get("hotels")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn context(&self) -> Option<&Value> {
        self.payload.get("context").filter(|v| v.is_object())
    }

    pub fn request_id(&self) -> Option<String> {
        self.context()?
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

pub struct SearchClient {
    context: SessionContext,
    account_token: Option<String>,
    warmup_enabled: bool,
}

impl SearchClient {
    pub fn new(context: SessionContext, warmup_enabled: bool) -> Self {
        Self {
            context,
            account_token: None,
            warmup_enabled,
        }
    }

    /// Fetches every result page for the given parameters, merging hotel
    /// lists and folding later page contexts over the first
    pub async fn fetch_properties(
        &mut self,
        params: &SearchParams,
    ) -> Result<SearchResults, SearchError> {
        tracing::info!(
            "Starting property fetch for {} ({} -> {})",
            params.location_id,
            params.check_in,
            params.check_out
        );

        self.ensure_account_token(false).await?;

        let mut aggregated: Option<Value> = None;
        let mut page_number = params.page;
        loop {
            let page_params = params.with_page(page_number);
            let warmup_current = self.warmup_enabled && page_number == params.page;
            let page_payload = self.fetch_page(&page_params, warmup_current).await?;

            let hotels_on_page = page_payload
                .get("hotels")
                .and_then(Value::as_array)
                .map(|hotels| hotels.len())
                .unwrap_or(0);

            match aggregated.as_mut() {
                None => aggregated = Some(page_payload.clone()),
                Some(total) => merge_page(total, &page_payload),
            }

            let has_next = page_payload
                .get("context")
                .and_then(|ctx| ctx.get("pagination"))
                .and_then(|p| p.get("hasNext"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_next || hotels_on_page == 0 {
                break;
            }
            page_number += 1;
        }

        let payload = aggregated.unwrap_or_else(|| {
            json!({
                "context": {
                    "pagination": { "page": params.page, "pageSize": params.page_size, "hasNext": false }
                },
                "hotels": [],
            })
        });

        Ok(SearchResults { payload })
    }

    /// Fetches one result page, refreshing the account token and travel
    /// session when the backend denies authorization
    async fn fetch_page(
        &mut self,
        params: &SearchParams,
        warmup: bool,
    ) -> Result<Value, SearchError> {
        let mut use_warmup = warmup;

        for refresh_attempt in 0..REFRESH_ATTEMPTS {
            if use_warmup {
                if let Some(payload) = self.warmup_capture(params).await? {
                    tracing::info!("Captured properties payload via warm-up page");
                    return Ok(payload);
                }
                tracing::warn!("Warm-up capture failed; falling back to direct POST");
            }

            match self.post_properties(params).await {
                Ok(payload) => return Ok(payload),
                Err(SearchError::Unauthorized { status, .. }) => {
                    tracing::warn!(
                        "Properties POST returned {}; refreshing session (attempt {})",
                        status,
                        refresh_attempt + 1
                    );
                    match self.ensure_account_token(true).await {
                        Ok(_) => {}
                        Err(SearchError::Transport(transport)) => {
                            return Err(SearchError::Transport(transport))
                        }
                        Err(e) => return Err(SearchError::SessionRefresh(e.to_string())),
                    }
                    self.refresh_travel_session().await?;
                    use_warmup = true;
                }
                Err(other) => return Err(other),
            }
        }

        Err(SearchError::SessionRefresh(
            "authorization still denied after token refresh".to_string(),
        ))
    }

    /// Issues the properties request directly
    async fn post_properties(&mut self, params: &SearchParams) -> Result<Value, SearchError> {
        tracing::info!(
            "Fetching properties for {} via direct POST (page {})",
            params.location_id,
            params.page
        );
        let url = self.context.endpoints.properties();
        let response = self.context.post_json(url, &params.to_payload()).await?;

        if response.ok() {
            return serde_json::from_str(&response.body)
                .map_err(|e| SearchError::Payload(format!("properties response not JSON: {e}")));
        }
        if response.status == 401 || response.status == 403 {
            return Err(SearchError::Unauthorized {
                status: response.status,
                body: response.body,
            });
        }
        Err(SearchError::BackendUnavailable {
            status: response.status,
            body: response.body,
        })
    }

    /// Lets the results page issue the search itself and harvests the
    /// embedded payload, bounded by a timeout. A miss is not an error:
    /// the caller falls back to the direct POST.
    async fn warmup_capture(
        &mut self,
        params: &SearchParams,
    ) -> Result<Option<Value>, SearchError> {
        let url = self.build_results_url(params);
        tracing::debug!("Navigating to warm-up results page {}", url);

        let response = match tokio::time::timeout(WARMUP_WAIT, self.context.get(url)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_context_lost() => return Err(e.into()),
            Ok(Err(e)) => {
                tracing::debug!("Warm-up navigation failed: {}", e);
                return Ok(None);
            }
            Err(_) => {
                tracing::debug!("Warm-up capture timed out after {:?}", WARMUP_WAIT);
                return Ok(None);
            }
        };

        if !response.ok() {
            return Ok(None);
        }
        Ok(extract_embedded_state(&response.body))
    }

    /// Results-page URL that triggers the site's own search request
    fn build_results_url(&self, params: &SearchParams) -> Url {
        let children_ages: Vec<String> = params
            .rooms
            .iter()
            .flat_map(|room| room.children.iter().map(u8::to_string))
            .collect();
        let mut url = self.context.endpoints.results_page();
        url.query_pairs_mut()
            .append_pair("adults", &params.total_adults().to_string())
            .append_pair("checkIn", &params.check_in.format("%Y-%m-%d").to_string())
            .append_pair("checkOut", &params.check_out.format("%Y-%m-%d").to_string())
            .append_pair("children", &params.total_children().to_string())
            .append_pair("childrenAges", &children_ages.join(","))
            .append_pair("locationType", "LOCATION_ID")
            .append_pair("page", &params.page.to_string())
            .append_pair("pageSize", &params.page_size.to_string())
            .append_pair("placeName", &params.location_label)
            .append_pair("rooms", &params.rooms.len().to_string())
            .append_pair("sortingOption", "FEATURED")
            .append_pair("placeId", &params.location_id)
            .append_pair(
                "accountToken",
                self.account_token.as_deref().unwrap_or_default(),
            );
        url
    }

    /// Returns the cached account token, fetching it when absent or when a
    /// refresh is forced
    async fn ensure_account_token(&mut self, force_refresh: bool) -> Result<String, SearchError> {
        if !force_refresh {
            if let Some(token) = &self.account_token {
                return Ok(token.clone());
            }
        }
        let token = self.fetch_account_token().await?;
        self.account_token = Some(token.clone());
        Ok(token)
    }

    /// Fetches the account token via a short book-root visit plus a direct
    /// authenticated request, retried with backoff
    async fn fetch_account_token(&mut self) -> Result<String, SearchError> {
        for attempt in 1..=TOKEN_ATTEMPTS {
            tracing::info!("Requesting account token (attempt {})", attempt);

            let book_root = self.context.endpoints.book_root();
            match self.context.get(book_root).await {
                Ok(_) => {}
                Err(e) if e.is_context_lost() => return Err(e.into()),
                Err(e) => tracing::debug!("Book root warm visit failed: {}", e),
            }

            let auth_url = self.context.endpoints.auth_session();
            let referer = self.context.endpoints.book_root().to_string();
            let headers = [
                ("Accept", "application/json, text/plain, */*"),
                ("Referer", referer.as_str()),
                ("Cache-Control", "no-cache"),
            ];
            match self.context.get_with_headers(auth_url, &headers).await {
                Ok(response) if response.ok() => {
                    match serde_json::from_str::<Value>(&response.body) {
                        Ok(data) => {
                            if let Some(token) =
                                data.get("clientCustomerId").and_then(Value::as_str)
                            {
                                tracing::info!("Obtained account token on attempt {}", attempt);
                                return Ok(token.to_string());
                            }
                            tracing::warn!(
                                "auth/session response missing clientCustomerId on attempt {}",
                                attempt
                            );
                        }
                        Err(_) => tracing::warn!(
                            "auth/session response not JSON on attempt {}: {}",
                            attempt,
                            truncate(&response.body, 128)
                        ),
                    }
                }
                Ok(response) => tracing::warn!(
                    "auth/session HTTP {} on attempt {} (preview: {})",
                    response.status,
                    attempt,
                    truncate(&response.body, 128)
                ),
                Err(e) if e.is_context_lost() => return Err(e.into()),
                Err(e) => tracing::warn!("auth/session fetch failed on attempt {}: {}", attempt, e),
            }

            tokio::time::sleep(TOKEN_BACKOFF).await;
        }
        Err(SearchError::TokenUnavailable)
    }

    /// Re-establishes the travel session cookies after a denied request
    async fn refresh_travel_session(&mut self) -> Result<(), SearchError> {
        tracing::info!("Refreshing travel session after failed properties request");
        let book_root = self.context.endpoints.book_root();
        match self.context.get(book_root).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_context_lost() => Err(e.into()),
            Err(e) => {
                tracing::debug!("Travel session refresh did not settle: {}", e);
                Ok(())
            }
        }
    }
}

/// Appends a later page's hotels onto the aggregate and folds its context
/// keys over the aggregate's
fn merge_page(aggregate: &mut Value, page: &Value) {
    let hotels = page
        .get("hotels")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    match aggregate.get_mut("hotels").and_then(Value::as_array_mut) {
        Some(existing) => existing.extend(hotels),
        None => {
            aggregate["hotels"] = Value::Array(hotels);
        }
    }

    if let Some(page_context) = page.get("context").and_then(Value::as_object) {
        if let Some(aggregate_map) = aggregate.as_object_mut() {
            let target = aggregate_map
                .entry("context")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(target_map) = target.as_object_mut() {
                for (key, value) in page_context {
                    target_map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Pulls the embedded search payload out of the results-page HTML
fn extract_embedded_state(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(EMBEDDED_STATE_SELECTOR).ok()?;
    let script = document.select(&selector).next()?;
    let text: String = script.text().collect();
    let payload: Value = serde_json::from_str(text.trim()).ok()?;
    payload.get("hotels")?.as_array()?;
    Some(payload)
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::params::RoomRequest;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> SearchParams {
        SearchParams::new(
            "ZMETRO-1001",
            "Tokyo (and vicinity), Japan",
            35.6762,
            139.6503,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 18).unwrap(),
            vec![RoomRequest::adults(2)],
        )
    }

    async fn mount_token_endpoints(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/en-us/book/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>book</html>"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en-us/book/api/auth/session"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"clientCustomerId": "acct-1"}"#),
            )
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer, warmup: bool) -> SearchClient {
        let context = SessionContext::new(&server.uri()).unwrap();
        SearchClient::new(context, warmup)
    }

    fn page_payload(hotel_ids: &[&str], has_next: bool) -> Value {
        json!({
            "context": {
                "requestId": "req-123",
                "pagination": { "page": 1, "pageSize": 50, "hasNext": has_next }
            },
            "hotels": hotel_ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_single_page_fetch() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_payload(&["h1", "h2"], false)),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server, false);
        let results = client.fetch_properties(&params()).await.unwrap();

        assert_eq!(results.hotels().len(), 2);
        assert_eq!(results.request_id().as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn test_pagination_merges_hotels() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .and(body_partial_json(json!({"pagination": {"page": 1}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_payload(&["h1", "h2"], true)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .and(body_partial_json(json!({"pagination": {"page": 2}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_payload(&["h3"], false)),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server, false);
        let results = client.fetch_properties(&params()).await.unwrap();

        assert_eq!(results.hotels().len(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_then_succeeds() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_payload(&["h1"], false)),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server, false);
        let results = client.fetch_properties(&params()).await.unwrap();
        assert_eq!(results.hotels().len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_exhausts_to_session_refresh() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let mut client = client_for(&server, false);
        let err = client.fetch_properties(&params()).await.unwrap_err();
        assert!(matches!(err, SearchError::SessionRefresh(_)));
    }

    #[tokio::test]
    async fn test_backend_error_not_retried() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server, false);
        let err = client.fetch_properties(&params()).await.unwrap_err();
        match err {
            SearchError::BackendUnavailable { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_warmup_capture_avoids_direct_post() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        let embedded = page_payload(&["h1"], false);
        let html = format!(
            r#"<html><body><script id="embedded-search-state" type="application/json">{embedded}</script></body></html>"#
        );
        Mock::given(method("GET"))
            .and(path("/en-us/book/accommodations/search-results"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = client_for(&server, true);
        let results = client.fetch_properties(&params()).await.unwrap();
        assert_eq!(results.hotels().len(), 1);
    }

    #[tokio::test]
    async fn test_warmup_miss_falls_back_to_post() {
        let server = MockServer::start().await;
        mount_token_endpoints(&server).await;
        Mock::given(method("GET"))
            .and(path("/en-us/book/accommodations/search-results"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no state</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/book/api/lxp/hotel/properties"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_payload(&["h1"], false)),
            )
            .mount(&server)
            .await;

        let mut client = client_for(&server, true);
        let results = client.fetch_properties(&params()).await.unwrap();
        assert_eq!(results.hotels().len(), 1);
    }

    #[test]
    fn test_extract_embedded_state_requires_hotels() {
        let html = r#"<script id="embedded-search-state">{"context": {}}</script>"#;
        assert!(extract_embedded_state(html).is_none());

        let html = r#"<script id="embedded-search-state">{"hotels": []}</script>"#;
        assert!(extract_embedded_state(html).is_some());
    }
}
