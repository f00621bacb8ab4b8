//! Pagination and retry behaviour of the HTTP page source against mock
//! provider catalogs.

use std::sync::Arc;
use std::time::Duration;

use cloud_price_sync::error::FailureClass;
use cloud_price_sync::fetch::{CursorStyle, HttpPageSource, PaginatedFetcher};
use cloud_price_sync::providers::{aws, azure, gcp};
use cloud_price_sync::retry::RetryPolicy;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(endpoint: String, style: CursorStyle, page_limit: u32) -> PaginatedFetcher {
    PaginatedFetcher::new(
        Arc::new(HttpPageSource::new(reqwest::Client::new(), endpoint, style)),
        RetryPolicy::new(3, Duration::from_millis(1)),
        page_limit,
        Duration::ZERO,
    )
}

fn azure_query() -> cloud_price_sync::fetch::SourceQuery {
    azure::queries(&["Virtual Machines".to_string()], &["eastus".to_string()], "USD")
        .remove(0)
}

#[tokio::test]
async fn azure_next_page_link_is_followed_until_absent() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/api/retail/prices", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/retail/prices"))
        .and(query_param("currencyCode", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"meterId": "a"}, {"meterId": "b"}],
            "NextPageLink": format!("{endpoint}?page=2"),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/retail/prices"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"meterId": "c"}],
            "NextPageLink": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = fetcher(endpoint, azure::CURSOR_STYLE, 10)
        .fetch(&azure_query())
        .await
        .unwrap();
    let ids: Vec<_> = items.iter().filter_map(|i| i.str_field("meterId")).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn page_limit_stops_a_never_ending_catalog() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/prices", server.uri());

    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"meterId": "x"}],
            "NextPageLink": format!("{endpoint}?again=1"),
        })))
        .expect(2)
        .mount(&server)
        .await;

    let items = fetcher(endpoint, azure::CURSOR_STYLE, 2)
        .fetch(&azure_query())
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn gcp_page_token_is_sent_with_the_original_parameters() {
    let server = MockServer::start().await;
    let endpoint = gcp::skus_endpoint(&server.uri(), gcp::DEFAULT_SERVICE_ID);
    let sku_path = format!("/services/{}/skus", gcp::DEFAULT_SERVICE_ID);

    Mock::given(method("GET"))
        .and(path(sku_path.as_str()))
        .and(query_param("pageToken", "t2"))
        .and(query_param("key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "skus": [{"skuId": "s2"}],
            "nextPageToken": "",
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(sku_path.as_str()))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "skus": [{"skuId": "s1"}],
            "nextPageToken": "t2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = gcp::query(gcp::DEFAULT_SERVICE_ID, "asia-southeast1", "k", "USD");
    let items = fetcher(endpoint, gcp::CURSOR_STYLE, 10)
        .fetch(&query)
        .await
        .unwrap();
    let ids: Vec<_> = items.iter().filter_map(|i| i.str_field("skuId")).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn aws_string_items_are_decoded() {
    let server = MockServer::start().await;
    let product = json!({"product": {"sku": "SKU1"}}).to_string();

    Mock::given(method("GET"))
        .and(path("/pricing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [product],
        })))
        .mount(&server)
        .await;

    let query = aws::query(aws::DEFAULT_SERVICE_CODE, "us-east-1", "USD");
    let items = fetcher(format!("{}/pricing", server.uri()), aws::CURSOR_STYLE, 5)
        .fetch(&query)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].str_at(&["product", "sku"]), Some("SKU1"));
}

#[tokio::test]
async fn persistent_503_is_tried_exactly_max_attempts_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher(format!("{}/prices", server.uri()), CursorStyle::AZURE, 5)
        .fetch(&azure_query())
        .await
        .unwrap_err();
    assert_eq!(err.class, FailureClass::Transient);
}

#[tokio::test]
async fn not_found_is_permanent_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(format!("{}/prices", server.uri()), CursorStyle::AZURE, 5)
        .fetch(&azure_query())
        .await
        .unwrap_err();
    assert_eq!(err.class, FailureClass::Permanent);
}

#[tokio::test]
async fn a_transient_failure_mid_run_is_recovered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"meterId": "a"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = fetcher(format!("{}/prices", server.uri()), CursorStyle::AZURE, 5)
        .fetch(&azure_query())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn failing_later_page_discards_the_whole_query() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/api/retail/prices", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/retail/prices"))
        .and(query_param("currencyCode", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"meterId": "a"}, {"meterId": "b"}],
            "NextPageLink": format!("{endpoint}?page=2"),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/retail/prices"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = fetcher(endpoint, azure::CURSOR_STYLE, 10)
        .fetch(&azure_query())
        .await;
    let err = result.expect_err("a page that never recovers fails the query");
    assert_eq!(err.class, FailureClass::Transient);
}
