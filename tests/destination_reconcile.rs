//! Upsert and bundle creation against a mock destination catalog.

use std::sync::Arc;
use std::time::Duration;

use cloud_price_sync::destination::{CatalogDestination, HttpCatalog};
use cloud_price_sync::error::FailureClass;
use cloud_price_sync::grouping::BundleGrouper;
use cloud_price_sync::model::{PricingRecord, RawCatalogItem, ReconcileOutcome};
use cloud_price_sync::normalization::{NormalizeContext, Normalizer};
use cloud_price_sync::providers::azure::AzureNormalizer;
use cloud_price_sync::reconcile::ReconciliationClient;
use cloud_price_sync::retry::RetryPolicy;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CODE: &str = "acme.azure.m-100.eastus";

fn record() -> PricingRecord {
    let ctx = NormalizeContext {
        prefix: "acme",
        currency: "USD",
        service: "Virtual Machines",
        region: "eastus",
    };
    AzureNormalizer::default()
        .normalize(
            &RawCatalogItem::new(json!({
                "meterId": "m-100",
                "serviceName": "Virtual Machines",
                "productName": "Virtual Machines D Series",
                "meterName": "D2s v3",
                "armRegionName": "eastus",
                "location": "US East",
                "retailPrice": 0.096,
                "unitOfMeasure": "1 Hour",
            })),
            &ctx,
        )
        .unwrap()
}

fn catalog(server: &MockServer) -> Arc<HttpCatalog> {
    let http = reqwest::Client::builder()
        .default_headers({
            let mut h = reqwest::header::HeaderMap::new();
            h.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_static("Bearer t0k"),
            );
            h
        })
        .build()
        .unwrap();
    Arc::new(HttpCatalog::new(http, format!("{}/api/", server.uri()), "acme"))
}

fn client(server: &MockServer) -> ReconciliationClient {
    ReconciliationClient::new(catalog(server), RetryPolicy::new(3, Duration::from_millis(1)))
}

#[tokio::test]
async fn unknown_code_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/prices"))
        .and(query_param("code", CODE))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prices": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/prices"))
        .and(body_partial_json(json!({
            "price": {"code": CODE, "priceType": "compute", "priceUnit": "hour", "incurCharges": "running"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "price": {"id": 42}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rec = record();
    assert_eq!(rec.code, CODE);
    let done = client(&server).upsert(&rec).await.unwrap();
    assert_eq!(done.outcome, ReconcileOutcome::Created);
    assert_eq!(done.destination_id, Some(42));
}

#[tokio::test]
async fn existing_code_is_updated_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prices": [{"id": 7, "code": "acme.azure.m-1000.eastus"}, {"id": 42, "code": CODE}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/prices/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let done = client(&server).upsert(&record()).await.unwrap();
    assert_eq!(done.outcome, ReconcileOutcome::Updated);
    assert_eq!(done.destination_id, Some(42));
}

#[tokio::test]
async fn rejected_create_is_permanent_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prices": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/prices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "price code already in use"})),
        )
        // one POST per call below; a retry would push this past 2
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.upsert(&record()).await.unwrap_err();
    assert_eq!(err.class, FailureClass::Permanent);
    assert!(err.reason.contains("already in use"));

    let failed = client.reconcile(record()).await;
    assert_eq!(failed.outcome, ReconcileOutcome::Failed);
    assert!(failed.destination_id.is_none());
}

#[tokio::test]
async fn lookup_outage_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prices": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/prices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": true, "id": "9"})))
        .mount(&server)
        .await;

    let done = client(&server).upsert(&record()).await.unwrap();
    assert_eq!(done.destination_id, Some(9));
}

#[tokio::test]
async fn bundles_are_posted_as_price_sets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/price-bundles"))
        .and(body_partial_json(json!({
            "priceSet": {"priceUnit": "hour", "systemCreated": true, "prices": [42]}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "priceSet": {"id": 5}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let destination: Arc<dyn CatalogDestination> = catalog(&server);
    let grouper = BundleGrouper::new("acme", destination, RetryPolicy::new(2, Duration::from_millis(1)));
    let rec = cloud_price_sync::model::ReconciledRecord {
        record: record(),
        destination_id: Some(42),
        outcome: ReconcileOutcome::Created,
        error: None,
    };
    let bundles = grouper.group(&[rec]);
    assert_eq!(bundles.len(), 1);
    let results = grouper.submit_all(bundles).await;
    assert!(results[0].succeeded());
    assert_eq!(results[0].destination_id, Some(5));
}
