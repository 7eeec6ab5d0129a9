//! Admin API over a real listener.

mod common;

use std::time::Duration;

use common::{memory_store, provider_over, FlakyStore, TestServer};
use reqwest::StatusCode;
use route_control::admin::{admin_router, AdminState};
use route_control::Settings;
use serde_json::{json, Value};
use tokio::net::TcpListener;

fn cluster_body(cluster_id: &str, destination: &str, address: &str) -> Value {
    json!({
        "cluster_id": cluster_id,
        "load_balancing_policy": "RoundRobin",
        "destinations": [
            { "destination_id": destination, "address": address }
        ]
    })
}

async fn create_cluster(client: &reqwest::Client, server: &TestServer, body: Value) -> Value {
    let resp = client
        .post(server.url("/admin/clusters"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

async fn config(client: &reqwest::Client, server: &TestServer) -> Value {
    client
        .get(server.url("/admin/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_status_and_empty_config() {
    let server = TestServer::start(Settings::default()).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .get(server.url("/admin/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["revision"], 1);
    assert_eq!(status["clusters"], 0);
    assert!(status.get("last_failure").is_none());

    let resp = client.get(server.url("/admin/config")).send().await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["revision"], 1);
    assert_eq!(body["clusters"], json!([]));
    assert_eq!(body["routes"], json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_cluster_and_route_lifecycle() {
    let server = TestServer::start(Settings::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/admin/clusters"))
        .header("x-actor", "alice")
        .json(&cluster_body("c1", "d1", "http://h1:80"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()["x-config-refresh"], "applied");
    let cluster: Value = resp.json().await.unwrap();
    assert_eq!(cluster["audit"]["created_by"], "alice");
    let cluster_pk = cluster["id"].as_str().unwrap().to_string();

    let resp = client
        .post(server.url("/admin/routes"))
        .json(&json!({
            "route_id": "r1",
            "path": "/api/*",
            "methods": ["get"],
            "cluster": cluster_pk,
            "headers": [{ "name": "x-tenant", "values": ["a"], "mode": "HeaderPrefix" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let route: Value = resp.json().await.unwrap();
    let route_pk = route["id"].as_str().unwrap().to_string();

    let snapshot = config(&client, &server).await;
    assert_eq!(snapshot["revision"], 3);
    assert_eq!(snapshot["clusters"][0]["ClusterId"], "c1");
    assert_eq!(
        snapshot["clusters"][0]["Destinations"]["d1"]["Address"],
        "http://h1:80"
    );
    let published = &snapshot["routes"][0];
    assert_eq!(published["RouteId"], "r1");
    assert_eq!(published["ClusterId"], "c1");
    assert_eq!(published["Match"]["Methods"], json!(["GET"]));
    assert_eq!(published["Match"]["Headers"][0]["Mode"], "HeaderPrefix");

    let resp = client
        .put(server.url(&format!("/admin/clusters/{cluster_pk}")))
        .json(&json!({ "destinations": [{ "destination_id": "d1", "address": "http://h1b:80" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let snapshot = config(&client, &server).await;
    assert_eq!(
        snapshot["clusters"][0]["Destinations"]["d1"]["Address"],
        "http://h1b:80"
    );

    let resp = client
        .delete(server.url(&format!("/admin/routes/{route_pk}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["x-config-refresh"], "applied");
    let snapshot = config(&client, &server).await;
    assert_eq!(snapshot["routes"], json!([]));

    // Soft delete keeps the row readable.
    let resp = client
        .delete(server.url(&format!("/admin/clusters/{cluster_pk}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let stored: Value = client
        .get(server.url(&format!("/admin/clusters/{cluster_pk}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["is_active"], false);
    assert_eq!(config(&client, &server).await["clusters"], json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_error_codes() {
    let server = TestServer::start(Settings::default()).await;
    let client = reqwest::Client::new();
    create_cluster(&client, &server, cluster_body("c1", "d1", "http://h1:80")).await;

    let resp = client
        .post(server.url("/admin/clusters"))
        .json(&cluster_body("c1", "d9", "http://h9:80"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(body["status"], 409);

    let resp = client
        .post(server.url("/admin/clusters"))
        .json(&json!({ "cluster_id": "c2", "destinations": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let resp = client
        .post(server.url("/admin/clusters"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let resp = client
        .post(server.url("/admin/routes"))
        .json(&json!({
            "route_id": "r1",
            "path": "/x",
            "cluster": uuid::Uuid::new_v4()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_REFERENCE");

    let resp = client
        .get(server.url(&format!("/admin/routes/{}", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");

    let resp = client
        .get(server.url("/admin/clusters/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_list_pagination_is_capped() {
    let mut settings = Settings::default();
    settings.admin.max_page_size = 2;
    let server = TestServer::start(settings).await;
    let client = reqwest::Client::new();

    for i in 0..5 {
        create_cluster(
            &client,
            &server,
            cluster_body(&format!("c{i}"), &format!("d{i}"), "http://h:80"),
        )
        .await;
    }

    let page: Value = client
        .get(server.url("/admin/clusters?page_number=2&page_size=50"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total_count"], 5);
    assert_eq!(page["page_number"], 2);
    assert_eq!(page["page_size"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["cluster_id"], "c2");

    server.stop().await;
}

#[tokio::test]
async fn test_manual_refresh_reports_outage() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let provider = provider_over(flaky.clone()).await;
    let app = admin_router(
        AdminState::new(store, provider.clone(), 100, Duration::from_secs(2)),
        Duration::from_secs(5),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/admin/config/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["revision"], 2);

    flaky.set_failing(true);
    let resp = client
        .post(format!("{base}/admin/config/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "STORE_UNAVAILABLE");
    assert_eq!(provider.revision(), 2);

    // Writes still succeed; the header says the snapshot is stale.
    let resp = client
        .post(format!("{base}/admin/clusters"))
        .json(&cluster_body("c1", "d1", "http://h1:80"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()["x-config-refresh"], "failed");

    let status: Value = client
        .get(format!("{base}/admin/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["revision"], 2);
    assert_eq!(status["last_failure"]["trigger"], "on_demand");

    server.abort();
}

#[tokio::test]
async fn test_seeded_entities_are_served() {
    let settings: Settings = toml::from_str(
        r#"
        [[seed.clusters]]
        cluster_id = "c1"
        destinations = [{ destination_id = "d1", address = "http://h1:80" }]

        [[seed.routes]]
        route_id = "r1"
        path = "/api/*"
        cluster_id = "c1"
        "#,
    )
    .unwrap();
    let server = TestServer::start(settings).await;
    let client = reqwest::Client::new();

    let snapshot = config(&client, &server).await;
    assert_eq!(snapshot["revision"], 1);
    assert_eq!(snapshot["routes"][0]["RouteId"], "r1");

    server.stop().await;
}

#[tokio::test]
async fn test_slow_refresh_does_not_hide_committed_write() {
    let store = memory_store().await;
    let flaky = FlakyStore::new(store.clone());
    let provider = provider_over(flaky.clone()).await;
    flaky.set_delay(Duration::from_millis(800));

    let app = admin_router(
        AdminState::new(store.clone(), provider.clone(), 100, Duration::from_millis(300)),
        Duration::from_secs(1),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/admin/clusters"))
        .json(&cluster_body("c1", "d1", "http://h1:80"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()["x-config-refresh"], "failed");
    let cluster: Value = resp.json().await.unwrap();
    assert_eq!(cluster["cluster_id"], "c1");

    assert!(store.find_cluster("c1").await.unwrap().is_some());
    assert_eq!(provider.revision(), 1);

    server.abort();
}
