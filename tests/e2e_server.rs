use std::sync::Arc;
use std::time::Duration;

use inventory_graphql::{inventory_schema, GraphQLServer, GraphQLService, MemoryStore};
use serde_json::json;
use tokio::net::TcpListener;

async fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port().await;
    let addr = format!("127.0.0.1:{}", port);
    let base_url = format!("http://{}", addr);

    let schema = inventory_schema(Arc::new(MemoryStore::seeded())).unwrap();
    let server = GraphQLServer::new(GraphQLService::new(Arc::new(schema)), "/api/graphql");

    let handle = tokio::spawn(async move {
        let _ = server.serve(&addr).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (base_url, handle)
}

async fn post_query(
    client: &reqwest::Client,
    base_url: &str,
    body: serde_json::Value,
) -> (u16, serde_json::Value) {
    let response = client
        .post(format!("{}/api/graphql", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();

    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_e2e_item_lookup() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post_query(
        &client,
        &base_url,
        json!({ "query": r#"{ item(barcode: "456") { barcode title sellingPrice } }"# }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["item"],
        json!({ "barcode": "456", "title": "Keyboard", "sellingPrice": 40.0 })
    );

    handle.abort();
}

#[tokio::test]
async fn test_e2e_order_workflow() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post_query(
        &client,
        &base_url,
        json!({
            "query": r#"mutation Setup($customer: CustomerInput!) {
                customer: createCustomer(customer: $customer) { customerId }
                first: createOrder(order: { tag: "Office", createdAt: "2024-03-01", customerId: 1 }) { orderId }
                second: createOrder(order: { tag: "Home", createdAt: "2024-03-02", customerId: 1 }) { orderId }
                a: addOrderItem(orderitem: { barcode: "123", quantity: 2, orderId: 1 }) { id }
                b: addOrderItem(orderitem: { barcode: "789", quantity: 1, orderId: 2 }) { id }
            }"#,
            "operationName": "Setup",
            "variables": { "customer": { "name": "Grace", "billingAddress": "1 Navy Yard" } }
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body.get("errors").is_none(), "{}", body);
    assert_eq!(body["data"]["second"]["orderId"], 2);

    let (status, body) = post_query(
        &client,
        &base_url,
        json!({
            "query": "{ orders { tag customer { name } items { quantity item { title } } } }"
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["orders"],
        json!([
            {
                "tag": "Office",
                "customer": { "name": "Grace" },
                "items": [{ "quantity": 2, "item": { "title": "Headphone" } }]
            },
            {
                "tag": "Home",
                "customer": { "name": "Grace" },
                "items": [{ "quantity": 1, "item": { "title": "Monitor" } }]
            }
        ])
    );

    handle.abort();
}

#[tokio::test]
async fn test_e2e_partial_failure() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post_query(
        &client,
        &base_url,
        json!({
            "query": r#"mutation {
                ok: createItem(item: { barcode: "900", title: "Cable", sellingPrice: 5.5 }) { title }
                dup: createItem(item: { barcode: "123", title: "Again", sellingPrice: 1 }) { title }
            }"#
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["ok"]["title"], "Cable");
    assert!(body["data"]["dup"].is_null());
    assert_eq!(body["errors"][0]["path"], json!(["dup"]));

    handle.abort();
}

#[tokio::test]
async fn test_e2e_parse_error() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post_query(&client, &base_url, json!({ "query": "{ items {" })).await;

    assert_eq!(status, 400);
    assert!(body.get("data").is_none());
    assert!(!body["errors"].as_array().unwrap().is_empty());

    handle.abort();
}

#[tokio::test]
async fn test_e2e_health_check() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    handle.abort();
}

#[tokio::test]
async fn test_e2e_concurrent_requests() {
    let (base_url, handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let mut handles = vec![];
    for barcode in ["123", "456", "789", "000"] {
        let client = client.clone();
        let url = format!("{}/api/graphql", base_url);
        handles.push(tokio::spawn(async move {
            let response = client
                .post(&url)
                .json(&json!({
                    "query": "query($code: String!) { item(barcode: $code) { barcode } }",
                    "variables": { "code": barcode }
                }))
                .send()
                .await
                .unwrap();
            let body: serde_json::Value = response.json().await.unwrap();
            (barcode, body)
        }));
    }

    for h in handles {
        let (barcode, body) = h.await.unwrap();
        if barcode == "000" {
            assert!(body["data"]["item"].is_null());
        } else {
            assert_eq!(body["data"]["item"]["barcode"], barcode);
        }
    }

    handle.abort();
}
