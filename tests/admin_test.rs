use fast_exchange_router::admin;
use fast_exchange_router::config::Topology;
use fast_exchange_router::server::Server;
use serde_json::json;
use tokio::net::TcpListener;

const TOPOLOGY: &str = r#"
exchanges:
  - name: "events"
    type: fanout
  - name: "prices"
    type: topic
queues:
  - name: "audit"
  - name: "filtered"
  - name: "ranked"
    sort_key: "rank"
bindings:
  - exchange: "events"
    queue: "audit"
"#;

/// Starts the admin API on a random port and returns its base URL.
async fn start_admin(server: &Server) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = admin::app(server.router());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_admin_bind_publish_inspect() {
    let server = Server::new(Topology::from_yaml(TOPOLOGY).unwrap()).unwrap();
    let base_url = start_admin(&server).await;
    let client = reqwest::Client::new();

    // POST /exchanges/events/bindings with a selector
    let resp = client
        .post(format!("{}/exchanges/events/bindings", base_url))
        .json(&json!({
            "queue": "filtered",
            "binding_key": "x-is-1",
            "arguments": { "x-filter-jms-selector": "x = 1" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["filtered"], json!(true));
    assert_eq!(body["selector"], json!("x = 1"));

    // POST /exchanges/events/publish
    let resp = client
        .post(format!("{}/exchanges/events/publish", base_url))
        .json(&json!({ "headers": { "x": 1 }, "body": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["routed_to"], json!(["audit", "filtered"]));

    let resp = client
        .post(format!("{}/exchanges/events/publish", base_url))
        .json(&json!({ "headers": { "x": 2 } }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["routed_to"], json!(["audit"]));

    // GET /queues/audit/messages
    let resp = client
        .get(format!("{}/queues/audit/messages", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let messages: serde_json::Value = resp.json().await.unwrap();
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"]["body"], json!("hello"));
    assert_eq!(messages[0]["sequence_number"], json!(1));

    // GET /exchanges shows match counters
    let resp = client
        .get(format!("{}/exchanges", base_url))
        .send()
        .await
        .unwrap();
    let exchanges: serde_json::Value = resp.json().await.unwrap();
    let events = exchanges
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "events")
        .unwrap();
    assert_eq!(events["type"], json!("fanout"));
    let filtered = events["bindings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["queue"] == "filtered")
        .unwrap();
    assert_eq!(filtered["matches"], json!(1));

    // DELETE /queues/audit/messages
    let resp = client
        .delete(format!("{}/queues/audit/messages", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], json!(2));
    assert_eq!(server.router().queue("audit").unwrap().depth(), 0);

    // DELETE /exchanges/events/bindings
    let resp = client
        .delete(format!("{}/exchanges/events/bindings", base_url))
        .json(&json!({ "queue": "filtered", "binding_key": "x-is-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(server
        .router()
        .exchange("events")
        .unwrap()
        .binding("filtered", "x-is-1")
        .is_none());
}

#[tokio::test]
async fn test_admin_error_statuses() {
    let server = Server::new(Topology::from_yaml(TOPOLOGY).unwrap()).unwrap();
    let base_url = start_admin(&server).await;
    let client = reqwest::Client::new();

    // Unparseable selector
    let resp = client
        .post(format!("{}/exchanges/events/bindings", base_url))
        .json(&json!({
            "queue": "filtered",
            "arguments": { "x-filter-jms-selector": "x = = 1" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Duplicate binding
    let resp = client
        .post(format!("{}/exchanges/events/bindings", base_url))
        .json(&json!({ "queue": "audit" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Malformed topic pattern
    let resp = client
        .post(format!("{}/exchanges/prices/bindings", base_url))
        .json(&json!({ "queue": "audit", "binding_key": "stock.us*" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown exchange, queue and binding
    let resp = client
        .post(format!("{}/exchanges/missing/publish", base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("{}/queues/missing/messages", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .delete(format!("{}/exchanges/events/bindings", base_url))
        .json(&json!({ "queue": "audit", "binding_key": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_admin_list_queues() {
    let server = Server::new(Topology::from_yaml(TOPOLOGY).unwrap()).unwrap();
    let base_url = start_admin(&server).await;

    let resp = reqwest::get(format!("{}/queues", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let queues: serde_json::Value = resp.json().await.unwrap();
    let names: Vec<&str> = queues
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["audit", "filtered", "ranked"]);
    assert_eq!(queues[0]["sort_key"], json!(null));
    assert_eq!(queues[2]["sort_key"], json!("rank"));
}
