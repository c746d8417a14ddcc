//! `/users/{id}/details` against mock upstreams.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

mod common;

async fn users_backend(delay: Duration) -> std::net::SocketAddr {
    common::start_programmable_backend(move |req| async move {
        tokio::time::sleep(delay).await;
        match req.target.as_str() {
            "/users/1" => (200, r#"{"id":1,"name":"Ann"}"#.to_string()),
            _ => (404, r#"{"error":"User not found"}"#.to_string()),
        }
    })
    .await
}

async fn orders_backend(delay: Duration) -> std::net::SocketAddr {
    common::start_programmable_backend(move |_req| async move {
        tokio::time::sleep(delay).await;
        let orders = json!([
            {"id": 10, "userId": 1, "productId": 5},
            {"id": 11, "userId": 2, "productId": 5},
            {"id": 12, "userId": 1, "productId": 6}
        ]);
        (200, orders.to_string())
    })
    .await
}

#[tokio::test]
async fn test_details_joins_both_calls_concurrently() {
    let users = users_backend(Duration::from_millis(300)).await;
    let orders = orders_backend(Duration::from_millis(300)).await;

    let config = common::gateway_config(vec![
        common::upstream("users", "Users", users),
        common::upstream("orders", "Orders", orders),
    ]);
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    let start = Instant::now();
    let res = client
        .get(format!("http://{}/users/1/details", gateway))
        .send()
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"], json!({"id": 1, "name": "Ann"}));
    let order_ids: Vec<_> = body["orders"].as_array().unwrap().iter().map(|o| o["id"].clone()).collect();
    assert_eq!(order_ids, vec![json!(10), json!(12)]);
    assert!(
        elapsed < Duration::from_millis(550),
        "details took {:?}, calls ran sequentially",
        elapsed
    );
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let users = users_backend(Duration::ZERO).await;
    let orders = orders_backend(Duration::ZERO).await;

    let config = common::gateway_config(vec![
        common::upstream("users", "Users", users),
        common::upstream("orders", "Orders", orders),
    ]);
    let (gateway, _shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/users/99/details", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"error": "User not found"}));
}

#[tokio::test]
async fn test_orders_outage_degrades_to_partial_result() {
    let users = users_backend(Duration::ZERO).await;
    let orders = common::closed_port().await;

    let config = common::gateway_config(vec![
        common::upstream("users", "Users", users),
        common::upstream("orders", "Orders", orders),
    ]);
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client
            .get(format!("http://{}/users/1/details", gateway))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["user"]["name"], "Ann");
        assert_eq!(body["orders"], json!([]));
        assert_eq!(body["ordersError"], "Orders service temporarily unavailable");
    }
}

#[tokio::test]
async fn test_users_outage_is_unavailable() {
    let users = common::closed_port().await;
    let orders = orders_backend(Duration::ZERO).await;

    let config = common::gateway_config(vec![
        common::upstream("users", "Users", users),
        common::upstream("orders", "Orders", orders),
    ]);
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();
    let url = format!("http://{}/users/1/details", gateway);

    assert_eq!(client.get(&url).send().await.unwrap().status(), 500);
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(
        res.json::<Value>().await.unwrap()["error"],
        "Users service temporarily unavailable"
    );
}

#[tokio::test]
async fn test_invalid_id_is_rejected_before_fan_out() {
    let config = common::gateway_config(vec![
        common::upstream("users", "Users", common::closed_port().await),
        common::upstream("orders", "Orders", common::closed_port().await),
    ]);
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    let res = client
        .get(format!("http://{}/users/abc/details", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let health: Value = client
        .get(format!("http://{}/health", gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["circuits"]["users"]["stats"]["failures"], 0);
}
