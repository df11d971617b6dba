//! Read-path tests for order history.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, StubCatalog, TestApp};
use order_checkout::{
    errors::ServiceError,
    models::{CheckoutItem, CheckoutRequest, OrderHistoryQuery, OrderStatus},
    queries::{order_history::GetOrderHistoryQuery, Query},
};
use rust_decimal_macros::dec;
use serde_json::json;

async fn place(app: &TestApp, user_id: i64, product_id: i64, quantity: i64) -> i64 {
    let request = CheckoutRequest {
        user_id,
        items: vec![CheckoutItem {
            product_id,
            quantity,
            price: None,
        }],
        payment_method: "card".into(),
        shipping_address: "X St".into(),
        idempotency_token: None,
    };
    app.state
        .checkout
        .checkout(&request, &app.deadline())
        .await
        .unwrap()
        .order_id
}

async fn history(app: &TestApp, query: OrderHistoryQuery) -> Result<Vec<i64>, ServiceError> {
    GetOrderHistoryQuery::new(query)
        .execute(&app.state.orders, &app.deadline())
        .await
        .map(|rows| rows.into_iter().map(|row| row.order_id).collect())
}

fn catalog() -> StubCatalog {
    StubCatalog::default()
        .with_product(1, dec!(1.00), 100)
        .with_product(2, dec!(2.00), 100)
}

#[tokio::test]
async fn lists_only_the_users_orders_newest_first() {
    let app = TestApp::new(catalog()).await;
    let first = place(&app, 7, 1, 1).await;
    let _other_user = place(&app, 8, 1, 1).await;
    let second = place(&app, 7, 2, 3).await;

    assert_eq!(
        history(&app, OrderHistoryQuery::all(7)).await.unwrap(),
        vec![second, first]
    );
    assert!(history(&app, OrderHistoryQuery::all(9)).await.unwrap().is_empty());
}

#[tokio::test]
async fn filters_by_status_code_and_zero_means_all() {
    let app = TestApp::new(catalog()).await;
    let created = place(&app, 7, 1, 1).await;
    let shipped = place(&app, 7, 2, 1).await;
    app.execute_sql(&format!(
        "UPDATE orders SET status = {} WHERE id = {}",
        OrderStatus::Shipped.code(),
        shipped
    ))
    .await;

    assert_eq!(
        history(&app, OrderHistoryQuery::with_status(7, OrderStatus::Created.code()))
            .await
            .unwrap(),
        vec![created]
    );
    assert_eq!(
        history(&app, OrderHistoryQuery::with_status(7, 0)).await.unwrap(),
        vec![shipped, created]
    );

    let rows = GetOrderHistoryQuery::new(OrderHistoryQuery::with_status(7, 3))
        .execute(&app.state.orders, &app.deadline())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "shipped");
    assert_eq!(rows[0].status_code, 3);
}

#[tokio::test]
async fn corrupt_detail_fails_the_whole_query() {
    let app = TestApp::new(catalog()).await;
    let _good = place(&app, 7, 1, 1).await;
    let bad = place(&app, 7, 2, 1).await;
    app.execute_sql(&format!(
        "UPDATE order_detail SET products = '[{{\"broken\"' WHERE id = (SELECT order_detail_id FROM orders WHERE id = {})",
        bad
    ))
    .await;

    assert_matches!(
        history(&app, OrderHistoryQuery::all(7)).await,
        Err(ServiceError::SerializationError(_))
    );
}

#[tokio::test]
async fn unknown_schema_version_is_rejected() {
    let app = TestApp::new(catalog()).await;
    let order_id = place(&app, 7, 1, 1).await;
    app.execute_sql(&format!(
        "UPDATE order_detail SET order_history = '{{\"version\":99,\"entries\":[]}}' WHERE id = (SELECT order_detail_id FROM orders WHERE id = {})",
        order_id
    ))
    .await;

    assert_matches!(
        history(&app, OrderHistoryQuery::all(7)).await,
        Err(ServiceError::SerializationError(msg)) if msg.contains("version 99")
    );
}

#[tokio::test]
async fn history_endpoint_returns_decoded_orders() {
    let app = TestApp::new(catalog()).await;
    let order_id = place(&app, 7, 2, 3).await;

    let response = app
        .request_as(7, Method::GET, "/v1/order_history?status=1", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order_id"], json!(order_id));
    assert_eq!(orders[0]["status"], json!("created"));
    assert_eq!(orders[0]["total_qty"], json!(3));
    assert_eq!(orders[0]["products"][0]["product_id"], json!(2));
    assert_eq!(orders[0]["history"][0]["status"], json!("created"));
}

#[tokio::test]
async fn corrupt_history_is_a_server_error_over_http() {
    let app = TestApp::new(catalog()).await;
    let order_id = place(&app, 7, 1, 1).await;
    app.execute_sql(&format!(
        "UPDATE order_detail SET order_history = 'garbage' WHERE id = (SELECT order_detail_id FROM orders WHERE id = {})",
        order_id
    ))
    .await;

    let response = app.request_as(7, Method::GET, "/v1/order_history", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
