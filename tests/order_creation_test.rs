//! Order placement: pricing integrity, atomicity, and guest resolution.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use tienda_api::entities::{address, order, order_item, user};

fn order_payload(items: serde_json::Value) -> serde_json::Value {
    json!({
        "items": items,
        "shipping_address": {
            "recipient_name": "Ana Rojas",
            "phone": "3001234567",
            "department": "Cundinamarca",
            "city": "Bogotá",
            "address_line": "Calle 1 # 2-3",
            "postal_code": "110111"
        },
        "contact": { "email": "ana@example.com", "phone": "3001234567" },
        "totals": { "shipping": "9000" }
    })
}

#[tokio::test]
async fn forged_client_prices_are_ignored() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    // Client claims the product costs 1.
    let payload = order_payload(json!([{
        "product_id": product.id,
        "quantity": 2,
        "price": "1"
    }]));

    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert!(body["id_pedido"].is_string());
    assert!(body["numero_pedido"].is_string());
    assert!(body["fecha_pedido"].is_string());

    let stored = order::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .expect("order persisted");
    assert_eq!(stored.subtotal, dec!(100000));
    assert_eq!(stored.shipping_cost, dec!(9000));
    assert_eq!(stored.total, dec!(109000));

    let line = order_item::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .expect("line item persisted");
    assert_eq!(line.unit_price, dec!(50000));
    assert_eq!(line.subtotal, dec!(100000));
}

#[tokio::test]
async fn unknown_product_rolls_back_everything() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let payload = order_payload(json!([
        { "product_id": product.id, "quantity": 1 },
        { "product_id": uuid::Uuid::new_v4(), "quantity": 1 }
    ]));

    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(order_item::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(address::Entity::find().count(&*app.db).await.unwrap(), 0);
    // Guest resolution ran inside the same transaction.
    assert_eq!(user::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn inactive_product_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Descontinuado", dec!(20000), false).await;

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains(&product.id.to_string()),
        "error should name the offending product"
    );
}

#[tokio::test]
async fn empty_cart_is_rejected_without_writes() {
    let app = TestApp::new().await;

    let payload = order_payload(json!([]));
    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(user::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 0 }]));
    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn reference_becomes_order_number_and_duplicates_conflict() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let mut payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    payload["reference"] = json!("PAY-REF-001");

    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["numero_pedido"], "PAY-REF-001");

    let replay = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 1);
}

#[tokio::test]
async fn generated_order_number_has_expected_shape() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let number = body["numero_pedido"].as_str().unwrap();
    assert!(number.starts_with("ORD-"), "got {}", number);
}

#[tokio::test]
async fn guest_users_are_created_once_per_email() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    let first = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    // Same email with different casing reuses the existing user.
    let mut payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    payload["contact"]["email"] = json!("ANA@Example.com");
    let second = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(second.status(), StatusCode::CREATED);

    let users = user::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "ana@example.com");
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 2);
}

#[tokio::test]
async fn authenticated_order_is_attached_to_caller() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;
    let owner = app.seed_user("cliente@example.com").await;
    let token = app.token_for(&owner);

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let stored = order::Entity::find()
        .filter(order::Column::UserId.eq(owner.id))
        .one(&*app.db)
        .await
        .unwrap();
    assert!(stored.is_some(), "order should belong to the token's user");
    // No guest user was minted for the contact email.
    assert_eq!(user::Entity::find().count(&*app.db).await.unwrap(), 1);
}

#[tokio::test]
async fn new_order_starts_pending() {
    let app = TestApp::new().await;
    let product = app.seed_product("Camiseta", dec!(50000), true).await;

    let payload = order_payload(json!([{ "product_id": product.id, "quantity": 1 }]));
    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let stored = order::Entity::find().one(&*app.db).await.unwrap().unwrap();
    assert_eq!(stored.status, order::OrderStatus::Pendiente);
    assert_eq!(stored.payment_status, order::PaymentStatus::Pendiente);
    assert!(stored.updated_at.is_none());
}
