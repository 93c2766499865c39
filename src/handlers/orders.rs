use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::{AuthUser, OptionalAuthUser},
    errors::ServiceError,
    services::orders::{CreateOrderRequest, CreateOrderResponse, OrderDetail, OrderSummary},
    AppState,
};

/// POST /api/v1/orders
///
/// Guest checkout is allowed: without a bearer token the order is attached to
/// a user resolved from the contact email.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Invalid cart or contact data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ServiceError> {
    let acting_user = user.map(|u| u.user_id);
    let response = state.services.orders.create_order(acting_user, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "The caller's orders, newest first", body = [OrderSummary]),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OrderSummary>>, ServiceError> {
    let summaries = state.services.orders.list_orders_for_user(user.user_id).await?;
    Ok(Json(summaries))
}

/// GET /api/v1/orders/{id}
///
/// Returns 404 both for a missing order and for an order owned by another
/// user, so order IDs cannot be probed.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order_detail(order_id, user.user_id)
        .await?;
    Ok(Json(detail))
}
