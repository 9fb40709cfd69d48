use super::common::PaginationParams;
use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::orders::{CreateOrderRequest, OrderListResponse, OrderResponse};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Create a new order for the calling user. Stock is checked advisorily and
/// the total is computed from snapshot prices.
async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state
        .services
        .orders
        .create_order(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// List the calling user's orders, newest first.
async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    params.validate_against(state.config.max_page_size)?;

    let orders = state
        .services
        .orders
        .list_orders(user.user_id, params.page, params.page_size)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get one of the calling user's orders.
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(order_id, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel a pending order.
async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(order_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:order_id", get(get_order))
        .route("/:order_id/cancel", post(cancel_order))
}
