use super::common::PaginationParams;
use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::products::{CreateProductRequest, ProductListResponse, ProductResponse};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Create a product (administrators only).
async fn create_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    user.require_admin()?;

    let product = state.services.products.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state.services.products.get_product(product_id).await?;
    Ok(Json(ApiResponse::success(product)))
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
    _user: AuthenticatedUser,
) -> Result<Json<ApiResponse<ProductListResponse>>, ServiceError> {
    params.validate_against(state.config.max_page_size)?;

    let products = state
        .services
        .products
        .list_products(params.page, params.page_size)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/", get(list_products))
        .route("/:product_id", get(get_product))
}
