use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, Model as ProductModel, ProductStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ProductModel> for ProductResponse {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            sku: model.sku,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductListResponse {
    pub items: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Minimal catalog maintenance; enough surface for the stock ledger to have
/// something to govern. Stock mutation stays with the ledger.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be positive".to_string(),
            ));
        }
        if request.stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock cannot be negative".to_string(),
            ));
        }

        let existing = ProductEntity::find()
            .filter(product::Column::Sku.eq(request.sku.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "a product with SKU {} already exists",
                request.sku
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku),
            name: Set(request.name),
            description: Set(request.description),
            price: Set(request.price),
            stock: Set(request.stock),
            status: Set(request.status.unwrap_or(ProductStatus::Active)),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %model.id, "Product created");
        self.event_sender.send(Event::ProductCreated(model.id)).await;

        Ok(model.into())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductResponse, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .map(ProductResponse::from)
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<ProductListResponse, ServiceError> {
        let paginator = ProductEntity::find()
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductListResponse {
            items: products.into_iter().map(ProductResponse::from).collect(),
            total,
            page,
            page_size,
        })
    }
}
