use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::{
    entities::{product, Product},
    errors::ServiceError,
};

/// Authoritative product lookup. Callable with a live transaction so order
/// placement observes a consistent snapshot of price and availability.
pub async fn get_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Option<product::Model>, ServiceError> {
    Product::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}
