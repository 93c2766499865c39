use crate::{
    entities::{
        address,
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity},
        product, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{catalog, customers},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request/Response types for the order service

/// A client-submitted cart line. The quantity is validated; any price the
/// client attaches is advisory and never used for pricing.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: i32,
    /// Advisory only; the persisted unit price is always re-read from the
    /// catalog inside the order transaction.
    #[serde(default, alias = "price")]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ContactInfo {
    #[validate(email(message = "Contact email must be a valid email address"))]
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddressInput {
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub recipient_name: String,
    #[validate(length(min = 1, message = "Contact phone is required"))]
    pub phone: String,
    pub department: String,
    pub city: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub address_line: String,
    pub postal_code: Option<String>,
}

/// Client-declared totals. Only shipping is carried; the subtotal is always
/// re-derived from the catalog.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderTotalsInput {
    #[serde(default)]
    pub shipping: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<CartLineRequest>,
    #[validate]
    pub shipping_address: ShippingAddressInput,
    #[validate]
    pub contact: ContactInfo,
    #[serde(default)]
    pub totals: OrderTotalsInput,
    /// External payment reference used as the order number when present
    /// (enables later webhook correlation). Generated when absent.
    pub reference: Option<String>,
    pub payment_method: Option<String>,
}

/// Created-order summary returned to the storefront. Field names follow the
/// established storefront contract.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    #[serde(rename = "id_pedido")]
    pub id: Uuid,
    #[serde(rename = "numero_pedido")]
    pub order_number: String,
    #[serde(rename = "fecha_pedido")]
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub item_count: usize,
    pub preview_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    pub recipient_name: String,
    pub phone: String,
    pub department: String,
    pub city: String,
    pub address_line: String,
    pub postal_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub id: Uuid,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub email: String,
    pub phone: Option<String>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub payment_method: Option<String>,
    pub address: Option<AddressResponse>,
    pub items: Vec<OrderItemResponse>,
}

/// A cart line after authoritative re-pricing against the catalog.
struct ValidatedLineItem {
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    subtotal: Decimal,
}

/// Service converting validated carts into persisted orders, plus the
/// ownership-checked read paths over them.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Places an order: re-prices every cart line against the catalog inside
    /// one transaction, persists address, header and line items atomically,
    /// and returns the created order's identifiers.
    ///
    /// `acting_user` is the authenticated caller; `None` means guest checkout,
    /// resolved to a user row from the contact email.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        acting_user: Option<Uuid>,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Quantity is re-checked here so a zero/negative line aborts before
        // any write, naming the offending product.
        for line in &request.items {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity must be a positive integer (product {})",
                    line.product_id
                )));
            }
        }

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let user_id = match acting_user {
            Some(id) => id,
            None => {
                customers::find_or_create_by_email(
                    &txn,
                    &request.contact.email,
                    &request.shipping_address.recipient_name,
                    request.contact.phone.as_deref(),
                )
                .await?
                .id
            }
        };

        // Re-read every product inside the transaction so pricing observes a
        // consistent snapshot. Client-submitted prices are never consulted.
        let mut validated_items = Vec::with_capacity(request.items.len());
        let mut subtotal = Decimal::ZERO;

        for line in &request.items {
            let product = catalog::get_product(&txn, line.product_id).await?;

            let product = match product {
                Some(p) if p.active => p,
                Some(_) => {
                    return Err(ServiceError::InvalidLineItem(format!(
                        "Product {} is not available for sale",
                        line.product_id
                    )));
                }
                None => {
                    return Err(ServiceError::InvalidLineItem(format!(
                        "Product {} does not exist",
                        line.product_id
                    )));
                }
            };

            let line_subtotal = product.price * Decimal::from(line.quantity);
            subtotal += line_subtotal;

            validated_items.push(ValidatedLineItem {
                product_id: product.id,
                product_name: product.name,
                quantity: line.quantity,
                unit_price: product.price,
                subtotal: line_subtotal,
            });
        }

        let shipping = &request.shipping_address;
        let address_model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(Some(user_id)),
            recipient_name: Set(shipping.recipient_name.clone()),
            phone: Set(shipping.phone.clone()),
            department: Set(shipping.department.clone()),
            city: Set(shipping.city.clone()),
            address_line: Set(shipping.address_line.clone()),
            postal_code: Set(shipping.postal_code.clone()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to persist shipping address");
            ServiceError::DatabaseError(e)
        })?;

        // Shipping cost is taken from the request as-is; only the subtotal is
        // authoritative. See DESIGN.md for the open trust-boundary question.
        let shipping_cost = request.totals.shipping;
        let total = subtotal + shipping_cost;

        let order_id = Uuid::new_v4();
        let order_number = request
            .reference
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(generate_order_number);

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            address_id: Set(address_model.id),
            email: Set(request.contact.email.clone()),
            phone: Set(request.contact.phone.clone()),
            subtotal: Set(subtotal),
            shipping_cost: Set(shipping_cost),
            total: Set(total),
            payment_method: Set(request.payment_method.clone()),
            status: Set(OrderStatus::Pendiente),
            payment_status: Set(PaymentStatus::Pendiente),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                warn!(order_number = %order_number, "Order number collision");
                ServiceError::Conflict(format!("Order number {} already exists", order_number))
            }
            _ => {
                error!(error = %e, order_id = %order_id, "Failed to create order in database");
                ServiceError::DatabaseError(e)
            }
        })?;

        for item in &validated_items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_name: Set(item.product_name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                subtotal: Set(item.subtotal),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, product_id = %item.product_id, "Failed to persist order line item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            user_id = %user_id,
            total = %total,
            "Order created successfully"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order created event");
            }
        }

        Ok(CreateOrderResponse {
            id: order_id,
            order_number: order_model.order_number,
            order_date: order_model.created_at,
        })
    }

    /// Lists the user's orders, newest first, each with an item count and a
    /// representative product image.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrderSummary>, ServiceError> {
        let db = &*self.db_pool;

        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to list orders");
                ServiceError::DatabaseError(e)
            })?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .find_also_related(Product)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to load order items for summaries");
                ServiceError::DatabaseError(e)
            })?;

        let mut per_order: HashMap<Uuid, (usize, Option<String>)> = HashMap::new();
        for (item, product) in items {
            let entry = per_order.entry(item.order_id).or_insert((0, None));
            entry.0 += 1;
            if entry.1.is_none() {
                entry.1 = product.and_then(|p| p.image_url);
            }
        }

        let summaries = orders
            .into_iter()
            .map(|o| {
                let (item_count, preview_image) =
                    per_order.remove(&o.id).unwrap_or((0, None));
                OrderSummary {
                    id: o.id,
                    order_number: o.order_number,
                    order_date: o.created_at,
                    status: o.status,
                    payment_status: o.payment_status,
                    total: o.total,
                    item_count,
                    preview_image,
                }
            })
            .collect();

        Ok(summaries)
    }

    /// Fetches one order's full record. Ownership is enforced in the query
    /// itself: an order that exists but belongs to another user is
    /// indistinguishable from a missing one.
    #[instrument(skip(self), fields(order_id = %order_id, user_id = %user_id))]
    pub async fn get_order_detail(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::UserId.eq(user_id))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with ID {} not found", order_id))
            })?;

        let address = crate::entities::Address::find_by_id(order.address_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order address");
                ServiceError::DatabaseError(e)
            })?
            .map(|a| AddressResponse {
                recipient_name: a.recipient_name,
                phone: a.phone,
                department: a.department,
                city: a.city,
                address_line: a.address_line,
                postal_code: a.postal_code,
            });

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .find_also_related(Product)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|(item, product): (order_item::Model, Option<product::Model>)| {
                OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    subtotal: item.subtotal,
                    image_url: product.and_then(|p| p.image_url),
                }
            })
            .collect();

        Ok(OrderDetail {
            id: order.id,
            order_number: order.order_number,
            order_date: order.created_at,
            status: order.status,
            payment_status: order.payment_status,
            email: order.email,
            phone: order.phone,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            payment_method: order.payment_method,
            address,
            items,
        })
    }
}

/// Time-based order number with a random suffix. Collisions are possible in
/// theory; the unique index on orders.order_number turns them into a
/// retryable conflict.
fn generate_order_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD-{}-{:04}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_number_has_time_and_random_parts() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].parse::<u32>().is_ok());
    }

    #[test]
    fn client_submitted_price_is_deserialized_but_advisory() {
        // The storefront may still send a price per line; the engine keeps
        // the field out of every pricing computation.
        let raw = serde_json::json!({
            "items": [{ "product_id": Uuid::new_v4(), "quantity": 2, "price": "1" }],
            "shipping_address": {
                "recipient_name": "Ana Rojas",
                "phone": "3001234567",
                "department": "Cundinamarca",
                "city": "Bogotá",
                "address_line": "Calle 1 # 2-3"
            },
            "contact": { "email": "ana@example.com" },
            "totals": { "shipping": "9000" }
        });

        let request: CreateOrderRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.items[0].unit_price, Some(dec!(1)));
        assert_eq!(request.totals.shipping, dec!(9000));
    }

    #[test]
    fn empty_cart_fails_validation() {
        let request = CreateOrderRequest {
            items: vec![],
            shipping_address: ShippingAddressInput {
                recipient_name: "Ana".into(),
                phone: "300".into(),
                department: "Antioquia".into(),
                city: "Medellín".into(),
                address_line: "Cra 1".into(),
                postal_code: None,
            },
            contact: ContactInfo {
                email: "ana@example.com".into(),
                phone: None,
            },
            totals: OrderTotalsInput::default(),
            reference: None,
            payment_method: None,
        };

        assert!(request.validate().is_err());
    }
}
