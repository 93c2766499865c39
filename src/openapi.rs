use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tienda API",
        version = "1.0.0",
        description = r#"
Storefront order API.

## Authentication

Order reads require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Order creation accepts guest checkouts without a token; the order is attached
to a user resolved from the contact email.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement and retrieval"),
        (name = "Payments", description = "Payment gateway callbacks"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::health_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentStatus,
        crate::services::orders::CartLineRequest,
        crate::services::orders::ContactInfo,
        crate::services::orders::ShippingAddressInput,
        crate::services::orders::OrderTotalsInput,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::CreateOrderResponse,
        crate::services::orders::OrderSummary,
        crate::services::orders::AddressResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderDetail,
        crate::services::payments::PaymentUpdateResponse,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
