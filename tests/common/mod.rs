#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use tienda_api::{
    app_router,
    auth::AuthService,
    config::AppConfig,
    entities::{product, user},
    migrator::Migrator,
    AppState,
};

/// In-memory application wired exactly like the binary, minus the outer
/// CORS/compression layers. The pool is pinned to a single connection so
/// every query sees the same in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub router: Router,
    pub auth: Arc<AuthService>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_webhook_secret(None).await
    }

    pub async fn with_webhook_secret(webhook_secret: Option<&str>) -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
        opts.max_connections(1).min_connections(1);

        let db = Database::connect(opts).await.expect("sqlite connection");
        Migrator::up(&db, None).await.expect("migrations");
        let db = Arc::new(db);

        let config = test_config(webhook_secret);
        let auth = Arc::new(AuthService::new(
            &config.jwt_secret,
            Duration::from_secs(config.jwt_expiration as u64),
        ));

        let state = AppState::new(db.clone(), config, None);
        let router = app_router(state, auth.clone());

        Self { db, router, auth }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, active: bool) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            active: Set(active),
            stock: Set(100),
            image_url: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_product_with_image(
        &self,
        name: &str,
        price: Decimal,
        image_url: &str,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            active: Set(true),
            stock: Set(100),
            image_url: Set(Some(image_url.to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_user(&self, email: &str) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("User".to_string()),
            phone: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed user")
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.auth
            .issue_token(user.id, &user.email)
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        json_body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match json_body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

fn test_config(webhook_secret: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        jwt_secret: "integration_test_secret_that_is_long_enough_123".into(),
        jwt_expiration: 3600,
        host: "127.0.0.1".into(),
        port: 0,
        environment: "test".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        cors_allow_credentials: false,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 30,
        db_idle_timeout_secs: 600,
        db_acquire_timeout_secs: 8,
        event_channel_capacity: 16,
        payment_webhook_secret: webhook_secret.map(str::to_string),
        payment_webhook_tolerance_secs: Some(300),
    }
}
