pub mod health;
pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    events::EventSender,
    services::{orders::OrderService, payments::PaymentService},
};

/// Service instances shared by every handler through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            orders: OrderService::new(db.clone(), event_sender.clone()),
            payments: PaymentService::new(db, event_sender),
        }
    }
}
