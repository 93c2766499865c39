use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Terminal statuses reported by the payment gateway. Matching is
/// case-insensitive; anything outside this set is rejected before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalPaymentStatus {
    Approved,
    Declined,
    Voided,
    Error,
}

impl ExternalPaymentStatus {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Ok(Self::Approved),
            "DECLINED" => Ok(Self::Declined),
            "VOIDED" => Ok(Self::Voided),
            "ERROR" => Ok(Self::Error),
            other => Err(ServiceError::InvalidStatus(format!(
                "Unrecognized payment status: {}",
                other
            ))),
        }
    }

    /// The payment status the order record should carry after this report.
    pub fn payment_status(self) -> PaymentStatus {
        match self {
            Self::Approved => PaymentStatus::Pagado,
            Self::Declined | Self::Error => PaymentStatus::Fallido,
            Self::Voided => PaymentStatus::Anulado,
        }
    }

    /// Order status induced by the report, applied only while the order is
    /// still pending so fulfilment progress never regresses.
    pub fn induced_order_status(self) -> Option<OrderStatus> {
        match self {
            Self::Approved => Some(OrderStatus::Procesando),
            Self::Declined | Self::Error => Some(OrderStatus::Cancelado),
            Self::Voided => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentUpdateResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
}

/// Applies gateway payment reports to orders, keyed by order number.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Records a gateway report against the order matching `order_number`.
    ///
    /// Returns `Ok(None)` when no order carries that number; the caller
    /// decides how to acknowledge an unmatchable report. Replays of the same
    /// report are absorbed without a write.
    #[instrument(skip(self), fields(order_number = %order_number, status = %raw_status))]
    pub async fn update_payment_status(
        &self,
        order_number: &str,
        raw_status: &str,
    ) -> Result<Option<PaymentUpdateResponse>, ServiceError> {
        let external = ExternalPaymentStatus::parse(raw_status)?;

        let db = &*self.db_pool;
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_number = %order_number, "Failed to look up order for payment update");
                ServiceError::DatabaseError(e)
            })?;

        let Some(order) = order else {
            warn!(order_number = %order_number, "Payment report references unknown order");
            return Ok(None);
        };

        let new_payment_status = external.payment_status();
        let new_order_status = match external.induced_order_status() {
            Some(status) if order.status == OrderStatus::Pendiente => status,
            _ => order.status,
        };

        if order.payment_status == new_payment_status && order.status == new_order_status {
            info!(
                order_id = %order.id,
                payment_status = ?new_payment_status,
                "Payment report already applied, nothing to update"
            );
            return Ok(Some(PaymentUpdateResponse {
                order_id: order.id,
                order_number: order.order_number,
                payment_status: order.payment_status,
                status: order.status,
            }));
        }

        let order_id = order.id;
        let mut active = order.into_active_model();
        active.payment_status = Set(new_payment_status);
        active.status = Set(new_order_status);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order payment status");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %updated.id,
            order_number = %updated.order_number,
            payment_status = ?updated.payment_status,
            status = ?updated.status,
            "Payment status updated"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PaymentStatusUpdated {
                    order_id: updated.id,
                    payment_status: format!("{:?}", updated.payment_status).to_lowercase(),
                })
                .await
            {
                warn!(error = %e, order_id = %updated.id, "Failed to send payment status event");
            }
        }

        Ok(Some(PaymentUpdateResponse {
            order_id: updated.id,
            order_number: updated.order_number,
            payment_status: updated.payment_status,
            status: updated.status,
        }))
    }
}
