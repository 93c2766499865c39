use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{errors::ServiceError, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Gateway payment report. Field aliases cover the spellings observed from
/// the gateway's retry pipeline.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(alias = "orderNumber", alias = "order_number")]
    pub reference: String,
    #[serde(alias = "externalStatus")]
    pub status: String,
}

/// POST /api/v1/payments/webhook
///
/// Always acknowledges with 200 once the payload is authentic and
/// well-formed, even when the reference matches no order, so the gateway
/// stops retrying reports we can never apply.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Report acknowledged"),
        (status = 400, description = "Malformed payload or unrecognized status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let tolerance = state.config.payment_webhook_tolerance_secs.unwrap_or(300);
        if !verify_signature(&headers, &body, secret, tolerance) {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;

    let updated = state
        .services
        .payments
        .update_payment_status(&payload.reference, &payload.status)
        .await?;

    match updated {
        Some(update) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "applied",
                "order_number": update.order_number,
                "payment_status": update.payment_status,
            })),
        )),
        None => {
            info!(reference = %payload.reference, "Acknowledged report for unknown order");
            Ok((
                StatusCode::OK,
                Json(json!({
                    "status": "ignored",
                    "order_number": payload.reference,
                })),
            ))
        }
    }
}

/// HMAC check over `"{timestamp}.{body}"` with x-timestamp and x-signature
/// headers. Stale timestamps outside the tolerance window are rejected.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accepts_gateway_field_aliases() {
        let a: WebhookPayload =
            serde_json::from_str(r#"{"reference":"ORD-1","status":"APPROVED"}"#).unwrap();
        assert_eq!(a.reference, "ORD-1");

        let b: WebhookPayload =
            serde_json::from_str(r#"{"orderNumber":"ORD-2","externalStatus":"DECLINED"}"#).unwrap();
        assert_eq!(b.reference, "ORD-2");
        assert_eq!(b.status, "DECLINED");
    }

    #[test]
    fn signature_round_trip_verifies() {
        let secret = "webhook_secret";
        let body = Bytes::from_static(b"{\"reference\":\"ORD-1\",\"status\":\"APPROVED\"}");
        let ts = chrono::Utc::now().timestamp().to_string();

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", ts, std::str::from_utf8(&body).unwrap()).as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());

        assert!(verify_signature(&headers, &body, secret, 300));
        assert!(!verify_signature(&headers, &body, "other_secret", 300));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let secret = "webhook_secret";
        let body = Bytes::from_static(b"{}");
        let ts = (chrono::Utc::now().timestamp() - 3600).to_string();

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", ts, "{}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());

        assert!(!verify_signature(&headers, &body, secret, 300));
    }
}
