use crate::errors::AppError;
use crate::handlers::AppState;
use crate::unlock::{self, Reconciliation};
use crate::webhook_models::{
    signature_manifest, PaymentNotification, SignatureHeader, WebhookResponse,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Payment Webhook Handler
///
/// Receives payment notifications, verifies the signature when a secret is
/// configured, looks the payment up at the provider and reconciles the
/// brand's unlocked mission.
///
/// Malformed notifications are rejected with 400. Notifications that cannot
/// be acted on (other topics, unknown payments, unknown brands, duplicates)
/// are answered with 200 `ignored` so the provider stops retrying.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    tracing::info!("Received payment webhook");

    // 1. Parse leniently
    let notification = PaymentNotification::parse(&body, &query).map_err(|reason| {
        tracing::warn!("Rejected payment webhook: {}", reason);
        AppError::BadRequest(format!("Invalid notification: {}", reason))
    })?;

    // 2. Validate signature (if configured)
    validate_signature(&state, &headers, notification.resource_id.as_deref())?;

    // 3. Only payments move missions
    if !notification.is_payment() {
        tracing::debug!("Ignoring '{}' notification", notification.topic);
        return Ok(ignored(format!(
            "topic '{}' is not handled",
            notification.topic
        )));
    }
    let Some(payment_id) = notification.resource_id else {
        return Ok(ignored("payment id missing"));
    };

    let Some(ref client) = state.payment_client else {
        tracing::error!(
            "Payment webhook for {} received but no payment provider is configured",
            payment_id
        );
        return Ok(ignored("payment provider not configured"));
    };

    // 4. Fetch the payment (not-found is soft)
    let Some(payment) = client.get_payment(&payment_id).await? else {
        return Ok(ignored("payment not found"));
    };
    if payment.id != payment_id {
        tracing::warn!(
            "Provider answered payment {} for lookup of {}",
            payment.id,
            payment_id
        );
        return Ok(ignored("payment id mismatch"));
    }

    // 5. Dedupe repeated deliveries of the same status
    let dedupe_key = format!("{}:{}", payment.id, payment.status);
    if state.processed_payments.contains_key(&dedupe_key) {
        tracing::debug!("Skipped duplicate notification {}", dedupe_key);
        return Ok(ignored("duplicate notification"));
    }

    // 6. Reconcile
    match unlock::reconcile(&state.storage, &payment).await? {
        Reconciliation::Applied(outcome) => {
            state.processed_payments.insert(dedupe_key, ()).await;
            tracing::info!(
                "Payment {} reconciled for brand {} (status={}, unlocked={:?}, advanced={})",
                payment.id,
                outcome.id_unico,
                outcome.payment_status,
                outcome.unlocked_mission,
                outcome.advanced
            );
            Ok((StatusCode::OK, Json(WebhookResponse::processed(outcome))))
        }
        Reconciliation::Ignored(reason) => Ok(ignored(reason)),
    }
}

fn ignored(reason: impl Into<String>) -> (StatusCode, Json<WebhookResponse>) {
    (StatusCode::OK, Json(WebhookResponse::ignored(reason)))
}

/// Validate the `x-signature` HMAC (skipped when no secret is configured)
fn validate_signature(
    state: &AppState,
    headers: &HeaderMap,
    data_id: Option<&str>,
) -> Result<(), AppError> {
    let Some(ref secret) = state.config.payment_webhook_secret else {
        return Ok(());
    };

    let header = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing x-signature header".to_string()))?;
    let signature = SignatureHeader::parse(header)
        .ok_or_else(|| AppError::Unauthorized("Malformed x-signature header".to_string()))?;
    let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());

    if !verify_signature(secret, data_id, request_id, &signature) {
        tracing::warn!("Invalid payment webhook signature received");
        return Err(AppError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    Ok(())
}

pub fn verify_signature(
    secret: &str,
    data_id: Option<&str>,
    request_id: Option<&str>,
    signature: &SignatureHeader,
) -> bool {
    let Ok(expected) = hex::decode(&signature.v1) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signature_manifest(data_id, request_id, &signature.ts).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Computes the `x-signature` header value for a notification.
pub fn sign_notification(
    secret: &str,
    data_id: Option<&str>,
    request_id: Option<&str>,
    ts: &str,
) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(signature_manifest(data_id, request_id, ts).as_bytes());
    Some(format!(
        "ts={},v1={}",
        ts,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let header = sign_notification("s3cret", Some("123"), Some("req-1"), "1700000000").unwrap();
        let parsed = SignatureHeader::parse(&header).unwrap();
        assert!(verify_signature("s3cret", Some("123"), Some("req-1"), &parsed));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let header = sign_notification("s3cret", Some("123"), Some("req-1"), "1700000000").unwrap();
        let parsed = SignatureHeader::parse(&header).unwrap();
        assert!(!verify_signature("other", Some("123"), Some("req-1"), &parsed));
        assert!(!verify_signature("s3cret", Some("124"), Some("req-1"), &parsed));
        assert!(!verify_signature("s3cret", Some("123"), None, &parsed));
    }

    #[test]
    fn test_signature_rejects_non_hex() {
        let parsed = SignatureHeader {
            ts: "1".to_string(),
            v1: "zz-not-hex".to_string(),
        };
        assert!(!verify_signature("s3cret", Some("1"), None, &parsed));
    }
}
