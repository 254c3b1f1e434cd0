use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

use crate::model::{PaymentStatus, Side};
use crate::repository::table_service::create_row;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Persist a payment domain event and hand it to the notification
/// boundary. Event recording is best-effort: a failure here must never
/// roll back the transition that already committed, so errors are logged
/// and swallowed.
pub async fn record_payment_event(
    state: &AppState,
    rental_id: Uuid,
    payment_id: Uuid,
    old_status: PaymentStatus,
    new_status: PaymentStatus,
    acting_side: Option<Side>,
) {
    let Some(pool) = state.db_pool.as_ref() else {
        return;
    };

    let mut row = Map::new();
    row.insert(
        "rental_id".to_string(),
        Value::String(rental_id.to_string()),
    );
    row.insert(
        "payment_id".to_string(),
        Value::String(payment_id.to_string()),
    );
    row.insert(
        "old_status".to_string(),
        Value::String(old_status.as_str().to_string()),
    );
    row.insert(
        "new_status".to_string(),
        Value::String(new_status.as_str().to_string()),
    );
    row.insert(
        "acting_side".to_string(),
        Value::String(
            acting_side
                .map(Side::as_str)
                .unwrap_or("system")
                .to_string(),
        ),
    );

    match create_row(pool, "payment_events", &row).await {
        Ok(event) => {
            tracing::info!(
                rental_id = %rental_id,
                payment_id = %payment_id,
                old_status = old_status.as_str(),
                new_status = new_status.as_str(),
                "Payment event recorded"
            );
            dispatch_webhook(state, &event).await;
        }
        Err(error) => {
            tracing::warn!(
                payment_id = %payment_id,
                error = %error,
                "Failed to record payment event"
            );
        }
    }
}

/// POST the event to the configured webhook, signing the body so the
/// receiver can authenticate it (`t=<unix-ts>,v1=<hmac-sha256-hex>` over
/// `<ts>.<body>`).
async fn dispatch_webhook(state: &AppState, event: &Value) {
    let Some(url) = state.config.payment_webhook_url.as_deref() else {
        return;
    };

    let body = event.to_string();
    let mut request = state
        .http_client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json");

    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let timestamp = Utc::now().timestamp();
        if let Some(signature) = sign_payload(secret, timestamp, &body) {
            request = request.header("x-rentora-signature", signature);
        }
    }

    match request.body(body).send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            tracing::warn!(status = %response.status(), "Payment webhook rejected the event");
        }
        Err(error) => {
            tracing::warn!(error = %error, "Payment webhook dispatch failed");
        }
    }
}

fn sign_payload(secret: &str, timestamp: i64, body: &str) -> Option<String> {
    let signed_payload = format!("{timestamp}.{body}");
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return None;
    };
    mac.update(signed_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Some(format!("t={timestamp},v1={signature}"))
}

#[cfg(test)]
mod tests {
    use super::sign_payload;

    #[test]
    fn signature_header_carries_timestamp_and_hex_digest() {
        let header = sign_payload("whsec", 1_620_000_000, r#"{"ok":true}"#).expect("signature");
        let (ts, sig) = header.split_once(',').expect("two parts");
        assert_eq!(ts, "t=1620000000");
        let sig = sig.strip_prefix("v1=").expect("v1 prefix");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_body_and_secret() {
        let base = sign_payload("whsec", 1, "a");
        assert_eq!(base, sign_payload("whsec", 1, "a"));
        assert_ne!(base, sign_payload("whsec", 1, "b"));
        assert_ne!(base, sign_payload("other", 1, "a"));
    }
}
