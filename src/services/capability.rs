use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::error::AppError;
use crate::model::PreRental;

/// Decryption failures and field mismatches are indistinguishable on
/// purpose, so a holder cannot probe which bound field was wrong.
const VERIFY_FAILED: &str = "Access key verification failed.";

const NONCE_LEN: usize = 12;

/// Issue a bearer key granting scoped access to one pre-rental record.
///
/// The record's identifying fields are canonicalized, sealed with
/// AES-256-GCM under a key derived from `secret`, and hex-encoded. The
/// nonce is random per call, so issuing twice for the same record yields
/// two different keys that both verify.
pub fn issue_access_key(secret: &str, record: &PreRental) -> Result<String, AppError> {
    let cipher = build_cipher(secret)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, canonical_string(record).as_bytes())
        .map_err(|_| AppError::Internal("Could not issue access key.".to_string()))?;

    let mut key = Vec::with_capacity(NONCE_LEN + sealed.len());
    key.extend_from_slice(&nonce);
    key.extend_from_slice(&sealed);
    Ok(hex::encode(key))
}

/// Verify a presented key against the live record. Every bound field must
/// match; any decode, decrypt, or comparison failure collapses into the
/// same error.
pub fn verify_access_key(secret: &str, record: &PreRental, key: &str) -> Result<(), AppError> {
    verify_inner(secret, record, key)
        .ok_or_else(|| AppError::Unauthorized(VERIFY_FAILED.to_string()))
}

fn verify_inner(secret: &str, record: &PreRental, key: &str) -> Option<()> {
    let raw = hex::decode(key.trim()).ok()?;
    if raw.len() <= NONCE_LEN {
        return None;
    }
    let (nonce, sealed) = raw.split_at(NONCE_LEN);

    let cipher = build_cipher(secret).ok()?;
    let plaintext = cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()?;
    let recovered = String::from_utf8(plaintext).ok()?;

    let bound: Vec<(String, String)> = form_urlencoded::parse(recovered.as_bytes())
        .into_owned()
        .collect();
    let expected = canonical_fields(record);

    if bound.len() != expected.len() {
        return None;
    }
    for ((bound_key, bound_value), (expected_key, expected_value)) in
        bound.iter().zip(expected.iter())
    {
        if bound_key != expected_key || bound_value != expected_value {
            return None;
        }
    }
    Some(())
}

fn build_cipher(secret: &str) -> Result<Aes256Gcm, AppError> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| AppError::Internal("Could not derive access key cipher.".to_string()))
}

/// The full field set a key is bound to, in fixed order.
fn canonical_fields(record: &PreRental) -> Vec<(String, String)> {
    vec![
        ("id".to_string(), record.id.to_string()),
        (
            "created_by".to_string(),
            record.created_by_user_id.to_string(),
        ),
        ("property_id".to_string(), record.property_id.to_string()),
        (
            "unit_id".to_string(),
            record
                .unit_id
                .map(|unit_id| unit_id.to_string())
                .unwrap_or_default(),
        ),
        (
            "tenant_name".to_string(),
            record.tenant_full_name.clone(),
        ),
        ("tenant_email".to_string(), record.tenant_email.clone()),
        ("tenant_phone".to_string(), record.tenant_phone.clone()),
        (
            "created_at".to_string(),
            record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        ),
    ]
}

fn canonical_string(record: &PreRental) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in canonical_fields(record) {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    fn record() -> PreRental {
        PreRental {
            id: Uuid::new_v4(),
            created_by_user_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            unit_id: Some(Uuid::new_v4()),
            tenant_full_name: "Ana Benítez".to_string(),
            tenant_email: "ana@example.com".to_string(),
            tenant_phone: "+595981234567".to_string(),
            created_at: Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 45).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
        }
    }

    #[test]
    fn issued_key_verifies_against_the_same_record() {
        let record = record();
        let key = issue_access_key("secret", &record).expect("issue");
        assert!(verify_access_key("secret", &record, &key).is_ok());
    }

    #[test]
    fn keys_are_nondeterministic_but_both_verify() {
        let record = record();
        let first = issue_access_key("secret", &record).expect("issue");
        let second = issue_access_key("secret", &record).expect("issue");
        assert_ne!(first, second);
        assert!(verify_access_key("secret", &record, &first).is_ok());
        assert!(verify_access_key("secret", &record, &second).is_ok());
    }

    #[test]
    fn every_bound_field_is_checked_independently() {
        let original = record();
        let key = issue_access_key("secret", &original).expect("issue");

        let mutations: Vec<Box<dyn Fn(&mut PreRental)>> = vec![
            Box::new(|r| r.id = Uuid::new_v4()),
            Box::new(|r| r.created_by_user_id = Uuid::new_v4()),
            Box::new(|r| r.property_id = Uuid::new_v4()),
            Box::new(|r| r.unit_id = None),
            Box::new(|r| r.tenant_full_name = "Someone Else".to_string()),
            Box::new(|r| r.tenant_email = "other@example.com".to_string()),
            Box::new(|r| r.tenant_phone = "+595999999999".to_string()),
            Box::new(|r| r.created_at = r.created_at + chrono::Duration::nanoseconds(1)),
        ];

        for (index, mutate) in mutations.iter().enumerate() {
            let mut mutated = original.clone();
            mutate(&mut mutated);
            assert!(
                verify_access_key("secret", &mutated, &key).is_err(),
                "mutation {index} should invalidate the key"
            );
        }
    }

    #[test]
    fn tampered_or_malformed_keys_are_rejected() {
        let record = record();
        let key = issue_access_key("secret", &record).expect("issue");

        let mut tampered = key.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(verify_access_key("secret", &record, &tampered).is_err());

        assert!(verify_access_key("secret", &record, "not-hex!").is_err());
        assert!(verify_access_key("secret", &record, "aabb").is_err());
        assert!(verify_access_key("other-secret", &record, &key).is_err());
    }
}
