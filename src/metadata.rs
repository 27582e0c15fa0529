//! Onboarding metadata blob.
//!
//! Stored as serialized text in the `brands` table but handled as a JSON
//! object everywhere else. Reads never fail: malformed or non-object content
//! is discarded and replaced by an empty object.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Checkout status written while a preference is open.
pub const STATUS_PENDING: &str = "pending";
/// Status reported by the payment provider for a settled payment.
pub const STATUS_APPROVED: &str = "approved";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OnboardingMetadata(Map<String, Value>);

impl OnboardingMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the stored text, discarding anything that is not a JSON object.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                tracing::warn!("Discarding malformed onboarding metadata: {}", e);
                Self::default()
            }
        }
    }

    /// Non-object values are discarded.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            // Some clients double-encode the blob
            Value::String(inner) => Self::parse_lenient(&inner),
            other => {
                tracing::warn!(
                    "Discarding onboarding metadata that is not an object: {}",
                    other
                );
                Self::default()
            }
        }
    }

    pub fn to_storage_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: top-level keys of `patch` overwrite existing keys.
    pub fn merge(&mut self, patch: OnboardingMetadata) {
        for (key, value) in patch.0 {
            self.0.insert(key, value);
        }
    }

    /// Records an open checkout preference.
    pub fn record_checkout(&mut self, preference_id: &str, product: &str, status: &str) {
        self.0.insert(
            "checkout".to_string(),
            json!({
                "status": status,
                "preferenceId": preference_id,
                "product": product,
                "updatedAt": Utc::now().to_rfc3339(),
            }),
        );
    }

    /// Records a payment notification and mirrors its status into `checkout`.
    pub fn record_payment(&mut self, payment_id: &str, status: &str, product: Option<&str>) {
        self.0.insert(
            "payment".to_string(),
            json!({
                "id": payment_id,
                "status": status,
                "product": product,
                "updatedAt": Utc::now().to_rfc3339(),
            }),
        );

        let checkout = self
            .0
            .entry("checkout".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !checkout.is_object() {
            *checkout = Value::Object(Map::new());
        }
        if let Value::Object(checkout) = checkout {
            checkout.insert("status".to_string(), json!(status));
            checkout.insert("paymentId".to_string(), json!(payment_id));
            if let Some(product) = product {
                checkout.insert("product".to_string(), json!(product));
            }
            checkout.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));
        }
    }

    pub fn checkout_status(&self) -> Option<&str> {
        self.0
            .get("checkout")
            .and_then(|c| c.get("status"))
            .and_then(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_text_is_discarded() {
        assert!(OnboardingMetadata::parse_lenient("{not json").is_empty());
        assert!(OnboardingMetadata::parse_lenient("[1,2,3]").is_empty());
        assert!(OnboardingMetadata::parse_lenient("").is_empty());
        assert!(OnboardingMetadata::parse_lenient("null").is_empty());
    }

    #[test]
    fn test_double_encoded_blob_is_unwrapped() {
        let raw = serde_json::to_string(r#"{"segment":"moda"}"#).unwrap();
        let metadata = OnboardingMetadata::parse_lenient(&raw);
        assert_eq!(metadata.get("segment"), Some(&json!("moda")));
    }

    #[test]
    fn test_storage_round_trip() {
        let metadata = OnboardingMetadata::from_value(json!({
            "segment": "consultoria",
            "answers": [1, 2, {"q": "porque"}],
            "checkout": {"status": "pending"}
        }));
        let restored = OnboardingMetadata::parse_lenient(&metadata.to_storage_string());
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_record_payment_updates_checkout_status() {
        let mut metadata = OnboardingMetadata::new();
        metadata.record_checkout("pref-1", "mission-2", STATUS_PENDING);
        assert_eq!(metadata.checkout_status(), Some(STATUS_PENDING));

        metadata.record_payment("123", STATUS_APPROVED, Some("mission-2"));
        assert_eq!(metadata.checkout_status(), Some(STATUS_APPROVED));
        assert_eq!(metadata.get("checkout").unwrap()["preferenceId"], "pref-1");
        assert_eq!(metadata.get("payment").unwrap()["id"], "123");
    }

    #[test]
    fn test_record_payment_replaces_non_object_checkout() {
        let mut metadata = OnboardingMetadata::from_value(json!({"checkout": "legacy"}));
        metadata.record_payment("9", STATUS_PENDING, None);
        assert_eq!(metadata.checkout_status(), Some(STATUS_PENDING));
    }

    #[test]
    fn test_merge_overwrites_top_level_keys() {
        let mut metadata = OnboardingMetadata::from_value(json!({"a": 1, "b": {"c": 2}}));
        metadata.merge(OnboardingMetadata::from_value(json!({"b": {"d": 3}, "e": 4})));
        assert_eq!(metadata.get("a"), Some(&json!(1)));
        assert_eq!(metadata.get("b"), Some(&json!({"d": 3})));
        assert_eq!(metadata.get("e"), Some(&json!(4)));
    }
}
