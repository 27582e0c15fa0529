use crate::unlock::ReconcileOutcome;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Payment notification, assembled from the JSON body and the query string.
///
/// The provider sends both webhook-style bodies (`{"type": "payment",
/// "data": {"id": ...}}`) and query-only IPN calls (`?topic=payment&id=...`).
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotification {
    pub topic: String,
    pub action: Option<String>,
    pub resource_id: Option<String>,
}

impl PaymentNotification {
    pub fn is_payment(&self) -> bool {
        self.topic == "payment"
    }

    /// Parses a notification. Never panics; malformed input yields `Err`.
    pub fn parse(body: &[u8], query: &HashMap<String, String>) -> Result<Self, String> {
        let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body).map_err(|e| format!("malformed JSON body: {}", e))?
        };
        if !body.is_object() {
            return Err("notification body must be a JSON object".to_string());
        }

        let topic = text_field(body.get("type"))
            .or_else(|| text_field(body.get("topic")))
            .or_else(|| query_field(query, "type"))
            .or_else(|| query_field(query, "topic"))
            .ok_or_else(|| "notification type is missing".to_string())?;

        let resource_id = body
            .get("data")
            .and_then(|data| text_field(data.get("id")))
            .or_else(|| query_field(query, "data.id"))
            .or_else(|| query_field(query, "id"))
            .or_else(|| {
                // IPN bodies put the id at the top level
                if topic == "payment" {
                    text_field(body.get("id"))
                } else {
                    None
                }
            });

        if topic == "payment" {
            match resource_id.as_deref() {
                None => return Err("payment notification without data.id".to_string()),
                Some(id) if !is_payment_id(id) => {
                    return Err(format!("payment id '{}' is not numeric", id))
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            topic,
            action: text_field(body.get("action")),
            resource_id,
        })
    }
}

/// Provider payment ids are decimal numbers.
pub fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn query_field(query: &HashMap<String, String>, key: &str) -> Option<String> {
    query
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parsed `x-signature` header: `ts=<unix>,v1=<hex hmac>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureHeader {
    pub ts: String,
    pub v1: String,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Option<Self> {
        let mut ts = None;
        let mut v1 = None;
        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "ts" => ts = Some(value.trim().to_string()),
                "v1" => v1 = Some(value.trim().to_lowercase()),
                _ => {}
            }
        }
        Some(Self { ts: ts?, v1: v1? })
    }
}

/// Signed manifest: `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`.
/// Absent parts are omitted. Alphanumeric ids are lowercased.
pub fn signature_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

/// Response sent back to the payment provider.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileOutcome>,
}

impl WebhookResponse {
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            status: "ignored",
            reason: Some(reason.into()),
            outcome: None,
        }
    }

    pub fn processed(outcome: ReconcileOutcome) -> Self {
        Self {
            status: "processed",
            reason: None,
            outcome: Some(outcome),
        }
    }
}
