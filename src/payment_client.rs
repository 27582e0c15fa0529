use crate::errors::AppError;
use crate::payment_models::{BackUrls, Payment, Preference, Product, CURRENCY};
use crate::webhook_models::is_payment_id;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Client for the payment provider's checkout and payment APIs.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl PaymentClient {
    pub fn new(base_url: String, access_token: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create payment client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Creates a checkout preference for `product`, referencing the brand by `id_unico`.
    pub async fn create_preference(
        &self,
        product: &Product,
        id_unico: &str,
        payer_email: Option<&str>,
        back_urls: &BackUrls,
        notification_url: &str,
    ) -> Result<Preference, AppError> {
        let url = format!("{}/checkout/preferences", self.base_url);
        tracing::info!(
            "Creating checkout preference for brand {} (product {})",
            id_unico,
            product.rank
        );

        let mut body = json!({
            "items": [{
                "id": product.rank.as_str(),
                "title": product.title,
                "quantity": 1,
                "currency_id": CURRENCY,
                "unit_price": product.unit_price,
            }],
            "external_reference": id_unico,
            "metadata": {
                "id_unico": id_unico,
                "product_code": product.rank.as_str(),
            },
            "back_urls": back_urls,
            "auto_return": "approved",
            "notification_url": notification_url,
        });
        if let Some(email) = payer_email {
            body["payer"] = json!({ "email": email });
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Payment request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Preference creation failed {}: {}",
                status, error_text
            )));
        }

        let preference: Preference = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse preference response: {}", e))
        })?;

        tracing::info!("✓ Preference {} created", preference.id);
        Ok(preference)
    }

    fn payment_url(&self, payment_id: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::InternalError(format!("Invalid payment API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                AppError::InternalError("Payment API URL cannot carry a path".to_string())
            })?
            .pop_if_empty()
            .extend(["v1", "payments", payment_id]);
        Ok(url)
    }

    /// Looks up a payment. `Ok(None)` when the provider does not know the id.
    pub async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>, AppError> {
        if !is_payment_id(payment_id) {
            return Err(AppError::BadRequest(format!(
                "Invalid payment id '{}'",
                payment_id
            )));
        }
        let url = self.payment_url(payment_id)?;
        tracing::info!("Fetching payment {}", payment_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Payment lookup failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!("Payment {} not found at provider", payment_id);
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Payment lookup returned {}: {}",
                status, error_text
            )));
        }

        let payment: Payment = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse payment response: {}", e))
        })?;

        tracing::debug!("Payment {} status={}", payment.id, payment.status);
        Ok(Some(payment))
    }
}
