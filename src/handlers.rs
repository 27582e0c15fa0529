use crate::auth;
use crate::config::Config;
use crate::db_storage::BrandStorage;
use crate::errors::{AppError, ResultExt};
use crate::llm_client::LlmClient;
use crate::metadata::{OnboardingMetadata, STATUS_PENDING};
use crate::missions::{CopyRequest, GeneratedCopy};
use crate::models::*;
use crate::payment_client::PaymentClient;
use crate::payment_models::{parse_product, BackUrls};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Brand record store (Postgres, or in-memory in development).
    pub storage: BrandStorage,
    /// Application configuration.
    pub config: Config,
    /// Payment provider client (absent when no access token is configured).
    pub payment_client: Option<PaymentClient>,
    /// Copy-generation client (absent means mock copy).
    pub llm_client: Option<LlmClient>,
    /// Recently reconciled `payment_id:status` pairs, to skip repeated deliveries.
    pub processed_payments: Cache<String, ()>,
}

impl AppState {
    /// Builds the state, creating clients for every configured integration.
    pub fn new(config: Config, storage: BrandStorage) -> Self {
        let payment_client = config.payment_access_token.as_ref().and_then(|token| {
            match PaymentClient::new(config.payment_api_base_url.clone(), token.clone()) {
                Ok(client) => {
                    tracing::info!(
                        "✓ Payment client initialized: {}",
                        config.payment_api_base_url
                    );
                    Some(client)
                }
                Err(e) => {
                    tracing::error!("Failed to initialize payment client: {}", e);
                    None
                }
            }
        });

        let llm_client = config.llm_api_key.as_ref().and_then(|key| {
            match LlmClient::new(
                config.llm_base_url.clone(),
                key.clone(),
                config.llm_model.clone(),
            ) {
                Ok(client) => {
                    tracing::info!("✓ LLM client initialized: {}", config.llm_base_url);
                    Some(client)
                }
                Err(e) => {
                    tracing::error!("Failed to initialize LLM client: {}", e);
                    None
                }
            }
        });

        // Provider retries arrive within minutes
        let processed_payments = Cache::builder()
            .time_to_live(Duration::from_secs(600))
            .max_capacity(10_000)
            .build();

        Self {
            storage,
            config,
            payment_client,
            llm_client,
            processed_payments,
        }
    }
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "brand-mission-api",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": state.storage.backend_name(),
            "payments": state.payment_client.is_some(),
            "llm": state.llm_client.is_some(),
        })),
    )
}

/// POST /api/v1/brands
///
/// Registers a brand. The record starts with no unlocked mission.
pub async fn register_brand(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<BrandRecord>), AppError> {
    tracing::info!("POST /brands - company: {:?}", request.company_name);

    if let Some(score) = request.diagnostic_score {
        validate_score(score)?;
    }
    let record = auth::register(&state.storage, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/brands/:id
pub async fn get_brand(
    State(state): State<Arc<AppState>>,
    Path(id_unico): Path<String>,
) -> Result<Json<BrandRecord>, AppError> {
    tracing::info!("GET /brands/{}", id_unico);

    let record = load_brand(&state.storage, &id_unico).await?;
    Ok(Json(record))
}

/// PATCH /api/v1/brands/:id
///
/// Dashboard save. The unlocked mission only moves through payments.
pub async fn patch_brand(
    State(state): State<Arc<AppState>>,
    Path(id_unico): Path<String>,
    Json(patch): Json<BrandPatch>,
) -> Result<Json<BrandRecord>, AppError> {
    tracing::info!("PATCH /brands/{}", id_unico);

    let (record, ()) = state
        .storage
        .update(&id_unico, |record| apply_patch(record, patch))
        .await
        .with_context(|| format!("saving dashboard for {}", id_unico))?
        .ok_or_else(|| AppError::NotFound(format!("Brand {} not found", id_unico)))?;

    Ok(Json(record))
}

/// Applies a dashboard patch in place. Validation happens before any field changes.
pub fn apply_patch(record: &mut BrandRecord, patch: BrandPatch) -> Result<(), AppError> {
    if let Some(ref name) = patch.company_name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest(
                "companyName cannot be empty".to_string(),
            ));
        }
    }
    if let Some(score) = patch.diagnostic_score {
        validate_score(score)?;
    }
    if let Some(xp) = patch.award_xp {
        if xp < 0 {
            return Err(AppError::BadRequest(
                "awardXp must not be negative".to_string(),
            ));
        }
    }

    if let Some(name) = patch.company_name {
        record.company_name = name.trim().to_string();
    }
    if let Some(score) = patch.diagnostic_score {
        record.diagnostic_score = Some(score);
    }
    if let Some(strategy) = patch.strategy {
        record.strategy = strategy;
    }
    if let Some(metadata) = patch.onboarding_metadata {
        record
            .onboarding_metadata
            .merge(OnboardingMetadata::from_value(metadata));
    }
    if let Some(xp) = patch.award_xp {
        record.award_xp(xp);
    }
    Ok(())
}

fn validate_score(score: i32) -> Result<(), AppError> {
    if !(0..=100).contains(&score) {
        return Err(AppError::BadRequest(
            "diagnosticScore must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

async fn load_brand(storage: &BrandStorage, id_unico: &str) -> Result<BrandRecord, AppError> {
    storage
        .get(id_unico)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Brand {} not found", id_unico)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    tracing::info!("POST /auth/login");

    let brand = auth::login(&state.storage, request).await?;
    Ok(Json(LoginResponse {
        success: true,
        brand,
    }))
}

/// POST /api/v1/checkout
///
/// Opens a checkout preference for a product and marks the checkout pending.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let id_unico = request
        .id_unico
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("idUnico is required".to_string()))?;
    let code = request
        .product
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("product is required".to_string()))?;
    let product = parse_product(code)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown product '{}'", code)))?;

    tracing::info!("POST /checkout - brand {} product {}", id_unico, product.rank);

    let record = load_brand(&state.storage, id_unico).await?;

    let client = state.payment_client.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Payments are not configured".to_string())
    })?;

    let preference = client
        .create_preference(
            &product,
            &record.id_unico,
            Some(record.email.as_str()),
            &BackUrls::for_base(&state.config.public_base_url),
            &state.config.webhook_url(),
        )
        .await?;

    let checkout_url = preference
        .checkout_url()
        .ok_or_else(|| {
            AppError::ExternalApiError("Preference response has no checkout URL".to_string())
        })?
        .to_string();

    // Re-read under lock: a webhook may have landed during the provider call
    state
        .storage
        .update(&record.id_unico, |stored| {
            stored.onboarding_metadata.record_checkout(
                &preference.id,
                product.rank.as_str(),
                STATUS_PENDING,
            );
            Ok(())
        })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Brand {} not found", record.id_unico)))?;

    Ok(Json(CheckoutResponse {
        preference_id: preference.id,
        checkout_url,
        product: product.rank,
    }))
}

/// POST /api/v1/missions/:mission/generate
///
/// Body: `{"stage": "...", ...payload}`. When `idUnico` is present the
/// brand must have the mission unlocked.
pub async fn generate_copy(
    State(state): State<Arc<AppState>>,
    Path(mission): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<GeneratedCopy>, AppError> {
    let mission: MissionRank = mission.parse().map_err(AppError::BadRequest)?;
    tracing::info!(
        "POST /missions/{}/generate - stage {:?}",
        mission,
        body.get("stage")
    );

    if !body.is_object() {
        return Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    }

    if let Some(id_unico) = body.get("idUnico").and_then(|v| v.as_str()) {
        let record = load_brand(&state.storage, id_unico).await?;
        let unlocked = record
            .unlocked_mission
            .is_some_and(|rank| rank.unlocks(mission));
        if !unlocked {
            return Err(AppError::Forbidden(format!(
                "{} is locked for this brand",
                mission
            )));
        }
    }

    let request = CopyRequest::parse(mission, body)?;
    let generated = request.generate(state.llm_client.as_ref()).await?;
    Ok(Json(generated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> BrandRecord {
        BrandRecord {
            id_unico: "b1".to_string(),
            company_name: "Lume".to_string(),
            email: "ana@lume.com".to_string(),
            password_hash: String::new(),
            diagnostic_score: None,
            unlocked_mission: Some(MissionRank::Mission1),
            xp: 90,
            level: level_for_xp(90).to_string(),
            strategy: Value::Null,
            onboarding_metadata: OnboardingMetadata::from_value(json!({"segment": "design"})),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_patch_updates_fields() {
        let mut brand = record();
        apply_patch(
            &mut brand,
            BrandPatch {
                company_name: Some(" Lume Studio ".to_string()),
                diagnostic_score: Some(80),
                strategy: Some(json!({"pilares": ["clareza"]})),
                onboarding_metadata: Some(json!({"stepsDone": 3})),
                award_xp: Some(20),
            },
        )
        .unwrap();

        assert_eq!(brand.company_name, "Lume Studio");
        assert_eq!(brand.diagnostic_score, Some(80));
        assert_eq!(brand.strategy["pilares"][0], "clareza");
        assert_eq!(brand.onboarding_metadata.get("segment"), Some(&json!("design")));
        assert_eq!(brand.onboarding_metadata.get("stepsDone"), Some(&json!(3)));
        assert_eq!(brand.xp, 110);
        assert_eq!(brand.level, "Estrategista");
        assert_eq!(brand.unlocked_mission, Some(MissionRank::Mission1));
    }

    #[test]
    fn test_apply_patch_null_strategy_clears_it() {
        let mut brand = record();
        brand.strategy = json!({"tom": "leve"});

        let patch: BrandPatch = serde_json::from_value(json!({"awardXp": 1})).unwrap();
        apply_patch(&mut brand, patch).unwrap();
        assert_eq!(brand.strategy, json!({"tom": "leve"}));

        let patch: BrandPatch = serde_json::from_value(json!({"strategy": null})).unwrap();
        apply_patch(&mut brand, patch).unwrap();
        assert_eq!(brand.strategy, Value::Null);
        assert_eq!(brand.strategy_storage_string(), None);
    }

    #[test]
    fn test_apply_patch_rejects_invalid_without_partial_writes() {
        let mut brand = record();
        let err = apply_patch(
            &mut brand,
            BrandPatch {
                company_name: Some("Outro".to_string()),
                award_xp: Some(-5),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(brand.company_name, "Lume");

        assert!(apply_patch(
            &mut brand,
            BrandPatch {
                diagnostic_score: Some(101),
                ..Default::default()
            }
        )
        .is_err());
    }
}
