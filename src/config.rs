use serde::Deserialize;

pub const DEFAULT_PAYMENT_API_BASE_URL: &str = "https://api.mercadopago.com";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Absent means the in-memory development store is used.
    pub database_url: Option<String>,
    pub port: u16,
    pub payment_access_token: Option<String>,
    pub payment_api_base_url: String,
    pub payment_webhook_secret: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub public_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: optional_var(&["DATABASE_URL", "DB_URL"])
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            payment_access_token: optional_var(&["PAYMENT_ACCESS_TOKEN", "MP_ACCESS_TOKEN"]),
            payment_api_base_url: http_url_or_default(
                "PAYMENT_API_BASE_URL",
                DEFAULT_PAYMENT_API_BASE_URL,
            )?,
            payment_webhook_secret: optional_var(&["PAYMENT_WEBHOOK_SECRET"]),
            llm_api_key: optional_var(&["LLM_API_KEY", "OPENAI_API_KEY"]),
            llm_base_url: http_url_or_default("LLM_BASE_URL", DEFAULT_LLM_BASE_URL)?,
            llm_model: optional_var(&["LLM_MODEL"])
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            public_base_url: http_url_or_default("PUBLIC_BASE_URL", "http://localhost:3000")?,
        };

        // Never log secret values, only whether they are present
        tracing::info!("Configuration loaded successfully");
        match config.database_url {
            Some(ref url) => tracing::debug!("Database URL: {}...", log_prefix(url)),
            None => tracing::warn!("No DATABASE_URL configured, using in-memory brand store"),
        }
        if config.payment_access_token.is_none() {
            tracing::warn!("No payment access token configured, checkout is disabled");
        }
        if config.payment_webhook_secret.is_none() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, webhook signatures will not be verified");
        }
        if config.llm_api_key.is_none() {
            tracing::warn!("No LLM API key configured, missions will return mock copy");
        }
        tracing::debug!("Payment API base URL: {}", config.payment_api_base_url);
        tracing::debug!("LLM base URL: {} (model {})", config.llm_base_url, config.llm_model);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Configuration with every external dependency disabled.
    pub fn local(port: u16) -> Self {
        Self {
            database_url: None,
            port,
            payment_access_token: None,
            payment_api_base_url: DEFAULT_PAYMENT_API_BASE_URL.to_string(),
            payment_webhook_secret: None,
            llm_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            public_base_url: format!("http://localhost:{}", port),
        }
    }

    pub fn webhook_url(&self) -> String {
        format!(
            "{}/api/v1/webhooks/payment",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// First non-empty value among `names`.
fn optional_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn http_url_or_default(name: &str, default: &str) -> anyhow::Result<String> {
    let Some(url) = optional_var(&[name]) else {
        return Ok(default.to_string());
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// First characters of a value, safe to log.
fn log_prefix(value: &str) -> String {
    value.chars().take(20).collect()
}
