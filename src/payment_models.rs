use crate::models::MissionRank;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Purchasable product. The product code is the mission rank it unlocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Product {
    pub rank: MissionRank,
    pub title: &'static str,
    pub unit_price: f64,
}

pub const CURRENCY: &str = "BRL";

pub fn product_for(rank: MissionRank) -> Product {
    let (title, unit_price) = match rank {
        MissionRank::Mission1 => ("Missão 1 - Essência da Marca", 47.0),
        MissionRank::Mission2 => ("Missão 2 - Posicionamento", 97.0),
        MissionRank::Mission3 => ("Missão 3 - Mensagem", 97.0),
        MissionRank::Mission4 => ("Missão 4 - Identidade Verbal", 97.0),
        MissionRank::Mission5 => ("Missão 5 - Plano de Conteúdo", 97.0),
        MissionRank::All => ("Jornada Completa - Todas as Missões", 297.0),
    };
    Product {
        rank,
        title,
        unit_price,
    }
}

/// Parses a client-supplied product code.
pub fn parse_product(code: &str) -> Option<Product> {
    code.parse::<MissionRank>().ok().map(product_for)
}

#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

impl BackUrls {
    pub fn for_base(public_base_url: &str) -> Self {
        let base = public_base_url.trim_end_matches('/');
        Self {
            success: format!("{}/checkout/sucesso", base),
            failure: format!("{}/checkout/falha", base),
            pending: format!("{}/checkout/pendente", base),
        }
    }
}

/// Checkout session returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Preference {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
}

impl Preference {
    pub fn checkout_url(&self) -> Option<&str> {
        self.init_point
            .as_deref()
            .or(self.sandbox_init_point.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentMetadata {
    pub id_unico: Option<String>,
    pub product_code: Option<String>,
}

/// Payment resource as returned by the provider lookup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: PaymentMetadata,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
}

impl Payment {
    pub fn is_approved(&self) -> bool {
        self.status == crate::metadata::STATUS_APPROVED
    }

    /// Brand key: external reference first, metadata second.
    pub fn id_unico(&self) -> Option<&str> {
        self.external_reference
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.metadata.id_unico.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn product(&self) -> Option<MissionRank> {
        self.metadata
            .product_code
            .as_deref()
            .and_then(|code| code.parse().ok())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn lenient_metadata<'de, D>(deserializer: D) -> Result<PaymentMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
