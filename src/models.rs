use crate::metadata::OnboardingMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// ============ Missions ============

/// Unlocked-mission marker. Variant order is the unlock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MissionRank {
    #[serde(rename = "mission-1", alias = "missao-1", alias = "missao_1", alias = "mission_1")]
    Mission1,
    #[serde(rename = "mission-2", alias = "missao-2", alias = "missao_2", alias = "mission_2")]
    Mission2,
    #[serde(rename = "mission-3", alias = "missao-3", alias = "missao_3", alias = "mission_3")]
    Mission3,
    #[serde(rename = "mission-4", alias = "missao-4", alias = "missao_4", alias = "mission_4")]
    Mission4,
    #[serde(rename = "mission-5", alias = "missao-5", alias = "missao_5", alias = "mission_5")]
    Mission5,
    #[serde(rename = "all", alias = "todas")]
    All,
}

impl MissionRank {
    pub const ALL_RANKS: [MissionRank; 6] = [
        MissionRank::Mission1,
        MissionRank::Mission2,
        MissionRank::Mission3,
        MissionRank::Mission4,
        MissionRank::Mission5,
        MissionRank::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionRank::Mission1 => "mission-1",
            MissionRank::Mission2 => "mission-2",
            MissionRank::Mission3 => "mission-3",
            MissionRank::Mission4 => "mission-4",
            MissionRank::Mission5 => "mission-5",
            MissionRank::All => "all",
        }
    }

    /// Mission number (1-5); `None` for `All`.
    pub fn number(&self) -> Option<u8> {
        match self {
            MissionRank::Mission1 => Some(1),
            MissionRank::Mission2 => Some(2),
            MissionRank::Mission3 => Some(3),
            MissionRank::Mission4 => Some(4),
            MissionRank::Mission5 => Some(5),
            MissionRank::All => None,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(MissionRank::Mission1),
            2 => Some(MissionRank::Mission2),
            3 => Some(MissionRank::Mission3),
            4 => Some(MissionRank::Mission4),
            5 => Some(MissionRank::Mission5),
            _ => None,
        }
    }

    /// Whether a brand holding `self` may access `mission`.
    pub fn unlocks(&self, mission: MissionRank) -> bool {
        *self >= mission
    }
}

impl fmt::Display for MissionRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionRank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if normalized == "all" || normalized == "todas" {
            return Ok(MissionRank::All);
        }
        let digits = normalized
            .strip_prefix("mission-")
            .or_else(|| normalized.strip_prefix("missao-"))
            .unwrap_or(normalized.as_str());
        digits
            .parse::<u8>()
            .ok()
            .and_then(MissionRank::from_number)
            .ok_or_else(|| format!("Unknown mission '{}'", s))
    }
}

// ============ Levels ============

/// Level label for an accumulated xp total.
pub fn level_for_xp(xp: i64) -> &'static str {
    match xp {
        i64::MIN..=99 => "Iniciante",
        100..=299 => "Estrategista",
        300..=599 => "Especialista",
        _ => "Mestre da Marca",
    }
}

// ============ Database Models ============

/// Raw `brands` row. Blob columns are text and are parsed leniently.
#[derive(Debug, Clone, FromRow)]
pub struct BrandRow {
    pub id_unico: String,
    pub company_name: String,
    pub email: String,
    pub password_hash: String,
    pub diagnostic_score: Option<i32>,
    pub unlocked_mission: Option<String>,
    pub xp: i64,
    pub level: String,
    pub strategy: Option<String>,
    pub onboarding_metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The single denormalized brand entity, keyed by `idUnico`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandRecord {
    pub id_unico: String,
    pub company_name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub diagnostic_score: Option<i32>,
    pub unlocked_mission: Option<MissionRank>,
    pub xp: i64,
    pub level: String,
    #[serde(default)]
    pub strategy: Value,
    #[serde(default)]
    pub onboarding_metadata: OnboardingMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BrandRecord {
    /// Adds experience points and recomputes the level label.
    pub fn award_xp(&mut self, amount: i64) {
        self.xp = self.xp.saturating_add(amount.max(0));
        self.level = level_for_xp(self.xp).to_string();
    }

    pub fn strategy_storage_string(&self) -> Option<String> {
        match self.strategy {
            Value::Null => None,
            ref value => Some(value.to_string()),
        }
    }
}

impl From<BrandRow> for BrandRecord {
    fn from(row: BrandRow) -> Self {
        let unlocked_mission = row.unlocked_mission.as_deref().and_then(|raw| {
            raw.parse::<MissionRank>()
                .map_err(|e| {
                    tracing::warn!("Brand {} has unreadable unlocked mission: {}", row.id_unico, e)
                })
                .ok()
        });

        let strategy = row
            .strategy
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| {
                        tracing::warn!("Discarding malformed strategy for {}: {}", row.id_unico, e)
                    })
                    .ok()
            })
            .unwrap_or(Value::Null);

        let onboarding_metadata = row
            .onboarding_metadata
            .as_deref()
            .map(OnboardingMetadata::parse_lenient)
            .unwrap_or_default();

        Self {
            id_unico: row.id_unico,
            company_name: row.company_name,
            email: row.email,
            password_hash: row.password_hash,
            diagnostic_score: row.diagnostic_score,
            unlocked_mission,
            xp: row.xp,
            level: row.level,
            strategy,
            onboarding_metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields for a record created at registration time.
#[derive(Debug, Clone)]
pub struct NewBrand {
    pub company_name: String,
    pub email: String,
    pub password_hash: String,
    pub diagnostic_score: Option<i32>,
    pub onboarding_metadata: OnboardingMetadata,
}

// ============ API Request/Response Models ============

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub diagnostic_score: Option<i32>,
    pub onboarding_metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub brand: BrandRecord,
}

/// Dashboard save. Every field is optional; the unlocked mission is not patchable.
///
/// `strategy: null` clears the strategy; an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandPatch {
    pub company_name: Option<String>,
    pub diagnostic_score: Option<i32>,
    #[serde(default, deserialize_with = "present_value")]
    pub strategy: Option<Value>,
    pub onboarding_metadata: Option<Value>,
    pub award_xp: Option<i64>,
}

/// Keeps an explicit `null` as `Some(Value::Null)`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub id_unico: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub preference_id: String,
    pub checkout_url: String,
    pub product: MissionRank,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> BrandRow {
        BrandRow {
            id_unico: "abc".to_string(),
            company_name: "Padaria Aurora".to_string(),
            email: "contato@aurora.com.br".to_string(),
            password_hash: "hash".to_string(),
            diagnostic_score: Some(72),
            unlocked_mission: Some("mission-2".to_string()),
            xp: 150,
            level: "Estrategista".to_string(),
            strategy: Some(r#"{"tom":"acolhedor"}"#.to_string()),
            onboarding_metadata: Some(r#"{"segment":"alimentos"}"#.to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_rank_total_order() {
        for pair in MissionRank::ALL_RANKS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(MissionRank::All.unlocks(MissionRank::Mission5));
        assert!(!MissionRank::Mission2.unlocks(MissionRank::Mission3));
    }

    #[test]
    fn test_rank_parsing_spellings() {
        assert_eq!("mission-3".parse::<MissionRank>().unwrap(), MissionRank::Mission3);
        assert_eq!("missao_4".parse::<MissionRank>().unwrap(), MissionRank::Mission4);
        assert_eq!("2".parse::<MissionRank>().unwrap(), MissionRank::Mission2);
        assert_eq!("ALL".parse::<MissionRank>().unwrap(), MissionRank::All);
        assert!("mission-6".parse::<MissionRank>().is_err());
        assert!("".parse::<MissionRank>().is_err());
    }

    #[test]
    fn test_rank_serde_matches_display() {
        for rank in MissionRank::ALL_RANKS {
            let encoded = serde_json::to_value(rank).unwrap();
            assert_eq!(encoded, json!(rank.to_string()));
        }
        let decoded: MissionRank = serde_json::from_value(json!("missao-5")).unwrap();
        assert_eq!(decoded, MissionRank::Mission5);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_xp(0), "Iniciante");
        assert_eq!(level_for_xp(99), "Iniciante");
        assert_eq!(level_for_xp(100), "Estrategista");
        assert_eq!(level_for_xp(300), "Especialista");
        assert_eq!(level_for_xp(10_000), "Mestre da Marca");
    }

    #[test]
    fn test_award_xp_ignores_negative_amounts() {
        let mut record = BrandRecord::from(sample_row());
        record.award_xp(-500);
        assert_eq!(record.xp, 150);
        record.award_xp(200);
        assert_eq!(record.xp, 350);
        assert_eq!(record.level, "Especialista");
    }

    #[test]
    fn test_row_conversion_discards_malformed_blobs() {
        let mut row = sample_row();
        row.strategy = Some("{broken".to_string());
        row.onboarding_metadata = Some("42".to_string());
        row.unlocked_mission = Some("premium".to_string());

        let record = BrandRecord::from(row);
        assert_eq!(record.strategy, Value::Null);
        assert!(record.onboarding_metadata.is_empty());
        assert_eq!(record.unlocked_mission, None);
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent_strategy() {
        let cleared: BrandPatch = serde_json::from_value(json!({"strategy": null})).unwrap();
        assert_eq!(cleared.strategy, Some(Value::Null));

        let untouched: BrandPatch = serde_json::from_value(json!({"awardXp": 5})).unwrap();
        assert_eq!(untouched.strategy, None);

        let replaced: BrandPatch =
            serde_json::from_value(json!({"strategy": {"tom": "leve"}})).unwrap();
        assert_eq!(replaced.strategy, Some(json!({"tom": "leve"})));
    }

    #[test]
    fn test_serialized_record_hides_password_hash() {
        let record = BrandRecord::from(sample_row());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["idUnico"], "abc");
        assert_eq!(value["unlockedMission"], "mission-2");
        assert_eq!(value["onboardingMetadata"]["segment"], "alimentos");
        assert!(value.get("passwordHash").is_none());
    }
}
