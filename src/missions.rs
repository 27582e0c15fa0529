//! Copy-generation missions.
//!
//! Each mission exposes a few stages. A stage owns its payload, its prompt
//! template, the strict JSON schema the model must answer with, and the typed
//! output that answer is decoded into.

use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::models::MissionRank;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SYSTEM_PROMPT: &str = "Você é um estrategista de marca sênior que escreve em português do Brasil. \
Responda somente com JSON válido no formato solicitado, sem comentários.";

/// A generation stage: payload in, schema-constrained copy out.
pub trait CopyStage: Sized {
    type Output: DeserializeOwned + Serialize;

    const NAME: &'static str;

    fn validate(&self) -> Result<(), AppError>;
    fn prompt(&self) -> String;
    fn schema() -> Value;
    /// Deterministic copy returned when no model is configured.
    fn mock(&self) -> Self::Output;
}

#[derive(Debug, Serialize)]
pub struct GeneratedCopy {
    pub mission: u8,
    pub stage: &'static str,
    pub mock: bool,
    pub copy: Value,
}

/// Runs one stage against the model, or returns mock copy without one.
pub async fn run_stage<S: CopyStage>(
    llm: Option<&LlmClient>,
    mission: MissionRank,
    stage: &S,
) -> Result<GeneratedCopy, AppError> {
    stage.validate()?;
    let mission_number = mission.number().unwrap_or_default();

    let (output, mock) = match llm {
        Some(client) => {
            let raw = client
                .generate_json(
                    SYSTEM_PROMPT,
                    &stage.prompt(),
                    &format!("mission_{}_{}", mission_number, S::NAME),
                    &S::schema(),
                )
                .await?;
            let output: S::Output = serde_json::from_value(raw).map_err(|e| {
                AppError::ExternalApiError(format!(
                    "Generated copy for stage '{}' does not match its schema: {}",
                    S::NAME,
                    e
                ))
            })?;
            (output, false)
        }
        None => {
            tracing::debug!("No LLM configured, returning mock copy for '{}'", S::NAME);
            (stage.mock(), true)
        }
    };

    let copy = serde_json::to_value(&output)
        .map_err(|e| AppError::InternalError(format!("Failed to encode copy: {}", e)))?;

    Ok(GeneratedCopy {
        mission: mission_number,
        stage: S::NAME,
        mock,
        copy,
    })
}

fn non_blank(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(não informado)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_unspecified(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("(não informado)")
}

/// Strict-mode object schema: every property required, nothing extra.
fn object_schema(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn string_array() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

// ============ Mission 1: brand essence ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeInput {
    pub company_name: String,
    pub segment: String,
    pub audience: String,
    #[serde(default)]
    pub differentiators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeCopy {
    pub purpose: String,
    pub mission_statement: String,
    pub vision: String,
}

impl CopyStage for PurposeInput {
    type Output = PurposeCopy;
    const NAME: &'static str = "purpose";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.segment, "segment")?;
        non_blank(&self.audience, "audience")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nSegmento: {}\nPúblico: {}\nDiferenciais:\n{}\n\n\
             Escreva o propósito da marca (uma frase), a declaração de missão \
             (até duas frases) e a visão de futuro (uma frase).",
            self.company_name.trim(),
            self.segment.trim(),
            self.audience.trim(),
            bullet_list(&self.differentiators)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "purpose": {"type": "string"},
            "missionStatement": {"type": "string"},
            "vision": {"type": "string"},
        }))
    }

    fn mock(&self) -> PurposeCopy {
        PurposeCopy {
            purpose: format!(
                "{} existe para transformar a experiência de {}.",
                self.company_name.trim(),
                self.audience.trim()
            ),
            mission_statement: format!(
                "Entregar soluções de {} com cuidado e consistência.",
                self.segment.trim()
            ),
            vision: format!(
                "Ser a referência em {} para quem valoriza qualidade.",
                self.segment.trim()
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesInput {
    pub company_name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandValue {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesCopy {
    pub values: Vec<BrandValue>,
}

impl CopyStage for ValuesInput {
    type Output = ValuesCopy;
    const NAME: &'static str = "values";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        if self.traits.iter().all(|t| t.trim().is_empty()) {
            return Err(AppError::BadRequest(
                "traits must list at least one trait".to_string(),
            ));
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nPropósito: {}\nTraços de personalidade:\n{}\n\n\
             Defina de 3 a 5 valores de marca, cada um com nome curto e uma \
             descrição de uma frase que mostre o valor na prática.",
            self.company_name.trim(),
            or_unspecified(&self.purpose),
            bullet_list(&self.traits)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "values": {
                "type": "array",
                "items": object_schema(json!({
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                })),
            },
        }))
    }

    fn mock(&self) -> ValuesCopy {
        ValuesCopy {
            values: self
                .traits
                .iter()
                .filter(|t| !t.trim().is_empty())
                .take(5)
                .map(|t| BrandValue {
                    name: t.trim().to_string(),
                    description: format!(
                        "{} coloca '{}' em cada entrega.",
                        self.company_name.trim(),
                        t.trim()
                    ),
                })
                .collect(),
        }
    }
}

// ============ Mission 2: positioning ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaInput {
    pub company_name: String,
    pub segment: String,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaCopy {
    pub name: String,
    pub age_range: String,
    pub summary: String,
    pub pains: Vec<String>,
    pub desires: Vec<String>,
    pub objections: Vec<String>,
}

impl CopyStage for PersonaInput {
    type Output = PersonaCopy;
    const NAME: &'static str = "persona";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.segment, "segment")?;
        non_blank(&self.audience, "audience")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nSegmento: {}\nPúblico descrito pelo cliente: {}\n\n\
             Crie a persona principal: nome fictício, faixa etária, um resumo \
             de duas frases e três dores, três desejos e três objeções de compra.",
            self.company_name.trim(),
            self.segment.trim(),
            self.audience.trim()
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "name": {"type": "string"},
            "ageRange": {"type": "string"},
            "summary": {"type": "string"},
            "pains": string_array(),
            "desires": string_array(),
            "objections": string_array(),
        }))
    }

    fn mock(&self) -> PersonaCopy {
        PersonaCopy {
            name: "Marina".to_string(),
            age_range: "28-40".to_string(),
            summary: format!(
                "Faz parte de {} e procura {} confiável.",
                self.audience.trim(),
                self.segment.trim()
            ),
            pains: vec!["Falta de tempo".to_string()],
            desires: vec!["Resultados previsíveis".to_string()],
            objections: vec!["Preço".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositioningInput {
    pub company_name: String,
    pub segment: String,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub differentiators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositioningCopy {
    pub statement: String,
    pub tagline: String,
    pub proof_points: Vec<String>,
}

impl CopyStage for PositioningInput {
    type Output = PositioningCopy;
    const NAME: &'static str = "positioning";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.segment, "segment")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nSegmento: {}\nConcorrentes:\n{}\nDiferenciais:\n{}\n\n\
             Escreva a declaração de posicionamento (para quem, o que entrega, \
             por que é diferente), um slogan de até oito palavras e três provas \
             que sustentam o posicionamento.",
            self.company_name.trim(),
            self.segment.trim(),
            bullet_list(&self.competitors),
            bullet_list(&self.differentiators)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "statement": {"type": "string"},
            "tagline": {"type": "string"},
            "proofPoints": string_array(),
        }))
    }

    fn mock(&self) -> PositioningCopy {
        PositioningCopy {
            statement: format!(
                "Para quem busca {}, {} é a escolha que une clareza e resultado.",
                self.segment.trim(),
                self.company_name.trim()
            ),
            tagline: format!("{}: clareza que vende", self.company_name.trim()),
            proof_points: self
                .differentiators
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }
}

// ============ Mission 3: messaging ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlinesInput {
    pub company_name: String,
    pub offer: String,
    pub audience: String,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlinesCopy {
    pub headlines: Vec<String>,
    pub subheadline: String,
    pub call_to_action: String,
}

impl CopyStage for HeadlinesInput {
    type Output = HeadlinesCopy;
    const NAME: &'static str = "headlines";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.offer, "offer")?;
        non_blank(&self.audience, "audience")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nOferta: {}\nPúblico: {}\nTom de voz: {}\n\n\
             Escreva cinco headlines para a página de vendas, um subtítulo de \
             apoio e uma chamada para ação curta.",
            self.company_name.trim(),
            self.offer.trim(),
            self.audience.trim(),
            or_unspecified(&self.tone)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "headlines": string_array(),
            "subheadline": {"type": "string"},
            "callToAction": {"type": "string"},
        }))
    }

    fn mock(&self) -> HeadlinesCopy {
        HeadlinesCopy {
            headlines: vec![
                format!("{} para {}", self.offer.trim(), self.audience.trim()),
                format!("Conheça {}", self.company_name.trim()),
            ],
            subheadline: format!("{} sem complicação.", self.offer.trim()),
            call_to_action: "Quero começar".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BioInput {
    pub company_name: String,
    #[serde(default)]
    pub positioning: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BioCopy {
    pub short_bio: String,
    pub long_bio: String,
}

impl CopyStage for BioInput {
    type Output = BioCopy;
    const NAME: &'static str = "bio";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nPosicionamento: {}\nTom de voz: {}\n\n\
             Escreva uma bio curta para redes sociais (até 150 caracteres) e \
             uma bio longa para o site (um parágrafo).",
            self.company_name.trim(),
            or_unspecified(&self.positioning),
            or_unspecified(&self.tone)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "shortBio": {"type": "string"},
            "longBio": {"type": "string"},
        }))
    }

    fn mock(&self) -> BioCopy {
        BioCopy {
            short_bio: format!("{} | estratégia de marca", self.company_name.trim()),
            long_bio: format!(
                "{} ajuda clientes a crescer com {}.",
                self.company_name.trim(),
                or_unspecified(&self.positioning)
            ),
        }
    }
}

// ============ Mission 4: verbal identity ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInput {
    pub company_name: String,
    pub personality: Vec<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCopy {
    pub voice_traits: Vec<String>,
    pub do_say: Vec<String>,
    pub dont_say: Vec<String>,
    pub sample_paragraph: String,
}

impl CopyStage for VoiceInput {
    type Output = VoiceCopy;
    const NAME: &'static str = "voice";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        if self.personality.iter().all(|p| p.trim().is_empty()) {
            return Err(AppError::BadRequest(
                "personality must list at least one trait".to_string(),
            ));
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nPúblico: {}\nPersonalidade:\n{}\n\n\
             Monte um guia de tom de voz: de 3 a 5 traços de voz, expressões \
             que a marca usa, expressões que ela evita e um parágrafo de exemplo \
             escrito nesse tom.",
            self.company_name.trim(),
            or_unspecified(&self.audience),
            bullet_list(&self.personality)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "voiceTraits": string_array(),
            "doSay": string_array(),
            "dontSay": string_array(),
            "sampleParagraph": {"type": "string"},
        }))
    }

    fn mock(&self) -> VoiceCopy {
        let traits: Vec<String> = self
            .personality
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .take(5)
            .map(str::to_string)
            .collect();
        VoiceCopy {
            sample_paragraph: format!(
                "Na {}, a gente fala de um jeito {}.",
                self.company_name.trim(),
                traits.join(", ")
            ),
            voice_traits: traits,
            do_say: vec!["a gente".to_string(), "vamos juntos".to_string()],
            dont_say: vec!["prezado cliente".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaglineInput {
    pub company_name: String,
    pub promise: String,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaglineCopy {
    pub taglines: Vec<String>,
    pub manifesto: String,
}

impl CopyStage for TaglineInput {
    type Output = TaglineCopy;
    const NAME: &'static str = "tagline";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.promise, "promise")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nPromessa da marca: {}\nTom de voz: {}\n\n\
             Sugira cinco slogans de até seis palavras e um manifesto curto \
             (até quatro frases).",
            self.company_name.trim(),
            self.promise.trim(),
            or_unspecified(&self.tone)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "taglines": string_array(),
            "manifesto": {"type": "string"},
        }))
    }

    fn mock(&self) -> TaglineCopy {
        TaglineCopy {
            taglines: vec![self.promise.trim().to_string()],
            manifesto: format!(
                "{} existe para {}.",
                self.company_name.trim(),
                self.promise.trim()
            ),
        }
    }
}

// ============ Mission 5: content plan ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarsInput {
    pub company_name: String,
    pub audience: String,
    #[serde(default)]
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPillar {
    pub name: String,
    pub description: String,
    pub example_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PillarsCopy {
    pub pillars: Vec<ContentPillar>,
}

impl CopyStage for PillarsInput {
    type Output = PillarsCopy;
    const NAME: &'static str = "pillars";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        non_blank(&self.audience, "audience")
    }

    fn prompt(&self) -> String {
        format!(
            "Empresa: {}\nPúblico: {}\nObjetivos:\n{}\n\n\
             Defina de 3 a 4 pilares de conteúdo, cada um com nome, uma frase \
             de descrição e três ideias de pauta.",
            self.company_name.trim(),
            self.audience.trim(),
            bullet_list(&self.goals)
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "pillars": {
                "type": "array",
                "items": object_schema(json!({
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "exampleTopics": string_array(),
                })),
            },
        }))
    }

    fn mock(&self) -> PillarsCopy {
        let pillar = |name: &str, description: String| ContentPillar {
            name: name.to_string(),
            description,
            example_topics: vec![format!("{} na prática", name)],
        };
        PillarsCopy {
            pillars: vec![
                pillar(
                    "Bastidores",
                    format!("Como a {} trabalha no dia a dia.", self.company_name.trim()),
                ),
                pillar(
                    "Educação",
                    format!("Dicas úteis para {}.", self.audience.trim()),
                ),
                pillar("Prova social", "Resultados de clientes reais.".to_string()),
            ],
        }
    }
}

pub const DEFAULT_CALENDAR_WEEKS: u32 = 4;
pub const MAX_CALENDAR_WEEKS: u32 = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInput {
    pub company_name: String,
    pub pillars: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub weeks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedPost {
    pub week: u32,
    pub channel: String,
    pub pillar: String,
    pub title: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCopy {
    pub posts: Vec<PlannedPost>,
}

impl CalendarInput {
    fn weeks(&self) -> u32 {
        self.weeks.unwrap_or(DEFAULT_CALENDAR_WEEKS)
    }

    fn pillar_names(&self) -> Vec<&str> {
        self.pillars
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

impl CopyStage for CalendarInput {
    type Output = CalendarCopy;
    const NAME: &'static str = "calendar";

    fn validate(&self) -> Result<(), AppError> {
        non_blank(&self.company_name, "companyName")?;
        if self.pillar_names().is_empty() {
            return Err(AppError::BadRequest(
                "pillars must list at least one pillar".to_string(),
            ));
        }
        if !(1..=MAX_CALENDAR_WEEKS).contains(&self.weeks()) {
            return Err(AppError::BadRequest(format!(
                "weeks must be between 1 and {}",
                MAX_CALENDAR_WEEKS
            )));
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        let channels = if self.channels.is_empty() {
            vec!["Instagram".to_string()]
        } else {
            self.channels.clone()
        };
        format!(
            "Empresa: {}\nPilares de conteúdo:\n{}\nCanais:\n{}\n\n\
             Monte um calendário editorial de {} semanas com duas publicações \
             por semana. Para cada post informe semana, canal, pilar, título e \
             legenda.",
            self.company_name.trim(),
            bullet_list(&self.pillars),
            bullet_list(&channels),
            self.weeks()
        )
    }

    fn schema() -> Value {
        object_schema(json!({
            "posts": {
                "type": "array",
                "items": object_schema(json!({
                    "week": {"type": "integer"},
                    "channel": {"type": "string"},
                    "pillar": {"type": "string"},
                    "title": {"type": "string"},
                    "caption": {"type": "string"},
                })),
            },
        }))
    }

    fn mock(&self) -> CalendarCopy {
        let pillars = self.pillar_names();
        let channel = self
            .channels
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .unwrap_or("Instagram");
        let posts = (1..=self.weeks())
            .zip(pillars.iter().cycle())
            .map(|(week, pillar)| PlannedPost {
                week,
                channel: channel.to_string(),
                pillar: pillar.to_string(),
                title: format!("{}: semana {}", pillar, week),
                caption: format!("{} | {}", self.company_name.trim(), pillar),
            })
            .collect();
        CalendarCopy { posts }
    }
}

// ============ Dispatch ============

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum BrandEssenceStage {
    Purpose(PurposeInput),
    Values(ValuesInput),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PositioningStage {
    Persona(PersonaInput),
    Positioning(PositioningInput),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum MessagingStage {
    Headlines(HeadlinesInput),
    Bio(BioInput),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum VerbalIdentityStage {
    Voice(VoiceInput),
    Tagline(TaglineInput),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ContentPlanStage {
    Pillars(PillarsInput),
    Calendar(CalendarInput),
}

/// A parsed generation request for one of the copy missions.
#[derive(Debug, Clone)]
pub enum CopyRequest {
    BrandEssence(BrandEssenceStage),
    Positioning(PositioningStage),
    Messaging(MessagingStage),
    VerbalIdentity(VerbalIdentityStage),
    ContentPlan(ContentPlanStage),
}

impl CopyRequest {
    pub fn parse(mission: MissionRank, body: Value) -> Result<Self, AppError> {
        fn decode<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
            serde_json::from_value(body)
                .map_err(|e| AppError::BadRequest(format!("Invalid stage payload: {}", e)))
        }

        match mission {
            MissionRank::Mission1 => Ok(CopyRequest::BrandEssence(decode(body)?)),
            MissionRank::Mission2 => Ok(CopyRequest::Positioning(decode(body)?)),
            MissionRank::Mission3 => Ok(CopyRequest::Messaging(decode(body)?)),
            MissionRank::Mission4 => Ok(CopyRequest::VerbalIdentity(decode(body)?)),
            MissionRank::Mission5 => Ok(CopyRequest::ContentPlan(decode(body)?)),
            MissionRank::All => Err(AppError::BadRequest(
                "Copy is generated per mission, not for 'all'".to_string(),
            )),
        }
    }

    pub fn mission(&self) -> MissionRank {
        match self {
            CopyRequest::BrandEssence(_) => MissionRank::Mission1,
            CopyRequest::Positioning(_) => MissionRank::Mission2,
            CopyRequest::Messaging(_) => MissionRank::Mission3,
            CopyRequest::VerbalIdentity(_) => MissionRank::Mission4,
            CopyRequest::ContentPlan(_) => MissionRank::Mission5,
        }
    }

    pub async fn generate(&self, llm: Option<&LlmClient>) -> Result<GeneratedCopy, AppError> {
        let mission = self.mission();
        match self {
            CopyRequest::BrandEssence(BrandEssenceStage::Purpose(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::BrandEssence(BrandEssenceStage::Values(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::Positioning(PositioningStage::Persona(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::Positioning(PositioningStage::Positioning(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::Messaging(MessagingStage::Headlines(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::Messaging(MessagingStage::Bio(s)) => run_stage(llm, mission, s).await,
            CopyRequest::VerbalIdentity(VerbalIdentityStage::Voice(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::VerbalIdentity(VerbalIdentityStage::Tagline(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::ContentPlan(ContentPlanStage::Pillars(s)) => {
                run_stage(llm, mission, s).await
            }
            CopyRequest::ContentPlan(ContentPlanStage::Calendar(s)) => {
                run_stage(llm, mission, s).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_for_mission() {
        let request = CopyRequest::parse(
            MissionRank::Mission2,
            json!({"stage": "persona", "companyName": "Lume", "segment": "design", "audience": "PMEs"}),
        )
        .unwrap();
        assert!(matches!(
            request,
            CopyRequest::Positioning(PositioningStage::Persona(_))
        ));
        assert_eq!(request.mission(), MissionRank::Mission2);
    }

    #[test]
    fn test_parse_rejects_stage_from_other_mission() {
        let err = CopyRequest::parse(
            MissionRank::Mission1,
            json!({"stage": "bio", "companyName": "Lume"}),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_parse_rejects_missing_fields_and_missions() {
        assert!(CopyRequest::parse(
            MissionRank::Mission3,
            json!({"stage": "headlines", "companyName": "Lume"})
        )
        .is_err());
        assert!(CopyRequest::parse(MissionRank::Mission3, json!({"companyName": "Lume"})).is_err());
        assert!(CopyRequest::parse(
            MissionRank::Mission4,
            json!({"stage": "bio", "companyName": "Lume"})
        )
        .is_err());
        assert!(CopyRequest::parse(
            MissionRank::All,
            json!({"stage": "voice", "companyName": "Lume", "personality": ["leve"]})
        )
        .is_err());
    }

    #[test]
    fn test_parse_later_missions() {
        let voice = CopyRequest::parse(
            MissionRank::Mission4,
            json!({"stage": "voice", "companyName": "Lume", "personality": ["leve"]}),
        )
        .unwrap();
        assert!(matches!(
            voice,
            CopyRequest::VerbalIdentity(VerbalIdentityStage::Voice(_))
        ));
        assert_eq!(voice.mission(), MissionRank::Mission4);

        let calendar = CopyRequest::parse(
            MissionRank::Mission5,
            json!({"stage": "calendar", "companyName": "Lume", "pillars": ["Bastidores"]}),
        )
        .unwrap();
        assert_eq!(calendar.mission(), MissionRank::Mission5);
    }

    #[tokio::test]
    async fn test_mock_calendar_cycles_pillars() {
        let request = CopyRequest::parse(
            MissionRank::Mission5,
            json!({
                "stage": "calendar",
                "companyName": "Lume",
                "pillars": ["Bastidores", " ", "Educação"],
                "channels": ["LinkedIn"],
                "weeks": 3
            }),
        )
        .unwrap();
        let generated = request.generate(None).await.unwrap();
        assert!(generated.mock);
        assert_eq!(generated.mission, 5);
        assert_eq!(generated.stage, "calendar");

        let posts = generated.copy["posts"].as_array().unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0]["pillar"], "Bastidores");
        assert_eq!(posts[1]["pillar"], "Educação");
        assert_eq!(posts[2]["pillar"], "Bastidores");
        assert_eq!(posts[2]["week"], 3);
        assert_eq!(posts[0]["channel"], "LinkedIn");
    }

    #[tokio::test]
    async fn test_calendar_week_range_is_validated() {
        let request = CopyRequest::parse(
            MissionRank::Mission5,
            json!({"stage": "calendar", "companyName": "Lume", "pillars": ["A"], "weeks": 12}),
        )
        .unwrap();
        assert!(matches!(
            request.generate(None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_voice_guide() {
        let request = CopyRequest::parse(
            MissionRank::Mission4,
            json!({"stage": "voice", "companyName": "Lume", "personality": ["leve", "direta"]}),
        )
        .unwrap();
        let generated = request.generate(None).await.unwrap();
        assert_eq!(generated.mission, 4);
        assert_eq!(generated.copy["voiceTraits"], json!(["leve", "direta"]));
        assert!(generated.copy["sampleParagraph"]
            .as_str()
            .unwrap()
            .contains("Lume"));
    }

    #[test]
    fn test_later_mission_schemas_are_strict() {
        let pillars = PillarsInput::schema();
        let item = &pillars["properties"]["pillars"]["items"];
        assert_eq!(item["additionalProperties"], false);
        assert!(item["required"]
            .as_array()
            .unwrap()
            .contains(&json!("exampleTopics")));

        let tagline = TaglineInput::schema();
        let required = tagline["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&json!("manifesto")));
    }

    #[test]
    fn test_schemas_are_strict() {
        let schema = PersonaInput::schema();
        assert_eq!(schema["additionalProperties"], false);
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert!(required.contains(&json!("ageRange")));

        let values = ValuesInput::schema();
        assert_eq!(values["properties"]["values"]["items"]["additionalProperties"], false);
    }

    #[test]
    fn test_prompt_includes_payload() {
        let input = PositioningInput {
            company_name: "Lume".to_string(),
            segment: "design".to_string(),
            competitors: vec!["Estúdio X".to_string()],
            differentiators: vec![],
        };
        let prompt = input.prompt();
        assert!(prompt.contains("Lume"));
        assert!(prompt.contains("- Estúdio X"));
        assert!(prompt.contains("(não informado)"));
    }

    #[tokio::test]
    async fn test_mock_generation_without_llm() {
        let request = CopyRequest::parse(
            MissionRank::Mission1,
            json!({"stage": "values", "companyName": "Lume", "traits": ["ousadia", " ", "cuidado"]}),
        )
        .unwrap();
        let generated = request.generate(None).await.unwrap();
        assert!(generated.mock);
        assert_eq!(generated.mission, 1);
        assert_eq!(generated.stage, "values");
        assert_eq!(generated.copy["values"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_required_field_is_rejected() {
        let request = CopyRequest::parse(
            MissionRank::Mission3,
            json!({"stage": "bio", "companyName": "   "}),
        )
        .unwrap();
        assert!(matches!(
            request.generate(None).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
