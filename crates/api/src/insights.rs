//! AI nutrition insights via the OpenAI chat-completions API

use std::time::Duration;

use heartbalance_shared::health::LdlClass;
use heartbalance_shared::{ColesterolRecord, MealLog};
use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::Config;
use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 2;

const SYSTEM_PROMPT: &str = "Você é um nutricionista do aplicativo HeartBalance, focado em saúde \
cardiovascular e controle do colesterol. Responda em português do Brasil, de forma breve, \
prática e encorajadora. Não faça diagnósticos; recomende procurar um médico quando houver \
valores preocupantes.";

const MEAL_ANALYSIS_PROMPT: &str = "Estime os dados nutricionais da refeição descrita pelo usuário. \
Responda somente com um objeto JSON no formato \
{\"calories\": <inteiro>, \"is_healthy\": <true|false>, \"comment\": \"<uma frase>\"}. \
Considere saudável uma refeição pobre em gordura saturada e rica em fibras.";

#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("OpenAI API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("OpenAI request failed: {0}")]
    Transport(String),
    #[error("Invalid OpenAI response: {0}")]
    InvalidResponse(String),
}

impl InsightsError {
    fn is_transient(&self) -> bool {
        match self {
            InsightsError::Transport(_) => true,
            InsightsError::Api { status, .. } => *status == 429 || *status >= 500,
            InsightsError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for InsightsError {
    fn from(err: reqwest::Error) -> Self {
        InsightsError::Transport(err.to_string())
    }
}

impl From<InsightsError> for ApiError {
    fn from(err: InsightsError) -> Self {
        tracing::error!(error = %err, "Insight generation failed");
        ApiError::Upstream(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Data the nutrition insight is generated from
#[derive(Debug, Clone, Default)]
pub struct NutritionContext {
    pub nome: Option<String>,
    pub meta_kcal: Option<f64>,
    pub meals: Vec<MealLog>,
    pub latest_cholesterol: Option<ColesterolRecord>,
}

/// Estimated nutrition for a described meal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealAnalysis {
    pub calories: i32,
    pub is_healthy: bool,
    #[serde(default)]
    pub comment: String,
}

/// Build the user prompt for the weekly nutrition insight
pub fn nutrition_prompt(ctx: &NutritionContext) -> String {
    let mut prompt = String::new();

    if let Some(nome) = ctx.nome.as_deref().filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("Usuário: {}.\n", nome));
    }
    if let Some(meta) = ctx.meta_kcal {
        prompt.push_str(&format!("Gasto energético diário estimado: {:.0} kcal.\n", meta));
    }

    match &ctx.latest_cholesterol {
        Some(exam) => prompt.push_str(&format!(
            "Último exame ({}): LDL {:.0} mg/dL ({}), HDL {:.0}, colesterol total {:.0}, triglicerídeos {:.0}.\n",
            exam.data_exame,
            exam.ldl,
            LdlClass::classify(exam.ldl),
            exam.hdl,
            exam.total,
            exam.triglicerides
        )),
        None => prompt.push_str("Nenhum exame de colesterol registrado.\n"),
    }

    if ctx.meals.is_empty() {
        prompt.push_str("Nenhuma refeição registrada nos últimos 7 dias.\n");
    } else {
        let healthy = ctx.meals.iter().filter(|m| m.is_healthy).count();
        prompt.push_str(&format!(
            "Refeições dos últimos 7 dias ({} de {} marcadas como saudáveis):\n",
            healthy,
            ctx.meals.len()
        ));
        for meal in &ctx.meals {
            let kcal = meal
                .calories
                .map(|c| format!("{} kcal", c))
                .unwrap_or_else(|| "kcal não informadas".to_string());
            prompt.push_str(&format!("- {}: {} ({})\n", meal.date, meal.description, kcal));
        }
    }

    prompt.push_str("Dê até 3 recomendações práticas para a próxima semana.");
    prompt
}

/// Parse the model's JSON meal estimate, tolerating markdown code fences
pub fn parse_meal_analysis(raw: &str) -> Result<MealAnalysis, InsightsError> {
    let trimmed = raw.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let analysis: MealAnalysis = serde_json::from_str(json)
        .map_err(|e| InsightsError::InvalidResponse(format!("meal analysis: {}", e)))?;

    if analysis.calories < 0 {
        return Err(InsightsError::InvalidResponse(
            "meal analysis: negative calories".to_string(),
        ));
    }

    Ok(analysis)
}

/// OpenAI chat-completions client
#[derive(Clone)]
pub struct InsightsClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl InsightsClient {
    pub fn new(api_key: String, model: String, api_base: String) -> Result<Self, InsightsError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InsightsError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model,
            api_base,
        })
    }

    /// Client from configuration; `None` when no API key is set
    pub fn from_config(config: &Config) -> Option<Result<Self, InsightsError>> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self::new(
            api_key,
            config.openai_model.clone(),
            config.openai_api_base.clone(),
        ))
    }

    /// Generate the weekly nutrition insight
    pub async fn nutrition_insight(&self, ctx: &NutritionContext) -> Result<String, InsightsError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(nutrition_prompt(ctx)),
        ];
        self.complete(&messages, false).await
    }

    /// Estimate calories and healthiness of a described meal
    pub async fn analyze_meal(&self, description: &str) -> Result<MealAnalysis, InsightsError> {
        let messages = [
            ChatMessage::system(MEAL_ANALYSIS_PROMPT),
            ChatMessage::user(description),
        ];
        let raw = self.complete(&messages, true).await?;
        parse_meal_analysis(&raw)
    }

    async fn complete(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String, InsightsError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.4,
            response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
        };

        let url = url.as_str();
        let body = &body;
        let http = &self.http;
        let api_key = self.api_key.as_str();

        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(4))
            .take(MAX_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, move || async move {
            let result = send_chat(http, url, api_key, body).await;
            match &result {
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "Transient OpenAI error - will retry");
                    Err(result)
                }
                _ => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }
}

async fn send_chat(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &ChatRequest<'_>,
) -> Result<String, InsightsError> {
    let response = http.post(url).bearer_auth(api_key).json(body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(InsightsError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|e| InsightsError::InvalidResponse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| InsightsError::InvalidResponse("empty completion".to_string()))
}
