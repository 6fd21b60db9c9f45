//! HTTP text-generation providers.
//!
//! Gemini models go through Google's native `generateContent` API; every
//! other model name is sent to an OpenAI-compatible chat-completions
//! endpoint (OpenAI itself, or any proxy given as base URL).

use crate::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Model used when `ENVMON_LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Wire format, inferred from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Gemini,
    OpenAi,
}

impl ApiFormat {
    pub fn from_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("gemini-") {
            Self::Gemini
        } else {
            Self::OpenAi
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_BASE_URL,
            Self::OpenAi => OPENAI_BASE_URL,
        }
    }
}

// ── Gemini generateContent wire types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ── OpenAI-compatible wire types ──

#[derive(Serialize)]
struct OaiRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Provider ──

/// Text-generation provider over HTTP.
pub struct HttpProvider {
    format: ApiFormat,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        Self::with_client(model, api_key, base_url, reqwest::Client::new())
    }

    /// Same as [`HttpProvider::new`], with a whole-request deadline.
    pub fn with_timeout(
        model: String,
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build http client with timeout, using defaults");
                reqwest::Client::new()
            }
        };
        Self::with_client(model, api_key, base_url, client)
    }

    fn with_client(
        model: String,
        api_key: String,
        base_url: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        let format = ApiFormat::from_model(&model);
        let base = base_url.unwrap_or_else(|| format.default_base_url().to_owned());
        Self {
            format,
            model,
            client,
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        match self.format {
            ApiFormat::Gemini => format!("{}/models/{}:generateContent", self.base_url, self.model),
            ApiFormat::OpenAi => format!("{}/chat/completions", self.base_url),
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<R, LlmError> {
        let resp = builder
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::debug!(model = %self.model, %status, "text generation request rejected");
            return Err(check_error(status, text));
        }

        resp.json()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("unreadable response: {e}")))
    }

    async fn complete_gemini(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| GeminiContent { role: None, parts: vec![GeminiPart { text: &m.content }] });
        let contents = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m: &ChatMessage| GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: &m.content }],
            })
            .collect();
        let body = GeminiRequest {
            system_instruction: system,
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let builder = self.client.post(self.endpoint()).header("x-goog-api-key", &self.api_key);
        let api: GeminiResponse = self.post(builder, &body).await?;

        let content: String = api
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let (input_tokens, output_tokens) = api
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or((0, 0));

        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }

    async fn complete_openai(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = OaiRequest {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| OaiMessage { role: role_str(m.role), content: &m.content })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let builder = self.client.post(self.endpoint()).bearer_auth(&self.api_key);
        let api: OaiResponse = self.post(builder, &body).await?;

        let content = api
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let (input_tokens, output_tokens) = api
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
    }
}

/// 429 is rate limiting; 401/403 mean the key is wrong.
fn check_error(status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        429 => LlmError::RateLimited,
        401 | 403 => LlmError::Unavailable(format!("credential rejected ({status})")),
        _ => LlmError::RequestFailed(format!("{status}: {body}")),
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.format {
            ApiFormat::Gemini => "gemini",
            ApiFormat::OpenAi => "openai-compatible",
        }
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        match self.format {
            ApiFormat::Gemini => Box::pin(self.complete_gemini(request)),
            ApiFormat::OpenAi => Box::pin(self.complete_openai(request)),
        }
    }
}

/// Build a provider from environment variables.
/// Reads `ENVMON_LLM_API_KEY` (falling back to `API_KEY`), optionally
/// `ENVMON_LLM_MODEL` and `ENVMON_LLM_BASE_URL`.
/// Returns `None` if no API key is set.
pub fn from_env(timeout: Duration) -> Option<HttpProvider> {
    let api_key = std::env::var("ENVMON_LLM_API_KEY")
        .or_else(|_| std::env::var("API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())?;
    let model = std::env::var("ENVMON_LLM_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
    let base_url = std::env::var("ENVMON_LLM_BASE_URL").ok().filter(|u| !u.trim().is_empty());
    tracing::info!(%model, "text generation provider configured");
    Some(HttpProvider::with_timeout(model, api_key, base_url, timeout))
}
