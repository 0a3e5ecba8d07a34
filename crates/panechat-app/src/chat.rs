//! One-shot requests to an OpenAI-compatible chat completions endpoint.

use serde::{Deserialize, Serialize};

use crate::config::{required_key_var, Settings};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE: &str = "https://api.deepseek.com/v1";
const ANTHROPIC_BASE: &str = "https://api.anthropic.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";

/// Errors from a chat request.
#[derive(Debug)]
pub enum ChatError {
    Http(reqwest::Error),
    /// Non-success status with the response body.
    Status(u16, String),
    EmptyResponse,
    MissingModel,
    /// No endpoint is known for the model and no `api_base` is set.
    UnknownProvider(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Http(err) => write!(f, "request failed: {err}"),
            ChatError::Status(code, body) => write!(f, "HTTP {code}: {body}"),
            ChatError::EmptyResponse => write!(f, "received an empty response"),
            ChatError::MissingModel => write!(f, "Model name not configured."),
            ChatError::UnknownProvider(model) => {
                write!(f, "no endpoint known for model '{model}'; set api_base in the settings file")
            }
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Http(err)
    }
}

/// One turn of the conversation as the API sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiMessage {
    pub role: &'static str,
    pub content: String,
}

impl ApiMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Where a model's requests go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    /// Model name as the provider knows it, without the routing prefix.
    pub model: String,
    pub api_key: Option<String>,
}

impl Endpoint {
    /// Route `model` by its provider prefix, or to `api_base` when set.
    pub fn resolve(settings: &Settings, env: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let model = settings.model.as_deref().ok_or(ChatError::MissingModel)?;
        let (provider, rest) = model.split_once('/').unwrap_or(("", model));
        let routed = match provider.to_ascii_lowercase().as_str() {
            "openrouter" => Some((OPENROUTER_BASE, rest)),
            "openai" => Some((OPENAI_BASE, rest)),
            "deepseek" => Some((DEEPSEEK_BASE, rest)),
            "anthropic" => Some((ANTHROPIC_BASE, rest)),
            "groq" => Some((GROQ_BASE, rest)),
            _ if model.starts_with("gpt-") => Some((OPENAI_BASE, model)),
            _ => None,
        };
        let (base_url, model_id) = match (settings.api_base.as_deref(), routed) {
            (Some(base), Some((_, id))) => (base, id),
            (Some(base), None) => (base, model),
            (None, Some(route)) => route,
            (None, None) => return Err(ChatError::UnknownProvider(model.to_string())),
        };
        let api_key = required_key_var(model).and_then(|var| settings.api_key(var, &env));
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model_id.to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Send the conversation and return the assistant's reply.
pub async fn complete(
    http: &reqwest::Client,
    endpoint: &Endpoint,
    messages: &[ApiMessage],
) -> Result<String, ChatError> {
    log::debug!("chat request to {} ({} messages)", endpoint.base_url, messages.len());
    let mut request = http.post(endpoint.url()).json(&CompletionRequest {
        model: &endpoint.model,
        messages,
    });
    if let Some(key) = &endpoint.api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::warn!("chat request failed with {status}");
        return Err(ChatError::Status(status.as_u16(), body.trim().to_string()));
    }
    let body: CompletionResponse = response.json().await?;
    reply_text(body)
}

fn reply_text(body: CompletionResponse) -> Result<String, ChatError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(ChatError::EmptyResponse)
}
