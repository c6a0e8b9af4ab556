use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AiConfig;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Moonshot AI.
    Kimi,
    #[value(name = "deepseek")]
    DeepSeek,
    #[value(name = "openai")]
    OpenAi,
    Zhipu,
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Kimi => "https://api.moonshot.cn/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Kimi => "moonshot-v1-8k",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Zhipu => "glm-4",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProviderKind::Kimi => "kimi",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Zhipu => "zhipu",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no configuration for provider {0}")]
    NotConfigured(ProviderKind),
    #[error("API key for {0} is empty")]
    MissingApiKey(ProviderKind),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("unreadable provider response: {0}")]
    InvalidResponse(String),
}

/// One request, one reply.
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

fn api_error(status: u16, body: &[u8]) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .error
        .and_then(|e| e.message)
        .or(parsed.message)
        .unwrap_or_else(|| format!("request failed ({status})"));
    ProviderError::Api { status, message }
}

fn parse_reply(body: &[u8]) -> Result<ChatMessage, ProviderError> {
    let parsed: CompletionResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    Ok(ChatMessage::assistant(content))
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatible {
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
}

impl OpenAiCompatible {
    pub fn from_config(config: &AiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey(config.provider));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(60)))
            .build()
            .into();

        Ok(Self {
            kind: config.provider,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            model: config.model().to_string(),
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatProvider for OpenAiCompatible {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError> {
        let body = serde_json::to_vec(&CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(
            provider:% = self.kind,
            model = self.model.as_str(),
            messages = messages.len();
            "Sending chat request"
        );
        let response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&body[..])
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .into_body()
            .read_to_vec()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            let err = api_error(status, &bytes);
            warn!(provider:% = self.kind, status; "Chat request failed: {}", err);
            return Err(err);
        }
        parse_reply(&bytes)
    }
}

/// Providers keyed by kind, built lazily from the configurations handed in.
#[derive(Default)]
pub struct ProviderRegistry {
    configs: HashMap<ProviderKind, AiConfig>,
    providers: Mutex<HashMap<ProviderKind, Arc<dyn ChatProvider>>>,
}

impl ProviderRegistry {
    pub fn new(configs: impl IntoIterator<Item = AiConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.provider, c)).collect(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Install a ready-made provider, replacing any previous one of the same kind.
    pub fn register(&self, provider: Arc<dyn ChatProvider>) {
        self.providers.lock().insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        let mut providers = self.providers.lock();
        if let Some(provider) = providers.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let config = self
            .configs
            .get(&kind)
            .ok_or(ProviderError::NotConfigured(kind))?;
        let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiCompatible::from_config(config)?);
        providers.insert(kind, Arc::clone(&provider));
        Ok(provider)
    }

    pub fn config(&self, kind: ProviderKind) -> Option<&AiConfig> {
        self.configs.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(ProviderKind);

    impl ChatProvider for Fixed {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError> {
            Ok(ChatMessage::assistant("ok"))
        }
    }

    #[test]
    fn request_body_has_wire_shape() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let body = serde_json::to_value(CompletionRequest {
            model: "deepseek-chat",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 1000,
        })
        .unwrap();
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn error_message_precedence() {
        let nested = api_error(401, br#"{"error":{"message":"bad key"},"message":"outer"}"#);
        assert_eq!(nested.to_string(), "bad key");

        let flat = api_error(500, br#"{"message":"outer"}"#);
        assert_eq!(flat.to_string(), "outer");

        let opaque = api_error(502, b"<html>gateway</html>");
        assert_eq!(opaque.to_string(), "request failed (502)");
    }

    #[test]
    fn reply_takes_first_choice() {
        let reply =
            parse_reply(br#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#)
                .unwrap();
        assert_eq!(reply, ChatMessage::assistant("hi"));

        let empty = parse_reply(br#"{"choices":[]}"#).unwrap();
        assert!(empty.content.is_empty());

        assert!(matches!(
            parse_reply(b"nope"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn client_uses_config_endpoint() {
        let mut config = AiConfig::new(ProviderKind::Zhipu, "key");
        let client = OpenAiCompatible::from_config(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );

        config.base_url = Some("http://localhost:8080/v1/".to_string());
        let client = OpenAiCompatible::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn empty_key_is_rejected() {
        let config = AiConfig::new(ProviderKind::Kimi, "  ");
        assert!(matches!(
            OpenAiCompatible::from_config(&config),
            Err(ProviderError::MissingApiKey(ProviderKind::Kimi))
        ));
    }

    #[test]
    fn registry_prefers_registered_and_reports_missing() {
        let registry = ProviderRegistry::new([AiConfig::new(ProviderKind::DeepSeek, "key")]);
        registry.register(Arc::new(Fixed(ProviderKind::OpenAi)));

        assert_eq!(registry.get(ProviderKind::OpenAi).unwrap().kind(), ProviderKind::OpenAi);
        assert_eq!(
            registry.get(ProviderKind::DeepSeek).unwrap().kind(),
            ProviderKind::DeepSeek
        );
        assert!(matches!(
            registry.get(ProviderKind::Zhipu),
            Err(ProviderError::NotConfigured(ProviderKind::Zhipu))
        ));
    }

    #[test]
    fn kind_names_round_trip_through_serde() {
        let kind: ProviderKind = serde_json::from_str("\"deepseek\"").unwrap();
        assert_eq!(kind, ProviderKind::DeepSeek);
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"openai\"");
    }
}
