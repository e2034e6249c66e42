//! Generation requests: the inbound wire shape and its validated form.

use serde::{Deserialize, Serialize};

use crate::message::{Message, new_id};
use crate::tool::ToolServer;

/// Temperature used when the caller does not supply one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ─────────────────────────────────────────────────────────────────────────────
// Provider Type
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream model API family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Openai,
    Anthropic,
    Gemini,
    /// OpenAI-compatible SiliconFlow endpoint.
    Siliconflow,
    /// Any OpenAI-compatible endpoint; requires a base URL.
    Custom,
}

impl ProviderType {
    pub const ALL: [ProviderType; 5] = [
        ProviderType::Openai,
        ProviderType::Anthropic,
        ProviderType::Gemini,
        ProviderType::Siliconflow,
        ProviderType::Custom,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderType::Openai => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Siliconflow => "siliconflow",
            ProviderType::Custom => "custom",
        }
    }

    /// Parse a provider type from its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Whether the provider speaks the OpenAI chat-completions protocol.
    pub fn is_openai_compatible(&self) -> bool {
        matches!(
            self,
            ProviderType::Openai | ProviderType::Siliconflow | ProviderType::Custom
        )
    }

    /// Default API base URL; `None` for custom endpoints.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::Openai => Some("https://api.openai.com/v1"),
            ProviderType::Siliconflow => Some("https://api.siliconflow.cn/v1"),
            ProviderType::Anthropic => Some("https://api.anthropic.com"),
            ProviderType::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderType::Custom => None,
        }
    }

    /// Type-specific environment variables consulted after the
    /// provider-normalized one, in order.
    pub fn fallback_env_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderType::Openai => &["OPENAI_API_KEY"],
            ProviderType::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderType::Gemini => &["GEMINI_API_KEY"],
            ProviderType::Siliconflow => &["SILICONFLOW_API_KEY", "OPENAI_API_KEY"],
            ProviderType::Custom => &[],
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation Request
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling parameters carried unchanged across orchestration rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: None,
            max_tokens: None,
        }
    }
}

/// A validated request for one generation turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub provider_type: ProviderType,
    /// Configured provider instance id, used to derive the credential env var.
    pub provider_id: Option<String>,
    pub model_id: String,
    pub base_url: Option<String>,
    pub client_api_key: Option<String>,
    pub params: SamplingParams,
    pub stop: Vec<String>,
    pub system_prompt: Option<String>,
    pub stream: bool,
    pub json_schema: Option<serde_json::Value>,
    pub enable_input_preprocessing: bool,
    pub tool_servers: Vec<ToolServer>,
}

impl GenerationRequest {
    pub fn new(
        provider_type: ProviderType,
        model_id: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            chat_id: new_id(),
            messages,
            provider_type,
            provider_id: None,
            model_id: model_id.into(),
            base_url: None,
            client_api_key: None,
            params: SamplingParams::default(),
            stop: Vec::new(),
            system_prompt: None,
            stream: true,
            json_schema: None,
            enable_input_preprocessing: false,
            tool_servers: Vec::new(),
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.client_api_key = Some(key.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    pub fn with_tool_servers(mut self, servers: Vec<ToolServer>) -> Self {
        self.tool_servers = servers;
        self
    }

    pub fn with_preprocessing(mut self, enabled: bool) -> Self {
        self.enable_input_preprocessing = enabled;
        self
    }

    /// Snapshot of the servers allowed to receive tool calls this turn.
    pub fn eligible_servers(&self) -> Vec<ToolServer> {
        self.tool_servers
            .iter()
            .filter(|s| s.is_eligible())
            .cloned()
            .collect()
    }

    /// Identifier used to derive the provider-normalized credential env var.
    pub fn provider_key_id(&self) -> &str {
        self.provider_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(self.provider_type.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound Wire Request
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons an inbound request is rejected before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Messages are required")]
    MissingMessages,
    #[error("Provider type is required")]
    MissingProviderType,
    #[error("Unknown provider type '{0}'")]
    UnknownProviderType(String),
    #[error("Model ID is required")]
    MissingModelId,
}

/// The JSON body accepted by the chat stream endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatApiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, alias = "modelNativeId", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_provided_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_input_preprocessing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_tool_servers: Option<Vec<ToolServer>>,
}

impl ChatApiRequest {
    pub fn new(
        chat_id: impl Into<String>,
        provider_type: ProviderType,
        model_id: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            chat_id: Some(chat_id.into()),
            messages: Some(messages),
            model_id: Some(model_id.into()),
            provider_type: Some(provider_type.name().to_string()),
            ..Default::default()
        }
    }

    /// Validate required fields and apply defaults.
    pub fn into_generation_request(self) -> Result<GenerationRequest, RequestError> {
        let messages = self
            .messages
            .filter(|m| !m.is_empty())
            .ok_or(RequestError::MissingMessages)?;
        let type_name = self
            .provider_type
            .filter(|t| !t.trim().is_empty())
            .ok_or(RequestError::MissingProviderType)?;
        let provider_type = ProviderType::from_name(&type_name)
            .ok_or(RequestError::UnknownProviderType(type_name))?;
        let model_id = self
            .model_id
            .filter(|m| !m.trim().is_empty())
            .ok_or(RequestError::MissingModelId)?;

        Ok(GenerationRequest {
            chat_id: self.chat_id.unwrap_or_else(new_id),
            messages,
            provider_type,
            provider_id: self.provider_id,
            model_id,
            base_url: self.base_url.filter(|u| !u.is_empty()),
            client_api_key: self.client_provided_api_key.filter(|k| !k.is_empty()),
            params: SamplingParams {
                temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                top_p: self.top_p,
                max_tokens: self.max_tokens,
            },
            stop: self.stop.unwrap_or_default(),
            system_prompt: self.system_prompt.filter(|s| !s.trim().is_empty()),
            stream: self.stream.unwrap_or(true),
            json_schema: self.json_schema.filter(|s| !s.is_null()),
            enable_input_preprocessing: self.enable_input_preprocessing.unwrap_or(false),
            tool_servers: self.eligible_tool_servers.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> ChatApiRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_provider_type_names_round_trip() {
        for p in ProviderType::ALL {
            assert_eq!(ProviderType::from_name(p.name()), Some(p));
        }
        assert_eq!(ProviderType::from_name("OpenAI"), Some(ProviderType::Openai));
        assert_eq!(ProviderType::from_name("bedrock"), None);
    }

    #[test]
    fn test_defaults_applied() {
        let req = body(
            r#"{"messages":[{"role":"user","content":"hi"}],"providerType":"openai","modelNativeId":"gpt-4o"}"#,
        )
        .into_generation_request()
        .unwrap();
        assert_eq!(req.model_id, "gpt-4o");
        assert_eq!(req.params.temperature, DEFAULT_TEMPERATURE);
        assert!(req.stream);
        assert!(!req.enable_input_preprocessing);
        assert!(!req.chat_id.is_empty());
        assert_eq!(req.provider_key_id(), "openai");
    }

    #[test]
    fn test_missing_fields() {
        let err = body(r#"{"providerType":"openai","modelId":"m"}"#)
            .into_generation_request()
            .unwrap_err();
        assert_eq!(err, RequestError::MissingMessages);
        assert_eq!(err.to_string(), "Messages are required");

        let err = body(r#"{"messages":[{"role":"user","content":"hi"}],"modelId":"m"}"#)
            .into_generation_request()
            .unwrap_err();
        assert_eq!(err, RequestError::MissingProviderType);

        let err = body(r#"{"messages":[{"role":"user","content":"hi"}],"providerType":"openai"}"#)
            .into_generation_request()
            .unwrap_err();
        assert_eq!(err, RequestError::MissingModelId);

        let err = body(
            r#"{"messages":[{"role":"user","content":"hi"}],"providerType":"mystery","modelId":"m"}"#,
        )
        .into_generation_request()
        .unwrap_err();
        assert!(matches!(err, RequestError::UnknownProviderType(_)));
    }

    #[test]
    fn test_eligible_servers_snapshot() {
        let req = GenerationRequest::new(ProviderType::Openai, "m", vec![]).with_tool_servers(vec![
            ToolServer::new("a", "http://a"),
            ToolServer::new("b", "http://b").with_enabled(false),
            ToolServer::new("c", "http://c").with_connected(false),
        ]);
        let eligible = req.eligible_servers();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "a");
    }
}
