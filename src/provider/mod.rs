//! Provider adapters for the agent loop.
//!
//! Four structurally different tool-calling wires (Gemini generateContent,
//! OpenAI chat completions, Anthropic messages, Ollama chat) are normalized
//! behind one capability: send the session, get back either final text or a
//! batch of tool invocations. Wire marshaling stays private to each adapter.

pub mod anthropic;
pub mod classify;
pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::agent::AgentSession;
use crate::agent::tools::ToolSpec;
use crate::config::Config;
use crate::error::GenerateError;
use async_trait::async_trait;
use std::time::Duration;

/// Longer timeout than a single-shot request would need: agentic loops spend
/// real time inside the model between tool rounds.
const REQUEST_TIMEOUT_SECS: u64 = 90;

/// The four supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gemini" => Some(ProviderKind::Gemini),
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "ollama" | "local" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Ollama => "Ollama",
        }
    }

    /// Environment variable holding the credential; the local provider has none
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Provider-assigned call id, or a synthesized one for wires without ids
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The result of executing one tool call.
///
/// The payload is always a string, even for failures, so it can be replayed
/// verbatim into any provider's tool-result envelope.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// What one provider round produced
#[derive(Debug, Clone)]
pub enum TurnResult {
    /// Text-only response: the candidate final answer
    Final(String),
    /// One or more tool calls, with any text the model emitted alongside them
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolInvocation>,
    },
}

/// A provider-level failure, raised before classification
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Already one of the closed error kinds; the classifier passes it
    /// through untouched.
    #[error(transparent)]
    Classified(#[from] GenerateError),

    /// Non-success HTTP response, with whatever message the body carried
    #[error("{message}")]
    Http { status: Option<u16>, message: String },

    /// Transport-level failure before any response arrived
    #[error("{0}")]
    Network(String),

    /// A response arrived but carried nothing usable
    #[error("{0}")]
    Malformed(String),
}

/// The one capability every adapter implements.
///
/// `allow_tools` is false only for the forced-final round after the step
/// ceiling, where the model must answer in text.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Cheap credential/endpoint validation, run by the loop before any
    /// network traffic.
    fn preflight(&self) -> Result<(), GenerateError>;

    async fn send_turn(
        &self,
        session: &AgentSession,
        tools: &[ToolSpec],
        allow_tools: bool,
    ) -> Result<TurnResult, ProviderError>;
}

/// Build the adapter for one provider from the resolved configuration
pub fn create(kind: ProviderKind, config: &Config) -> Box<dyn Provider> {
    let key = config.api_key_for(kind);
    let model = config.model.clone();
    match kind {
        ProviderKind::Gemini => Box::new(gemini::GeminiProvider::new(key, model)),
        ProviderKind::OpenAi => Box::new(openai::OpenAiProvider::new(key, model)),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(key, model)),
        ProviderKind::Ollama => {
            Box::new(ollama::OllamaProvider::new(config.ollama_host.clone(), model))
        }
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {e}")))
}

/// Error for a cloud provider invoked without a credential
pub(crate) fn missing_key_error(kind: ProviderKind) -> GenerateError {
    let env = kind.key_env().unwrap_or("API key");
    GenerateError::ApiKeyMissing(format!(
        "{env} is not set. Export it or add it to {}.",
        Config::location()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_names_case_insensitively() {
        assert_eq!(ProviderKind::parse("Gemini"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::parse("OPENAI"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse("claude"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("local"), Some(ProviderKind::Ollama));
        assert_eq!(ProviderKind::parse("mistral"), None);
    }

    #[test]
    fn only_cloud_providers_have_key_envs() {
        assert!(ProviderKind::Gemini.key_env().is_some());
        assert!(ProviderKind::OpenAi.key_env().is_some());
        assert!(ProviderKind::Anthropic.key_env().is_some());
        assert!(ProviderKind::Ollama.key_env().is_none());
    }

    #[test]
    fn missing_key_error_names_the_env_var() {
        let err = missing_key_error(ProviderKind::Gemini);
        match err {
            GenerateError::ApiKeyMissing(msg) => assert!(msg.contains("GEMINI_API_KEY")),
            other => panic!("wrong kind: {other:?}"),
        }
    }
}
