//! OpenAI chat-completions adapter.
//!
//! Tool calls arrive on the assistant message as `tool_calls` with
//! stringified JSON arguments; results go back as `role: "tool"` messages
//! keyed by `tool_call_id`.

use super::{
    http_client, missing_key_error, Provider, ProviderError, ProviderKind, ToolInvocation,
    TurnResult,
};
use crate::agent::tools::ToolSpec;
use crate::agent::{AgentSession, Turn};
use crate::error::GenerateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 1024;

pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCallMessage {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: FunctionCallMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCallMessage {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDecl>>,
}

#[derive(Serialize)]
struct ToolDecl {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDecl,
}

#[derive(Serialize)]
struct FunctionDecl {
    name: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallMessage>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

fn declare_tools(tools: &[ToolSpec]) -> Vec<ToolDecl> {
    tools
        .iter()
        .map(|t| ToolDecl {
            tool_type: "function",
            function: FunctionDecl {
                name: t.name,
                description: t.description,
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn project_session(session: &AgentSession) -> Vec<Message> {
    let mut messages = vec![Message {
        role: "system".to_string(),
        content: Some(session.system.clone()),
        tool_calls: None,
        tool_call_id: None,
    }];

    for turn in &session.turns {
        match turn {
            Turn::User(text) => messages.push(Message {
                role: "user".to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            }),
            Turn::Assistant { text, calls } => messages.push(Message {
                role: "assistant".to_string(),
                content: text.clone(),
                tool_calls: Some(
                    calls
                        .iter()
                        .map(|c| ToolCallMessage {
                            id: c.id.clone(),
                            call_type: "function".to_string(),
                            function: FunctionCallMessage {
                                name: c.name.clone(),
                                arguments: serde_json::to_string(&c.arguments)
                                    .unwrap_or_else(|_| "{}".to_string()),
                            },
                        })
                        .collect(),
                ),
                tool_call_id: None,
            }),
            Turn::ToolResults(outcomes) => {
                for outcome in outcomes {
                    messages.push(Message {
                        role: "tool".to_string(),
                        content: Some(outcome.content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(outcome.call_id.clone()),
                    });
                }
            }
        }
    }

    messages
}

fn parse_turn(body: &str) -> Result<TurnResult, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("Unparseable chat response: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("Response contained no choices".to_string()))?;

    if let Some(tool_calls) = choice.message.tool_calls.filter(|t| !t.is_empty()) {
        let calls = tool_calls
            .into_iter()
            .map(|tc| ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();
        return Ok(TurnResult::ToolCalls {
            text: choice.message.content,
            calls,
        });
    }

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(TurnResult::Final(content)),
        _ => Err(ProviderError::Malformed(
            "Model returned an empty response".to_string(),
        )),
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn preflight(&self) -> Result<(), GenerateError> {
        if self.api_key.is_none() {
            return Err(missing_key_error(ProviderKind::OpenAi));
        }
        Ok(())
    }

    async fn send_turn(
        &self,
        session: &AgentSession,
        tools: &[ToolSpec],
        allow_tools: bool,
    ) -> Result<TurnResult, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Classified(missing_key_error(ProviderKind::OpenAi)))?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: project_session(session),
            max_tokens: MAX_TOKENS,
            stream: false,
            tools: if allow_tools {
                Some(declare_tools(tools))
            } else {
                None
            },
        };

        let client = http_client()?;
        let response = client
            .post(OPENAI_URL)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.clone());
            return Err(ProviderError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        parse_turn(&text)
    }
}
