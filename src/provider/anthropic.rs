//! Anthropic messages adapter.
//!
//! Conversation turns are lists of typed content blocks: `tool_use` blocks
//! carry the model's calls, and results return as `tool_result` blocks (with
//! an explicit error flag) inside the next user message.

use super::{
    http_client, missing_key_error, Provider, ProviderError, ProviderKind, ToolInvocation,
    TurnResult,
};
use crate::agent::tools::ToolSpec;
use crate::agent::{AgentSession, Turn};
use crate::error::GenerateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    api_key: Option<String>,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDecl>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: Vec<Block>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Serialize)]
struct ToolDecl {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

/// Response blocks are parsed leniently: block types this adapter does not
/// model are ignored rather than failing the whole turn.
#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

fn declare_tools(tools: &[ToolSpec]) -> Vec<ToolDecl> {
    tools
        .iter()
        .map(|t| ToolDecl {
            name: t.name,
            description: t.description,
            input_schema: t.parameters.clone(),
        })
        .collect()
}

fn project_session(session: &AgentSession) -> Vec<WireMessage> {
    let mut messages = Vec::new();

    for turn in &session.turns {
        match turn {
            Turn::User(text) => messages.push(WireMessage {
                role: "user".to_string(),
                content: vec![Block::Text { text: text.clone() }],
            }),
            Turn::Assistant { text, calls } => {
                let mut content = Vec::new();
                if let Some(text) = text {
                    content.push(Block::Text { text: text.clone() });
                }
                for call in calls {
                    content.push(Block::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                messages.push(WireMessage {
                    role: "assistant".to_string(),
                    content,
                });
            }
            Turn::ToolResults(outcomes) => {
                let content = outcomes
                    .iter()
                    .map(|o| Block::ToolResult {
                        tool_use_id: o.call_id.clone(),
                        content: o.content.clone(),
                        is_error: o.is_error,
                    })
                    .collect();
                messages.push(WireMessage {
                    role: "user".to_string(),
                    content,
                });
            }
        }
    }

    messages
}

fn parse_turn(body: &str) -> Result<TurnResult, ProviderError> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("Unparseable messages response: {e}")))?;

    let mut text_parts = Vec::new();
    let mut calls = Vec::new();

    for block in parsed.content {
        match block.block_type.as_str() {
            "text" => {
                if let Some(text) = block.text {
                    text_parts.push(text);
                }
            }
            "tool_use" => {
                if let (Some(id), Some(name)) = (block.id, block.name) {
                    calls.push(ToolInvocation {
                        id,
                        name,
                        arguments: block.input.unwrap_or(serde_json::Value::Null),
                    });
                }
            }
            _ => {}
        }
    }

    let text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    };

    if !calls.is_empty() {
        return Ok(TurnResult::ToolCalls { text, calls });
    }

    match text {
        Some(text) if !text.trim().is_empty() => Ok(TurnResult::Final(text)),
        _ => Err(ProviderError::Malformed(
            "Model returned an empty response".to_string(),
        )),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn preflight(&self) -> Result<(), GenerateError> {
        if self.api_key.is_none() {
            return Err(missing_key_error(ProviderKind::Anthropic));
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
            .ok_or_else(|| ProviderError::Classified(missing_key_error(ProviderKind::Anthropic)))?;

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: session.system.clone(),
            messages: project_session(session),
            tools: if allow_tools {
                Some(declare_tools(tools))
            } else {
                None
            },
        };

        let client = http_client()?;
        let response = client
            .post(ANTHROPIC_URL)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
                .unwrap_or_else(|_| text.clone());
            return Err(ProviderError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        parse_turn(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::tool_specs;
    use crate::provider::ToolOutcome;

    #[test]
    fn tool_declarations_carry_input_schema() {
        let decls = declare_tools(&tool_specs());
        let json = serde_json::to_string(&decls).unwrap();
        assert!(json.contains("input_schema"));
        assert!(json.contains("read_file"));
    }

    #[test]
    fn session_projection_emits_typed_blocks() {
        let session = AgentSession::new("sys", "briefing")
            .with_turn(Turn::Assistant {
                text: None,
                calls: vec![ToolInvocation {
                    id: "toolu_1".into(),
                    name: "read_file".into(),
                    arguments: serde_json::json!({"path": "src/lib.rs"}),
                }],
            })
            .with_turn(Turn::ToolResults(vec![ToolOutcome {
                call_id: "toolu_1".into(),
                name: "read_file".into(),
                content: "Path not found: src/lib.rs".into(),
                is_error: true,
            }]));

        let messages = project_session(&session);
        let json = serde_json::to_string(&messages).unwrap();
        assert!(json.contains(r#""type":"tool_use""#));
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""tool_use_id":"toolu_1""#));
        assert!(json.contains(r#""is_error":true"#));
    }

    #[test]
    fn successful_tool_result_omits_error_flag() {
        let messages = project_session(&AgentSession::new("s", "b").with_turn(
            Turn::ToolResults(vec![ToolOutcome {
                call_id: "toolu_2".into(),
                name: "get_diff".into(),
                content: "diff body".into(),
                is_error: false,
            }]),
        ));
        let json = serde_json::to_string(&messages).unwrap();
        assert!(!json.contains("is_error"));
    }

    #[test]
    fn parse_turn_reads_tool_use_blocks() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_3", "name": "get_diff", "input": {"path": "README.md"}}
            ]
        }"#;

        match parse_turn(body).unwrap() {
            TurnResult::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me check."));
                assert_eq!(calls[0].id, "toolu_3");
                assert_eq!(calls[0].arguments["path"], "README.md");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_ignores_unknown_block_types() {
        let body = r#"{
            "content": [
                {"type": "thinking", "text": "internal"},
                {"type": "text", "text": "fix: patch the bug"}
            ]
        }"#;
        match parse_turn(body).unwrap() {
            TurnResult::Final(text) => assert!(text.contains("fix: patch the bug")),
            other => panic!("expected final text, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_rejects_empty_content() {
        assert!(matches!(
            parse_turn(r#"{"content": []}"#),
            Err(ProviderError::Malformed(_))
        ));
    }
}
