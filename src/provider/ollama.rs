//! Ollama chat adapter for locally hosted models.
//!
//! Same message/tool shape family as chat completions, but arguments travel
//! as JSON objects, there is no auth, and there are no call ids, so the
//! adapter synthesizes them. The host is configurable; failures name it so
//! the user knows which daemon was unreachable.

use super::{http_client, Provider, ProviderError, ProviderKind, ToolInvocation, TurnResult};
use crate::agent::tools::ToolSpec;
use crate::agent::{AgentSession, Turn};
use crate::error::GenerateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

pub struct OllamaProvider {
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: Option<String>, model: Option<String>) -> Self {
        Self {
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
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
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
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

fn project_session(session: &AgentSession) -> Vec<WireMessage> {
    let mut messages = vec![WireMessage {
        role: "system".to_string(),
        content: session.system.clone(),
        tool_calls: None,
    }];

    for turn in &session.turns {
        match turn {
            Turn::User(text) => messages.push(WireMessage {
                role: "user".to_string(),
                content: text.clone(),
                tool_calls: None,
            }),
            Turn::Assistant { text, calls } => messages.push(WireMessage {
                role: "assistant".to_string(),
                content: text.clone().unwrap_or_default(),
                tool_calls: Some(
                    calls
                        .iter()
                        .map(|c| WireToolCall {
                            function: WireFunction {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                        .collect(),
                ),
            }),
            Turn::ToolResults(outcomes) => {
                for outcome in outcomes {
                    messages.push(WireMessage {
                        role: "tool".to_string(),
                        content: outcome.content.clone(),
                        tool_calls: None,
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

    let message = parsed
        .message
        .ok_or_else(|| ProviderError::Malformed("Response contained no message".to_string()))?;

    if let Some(tool_calls) = message.tool_calls.filter(|t| !t.is_empty()) {
        let calls = tool_calls
            .into_iter()
            .enumerate()
            .map(|(idx, tc)| ToolInvocation {
                id: format!("{}-{}", tc.function.name, idx),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();
        let text = if message.content.trim().is_empty() {
            None
        } else {
            Some(message.content)
        };
        return Ok(TurnResult::ToolCalls { text, calls });
    }

    if message.content.trim().is_empty() {
        return Err(ProviderError::Malformed(
            "Model returned an empty response".to_string(),
        ));
    }
    Ok(TurnResult::Final(message.content))
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    /// No credential to check; validate the host URL instead so a typo is
    /// caught before the first request.
    fn preflight(&self) -> Result<(), GenerateError> {
        Url::parse(&self.host)
            .map_err(|e| GenerateError::Request(format!("Invalid Ollama host '{}': {e}", self.host)))?;
        Ok(())
    }

    async fn send_turn(
        &self,
        session: &AgentSession,
        tools: &[ToolSpec],
        allow_tools: bool,
    ) -> Result<TurnResult, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: project_session(session),
            stream: false,
            tools: if allow_tools {
                Some(declare_tools(tools))
            } else {
                None
            },
        };

        let url = format!("{}/api/chat", self.host.trim_end_matches('/'));
        let client = http_client()?;
        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Network(format!("Could not reach Ollama at {}: {e}", self.host))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or_else(|_| text.clone());
            return Err(ProviderError::Http {
                status: Some(status.as_u16()),
                message: format!("Ollama at {}: {}", self.host, message),
            });
        }

        parse_turn(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolOutcome;

    #[test]
    fn preflight_rejects_unparseable_host() {
        let provider = OllamaProvider::new(Some("not a url".to_string()), None);
        match provider.preflight().unwrap_err() {
            GenerateError::Request(msg) => assert!(msg.contains("not a url")),
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn preflight_accepts_default_host() {
        let provider = OllamaProvider::new(None, None);
        assert!(provider.preflight().is_ok());
    }

    #[test]
    fn session_projection_flattens_tool_results_to_tool_messages() {
        let session = AgentSession::new("sys", "briefing")
            .with_turn(Turn::Assistant {
                text: None,
                calls: vec![ToolInvocation {
                    id: "get_diff-0".into(),
                    name: "get_diff".into(),
                    arguments: serde_json::json!({"path": "README.md"}),
                }],
            })
            .with_turn(Turn::ToolResults(vec![ToolOutcome {
                call_id: "get_diff-0".into(),
                name: "get_diff".into(),
                content: "diff body".into(),
                is_error: false,
            }]));

        let messages = project_session(&session);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[3].role, "tool");
        assert_eq!(messages[3].content, "diff body");

        // Arguments stay a JSON object on this wire
        let json = serde_json::to_string(&messages[2]).unwrap();
        assert!(json.contains(r#""arguments":{"path":"README.md"}"#));
    }

    #[test]
    fn parse_turn_synthesizes_call_ids() {
        let body = r#"{
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": {"path": "src/lib.rs"}}}
                ]
            },
            "done": true
        }"#;

        match parse_turn(body).unwrap() {
            TurnResult::ToolCalls { calls, .. } => {
                assert_eq!(calls[0].id, "read_file-0");
                assert_eq!(calls[0].arguments["path"], "src/lib.rs");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_reads_final_text() {
        let body = r#"{"message": {"role": "assistant", "content": "chore: bump deps"}, "done": true}"#;
        match parse_turn(body).unwrap() {
            TurnResult::Final(text) => assert_eq!(text, "chore: bump deps"),
            other => panic!("expected final text, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_rejects_empty_message() {
        let body = r#"{"message": {"role": "assistant", "content": ""}, "done": true}"#;
        assert!(matches!(
            parse_turn(body),
            Err(ProviderError::Malformed(_))
        ));
    }
}
