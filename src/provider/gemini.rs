//! Gemini generateContent adapter.
//!
//! Tool calls arrive as `functionCall` parts inside the model's content;
//! results go back as `functionResponse` parts in a user turn. This wire has
//! no call ids, so outcomes are matched by function name and the adapter
//! synthesizes ids for the loop's bookkeeping.

use super::{
    http_client, missing_key_error, Provider, ProviderError, ProviderKind, ToolInvocation,
    TurnResult,
};
use crate::agent::tools::ToolSpec;
use crate::agent::{AgentSession, Turn};
use crate::error::GenerateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const GEMINI_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolsDecl>>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            function_call: None,
            function_response: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsDecl {
    function_declarations: Vec<FunctionDecl>,
}

#[derive(Serialize)]
struct FunctionDecl {
    name: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn declare_tools(tools: &[ToolSpec]) -> Vec<ToolsDecl> {
    vec![ToolsDecl {
        function_declarations: tools
            .iter()
            .map(|t| FunctionDecl {
                name: t.name,
                description: t.description,
                parameters: t.parameters.clone(),
            })
            .collect(),
    }]
}

fn project_session(session: &AgentSession) -> Vec<Content> {
    let mut contents = Vec::new();

    for turn in &session.turns {
        match turn {
            Turn::User(text) => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part::text(text.clone())],
            }),
            Turn::Assistant { text, calls } => {
                let mut parts = Vec::new();
                if let Some(text) = text {
                    parts.push(Part::text(text.clone()));
                }
                for call in calls {
                    parts.push(Part {
                        text: None,
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        function_response: None,
                    });
                }
                contents.push(Content {
                    role: "model".to_string(),
                    parts,
                });
            }
            Turn::ToolResults(outcomes) => {
                let parts = outcomes
                    .iter()
                    .map(|o| Part {
                        text: None,
                        function_call: None,
                        function_response: Some(FunctionResponse {
                            name: o.name.clone(),
                            response: serde_json::json!({ "content": o.content }),
                        }),
                    })
                    .collect();
                contents.push(Content {
                    role: "user".to_string(),
                    parts,
                });
            }
        }
    }

    contents
}

fn parse_turn(body: &str) -> Result<TurnResult, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("Unparseable generateContent response: {e}")))?;

    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ProviderError::Malformed("Response contained no candidates".to_string()))?;

    let mut text_parts = Vec::new();
    let mut calls = Vec::new();

    for (idx, part) in content.parts.into_iter().enumerate() {
        if let Some(text) = part.text {
            text_parts.push(text);
        }
        if let Some(call) = part.function_call {
            calls.push(ToolInvocation {
                id: format!("{}-{}", call.name, idx),
                name: call.name,
                arguments: call.args,
            });
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
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn preflight(&self) -> Result<(), GenerateError> {
        if self.api_key.is_none() {
            return Err(missing_key_error(ProviderKind::Gemini));
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
            .ok_or_else(|| ProviderError::Classified(missing_key_error(ProviderKind::Gemini)))?;

        let request = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: session.system.clone(),
                }],
            },
            contents: project_session(session),
            tools: if allow_tools {
                Some(declare_tools(tools))
            } else {
                None
            },
        };

        let url = format!("{}/{}:generateContent", GEMINI_URL_BASE, self.model);
        let client = http_client()?;
        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::tool_specs;
    use crate::provider::ToolOutcome;

    #[test]
    fn tool_declarations_use_camel_case_envelope() {
        let decls = declare_tools(&tool_specs());
        let json = serde_json::to_string(&decls).unwrap();
        assert!(json.contains("functionDeclarations"));
        assert!(json.contains("get_file_outline"));
    }

    #[test]
    fn session_projection_maps_roles_and_function_parts() {
        let session = AgentSession::new("sys", "briefing")
            .with_turn(Turn::Assistant {
                text: Some("checking".into()),
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

        let contents = project_session(&session);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].role, "user");

        let json = serde_json::to_string(&contents).unwrap();
        assert!(json.contains("functionCall"));
        assert!(json.contains("functionResponse"));
        assert!(json.contains("diff body"));
    }

    #[test]
    fn parse_turn_reads_function_calls() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "get_diff", "args": {"path": "README.md"}}}
                    ]
                }
            }]
        }"#;

        match parse_turn(body).unwrap() {
            TurnResult::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_diff");
                assert_eq!(calls[0].arguments["path"], "README.md");
                assert!(!calls[0].id.is_empty());
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_reads_final_text() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "docs: update readme"}]}
            }]
        }"#;
        match parse_turn(body).unwrap() {
            TurnResult::Final(text) => assert_eq!(text, "docs: update readme"),
            other => panic!("expected final text, got {other:?}"),
        }
    }

    #[test]
    fn parse_turn_rejects_missing_candidates() {
        assert!(matches!(
            parse_turn(r#"{"candidates": []}"#),
            Err(ProviderError::Malformed(_))
        ));
    }
}
