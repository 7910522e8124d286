//! The agent orchestration loop.
//!
//! Drives a tool-using model from an information-poor briefing to a final
//! commit message: send the session, execute whatever tool calls come back,
//! feed the outcomes in, repeat. A step ceiling bounds the investigation;
//! past it the model is told to stop and answer with what it has.

pub mod sanitize;
pub mod tools;

use crate::config::Limits;
use crate::context::{build_briefing, ChangeSet, RepositoryTree};
use crate::error::GenerateError;
use crate::provider::{classify::classify, Provider, ProviderError, ToolInvocation, ToolOutcome, TurnResult};
use self::tools::{tool_specs, Sandbox};
use std::path::Path;
use tracing::{debug, warn};

pub const SYSTEM_PROMPT: &str = "\
You write conventional commit messages for staged git changes.

Rules:
- Reply with the commit message only: no prose around it, no code fences.
- First line: type(scope): description, 72 characters or less, imperative mood.
- Allowed types: feat, fix, docs, style, refactor, perf, test, build, ci, chore, revert.
- Add a short body only when the change is not self-explanatory from the first line.
- Inspect the actual changes with the available tools before choosing a type.";

/// Sent once the step ceiling is reached; the next response is final either way
const FORCE_FINAL_PROMPT: &str = "Stop investigating. Reply now with the final \
conventional commit message based on what you have seen so far. Do not call \
any more tools.";

/// Used when even the forced round yields no usable text
const FALLBACK_MESSAGE: &str = "chore: update project files";

/// Observational progress channel; notifications never carry control meaning
pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: &str, increment_percent: Option<f64>);
}

/// Sink that discards every notification
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn notify(&self, _message: &str, _increment_percent: Option<f64>) {}
}

/// One entry in the conversation, independent of any provider's wire shape
#[derive(Debug, Clone)]
pub enum Turn {
    User(String),
    Assistant {
        text: Option<String>,
        calls: Vec<ToolInvocation>,
    },
    ToolResults(Vec<ToolOutcome>),
}

/// The conversation state for one invocation.
///
/// Owned by exactly one loop run, never shared or persisted. Steps return a
/// new session value instead of mutating, which keeps step-by-step behavior
/// easy to pin down in tests.
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub system: String,
    pub turns: Vec<Turn>,
    pub steps: usize,
}

impl AgentSession {
    pub fn new(system: impl Into<String>, briefing: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            turns: vec![Turn::User(briefing.into())],
            steps: 0,
        }
    }

    #[must_use]
    pub fn with_turn(&self, turn: Turn) -> Self {
        let mut next = self.clone();
        next.turns.push(turn);
        next
    }

    #[must_use]
    pub fn stepped(&self) -> Self {
        let mut next = self.clone();
        next.steps += 1;
        next
    }
}

/// Inputs supplied by the git and configuration collaborators
pub struct GenerateRequest<'a> {
    pub diff: &'a str,
    pub repo_root: &'a Path,
    pub limits: &'a Limits,
}

/// Generate a commit message for the staged changes.
///
/// Precondition failures (empty diff, missing credential) are raised before
/// any provider call. Provider failures are classified and raised
/// immediately; there is no retry at this layer.
pub async fn generate_commit_message(
    provider: &dyn Provider,
    request: &GenerateRequest<'_>,
    progress: &dyn ProgressSink,
) -> Result<String, GenerateError> {
    let changes = ChangeSet::parse(request.diff);
    if request.diff.trim().is_empty() || changes.is_empty() {
        return Err(GenerateError::NoChanges);
    }
    provider.preflight()?;

    let tree = RepositoryTree::build(
        request.repo_root,
        request.limits.tree_depth,
        request.limits.tree_max_files,
    );
    let briefing = build_briefing(&changes, &tree);
    let sandbox = Sandbox::new(request.repo_root, request.diff, request.limits);
    let specs = tool_specs();
    let step_share = 100.0 / (request.limits.step_ceiling + 1) as f64;

    let mut session = AgentSession::new(SYSTEM_PROMPT, briefing);

    loop {
        if session.steps >= request.limits.step_ceiling {
            warn!(steps = session.steps, "step ceiling reached, forcing a final answer");
            progress.notify("Asking for a final answer", Some(step_share));

            session = session.with_turn(Turn::User(FORCE_FINAL_PROMPT.to_string()));
            let text = match provider.send_turn(&session, &specs, false).await {
                Ok(TurnResult::Final(text)) if !text.trim().is_empty() => text,
                Ok(_) => FALLBACK_MESSAGE.to_string(),
                Err(ProviderError::Malformed(_)) => FALLBACK_MESSAGE.to_string(),
                Err(e) => return Err(classify(provider.kind(), e)),
            };
            return Ok(sanitize::extract(&text));
        }

        progress.notify("Consulting the model", Some(step_share));
        debug!(step = session.steps, "sending session to provider");

        let result = provider
            .send_turn(&session, &specs, true)
            .await
            .map_err(|e| classify(provider.kind(), e))?;

        match result {
            TurnResult::Final(text) => {
                debug!("model returned final text");
                return Ok(sanitize::extract(&text));
            }
            TurnResult::ToolCalls { text, calls } => {
                session = session.with_turn(Turn::Assistant {
                    text,
                    calls: calls.clone(),
                });

                let mut outcomes = Vec::with_capacity(calls.len());
                for call in &calls {
                    progress.notify(&format!("Inspecting repository ({})", call.name), None);
                    debug!(tool = %call.name, "dispatching tool call");
                    outcomes.push(sandbox.execute(call));
                }

                session = session.with_turn(Turn::ToolResults(outcomes)).stepped();
            }
        }
    }
}
