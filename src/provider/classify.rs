//! Maps provider-specific failure signals into the shared error taxonomy.
//!
//! Each provider reports credential and quota problems differently, so the
//! matched status codes and message substrings are enumerated as data, one
//! table per provider. First matching rule wins; anything unmatched falls
//! through to the request catch-all. Errors already classified by the loop's
//! own precondition checks pass through untouched.

use super::{ProviderError, ProviderKind};
use crate::error::GenerateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    InvalidKey,
    Quota,
}

/// One recognizable failure signal.
///
/// A present `status` must equal the response status; a present `needle`
/// must appear in the lowercased message. Both present means both must hold.
struct Rule {
    status: Option<u16>,
    needle: Option<&'static str>,
    kind: FailureKind,
}

const GEMINI_RULES: &[Rule] = &[
    Rule { status: Some(401), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: Some(403), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("api key not valid"), kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("api_key_invalid"), kind: FailureKind::InvalidKey },
    Rule { status: Some(429), needle: None, kind: FailureKind::Quota },
    Rule { status: None, needle: Some("resource_exhausted"), kind: FailureKind::Quota },
    Rule { status: None, needle: Some("quota"), kind: FailureKind::Quota },
];

const OPENAI_RULES: &[Rule] = &[
    Rule { status: Some(401), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: Some(403), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("invalid_api_key"), kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("incorrect api key"), kind: FailureKind::InvalidKey },
    Rule { status: Some(429), needle: None, kind: FailureKind::Quota },
    Rule { status: None, needle: Some("insufficient_quota"), kind: FailureKind::Quota },
    Rule { status: None, needle: Some("rate limit"), kind: FailureKind::Quota },
];

const ANTHROPIC_RULES: &[Rule] = &[
    Rule { status: Some(401), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: Some(403), needle: None, kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("authentication_error"), kind: FailureKind::InvalidKey },
    Rule { status: None, needle: Some("invalid x-api-key"), kind: FailureKind::InvalidKey },
    Rule { status: Some(429), needle: None, kind: FailureKind::Quota },
    Rule { status: None, needle: Some("rate_limit_error"), kind: FailureKind::Quota },
];

/// A local daemon has neither credentials nor quotas
const OLLAMA_RULES: &[Rule] = &[];

fn rules_for(kind: ProviderKind) -> &'static [Rule] {
    match kind {
        ProviderKind::Gemini => GEMINI_RULES,
        ProviderKind::OpenAi => OPENAI_RULES,
        ProviderKind::Anthropic => ANTHROPIC_RULES,
        ProviderKind::Ollama => OLLAMA_RULES,
    }
}

/// Classify a provider failure into one of the closed error kinds
pub fn classify(kind: ProviderKind, err: ProviderError) -> GenerateError {
    match err {
        ProviderError::Classified(e) => e,
        ProviderError::Network(message) | ProviderError::Malformed(message) => {
            GenerateError::Request(message)
        }
        ProviderError::Http { status, message } => {
            let lowered = message.to_lowercase();
            for rule in rules_for(kind) {
                let status_matches = rule.status.is_none_or(|s| Some(s) == status);
                let needle_matches = rule.needle.is_none_or(|n| lowered.contains(n));
                if status_matches && needle_matches {
                    return match rule.kind {
                        FailureKind::InvalidKey => {
                            let hint = kind
                                .key_env()
                                .map(|env| format!(" (check {env})"))
                                .unwrap_or_default();
                            GenerateError::ApiKeyInvalid(format!(
                                "{} rejected the API key{hint}",
                                kind.name()
                            ))
                        }
                        FailureKind::Quota => GenerateError::QuotaExceeded(format!(
                            "{} rate or quota limit reached; wait a while and try again",
                            kind.name()
                        )),
                    };
                }
            }
            let code = status.map(|s| format!(" (HTTP {s})")).unwrap_or_default();
            GenerateError::Request(format!(
                "{}{code}: {}",
                kind.name(),
                truncate(&message, 300)
            ))
        }
    }
}

/// Truncate a message for display (Unicode-safe)
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
