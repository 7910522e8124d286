//! Inspection tools the model can call while investigating a change.
//!
//! Every tool is read-only and confined to the repository root; tool
//! arguments come from the model and are the only untrusted input in the
//! system, so the path guard here is the security boundary. Failures never
//! escape as errors: they become error-flagged outcomes the model can read
//! and react to.

use crate::config::Limits;
use crate::provider::{ToolInvocation, ToolOutcome};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A provider-independent tool declaration.
///
/// Each provider adapter projects these into its own wire shape.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// The three inspection capabilities offered to the model
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "get_diff",
            description: "Show the staged diff for one file. Start here: it is the cheapest way to see what actually changed.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path exactly as it appears in the change table"
                    }
                },
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: "read_file",
            description: "Read a file from the repository with line numbers. Use start_line/end_line to narrow large files.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the repository root"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to return (1-indexed, inclusive)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to return (inclusive)"
                    }
                },
                "required": ["path"]
            }),
        },
        ToolSpec {
            name: "get_file_outline",
            description: "List the structural lines of a file (imports, types, functions, constants). Cheaper than reading the whole file.",
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the repository root"
                    }
                },
                "required": ["path"]
            }),
        },
    ]
}

/// Executes tool invocations against the repository tree and the stored diff
pub struct Sandbox<'a> {
    root: &'a Path,
    diff: &'a str,
    limits: &'a Limits,
}

impl<'a> Sandbox<'a> {
    pub fn new(root: &'a Path, diff: &'a str, limits: &'a Limits) -> Self {
        Self { root, diff, limits }
    }

    /// Run one invocation. Never fails outward: every problem becomes an
    /// error-flagged outcome whose text explains what went wrong.
    pub fn execute(&self, call: &ToolInvocation) -> ToolOutcome {
        let (content, is_error) = match call.name.as_str() {
            "get_diff" => self.get_diff(&call.arguments),
            "read_file" => self.read_file(&call.arguments),
            "get_file_outline" => self.file_outline(&call.arguments),
            other => (format!("Unknown tool: {other}"), true),
        };

        ToolOutcome {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error,
        }
    }

    fn get_diff(&self, args: &serde_json::Value) -> (String, bool) {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }

        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("Invalid arguments: {e}"), true),
        };

        match diff_section(self.diff, &args.path) {
            Some(section) => (section, false),
            None => (
                format!(
                    "No diff section found for '{}'. Use the path exactly as listed in the change table.",
                    args.path
                ),
                true,
            ),
        }
    }

    fn read_file(&self, args: &serde_json::Value) -> (String, bool) {
        #[derive(Deserialize)]
        struct Args {
            path: String,
            start_line: Option<usize>,
            end_line: Option<usize>,
        }

        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("Invalid arguments: {e}"), true),
        };

        let target = match self.resolve(&args.path) {
            Ok(p) => p,
            Err(msg) => return (msg, true),
        };

        if target.is_dir() {
            return (format!("'{}' is a directory, not a file", args.path), true);
        }

        let ranged = args.start_line.is_some() || args.end_line.is_some();
        if let Ok(meta) = fs::metadata(&target) {
            if meta.len() > self.limits.read_max_bytes && !ranged {
                return (
                    format!(
                        "'{}' is {} bytes, above the {} byte limit. Request a line range with start_line and end_line instead.",
                        args.path,
                        meta.len(),
                        self.limits.read_max_bytes
                    ),
                    true,
                );
            }
        }

        let content = match fs::read_to_string(&target) {
            Ok(c) => c,
            Err(e) => return (format!("Failed to read '{}': {e}", args.path), true),
        };

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        if total == 0 {
            return ("(empty file)".to_string(), false);
        }

        // Clamp the requested range into [1, total]
        let start = args.start_line.unwrap_or(1).clamp(1, total);
        let end = args.end_line.unwrap_or(total).clamp(start, total);

        let span = end - start + 1;
        let take = span.min(self.limits.read_max_lines);

        let mut out = String::new();
        for (i, line) in lines[start - 1..start - 1 + take].iter().enumerate() {
            out.push_str(&format!("{:>4}│ {}\n", start + i, line));
        }

        if span > take {
            let remaining = span - take;
            out.push_str(&format!(
                "... ({} more lines in range; call read_file with start_line={} to continue)\n",
                remaining,
                start + take
            ));
        }

        (out, false)
    }

    fn file_outline(&self, args: &serde_json::Value) -> (String, bool) {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }

        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("Invalid arguments: {e}"), true),
        };

        let target = match self.resolve(&args.path) {
            Ok(p) => p,
            Err(msg) => return (msg, true),
        };

        if target.is_dir() {
            return (format!("'{}' is a directory, not a file", args.path), true);
        }

        let content = match fs::read_to_string(&target) {
            Ok(c) => c,
            Err(e) => return (format!("Failed to read '{}': {e}", args.path), true),
        };

        let rules = outline_rules();
        let mut out = String::new();
        let mut emitted = 0usize;
        let mut truncated = false;

        for (idx, line) in content.lines().enumerate() {
            let Some((label, _)) = rules.iter().find(|(_, re)| re.is_match(line)) else {
                continue;
            };
            if emitted >= self.limits.outline_max_lines {
                truncated = true;
                break;
            }
            emitted += 1;
            out.push_str(&format!("{:>4}│ [{label}] {}\n", idx + 1, line.trim()));
        }

        if truncated {
            out.push_str("... (truncated)\n");
        }
        if out.is_empty() {
            out.push_str("(no structural lines recognized)\n");
        }

        (out, false)
    }

    /// Resolve a model-supplied path against the repository root.
    ///
    /// The canonicalized result must stay under the canonicalized root;
    /// anything else (including `..` escapes and absolute paths) is refused.
    fn resolve(&self, rel: &str) -> Result<PathBuf, String> {
        let root = self
            .root
            .canonicalize()
            .map_err(|e| format!("Repository root unavailable: {e}"))?;
        let resolved = root
            .join(rel)
            .canonicalize()
            .map_err(|_| format!("Path not found: {rel}"))?;
        if !resolved.starts_with(&root) {
            return Err(format!(
                "Path '{rel}' resolves outside the repository root and was refused"
            ));
        }
        Ok(resolved)
    }
}

/// Find the file section of a diff whose header mentions `path` on either side
fn diff_section(diff: &str, path: &str) -> Option<String> {
    let a_side = format!("a/{path}");
    let b_side = format!("b/{path}");
    let bare_old = format!("--- {path}");
    let bare_new = format!("+++ {path}");

    let mut sections: Vec<Vec<&str>> = Vec::new();
    let has_git_headers = diff.lines().any(|l| l.starts_with("diff --git "));

    for line in diff.lines() {
        let opens_section = if has_git_headers {
            line.starts_with("diff --git ")
        } else {
            line.starts_with("--- ")
                && sections
                    .last()
                    .is_some_and(|s| s.iter().any(|l| l.starts_with("+++ ")))
                || sections.is_empty() && line.starts_with("--- ")
        };
        if opens_section || sections.is_empty() {
            sections.push(Vec::new());
        }
        if let Some(section) = sections.last_mut() {
            section.push(line);
        }
    }

    for section in &sections {
        let header_end = section
            .iter()
            .position(|l| l.starts_with("@@"))
            .unwrap_or(section.len());
        let mentions = section[..header_end].iter().any(|l| {
            l.contains(&a_side) || l.contains(&b_side) || *l == bare_old || *l == bare_new
        });
        if mentions {
            let mut text = section.join("\n");
            text.push('\n');
            return Some(text);
        }
    }

    None
}

/// Ordered structural patterns for the outline tool; first match labels the line
fn outline_rules() -> Vec<(&'static str, Regex)> {
    [
        (
            "import",
            r"^\s*(use\s|import\s|from\s+\S+\s+import\s|#include\b|require\s*\()",
        ),
        ("export", r"^\s*(pub\s|pub\(|export\s)"),
        (
            "type",
            r"^\s*(abstract\s+)?(struct|enum|trait|union|class|interface|type)\s+\w",
        ),
        ("function", r"^\s*(async\s+)?(fn|def|func|function)\s+\w"),
        ("const", r"^\s*(const|static|final)\s+\w"),
        ("module-export", r"^\s*module\.exports"),
    ]
    .into_iter()
    .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
    .collect()
}
