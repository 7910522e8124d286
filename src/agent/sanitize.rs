//! Commit-message extraction from raw model output.
//!
//! Models sometimes prepend analysis or wrap the answer in code fences
//! despite instructions. Extraction is advisory and never destructive: when
//! nothing recognizable is found, the original trimmed text is returned
//! rather than failing the invocation.

use regex::Regex;

/// First-line shape of a conventional commit: `type(scope)!: description`
/// with the type drawn from the fixed vocabulary.
fn commit_line_re() -> Option<Regex> {
    Regex::new(
        r"^(?:feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(?:\([^)]*\))?!?:\s+\S",
    )
    .ok()
}

/// Pull a single well-formed commit message out of whatever the model wrote.
///
/// In order, first match wins: the text as-is when its first line already
/// conforms; the text from the first conforming line onward; both again
/// after stripping surrounding code fences; the trimmed original verbatim.
pub fn extract(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(re) = commit_line_re() else {
        return trimmed.to_string();
    };

    if let Some(found) = extract_from(trimmed, &re) {
        return found;
    }

    let stripped = strip_fences(trimmed);
    let stripped = stripped.trim();
    if stripped != trimmed {
        if let Some(found) = extract_from(stripped, &re) {
            return found;
        }
    }

    trimmed.to_string()
}

fn extract_from(text: &str, re: &Regex) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.first()?;

    if re.is_match(first) {
        return Some(text.to_string());
    }

    let idx = lines.iter().position(|l| re.is_match(l.trim_start()))?;
    let tail: Vec<&str> = lines[idx..]
        .iter()
        .map(|l| l.trim_start())
        .filter(|l| !l.starts_with("```"))
        .collect();
    Some(tail.join("\n").trim_end().to_string())
}

/// Drop a leading and trailing fence line if present
fn strip_fences(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines
        .first()
        .is_some_and(|l| l.trim_start().starts_with("```"))
    {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conforming_text_passes_through_unchanged() {
        let msg = "feat(api): add endpoint\n\nBody text.";
        assert_eq!(extract(msg), msg);
    }

    #[test]
    fn leading_whitespace_is_trimmed() {
        assert_eq!(extract("\n\n  fix: repair parser  \n"), "fix: repair parser");
    }

    #[test]
    fn preamble_before_commit_line_is_dropped() {
        let raw = "Here is the commit message you asked for:\n\nfix(parser): handle empty hunks\n\nThe old code panicked.";
        assert_eq!(
            extract(raw),
            "fix(parser): handle empty hunks\n\nThe old code panicked."
        );
    }

    #[test]
    fn fenced_message_loses_its_fences() {
        let raw = "```\nfeat(api): add endpoint\n\nBody text.\n```";
        assert_eq!(extract(raw), "feat(api): add endpoint\n\nBody text.");
    }

    #[test]
    fn fenced_with_language_tag() {
        let raw = "```text\nchore: bump dependencies\n```";
        assert_eq!(extract(raw), "chore: bump dependencies");
    }

    #[test]
    fn breaking_change_marker_is_recognized() {
        let msg = "feat(core)!: drop legacy config format";
        assert_eq!(extract(msg), msg);
    }

    #[test]
    fn scope_free_type_is_recognized() {
        let msg = "docs: clarify setup steps";
        assert_eq!(extract(msg), msg);
    }

    #[test]
    fn unknown_type_word_is_not_a_commit_line() {
        // "feature:" is not in the type vocabulary; nothing matches, the
        // original comes back verbatim.
        let raw = "feature: this is not conventional";
        assert_eq!(extract(raw), raw);
    }

    #[test]
    fn unparseable_text_returns_verbatim() {
        let raw = "The model refused to answer in the requested format.";
        assert_eq!(extract(raw), raw);
    }

    #[test]
    fn extraction_is_idempotent() {
        let samples = [
            "feat(api): add endpoint\n\nBody text.",
            "Analysis first.\n\nfix: repair the thing\nMore detail.",
            "```\nchore(deps): bump serde\n```",
            "no commit message here at all",
            "",
        ];
        for sample in samples {
            let once = extract(sample);
            let twice = extract(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn conforming_first_line_is_never_shortened() {
        let msg = "refactor(agent): split loop from dispatch\n\nLong body line one.\nLong body line two.";
        let out = extract(msg);
        assert!(out.len() >= msg.trim().len());
        assert_eq!(out, msg);
    }
}
