//! Diff and repository context for the agent briefing
//!
//! Parses a unified diff into a per-file change table and renders a bounded
//! view of the repository layout. The briefing built from the two is
//! deliberately information-poor: the model is told what changed, not how,
//! so it has to inspect the repository through tools before classifying.

use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// How a file changed according to the staged diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        }
    }
}

/// One file's entry in the change table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// The staged diff plus its derived per-file change table.
///
/// Built once per invocation and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub diff: String,
    pub files: Vec<FileChange>,
}

/// Parser state for one file section of the diff
#[derive(Debug, Default)]
struct PendingFile {
    header_old: Option<String>,
    header_new: Option<String>,
    /// Path from the `---` line, None when that side is /dev/null
    old: Option<String>,
    /// Path from the `+++` line, None when that side is /dev/null
    new: Option<String>,
    seen_old_marker: bool,
    seen_new_marker: bool,
    lines_added: usize,
    lines_removed: usize,
}

impl PendingFile {
    fn finish(self) -> Option<FileChange> {
        // Prefer the ---/+++ sides; fall back to the `diff --git` header for
        // sections without hunks (mode changes, binary files).
        let (old, new) = if self.seen_old_marker || self.seen_new_marker {
            (self.old, self.new)
        } else {
            (self.header_old.clone(), self.header_new.clone())
        };

        let (path, kind) = match (&old, &new) {
            (None, Some(p)) => (p.clone(), ChangeKind::Added),
            (Some(p), None) => (p.clone(), ChangeKind::Deleted),
            (Some(a), Some(b)) if a != b => (b.clone(), ChangeKind::Renamed),
            (Some(_), Some(b)) => (b.clone(), ChangeKind::Modified),
            (None, None) => return None,
        };

        Some(FileChange {
            path,
            kind,
            lines_added: self.lines_added,
            lines_removed: self.lines_removed,
        })
    }
}

impl ChangeSet {
    /// Parse a unified diff into the per-file change table.
    ///
    /// File sections begin at `diff --git` headers; plain concatenated
    /// unified diffs (no git header) are sectioned on their `---`/`+++`
    /// pairs instead. Added and removed counts exclude the two header lines
    /// of each section.
    pub fn parse(diff: &str) -> Self {
        let mut files = Vec::new();
        let mut current: Option<PendingFile> = None;

        for line in diff.lines() {
            if let Some(rest) = line.strip_prefix("diff --git ") {
                if let Some(done) = current.take().and_then(PendingFile::finish) {
                    files.push(done);
                }
                let (old, new) = split_git_header(rest);
                current = Some(PendingFile {
                    header_old: old,
                    header_new: new,
                    ..PendingFile::default()
                });
                continue;
            }

            if let Some(rest) = line.strip_prefix("--- ") {
                let start_new_section = match &current {
                    None => true,
                    // A second `---` inside a git-headerless diff opens the
                    // next file section.
                    Some(cur) => cur.header_old.is_none() && cur.seen_old_marker,
                };
                if start_new_section {
                    if let Some(done) = current.take().and_then(PendingFile::finish) {
                        files.push(done);
                    }
                    current = Some(PendingFile::default());
                }
                if let Some(cur) = current.as_mut() {
                    if !cur.seen_old_marker {
                        cur.old = parse_side(rest);
                        cur.seen_old_marker = true;
                        continue;
                    }
                }
            }

            if let Some(rest) = line.strip_prefix("+++ ") {
                if let Some(cur) = current.as_mut() {
                    if !cur.seen_new_marker {
                        cur.new = parse_side(rest);
                        cur.seen_new_marker = true;
                        continue;
                    }
                }
            }

            if let Some(cur) = current.as_mut() {
                if line.starts_with('+') {
                    cur.lines_added += 1;
                } else if line.starts_with('-') {
                    cur.lines_removed += 1;
                }
            }
        }

        if let Some(done) = current.take().and_then(PendingFile::finish) {
            files.push(done);
        }

        Self {
            diff: diff.to_string(),
            files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Split the `a/OLD b/NEW` remainder of a `diff --git` header
fn split_git_header(rest: &str) -> (Option<String>, Option<String>) {
    if let Some(pos) = rest.find(" b/") {
        let old = rest[..pos].trim_start_matches("a/").to_string();
        let new = rest[pos + 3..].to_string();
        (Some(old), Some(new))
    } else {
        (None, None)
    }
}

/// Parse one side of a `---`/`+++` marker; the null device means the file
/// does not exist on that side.
fn parse_side(rest: &str) -> Option<String> {
    let mut path = rest.trim();
    // Strip a timestamp suffix some diff producers append
    if let Some(tab) = path.find('\t') {
        path = &path[..tab];
    }
    if path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

/// Directories never worth showing the model
const NOISE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".next",
];

/// A bounded textual rendering of the repository's file layout.
///
/// Depth-first, directories before files, each level alphabetical, truncated
/// past a file-count ceiling. Built once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct RepositoryTree {
    text: String,
    pub file_count: usize,
    pub truncated: bool,
}

impl RepositoryTree {
    pub fn build(root: &Path, max_depth: usize, max_files: usize) -> Self {
        let mut text = String::new();
        let mut file_count = 0usize;
        let mut truncated = false;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth.max(1))
            .sort_by(|a, b| {
                b.file_type()
                    .is_dir()
                    .cmp(&a.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_entry(|e| !is_noise(e));

        for entry in walker.flatten() {
            let name = entry.file_name().to_string_lossy();
            let indent = "  ".repeat(entry.depth().saturating_sub(1));
            if entry.file_type().is_dir() {
                text.push_str(&format!("{indent}{name}/\n"));
            } else {
                if file_count >= max_files {
                    truncated = true;
                    break;
                }
                file_count += 1;
                text.push_str(&format!("{indent}{name}\n"));
            }
        }

        if truncated {
            text.push_str("... (truncated)\n");
        }

        Self {
            text,
            file_count,
            truncated,
        }
    }

    pub fn as_text(&self) -> &str {
        &self.text
    }
}

fn is_noise(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && NOISE_DIRS.contains(&name.as_ref()) {
        return true;
    }
    name.starts_with('.')
}

/// Render the initial briefing for the agent.
///
/// The briefing names the changed files and the repository layout but none
/// of the actual content, then tells the model to go look before deciding.
pub fn build_briefing(changes: &ChangeSet, tree: &RepositoryTree) -> String {
    let mut out = String::new();

    out.push_str("## Staged changes\n\n");
    out.push_str("| file | change | lines |\n");
    out.push_str("|------|--------|-------|\n");
    for file in &changes.files {
        out.push_str(&format!(
            "| {} | {} | +{}/-{} |\n",
            file.path,
            file.kind.label(),
            file.lines_added,
            file.lines_removed
        ));
    }

    out.push_str("\n## Repository layout\n\n");
    out.push_str(tree.as_text());

    out.push_str(
        "\nYou have NOT seen the contents of these changes yet. Call get_diff \
         on the files above, and read_file or get_file_outline where the \
         surrounding code matters, before choosing a commit type and scope. \
         When you are confident, reply with the commit message alone.\n",
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MODIFY_DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 fn existing() {}
-fn old() {}
+fn new_one() {}
+fn extra() {}
";

    #[test]
    fn parse_modified_file_counts_lines() {
        let set = ChangeSet::parse(MODIFY_DIFF);
        assert_eq!(set.files.len(), 1);
        let file = &set.files[0];
        assert_eq!(file.path, "src/lib.rs");
        assert_eq!(file.kind, ChangeKind::Modified);
        assert_eq!(file.lines_added, 2);
        assert_eq!(file.lines_removed, 1);
    }

    #[test]
    fn parse_added_file() {
        let diff = "\
diff --git a/docs/guide.md b/docs/guide.md
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/docs/guide.md
@@ -0,0 +1,2 @@
+# Guide
+Welcome.
";
        let set = ChangeSet::parse(diff);
        assert_eq!(set.files.len(), 1);
        assert_eq!(set.files[0].kind, ChangeKind::Added);
        assert_eq!(set.files[0].path, "docs/guide.md");
        assert_eq!(set.files[0].lines_added, 2);
        assert_eq!(set.files[0].lines_removed, 0);
    }

    #[test]
    fn parse_deleted_file() {
        let diff = "\
diff --git a/old.txt b/old.txt
deleted file mode 100644
--- a/old.txt
+++ /dev/null
@@ -1,1 +0,0 @@
-goodbye
";
        let set = ChangeSet::parse(diff);
        assert_eq!(set.files[0].kind, ChangeKind::Deleted);
        assert_eq!(set.files[0].path, "old.txt");
        assert_eq!(set.files[0].lines_removed, 1);
    }

    #[test]
    fn parse_renamed_file() {
        let diff = "\
diff --git a/src/old_name.rs b/src/new_name.rs
--- a/src/old_name.rs
+++ b/src/new_name.rs
@@ -1,1 +1,1 @@
-fn a() {}
+fn b() {}
";
        let set = ChangeSet::parse(diff);
        assert_eq!(set.files[0].kind, ChangeKind::Renamed);
        assert_eq!(set.files[0].path, "src/new_name.rs");
    }

    #[test]
    fn parse_multiple_files() {
        let diff = format!(
            "{}diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1 @@\n-old\n+new\n",
            MODIFY_DIFF
        );
        let set = ChangeSet::parse(&diff);
        assert_eq!(set.files.len(), 2);
        assert_eq!(set.files[1].path, "README.md");
        assert_eq!(set.files[1].lines_added, 1);
        assert_eq!(set.files[1].lines_removed, 1);
    }

    #[test]
    fn parse_plain_unified_diff_without_git_headers() {
        let diff = "\
--- a/one.txt
+++ b/one.txt
@@ -1 +1 @@
-x
+y
--- a/two.txt
+++ b/two.txt
@@ -1 +1,2 @@
 keep
+more
";
        let set = ChangeSet::parse(diff);
        assert_eq!(set.files.len(), 2);
        assert_eq!(set.files[0].path, "one.txt");
        assert_eq!(set.files[1].path, "two.txt");
        assert_eq!(set.files[1].lines_added, 1);
    }

    #[test]
    fn empty_diff_has_no_files() {
        let set = ChangeSet::parse("");
        assert!(set.is_empty());
    }

    #[test]
    fn header_lines_are_not_counted() {
        let set = ChangeSet::parse(MODIFY_DIFF);
        // The ---/+++ markers must not count toward added/removed.
        assert_eq!(set.files[0].lines_added, 2);
        assert_eq!(set.files[0].lines_removed, 1);
    }

    #[test]
    fn tree_renders_dirs_before_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# Test").unwrap();

        let tree = RepositoryTree::build(dir.path(), 3, 100);
        let text = tree.as_text();
        let src_pos = text.find("src/").unwrap();
        let readme_pos = text.find("README.md").unwrap();
        assert!(src_pos < readme_pos);
        assert!(text.contains("main.rs"));
        assert_eq!(tree.file_count, 2);
        assert!(!tree.truncated);
    }

    #[test]
    fn tree_skips_noise_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/pkg.js"), "x").unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let tree = RepositoryTree::build(dir.path(), 3, 100);
        assert!(!tree.as_text().contains("node_modules"));
        assert!(tree.as_text().contains("kept.txt"));
    }

    #[test]
    fn tree_truncates_past_file_ceiling() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("file{i:02}.txt")), "x").unwrap();
        }

        let tree = RepositoryTree::build(dir.path(), 2, 4);
        assert!(tree.truncated);
        assert_eq!(tree.file_count, 4);
        assert!(tree.as_text().contains("... (truncated)"));
    }

    #[test]
    fn briefing_mentions_files_and_instruction() {
        let set = ChangeSet::parse(MODIFY_DIFF);
        let dir = tempdir().unwrap();
        let tree = RepositoryTree::build(dir.path(), 2, 10);

        let briefing = build_briefing(&set, &tree);
        assert!(briefing.contains("src/lib.rs"));
        assert!(briefing.contains("modified"));
        assert!(briefing.contains("+2/-1"));
        assert!(briefing.contains("NOT seen"));
        assert!(briefing.contains("get_diff"));
    }
}
