//! Git operations for the generate-and-commit workflow
//!
//! Provides repository discovery, staging, staged-diff extraction, and commit.

use anyhow::{Context, Result};
use git2::{DiffFormat, IndexAddOption, Repository, Signature};
use std::path::{Path, PathBuf};

/// Check whether `path` is inside a git repository
pub fn is_git_repo(path: &Path) -> bool {
    Repository::discover(path).is_ok()
}

/// Resolve the working-directory root of the repository containing `path`
pub fn repo_root(path: &Path) -> Result<PathBuf> {
    let repo = Repository::discover(path)?;
    repo.workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("Repository has no working directory"))
}

/// Stage all modified files
pub fn stage_all(repo_path: &Path) -> Result<()> {
    let repo = Repository::discover(repo_path)?;
    let mut index = repo.index()?;

    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;

    Ok(())
}

/// Render the staged changes (HEAD vs index) as unified diff text.
///
/// An unborn HEAD diffs the index against an empty tree, so the first
/// commit of a repository works like any other.
pub fn staged_diff(repo_path: &Path) -> Result<String> {
    let repo = Repository::discover(repo_path)?;

    let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
    let diff = repo
        .diff_tree_to_index(head_tree.as_ref(), None, None)
        .context("Failed to diff HEAD against the index")?;

    let mut buf = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if let Ok(text) = std::str::from_utf8(line.content()) {
            match line.origin() {
                '+' | '-' | ' ' => buf.push(line.origin()),
                _ => {}
            }
            buf.push_str(text);
        }
        true
    })
    .context("Failed to render staged diff")?;

    Ok(buf)
}

/// Commit staged changes
pub fn commit(repo_path: &Path, message: &str) -> Result<String> {
    let repo = Repository::discover(repo_path)?;
    let mut index = repo.index()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(_) => None,
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    // Get author info from git config
    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "autocommit".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "autocommit@local".to_string());

    let sig = Signature::now(&name, &email)?;

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

    Ok(oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "tester").unwrap();
            config.set_str("user.email", "tester@local").unwrap();
        }
        repo
    }

    #[test]
    fn detects_git_repo() {
        let dir = tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
        init_repo(dir.path());
        assert!(is_git_repo(dir.path()));
    }

    #[test]
    fn staged_diff_covers_new_file() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("hello.txt"), "hello world\n").unwrap();

        stage_all(dir.path()).unwrap();
        let diff = staged_diff(dir.path()).unwrap();

        assert!(diff.contains("hello.txt"));
        assert!(diff.contains("+hello world"));
    }

    #[test]
    fn staged_diff_empty_without_changes() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());

        let diff = staged_diff(dir.path()).unwrap();
        assert!(diff.trim().is_empty());
    }

    #[test]
    fn commit_creates_head() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();

        stage_all(dir.path()).unwrap();
        let oid = commit(dir.path(), "chore: initial import").unwrap();

        assert!(!oid.is_empty());
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message().unwrap().trim(), "chore: initial import");

        // A second commit gets the first as parent
        fs::write(dir.path().join("a.txt"), "b\n").unwrap();
        stage_all(dir.path()).unwrap();
        commit(dir.path(), "fix: adjust contents").unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.parent_count(), 1);
    }
}
