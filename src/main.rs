use autocommit::agent::{generate_commit_message, GenerateRequest, ProgressSink};
use autocommit::config::Config;
use autocommit::git_ops;
use autocommit::provider::{self, ProviderKind};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

// Exit codes for failures outside the generation engine
const EXIT_NOT_GIT_REPO: u8 = 1;
const EXIT_STAGE_FAILED: u8 = 2;
const EXIT_COMMIT_FAILED: u8 = 20;
const EXIT_UNKNOWN: u8 = 99;

#[derive(Parser, Debug)]
#[command(
    name = "autocommit",
    about = "Generate conventional commit messages with a tool-using LLM agent",
    version
)]
struct Args {
    /// Path to the repository (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// LLM provider: gemini, openai, anthropic, or ollama
    #[arg(short, long)]
    provider: Option<String>,

    /// Specific model to use (optional)
    #[arg(short, long)]
    model: Option<String>,

    /// Commit without confirmation (use with caution)
    #[arg(short = 'y', long)]
    yes: bool,

    /// Only print the generated message to stdout
    #[arg(long)]
    print_only: bool,
}

/// Progress sink that narrates step boundaries on stderr
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn notify(&self, message: &str, _increment_percent: Option<f64>) {
        eprintln!("  {message}...");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> ExitCode {
    if !git_ops::is_git_repo(&args.path) {
        eprintln!("Error: not a git repository. Run this command inside a git repository.");
        return ExitCode::from(EXIT_NOT_GIT_REPO);
    }

    let root = match git_ops::repo_root(&args.path) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_NOT_GIT_REPO);
        }
    };

    if let Err(e) = git_ops::stage_all(&root) {
        eprintln!("Error: failed to stage changes: {e:#}");
        return ExitCode::from(EXIT_STAGE_FAILED);
    }

    let diff = match git_ops::staged_diff(&root) {
        Ok(diff) => diff,
        Err(e) => {
            eprintln!("Error: failed to read staged changes: {e:#}");
            return ExitCode::from(EXIT_UNKNOWN);
        }
    };

    let mut config = Config::load();
    if args.model.is_some() {
        config.model = args.model.clone();
    }

    let provider_name = args
        .provider
        .clone()
        .or_else(|| config.provider.clone())
        .unwrap_or_else(|| "gemini".to_string());
    let Some(kind) = ProviderKind::parse(&provider_name) else {
        eprintln!(
            "Error: provider '{provider_name}' is not supported. Use gemini, openai, anthropic, or ollama."
        );
        return ExitCode::from(EXIT_UNKNOWN);
    };

    let provider = provider::create(kind, &config);
    let request = GenerateRequest {
        diff: &diff,
        repo_root: &root,
        limits: &config.limits,
    };

    eprintln!("  Generating commit message with {}...", kind.name());
    let message = match generate_commit_message(provider.as_ref(), &request, &StderrProgress).await
    {
        Ok(message) => message,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    if args.print_only {
        // Only the message goes to stdout; everything else stays on stderr
        println!("{message}");
        return ExitCode::SUCCESS;
    }

    eprintln!();
    eprintln!("Generated commit message:");
    eprintln!("  ------------------------------------------------------------");
    for line in message.lines() {
        eprintln!("  {line}");
    }
    eprintln!("  ------------------------------------------------------------");

    let should_commit = args.yes || confirm("Commit with this message?");
    if !should_commit {
        eprintln!("Aborted.");
        return ExitCode::SUCCESS;
    }

    match git_ops::commit(&root, &message) {
        Ok(oid) => {
            eprintln!("Committed {}.", &oid[..8.min(oid.len())]);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: failed to commit: {e:#}");
            ExitCode::from(EXIT_COMMIT_FAILED)
        }
    }
}

fn confirm(prompt: &str) -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }
    eprint!("{prompt} [y/N] ");
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
