use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use council::artifacts::FsArtifactStore;
use council::beads::BeadsCli;
use council::config::CouncilConfig;
use council::engine::Engine;
use council::events::EngineEvent;
use council::probe::probe_providers;
use council::provider::{default_table, ProviderName};
use council::repo_context::{RepoContext, RepoContextConfig};

#[derive(Parser)]
#[command(name = "council", version, about = "Multi-agent council over a beads issue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full council session (research, critique, synthesis rounds).
    Consult(ConsultArgs),
    /// Single-shot plan from one provider, no deliberation.
    Oracle(OracleArgs),
    /// Check that every provider CLI responds end to end.
    Probe {
        /// Per-provider timeout in seconds.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Check that required external binaries are on PATH.
    Doctor,
    /// Tail an issue's comment feed.
    Watch {
        issue_id: String,
        /// Poll cadence in seconds.
        #[arg(long, default_value_t = 5)]
        poll: u64,
        /// Beads database path (defaults to COUNCIL_BD_DB or bd's own default).
        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Args)]
struct ConsultArgs {
    /// The question or task to deliberate.
    prompt: String,
    /// Reuse an existing issue instead of creating one.
    #[arg(long)]
    issue: Option<String>,
    #[arg(long, default_value_t = 5)]
    max_rounds: u32,
    /// Local "still running" log cadence in seconds (0 disables).
    #[arg(long, default_value_t = 15)]
    heartbeat: u64,
    /// Heartbeat comment cadence in seconds (0 disables).
    #[arg(long, default_value_t = 60)]
    beads_heartbeat: u64,
    /// Cap on heartbeat comments per provider run.
    #[arg(long, default_value_t = 5)]
    beads_heartbeat_max: u32,
    /// Per-provider timeout in seconds.
    #[arg(long, default_value_t = 600)]
    timeout: u64,
    /// How long to wait for a tagged user reply when questions are raised
    /// (0 disables pauses).
    #[arg(long, default_value_t = 60)]
    user_wait: u64,
    /// Session-wide budget of user-wait pauses.
    #[arg(long, default_value_t = 2)]
    max_user_waits: u32,
    /// Poll cadence while waiting for a user reply, in seconds.
    #[arg(long, default_value_t = 2)]
    poll: u64,
    /// Skip attaching scoped repo context to prompts.
    #[arg(long)]
    no_repo_context: bool,
    /// Beads database path (defaults to COUNCIL_BD_DB or bd's own default).
    #[arg(long)]
    db: Option<String>,
}

#[derive(Args)]
struct OracleArgs {
    /// The question or task to plan.
    prompt: String,
    /// Which provider answers.
    #[arg(long, default_value = "codex")]
    provider: String,
    /// Reuse an existing issue instead of creating one.
    #[arg(long)]
    issue: Option<String>,
    #[arg(long, default_value_t = 600)]
    timeout: u64,
    #[arg(long)]
    no_repo_context: bool,
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Consult(args) => consult(args).await,
        Command::Oracle(args) => oracle(args).await,
        Command::Probe { timeout } => probe(timeout).await,
        Command::Doctor => doctor().await,
        Command::Watch { issue_id, poll, db } => watch(&issue_id, poll, db).await,
    }
}

async fn consult(args: ConsultArgs) -> Result<()> {
    let config = CouncilConfig {
        max_rounds: args.max_rounds,
        heartbeat_seconds: args.heartbeat,
        beads_heartbeat_seconds: args.beads_heartbeat,
        beads_heartbeat_max: args.beads_heartbeat_max,
        timeout_seconds: args.timeout,
        user_wait_seconds: args.user_wait,
        max_user_waits: args.max_user_waits,
        user_poll_seconds: args.poll,
        repo_context_enabled: !args.no_repo_context,
        repo_context: RepoContextConfig::default(),
    };

    let store = Arc::new(beads(args.db));
    let issue_id = match args.issue {
        Some(id) => id,
        None => {
            let id = store
                .create_issue(
                    &format!("Council: {}", truncate(&args.prompt, 72)),
                    &args.prompt,
                    &["council"],
                    Some("2"),
                )
                .await?;
            info!(issue = %id, "created session issue");
            id
        }
    };

    let context_config = config.repo_context.clone();
    let engine = Engine::new(
        issue_id.clone(),
        args.prompt,
        config,
        store,
        default_table(),
        Arc::new(FsArtifactStore::default()),
    )?
    .with_context(Arc::new(RepoContext::new(context_config)))
    .with_event_sink(print_event);

    println!("Council session on issue {issue_id}");
    engine.run().await?;
    println!("Done. Transcript: bd comments {issue_id}");
    Ok(())
}

async fn oracle(args: OracleArgs) -> Result<()> {
    let provider = ProviderName::parse(&args.provider)
        .with_context(|| format!("unknown provider `{}` (codex|claude|gemini)", args.provider))?;

    let config = CouncilConfig {
        timeout_seconds: args.timeout,
        user_wait_seconds: 0,
        repo_context_enabled: !args.no_repo_context,
        ..CouncilConfig::default()
    };

    let store = Arc::new(beads(args.db));
    let issue_id = match args.issue {
        Some(id) => id,
        None => {
            store
                .create_issue(
                    &format!("Plan: {}", truncate(&args.prompt, 72)),
                    &args.prompt,
                    &["council", "plan"],
                    Some("2"),
                )
                .await?
        }
    };

    let context_config = config.repo_context.clone();
    let engine = Engine::new(
        issue_id.clone(),
        args.prompt.clone(),
        config,
        store,
        default_table(),
        Arc::new(FsArtifactStore::default()),
    )?
    .with_context(Arc::new(RepoContext::new(context_config)))
    .with_event_sink(print_event);

    println!("Plan mode on issue {issue_id} (provider: {provider})");
    engine.run_oracle(provider, &plan_prompt(&args.prompt)).await?;
    println!("Done. Transcript: bd comments {issue_id}");
    Ok(())
}

/// Single-shot planning prompt: the answer must arrive as one machine-usable
/// plan artifact alongside the normal response fields.
fn plan_prompt(user_prompt: &str) -> String {
    [
        "Produce an implementation plan for the task below.",
        "Attach EXACTLY ONE artifact with type=\"beads_issue_plan\",",
        "suggested_filename=\"beads_issue_plan.json\", mime=\"application/json\".",
        "Its content must be a JSON object: {\"title\": string, \"summary\": string,",
        " \"issues\": [{\"title\": string, \"description\": string,",
        "   \"priority\": 0|1|2|3, \"dependencies\": [string, ...]}]}",
        "where dependencies reference earlier issue titles in the same list.",
        "",
        "Task:",
        user_prompt,
    ]
    .join("\n")
}

async fn probe(timeout: u64) -> Result<()> {
    let table = default_table();
    let reports = probe_providers(&table, Duration::from_secs(timeout)).await;
    let mut failures = 0;
    for report in &reports {
        let status = if report.ok { "ok  " } else { "FAIL" };
        println!("{status} {:<8} {:>6}ms  {}", report.provider, report.elapsed_ms, first_line(&report.detail));
        if !report.ok {
            failures += 1;
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} provider(s) failed the probe");
    }
    Ok(())
}

async fn doctor() -> Result<()> {
    let mut missing = 0;
    for (bin, arg) in [
        ("bd", "--version"),
        ("codex", "--version"),
        ("claude", "--version"),
        ("gemini", "--version"),
        ("rg", "--version"),
        ("git", "--version"),
    ] {
        let found = tokio::process::Command::new(bin)
            .arg(arg)
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false);
        println!("{} {bin}", if found { "ok  " } else { "MISS" });
        if !found {
            missing += 1;
        }
    }
    if missing > 0 {
        anyhow::bail!("{missing} required binaries missing");
    }
    Ok(())
}

async fn watch(issue_id: &str, poll: u64, db: Option<String>) -> Result<()> {
    let store = beads(db);
    let mut shown = String::new();
    loop {
        let text = store.comments_text(issue_id).await?;
        if text.len() > shown.len() && text.starts_with(&shown) {
            print!("{}", &text[shown.len()..]);
            shown = text;
        } else if text != shown {
            // The feed was rewritten (or this is the first read); reprint.
            print!("{text}");
            shown = text;
        }
        tokio::time::sleep(Duration::from_secs(poll.max(1))).await;
    }
}

fn beads(db: Option<String>) -> BeadsCli {
    match db {
        Some(db) => BeadsCli::new().with_db(db),
        None => BeadsCli::new(),
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::PhaseStarted { round, phase, .. } => {
            eprintln!("▶ round {round} {phase}");
        }
        EngineEvent::PhaseFinished { round, phase, .. } => {
            eprintln!("■ round {round} {phase} done");
        }
        EngineEvent::ProviderStarted { provider, .. } => {
            eprintln!("  {provider} running...");
        }
        EngineEvent::ProviderFinished { provider, elapsed_ms, ok, error, .. } => {
            if *ok {
                eprintln!("  {provider} finished in {}s", elapsed_ms / 1000);
            } else {
                let detail = error.as_deref().unwrap_or("unknown error");
                eprintln!("  {provider} FAILED: {}", first_line(detail));
            }
        }
        EngineEvent::WaitingForUser { timeout_seconds, waits_used, waits_max, questions, .. } => {
            eprintln!(
                "? waiting {timeout_seconds}s for a **USER** comment ({waits_used}/{waits_max}); {} question(s)",
                questions.len()
            );
        }
        EngineEvent::UserInputReceived { .. } => eprintln!("? user reply received"),
        EngineEvent::UserInputTimedOut { .. } => eprintln!("? no user reply; continuing"),
        EngineEvent::CommentPosted { .. } => {}
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
