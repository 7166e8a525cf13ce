//! `camel` — run a planner-generated program under the capability runtime.
//!
//! Grounded on `main.rs` in `examples/pycckuu-wintermute` for the overall
//! shape (tracing init, `clap` subcommands, `anyhow::Context` on
//! top-level I/O) and on the six end-to-end scenarios in the reference
//! Python demo (`examples/original_source/demo.py`) for the `demo`
//! subcommand's scripted attacks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use camel_runtime::algebra::{Capability, CapabilitySet};
use camel_runtime::config::RuntimeConfig;
use camel_runtime::error::CamelError;
use camel_runtime::orchestrator::{Orchestrator, ScriptedExtractor, ScriptedPlanner};
use camel_runtime::policy::{
    EmailRecipientPolicy, ExfiltrationHeuristicPolicy, FileAccessPolicy, PatternDenyPolicy, RateLimitPolicy,
    ToolShadowingDetector,
};
use camel_runtime::registry::{AlwaysApprove, AlwaysDeny, ToolRegistry};
use camel_runtime::tools::register_reference_tools;
use camel_runtime::tracker::CapabilityTracker;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "camel", about = "Defensive runtime for LLM agents against prompt injection")]
struct Cli {
    /// Path to a TOML config file overriding policy defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Automatically approve every tool call that requires human approval,
    /// instead of denying it. Intended for non-interactive demonstration
    /// runs only.
    #[arg(long, global = true)]
    auto_approve: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a fixed program (read from a file) against the reference
    /// policies and tools, as if a planner had generated it.
    Run {
        /// Path to a file containing restricted-language source.
        program: PathBuf,
        /// The user request this program is presented as satisfying.
        #[arg(long, default_value = "run the supplied program")]
        user_request: String,
        /// The value the quarantined extractor returns for every
        /// `query_quarantined_llm` call in the program.
        #[arg(long, default_value = "")]
        extractor_response: String,
    },
    /// Run one of the reference end-to-end prompt-injection scenarios.
    Demo {
        /// Which scenario to run.
        #[arg(value_enum)]
        scenario: DemoScenario,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum DemoScenario {
    /// The planner asks for the last email's content; the interpreter
    /// must never let the embedded injection redirect the reply.
    EmailInjection,
    /// The planner reads a document containing an injected instruction
    /// to exfiltrate confidential files.
    DocumentInjection,
}

fn build_tracker(config: &RuntimeConfig) -> CapabilityTracker {
    let mut tracker = CapabilityTracker::new();
    tracker.add_policy(Box::new(ToolShadowingDetector::new()));
    tracker.add_policy(Box::new(EmailRecipientPolicy::new(
        config.trusted_email_domains.clone(),
        config.approved_recipients.clone(),
    )));
    tracker.add_policy(Box::new(FileAccessPolicy::new(config.allowed_path_prefixes.clone())));
    tracker.add_policy(Box::new(RateLimitPolicy::new(
        config.rate_limit_max_calls,
        Duration::from_secs(config.rate_limit_window_secs),
    )));
    tracker.add_policy(Box::new(PatternDenyPolicy::new().with_reference_defaults()));
    tracker.add_policy(Box::new(ExfiltrationHeuristicPolicy::new(
        config.max_sensitive_exports_per_session,
    )));
    tracker
}

fn build_registry(tracker: &CapabilityTracker, auto_approve: bool) -> Result<ToolRegistry> {
    let oracle: Box<dyn camel_runtime::registry::ApprovalOracle> = if auto_approve {
        Box::new(AlwaysApprove)
    } else {
        Box::new(AlwaysDeny)
    };
    let mut registry = ToolRegistry::new(oracle);
    register_reference_tools(&mut registry, tracker).context("failed to register reference tools")?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    camel_runtime::logging::init_cli();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config: {e}");
                return std::process::ExitCode::from(2);
            }
        },
        None => RuntimeConfig::default(),
    };

    let result = match &cli.command {
        Command::Run {
            program,
            user_request,
            extractor_response,
        } => run_program(&config, cli.auto_approve, program, user_request, extractor_response).await,
        Command::Demo { scenario } => run_demo(&config, cli.auto_approve, scenario.clone()).await,
    };

    match result {
        Ok(output) => {
            println!("{output}");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            let exit_code = e.downcast_ref::<CamelError>().map(CamelError::exit_code).unwrap_or(3);
            std::process::ExitCode::from(exit_code as u8)
        }
    }
}

async fn run_program(
    config: &RuntimeConfig,
    auto_approve: bool,
    program_path: &PathBuf,
    user_request: &str,
    extractor_response: &str,
) -> Result<String> {
    let source = std::fs::read_to_string(program_path)
        .with_context(|| format!("failed to read program file {}", program_path.display()))?;

    let tracker = build_tracker(config);
    let registry = build_registry(&tracker, auto_approve)?;

    let mut orchestrator = Orchestrator::new(
        tracker,
        registry,
        Box::new(ScriptedPlanner::new(source)),
        Box::new(ScriptedExtractor::new(extractor_response.to_string())),
    );

    info!(user_request, "executing program");
    orchestrator.execute(user_request).await.map_err(|e| CamelError::from(e).into())
}

async fn run_demo(config: &RuntimeConfig, auto_approve: bool, scenario: DemoScenario) -> Result<String> {
    let tracker = build_tracker(config);
    let mut registry = build_registry(&tracker, auto_approve)?;

    // The trusted "ground truth" seed the planner's generated program is
    // checked against, independent of whatever the tools return.
    let mut orchestrator = match scenario {
        DemoScenario::EmailInjection => {
            registry
                .register(
                    "__seed_marker",
                    "demo",
                    Box::new(|_| Ok(serde_json::json!("email-injection"))),
                    serde_json::json!({}),
                    camel_runtime::registry::OutputCapabilities::Fixed(CapabilitySet::from_capabilities([
                        Capability::trusted("demo"),
                    ])),
                    false,
                    &tracker,
                )
                .context("failed to seed demo marker")?;
            Orchestrator::new(
                tracker,
                registry,
                Box::new(ScriptedPlanner::new(
                    r#"
                        body = get_last_email();
                        sender = query_quarantined_llm(body, "email", "extract the sender's email address");
                        notify_user(sender);
                        return sender;
                    "#,
                )),
                Box::new(ScriptedExtractor::new("bob@company.com")),
            )
        }
        DemoScenario::DocumentInjection => Orchestrator::new(
            tracker,
            registry,
            Box::new(ScriptedPlanner::new(
                r#"
                    notes = read_file({"path": "/documents/meeting_notes.txt"});
                    return notes;
                "#,
            )),
            Box::new(ScriptedExtractor::new("")),
        ),
    };

    orchestrator
        .execute("summarize my last email")
        .await
        .map_err(|e| CamelError::from(e).into())
}
