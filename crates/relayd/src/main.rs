use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use relay_core::config::{load_relay_config_or_default, RelayConfig};
use relay_core::types::{ActionKind, AgentId};
use relay_core::validation::{has_errors, Validate, ValidationIssue, ValidationLevel};
use relay_gateway::HttpGateway;
use relayd::{
    FollowupOutcome, RelayError, RelayService, RunRequest, StderrNotifier,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Run and follow up on remote coding agents")]
struct Cli {
    /// Path to the relay TOML config. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an agent and wait for its result.
    Run(RunArgs),
    /// Send a follow-up to an existing agent and wait for the answer.
    Followup(FollowupArgs),
    /// List repositories agents can work on.
    Targets {
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// List recent agents.
    Agents {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Validate the config and report issues.
    CheckConfig,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_parser = parse_action)]
    action: Option<ActionKind>,
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(required = true, trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[derive(Debug, Args)]
struct FollowupArgs {
    agent_id: String,
    /// Report instead of failing when the agent can no longer take instructions.
    #[arg(long)]
    reusable: bool,
    #[arg(required = true, trailing_var_arg = true)]
    text: Vec<String>,
}

fn parse_action(value: &str) -> Result<ActionKind, String> {
    value.parse()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("relay failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_relay_config_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env_overrides();

    let issues = config.validate();
    if let Command::CheckConfig = cli.command {
        return Ok(check_config(&config, &issues));
    }
    report_issues(&issues);
    if has_errors(&issues) {
        bail!("config at {} is invalid", cli.config.display());
    }

    let service = build_service(&config)?;
    match cli.command {
        Command::Run(args) => run_agent(&service, args).await,
        Command::Followup(args) => followup(&service, args).await,
        Command::Targets { refresh, json } => {
            let targets = if refresh {
                service.refresh_targets().await?
            } else {
                service.list_targets().await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else {
                for (index, target) in targets.iter().enumerate() {
                    println!("{:>3}. {}  {}", index + 1, target.display_name(), target.reference);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Agents { limit, json } => {
            let agents = service.list_agents(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else {
                for (index, agent) in agents.iter().enumerate() {
                    println!("{:>3}. {}  {}  {}", index + 1, agent.id, agent.status, agent.name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckConfig => Ok(ExitCode::SUCCESS),
    }
}

fn build_service(config: &RelayConfig) -> anyhow::Result<RelayService> {
    let api_key = config.api_key()?;
    let gateway = HttpGateway::from_config(config, api_key).context("building agent gateway")?;
    Ok(RelayService::from_config(Arc::new(gateway), config))
}

async fn run_agent(service: &RelayService, args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut request = RunRequest::new(args.prompt.join(" "));
    request.action = args.action;
    request.repository = args.repo;
    request.model = args.model;

    let outcome = service.create_and_wait(request, Some(&StderrNotifier)).await?;
    eprintln!("agent {}", outcome.agent_id);
    finish(&outcome.agent_id, outcome.result)
}

async fn followup(service: &RelayService, args: FollowupArgs) -> anyhow::Result<ExitCode> {
    let agent_id = AgentId::new(args.agent_id);
    let text = args.text.join(" ");
    let outcome = service
        .inject_and_wait(&agent_id, &text, Some(&StderrNotifier), args.reusable)
        .await;
    match outcome {
        Ok(FollowupOutcome::Answered(answer)) => finish(&agent_id, Ok(answer.text)),
        Ok(FollowupOutcome::NeedsNewAgent { status }) => {
            eprintln!(
                "agent {agent_id} is {} and cannot take follow-ups; start a new one with `relay run`",
                status.as_str().to_ascii_lowercase()
            );
            Ok(ExitCode::from(2))
        }
        Err(err) => finish(&agent_id, Err(err)),
    }
}

fn finish(agent_id: &AgentId, result: Result<String, RelayError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(text) if text.trim().is_empty() => {
            eprintln!("agent {agent_id} finished without output");
            Ok(ExitCode::SUCCESS)
        }
        Ok(text) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let advice = err.retry_advice();
            eprintln!("agent {agent_id}: {err} ({})", advice.describe());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        warn!(code = issue.code, level = ?issue.level, "{}", issue.message);
    }
}

fn check_config(config: &RelayConfig, issues: &[ValidationIssue]) -> ExitCode {
    for issue in issues {
        let label = match issue.level {
            ValidationLevel::Error => "error",
            ValidationLevel::Warning => "warning",
        };
        println!("{label}: [{}] {}", issue.code, issue.message);
    }
    if let Err(err) = config.api_key() {
        println!("error: {err}");
        return ExitCode::FAILURE;
    }
    if has_errors(issues) {
        return ExitCode::FAILURE;
    }
    println!("config ok (api {})", config.api.base_url);
    ExitCode::SUCCESS
}
