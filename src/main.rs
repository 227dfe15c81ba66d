//! homelab-stack - 家庭实验室基础设施声明与部署
//!
//! Usage:
//! - List services: `homelab-stack services`
//! - Preview the plan: `homelab-stack preview --format yaml`
//! - Check dependencies: `homelab-stack check`
//! - Provision: `homelab-stack up`
//! - Tear down: `homelab-stack destroy --yes`
//! - Export kubernetes manifests: `homelab-stack manifests`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use homelab_stack::config::{ConfigStore, EnvConfig, StackConfig};
use homelab_stack::domain::apply::{ApplyReport, LogLine, RunStatus, StepStatus};
use homelab_stack::services::apply::{manifests, ApplyContext, Applier};
use homelab_stack::services::catalog::{self, KUBE_SERVICES};
use homelab_stack::services::plan::PlanFormat;
use homelab_stack::services::{check_dependencies, Plan};
use homelab_stack::state::Stack;

#[derive(Parser)]
#[command(name = "homelab-stack")]
#[command(about = "Declare and provision homelab services", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "HOMELAB_CONFIG")]
    config: Option<PathBuf>,

    /// Override `stack.name`
    #[arg(long, global = true)]
    stack: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the service catalog
    Services,

    /// Show the resources and the order they would be created in
    Preview {
        /// table, json or yaml
        #[arg(short, long, default_value = "table")]
        format: PlanFormat,

        /// Print secret values instead of `[secret]`
        #[arg(long)]
        reveal_secrets: bool,
    },

    /// Verify every referenced resource is a declared dependency
    Check,

    /// Create or replace every resource
    Up {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every resource, dependents first
    Destroy {
        /// Confirm the teardown
        #[arg(long)]
        yes: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the kubernetes manifests as multi-document YAML
    Manifests {
        /// Print secret values instead of `[secret]`
        #[arg(long)]
        reveal_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut env = EnvConfig::from_env();
    homelab_stack::init_tracing(cli.verbose, env.log_format);

    if let Some(path) = cli.config.clone() {
        env.config_path = path;
    }

    match cli.command {
        Commands::Services => list_services(&load_config(&env, cli.stack.as_deref())?),
        Commands::Preview {
            format,
            reveal_secrets,
        } => {
            let (stack, plan) = declare(&env, cli.stack.as_deref())?;
            print!("{}", plan.render(&stack, format, reveal_secrets)?);
            Ok(())
        }
        Commands::Check => {
            let config = load_config(&env, cli.stack.as_deref())?;
            let stack = catalog::declare_stack(&config)?;
            let issues = check_dependencies(&stack);
            if issues.is_empty() {
                println!("{} resources, dependencies complete", stack.len());
                return Ok(());
            }
            for issue in &issues {
                println!("{}", issue);
            }
            bail!("{} dependency issues", issues.len())
        }
        Commands::Up { json } => {
            let (stack, plan) = declare(&env, cli.stack.as_deref())?;
            let ctx = context(&env, &stack);
            let report = Applier::from_env(&env).apply(&ctx, &stack, &plan).await;
            finish(&report, json)
        }
        Commands::Destroy { yes, json } => {
            if !yes {
                bail!("destroy removes every container, volume and network of the stack; pass --yes to confirm");
            }
            let (stack, plan) = declare(&env, cli.stack.as_deref())?;
            let ctx = context(&env, &stack);
            let report = Applier::from_env(&env).destroy(&ctx, &stack, &plan).await;
            finish(&report, json)
        }
        Commands::Manifests { reveal_secrets } => {
            let (stack, plan) = declare(&env, cli.stack.as_deref())?;
            print!("{}", manifests(&stack, &plan, reveal_secrets)?);
            Ok(())
        }
    }
}

fn load_config(env: &EnvConfig, stack_name: Option<&str>) -> Result<StackConfig> {
    let mut store = ConfigStore::load_or_env(&env.config_path)
        .with_context(|| format!("loading {}", env.config_path.display()))?;
    if let Some(name) = stack_name {
        store.set("stack.name", name);
    }
    Ok(StackConfig::from_store(store)?)
}

/// Declares the stack and orders it; dependency gaps are warnings here
fn declare(env: &EnvConfig, stack_name: Option<&str>) -> Result<(Stack, Plan)> {
    let config = load_config(env, stack_name)?;
    let stack = catalog::declare_stack(&config)?;
    for issue in check_dependencies(&stack) {
        warn!(%issue, "Dependency issue");
    }
    let plan = Plan::build(&stack)?;
    Ok((stack, plan))
}

/// Execution context cancelled by Ctrl-C; command output goes to the debug log
fn context(env: &EnvConfig, stack: &Stack) -> ApplyContext {
    let (log_tx, mut log_rx) = broadcast::channel::<LogLine>(1024);
    tokio::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(line) => debug!(stream = %line.stream, "{}", line.content),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after running commands stop");
            cancel.cancel();
        }
    });

    ApplyContext::new(stack.name())
        .with_log_channel(log_tx)
        .with_cancel_token(token)
        .with_timeout(Duration::from_secs(env.command_timeout_secs))
}

fn list_services(config: &StackConfig) -> Result<()> {
    println!("{:<18} {:<12} ENABLED", "NAME", "PROVIDER");
    for name in catalog::service_names() {
        let provider = if KUBE_SERVICES.contains(&name) {
            "kubernetes"
        } else {
            "docker"
        };
        let enabled = if config.is_enabled(name) { "yes" } else { "" };
        println!("{:<18} {:<12} {}", name, provider, enabled);
    }
    Ok(())
}

fn finish(report: &ApplyReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for step in &report.steps {
            let duration = step
                .duration_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_default();
            println!(
                "{:<8} {:<40} {:>8} {}",
                step.status.as_str(),
                step.resource.to_string(),
                duration,
                step.message.as_deref().unwrap_or("")
            );
        }
    }

    info!(
        run_id = %report.id,
        succeeded = report.count(StepStatus::Success),
        failed = report.count(StepStatus::Failed),
        skipped = report.count(StepStatus::Skipped),
        "Run complete"
    );

    match report.status {
        RunStatus::Success => Ok(()),
        status => bail!("run {} {}", report.id, status.as_str()),
    }
}
