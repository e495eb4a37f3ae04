//! The `entity` binary: thin adapter from the command line onto the kernel
//! library. Exit codes: 0 on success, 1 on any verification failure or
//! terminal status.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use entity_cli::Kernel;
use entity_types::ops::TemplateKind;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "entity", about = "Autonomous self-regulating entity runtime")]
struct Cli {
    /// Base directory of the entity. Defaults to ENTITY_HOME, then the
    /// current directory.
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Instantiate a fresh entity from the spec/ documents under the base.
    Init {
        /// Specification identifier.
        #[arg(long, default_value = "entity/1.0")]
        specification: String,
        /// Label of the instantiating caller.
        #[arg(long, default_value = "operator")]
        by: String,
        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Run all invariant checks and record the outcome.
    Verify,
    /// Run all invariant checks without recording anything.
    VerifyReadonly,
    /// Print a status summary.
    Status,
    /// Start a coupling session.
    SessionStart {
        /// Opaque partner label.
        partner: String,
    },
    /// Queue a coupling request for the entity to serve later.
    CouplingRequest {
        /// Opaque partner label.
        partner: String,
    },
    /// End the active coupling session.
    SessionEnd,
    /// Recharge energy.
    Recharge {
        /// Amount in [0, 1]; defaults to the catalog default.
        #[arg(long)]
        amount: Option<f64>,
    },
    /// Execute a catalog or ACTIVE generated operation.
    OpExec {
        /// Dotted operation identifier.
        id: String,
        /// JSON parameters.
        #[arg(long, default_value = "null")]
        params: String,
    },
    /// Force one agent cycle.
    AgentCycle,
    /// Wake the agent.
    AgentWake,
    /// Put the agent to sleep.
    AgentSleep,
    /// Run the agent daemon until interrupted.
    Run,
    /// Create a snapshot bundle.
    SnapshotCreate {
        /// Description of the snapshot.
        description: String,
    },
    /// List snapshot bundles.
    SnapshotList,
    /// Restore the state cache from a snapshot bundle.
    SnapshotRestore {
        /// Snapshot identifier.
        id: String,
    },
    /// Define a generated operation from a template.
    MetaDefine {
        /// New operation identifier.
        id: String,
        /// Template tag (read_field, set_field, compose, conditional,
        /// transform, aggregate, echo).
        template: String,
        /// JSON template parameters.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Energy cost.
        #[arg(long, default_value_t = 0.005)]
        energy_cost: f64,
        /// Require an active coupling session.
        #[arg(long)]
        requires_coupling: bool,
    },
    /// Compose existing operations into a bundle.
    MetaCompose {
        /// New operation identifier.
        id: String,
        /// Component operation identifiers, in order.
        #[arg(required = true)]
        components: Vec<String>,
    },
    /// Specialize an existing operation with preset parameters.
    MetaSpecialize {
        /// Source operation identifier.
        source: String,
        /// New operation identifier.
        id: String,
        /// JSON preset parameters.
        #[arg(long, default_value = "{}")]
        preset: String,
        /// Energy cost; must not exceed the source's.
        #[arg(long)]
        energy_cost: Option<f64>,
    },
    /// Run the recovery engine.
    Recover,
    /// Rebuild the state cache from full replay.
    Rebuild,
}

fn base_dir(cli: &Cli) -> PathBuf {
    cli.base
        .clone()
        .or_else(|| std::env::var_os("ENTITY_HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("invalid JSON: {text}"))
}

fn parse_template(tag: &str) -> Result<TemplateKind> {
    serde_json::from_value(Value::String(tag.to_string()))
        .map_err(|_| anyhow!("unknown template tag: {tag}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() {
    if let Err(e) = entity_telemetry::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn dispatch(cli: &Cli) -> Result<i32> {
    let base = base_dir(cli);

    if let Command::Init {
        specification,
        by,
        name,
    } = &cli.command
    {
        let kernel = Kernel::instantiate(&base, specification, by, name.as_deref())?;
        print_json(&kernel.status()?)?;
        return Ok(0);
    }

    let kernel = Kernel::open(&base)?;
    match &cli.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Verify => {
            let (report, state) = kernel.verify()?;
            print_json(&report)?;
            let code = if report.passed
                && state.integrity.status != entity_types::state::IntegrityStatus::Terminal
            {
                0
            } else {
                1
            };
            Ok(code)
        }
        Command::VerifyReadonly => {
            let report = kernel.verify_readonly()?;
            print_json(&report)?;
            Ok(if report.passed { 0 } else { 1 })
        }
        Command::Status => {
            let status = kernel.status()?;
            print_json(&status)?;
            Ok(status.exit_code())
        }
        Command::SessionStart { partner } => {
            let state = kernel.session_start(partner)?;
            print_json(&state.coupling)?;
            Ok(0)
        }
        Command::CouplingRequest { partner } => {
            let state = kernel.coupling_request(partner)?;
            print_json(&state.coupling_requests)?;
            Ok(0)
        }
        Command::SessionEnd => {
            let state = kernel.session_end()?;
            print_json(&state.session)?;
            Ok(0)
        }
        Command::Recharge { amount } => {
            let (outcome, _) = kernel.recharge(*amount)?;
            print_json(&outcome)?;
            Ok(0)
        }
        Command::OpExec { id, params } => {
            let params = parse_json(params)?;
            let (outcome, _) = kernel.op_exec(id, &params)?;
            print_json(&outcome)?;
            Ok(0)
        }
        Command::AgentCycle => {
            let outcome = kernel.agent_force_cycle()?;
            print_json(&outcome)?;
            Ok(0)
        }
        Command::AgentWake => {
            let state = kernel.agent_wake()?;
            print_json(&state.agent)?;
            Ok(0)
        }
        Command::AgentSleep => {
            let state = kernel.agent_sleep()?;
            print_json(&state.agent)?;
            Ok(0)
        }
        Command::Run => run_daemon(kernel),
        Command::SnapshotCreate { description } => {
            let info = kernel.snapshot_create(description)?;
            print_json(&info)?;
            Ok(0)
        }
        Command::SnapshotList => {
            let infos = kernel.snapshot_list()?;
            print_json(&infos)?;
            Ok(0)
        }
        Command::SnapshotRestore { id } => {
            let state = kernel.snapshot_restore(id)?;
            print_json(&state.memory)?;
            Ok(0)
        }
        Command::MetaDefine {
            id,
            template,
            params,
            energy_cost,
            requires_coupling,
        } => {
            let op = kernel.meta_define(
                id,
                parse_template(template)?,
                parse_json(params)?,
                *energy_cost,
                *requires_coupling,
            )?;
            print_json(&op)?;
            Ok(0)
        }
        Command::MetaCompose { id, components } => {
            let op = kernel.meta_compose(id, components)?;
            print_json(&op)?;
            Ok(0)
        }
        Command::MetaSpecialize {
            source,
            id,
            preset,
            energy_cost,
        } => {
            let op = kernel.meta_specialize(source, id, parse_json(preset)?, *energy_cost)?;
            print_json(&op)?;
            Ok(0)
        }
        Command::Recover => {
            let report = kernel.recover()?;
            print_json(&report)?;
            Ok(match report.status {
                entity_state::recovery::RecoveryStatus::Recovered => 0,
                _ => 1,
            })
        }
        Command::Rebuild => {
            let state = kernel.rebuild()?;
            print_json(&state.memory)?;
            Ok(0)
        }
    }
}

fn run_daemon(kernel: Kernel) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        tracing::info!(target: "daemon", "entity daemon starting");
        // Wake the agent if it is asleep; a restart resumes the loop.
        if let Ok(status) = kernel.status() {
            if !status.agent_awake {
                let _ = kernel.agent_wake();
            }
        }
        // Agent::run never returns; it lives until the task aborts.
        let agent_task = tokio::spawn(Arc::clone(kernel.agent()).run());
        tokio::signal::ctrl_c().await?;
        tracing::info!(target: "daemon", "interrupt received; stopping");
        agent_task.abort();
        let _ = kernel.agent_sleep();
        Ok::<i32, anyhow::Error>(0)
    })
}
