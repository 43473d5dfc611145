#![forbid(unsafe_code)]

//! `skipper`: ephemeral ECS debug shells and service restarts.
//!
//! Resolves configuration and identity, wires the AWS, key store, prompt,
//! and shell collaborators, and dispatches the requested command.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use skipper::config::GlobalConfig;
use skipper::identity::Identity;
use skipper::keystore::{FileKeyStore, KeyStore};
use skipper::orchestrator::restart::{graceful_restart, terminate_all, RollingRestart};
use skipper::orchestrator::services::{list_services, render_status, update_environment};
use skipper::orchestrator::session::SessionOrchestrator;
use skipper::orchestrator::shell::SshDockerShell;
use skipper::prompt::{Prompter, TerminalPrompter};
use skipper::provider::aws_cli::AwsCli;
use skipper::provider::ec2::AwsCompute;
use skipper::provider::ecs::AwsCluster;
use skipper::provider::task_definition::EnvChanges;
use skipper::provider::{ClusterApi, ComputeApi};
use skipper::provision::{ensure_keypair, purge_keypair};
use skipper::terminal::TerminalInput;
use skipper::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "skipper", about = "Debug shells and restarts for ECS services", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Act on behalf of this user instead of `$USER`.
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive debug shells.
    Shell {
        #[command(subcommand)]
        command: ShellCommand,
    },
    /// Service inspection and maintenance.
    Services {
        #[command(subcommand)]
        command: ServicesCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    /// Open a shell in a debug copy of a running task.
    Tunnel {
        /// Cluster of the service; prompts when omitted.
        cluster: Option<String>,
        /// Service to debug; prompts when omitted.
        service: Option<String>,
    },
    /// Create the personal keypair if it does not exist yet.
    #[command(name = "setkeypair")]
    SetKeypair,
    /// Delete the personal keypair remotely and locally.
    #[command(name = "purgekeypair")]
    PurgeKeypair,
}

#[derive(Debug, Subcommand)]
enum ServicesCommand {
    /// List clusters and their services.
    List,
    /// Show desired, pending, and running counts per deployment.
    Status {
        cluster: Option<String>,
        service: Option<String>,
    },
    /// Restart a service; forces a new deployment unless a flag is given.
    Restart {
        cluster: Option<String>,
        service: Option<String>,
        /// Replace tasks one at a time.
        #[arg(long, conflicts_with = "terminate")]
        rotating: bool,
        /// Stop every task at once.
        #[arg(long)]
        terminate: bool,
    },
    /// Change container environment variables and redeploy.
    Update {
        cluster: Option<String>,
        service: Option<String>,
        /// Set a variable (repeatable).
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Remove a variable (repeatable).
        #[arg(long, value_name = "KEY")]
        unset: Vec<String>,
    },
}

/// Collaborators shared by every command.
struct App {
    config: GlobalConfig,
    identity: Identity,
    compute: Arc<dyn ComputeApi>,
    cluster: Arc<dyn ClusterApi>,
    keys: Arc<FileKeyStore>,
    input: TerminalInput,
    prompter: Arc<dyn Prompter>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));
    drop(runtime);

    match result {
        Ok(code) => ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(1)),
        Err(err) => {
            error!(%err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<i64> {
    let config = GlobalConfig::discover(args.config.as_deref())?;
    let identity = match args.user {
        Some(user) => Identity::new(user)?,
        None => Identity::from_env()?,
    };
    info!(user = identity.user(), "configuration loaded");

    let cli = AwsCli::new(&config.aws);
    let input = TerminalInput::stdin();
    let app = App {
        compute: Arc::new(AwsCompute::new(cli.clone())),
        cluster: Arc::new(AwsCluster::new(cli)),
        keys: Arc::new(FileKeyStore::new(config.key_dir()?)),
        prompter: Arc::new(TerminalPrompter::terminal(&input)),
        input,
        config,
        identity,
    };

    match args.command {
        Command::Shell { command } => run_shell(&app, command).await,
        Command::Services { command } => run_services(&app, command).await.map(|()| 0),
    }
}

async fn run_shell(app: &App, command: ShellCommand) -> Result<i64> {
    match command {
        ShellCommand::Tunnel { cluster, service } => {
            let key_path = app.keys.path(&app.identity.keypair_name());
            let shell = Arc::new(SshDockerShell::new(&app.config, key_path, app.input.clone()));
            let keys: Arc<dyn KeyStore> = Arc::clone(&app.keys) as Arc<dyn KeyStore>;
            let orchestrator = SessionOrchestrator::new(
                Arc::clone(&app.compute),
                Arc::clone(&app.cluster),
                keys,
                Arc::clone(&app.prompter),
                shell,
                app.identity.clone(),
                &app.config,
            );
            let report = orchestrator
                .run(cluster.as_deref(), service.as_deref())
                .await?;
            Ok(report.exit_code)
        }
        ShellCommand::SetKeypair => {
            ensure_keypair(app.compute.as_ref(), app.keys.as_ref(), &app.identity).await?;
            println!(
                "keypair {} ready at {}",
                app.identity.keypair_name(),
                app.keys.path(&app.identity.keypair_name()).display()
            );
            Ok(0)
        }
        ShellCommand::PurgeKeypair => {
            let removed =
                purge_keypair(app.compute.as_ref(), app.keys.as_ref(), &app.identity).await?;
            println!(
                "keypair {} purged (remote: {}, local: {})",
                app.identity.keypair_name(),
                removed.remote,
                removed.local
            );
            Ok(0)
        }
    }
}

async fn run_services(app: &App, command: ServicesCommand) -> Result<()> {
    match command {
        ServicesCommand::List => {
            for (cluster, services) in list_services(app.cluster.as_ref()).await? {
                println!("{cluster}");
                for service in services {
                    println!("  {service}");
                }
            }
        }
        ServicesCommand::Status { cluster, service } => {
            let (cluster, service) = resolve_service(app, cluster, service).await?;
            let status = app.cluster.find_service(&cluster, &service).await?;
            print!("{}", render_status(&status));
        }
        ServicesCommand::Restart {
            cluster,
            service,
            rotating,
            terminate,
        } => {
            let (cluster, service) = resolve_service(app, cluster, service).await?;
            if rotating {
                let report = RollingRestart::new(Arc::clone(&app.cluster), &app.config)
                    .run(app.prompter.as_ref(), &cluster, &service)
                    .await?;
                println!("{} task(s) replaced", report.retired.len());
            } else if terminate {
                let stopped = terminate_all(
                    app.cluster.as_ref(),
                    app.prompter.as_ref(),
                    &cluster,
                    &service,
                )
                .await?;
                println!("{stopped} task(s) stopped");
            } else {
                graceful_restart(app.cluster.as_ref(), &cluster, &service).await?;
                println!("new deployment of {service} started");
            }
        }
        ServicesCommand::Update {
            cluster,
            service,
            set,
            unset,
        } => {
            let changes = EnvChanges::parse(&set, &unset)?;
            let (cluster, service) = resolve_service(app, cluster, service).await?;
            let revision =
                update_environment(app.cluster.as_ref(), &cluster, &service, &changes).await?;
            println!("{service} now runs {revision}");
        }
    }
    Ok(())
}

async fn resolve_service(
    app: &App,
    cluster: Option<String>,
    service: Option<String>,
) -> Result<(String, String)> {
    let cluster = match cluster {
        Some(cluster) => cluster,
        None => {
            let clusters = app.cluster.list_clusters().await?;
            let index = app.prompter.pick("cluster", &clusters)?;
            clusters
                .get(index)
                .cloned()
                .ok_or_else(|| AppError::NoTaskSelected("cluster".into()))?
        }
    };
    let service = match service {
        Some(service) => service,
        None => {
            let services = app.cluster.list_services(&cluster).await?;
            let index = app.prompter.pick("service", &services)?;
            services
                .get(index)
                .cloned()
                .ok_or_else(|| AppError::NoTaskSelected("service".into()))?
        }
    };
    Ok((cluster, service))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
