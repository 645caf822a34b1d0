//! Plugin manager command-line front end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mpm_kernel::config::Config;
use mpm_kernel::executor::{PipEnvironment, SystemExecutor};
use mpm_kernel::plugin::cli::{self, TaskCommand};
use mpm_kernel::plugin::{CatalogStore, LocalRuntime};
use mpm_kernel::session::Session;
use mpm_kernel::task::{ConsoleReply, TaskContext, TaskState};
use mpm_kernel::version::Version;

/// Install, upgrade and uninstall plugins with their dependencies.
#[derive(Parser, Debug)]
#[command(name = "mpm", author, version, about, long_about = None)]
struct Args {
    /// Confirm planned tasks without asking.
    #[arg(short, long, global = true)]
    yes: bool,

    /// Version reported for the host runtime.
    #[arg(long, global = true)]
    host_version: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install plugins and their missing dependencies.
    Install {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Upgrade installed plugins.
    Upgrade {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Uninstall plugins, dependents first.
    Uninstall {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List installed plugins with a newer version in the catalog.
    CheckUpdate,
    /// List catalog plugins.
    List {
        /// Only show plugins with one of these labels (comma-separated).
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },
    /// Search catalog plugins by id, name and description.
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Show details of a catalog plugin.
    Info { id: String },
    /// Download the latest catalog document.
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    info!(plugins_dir = %config.plugins_dir.display(), "configuration loaded");

    let catalog = Arc::new(CatalogStore::new(config.catalog_cache_path()));
    if let Command::Refresh = args.command {
        return cli::cmd_refresh(&catalog, &config.catalog_source, config.timeout).await;
    }
    if catalog.load().is_err() {
        warn!("no usable catalog cache, run `mpm refresh` to download one");
    }

    let mut runtime = LocalRuntime::open(&config.plugins_dir).context("failed to open plugins directory")?;
    if let Some(version) = &args.host_version {
        let version = Version::parse(version).context("invalid --host-version")?;
        runtime = runtime.with_host(&config.host_id, version);
    }
    let runtime = Arc::new(runtime);

    match args.command {
        Command::List { labels } => cli::cmd_list(catalog.as_ref(), runtime.as_ref(), &labels),
        Command::Search { query } => cli::cmd_search(catalog.as_ref(), runtime.as_ref(), &query.join(" ")),
        Command::Info { id } => cli::cmd_info(catalog.as_ref(), runtime.as_ref(), &id),
        Command::CheckUpdate => {
            let session = build_session(&config, catalog, runtime, PipEnvironment::default())?;
            session.check_updates(&ConsoleReply);
            Ok(())
        }
        Command::Install { ids } => {
            run_task(&config, catalog, runtime, TaskCommand::Install { ids, upgrade: false }, args.yes).await
        }
        Command::Upgrade { ids } => {
            run_task(&config, catalog, runtime, TaskCommand::Install { ids, upgrade: true }, args.yes).await
        }
        Command::Uninstall { ids } => {
            run_task(&config, catalog, runtime, TaskCommand::Uninstall { ids }, args.yes).await
        }
        Command::Refresh => Ok(()),
    }
}

async fn run_task(
    config: &Config,
    catalog: Arc<CatalogStore>,
    runtime: Arc<LocalRuntime>,
    command: TaskCommand,
    yes: bool,
) -> Result<()> {
    let packages = match &command {
        TaskCommand::Install { .. } => PipEnvironment::load(&config.python, config.timeout)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not list installed packages, treating all as missing");
                PipEnvironment::default()
            }),
        TaskCommand::Uninstall { .. } => PipEnvironment::default(),
    };

    let session = build_session(config, catalog, runtime, packages)?;
    match cli::cmd_run_task(&session, command, yes).await? {
        Some(TaskState::PartiallyFailed) => anyhow::bail!("task finished with errors"),
        _ => Ok(()),
    }
}

fn build_session(
    config: &Config,
    catalog: Arc<CatalogStore>,
    runtime: Arc<LocalRuntime>,
    packages: PipEnvironment,
) -> Result<Session> {
    let executor = SystemExecutor::new(PathBuf::from(&config.python), config.timeout)?;
    Ok(Session::new(TaskContext {
        catalog,
        runtime,
        packages: Arc::new(packages),
        executor: Arc::new(executor),
        host_id: config.host_id.clone(),
        self_id: config.self_id.clone(),
        install_dir: config.plugins_dir.clone(),
        download_url_template: config.download_url_template.clone(),
    }))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
