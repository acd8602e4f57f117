//! `bt`'s command-line surface (§6), implemented with `clap`'s derive API.
//!
//! Grounded on the teacher's `infrastructure/cli/mod.rs` (`Cli`/`Commands`
//! derive shape, logging set up once before dispatch) generalized from the
//! teacher's daemon-oriented command tree to this spec's one-shot verbs.
//! `bt` has no daemon subcommand (§1 "out of scope"): every invocation does
//! its work and exits.

mod table;

use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use crate::config::{Config, VaultConfig};
use crate::domain::Digest;
use crate::error::{BtError, Result};
use crate::infrastructure::database::Database;
use crate::infrastructure::vault::fs::FilesystemVault;
use crate::infrastructure::vault::s3::S3Vault;
use crate::infrastructure::vault::Vault;
use crate::service::BackupService;

#[derive(Parser)]
#[command(name = "bt", about = "A personal, multi-host backup engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the `bt.toml` configuration file
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage configured vaults
    #[command(subcommand)]
    Vault(VaultCommands),

    /// Track the current directory as a backup root
    Init,

    /// Stage a file or directory tree for backup (default: `.`)
    Add {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Drain the write-ahead log, then upload the metadata database
    Backup,

    /// Print per-file status beneath the current tracked directory
    Status {
        /// Include `File` rows whose on-disk path has vanished
        #[arg(long)]
        deleted: bool,
    },

    /// Print a file's snapshot history, newest first
    Log { file: PathBuf },

    /// Restore a file to `FILE.<digest>` from a prior snapshot
    Restore {
        file: PathBuf,
        #[arg(long)]
        digest: Digest,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Create a default config file and generate a fresh `host_id`
    Init,
    /// Print the active configuration
    List,
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Run `validate_setup` against every configured vault
    Init,
}

fn init_logging(log_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::EnvFilter;

    let roller = tracing_appender::rolling::daily(log_dir, "bt.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(roller);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr.and(non_blocking))
        .init();

    guard
}

/// Parses argv, initializes logging, dispatches, and maps the outcome to a
/// process exit code per §7's `BtError::exit_code` taxonomy. Never panics
/// on an expected error path — every fallible step returns `Result`.
pub async fn run() -> ProcessExitCode {
    let cli = Cli::parse();

    // `config init` must work before any config file exists, so it is
    // dispatched before logging (which needs `log_dir` from a loaded
    // config) and before the rest of the command tree.
    if let Commands::Config(ConfigCommands::Init) = &cli.command {
        return match Config::init_default() {
            Ok(config) => {
                println!("wrote config with host_id {}", config.host_id);
                ProcessExitCode::SUCCESS
            }
            Err(e) => report(e),
        };
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => return report(e),
    };

    let _guard = init_logging(&config.log_dir);

    match dispatch(&cli.command, &config).await {
        Ok(()) => ProcessExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

fn report(e: BtError) -> ProcessExitCode {
    error!(error = %e, "bt failed");
    eprintln!("bt: {e}");
    ProcessExitCode::from(e.exit_code() as u8)
}

async fn dispatch(command: &Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Config(ConfigCommands::Init) => unreachable!("handled in run() before logging"),
        Commands::Config(ConfigCommands::List) => {
            print!("{}", toml::to_string_pretty(config).map_err(|e| {
                BtError::ConfigInvalid(format!("serializing config: {e}"))
            })?);
            Ok(())
        }
        Commands::Vault(VaultCommands::Init) => cmd_vault_init(config).await,
        Commands::Init => cmd_init(config).await,
        Commands::Add { path } => cmd_add(config, path).await,
        Commands::Backup => cmd_backup(config).await,
        Commands::Status { deleted } => cmd_status(config, *deleted).await,
        Commands::Log { file } => cmd_log(config, file).await,
        Commands::Restore { file, digest } => cmd_restore(config, file, digest).await,
    }
}

async fn build_vaults(config: &Config) -> Result<Vec<Arc<dyn Vault>>> {
    let mut vaults: Vec<Arc<dyn Vault>> = Vec::new();
    for vault_config in &config.vaults {
        let vault: Arc<dyn Vault> = match vault_config {
            VaultConfig::Fs { root } => Arc::new(FilesystemVault::new(root.clone())),
            VaultConfig::S3 { .. } => Arc::new(S3Vault::from_config(vault_config).await?),
        };
        vaults.push(vault);
    }
    Ok(vaults)
}

async fn open_service(config: &Config) -> Result<(BackupService, Database)> {
    let db = Database::create(&config.metadata_db_path()).await?;
    let vaults = build_vaults(config).await?;
    let service = BackupService::new(
        &db,
        config.staging_root(),
        vaults,
        config.host_id,
        config.ignore_list.clone(),
    );
    Ok((service, db))
}

async fn cmd_vault_init(config: &Config) -> Result<()> {
    let vaults = build_vaults(config).await?;
    if vaults.is_empty() {
        println!("no vaults configured");
        return Ok(());
    }
    for vault in &vaults {
        vault.validate_setup().await?;
        println!("{}: ok", vault.describe());
    }
    Ok(())
}

async fn cmd_init(config: &Config) -> Result<()> {
    let (service, _db) = open_service(config).await?;
    let cwd = std::env::current_dir()?;
    let dir = service.add_directory(&cwd).await?;
    println!("tracking {} ({})", dir.path, dir.uuid);
    Ok(())
}

async fn cmd_add(config: &Config, path: &std::path::Path) -> Result<()> {
    let (service, _db) = open_service(config).await?;
    let staged = service.stage_file(path).await?;
    println!("staged {staged} file(s)");
    Ok(())
}

async fn cmd_backup(config: &Config) -> Result<()> {
    let (service, db) = open_service(config).await?;
    let committed = service.backup(&db).await?;
    println!("committed {committed} operation(s)");
    Ok(())
}

async fn cmd_status(config: &Config, deleted: bool) -> Result<()> {
    let (service, _db) = open_service(config).await?;
    let cwd = std::env::current_dir()?;
    let entries = service.get_status(&cwd, deleted).await?;
    table::print_status(&entries);
    Ok(())
}

async fn cmd_log(config: &Config, file: &std::path::Path) -> Result<()> {
    let (service, _db) = open_service(config).await?;
    let snapshots = service.get_file_history(file).await?;
    table::print_snapshots(&snapshots);
    Ok(())
}

async fn cmd_restore(config: &Config, file: &std::path::Path, digest: &Digest) -> Result<()> {
    let (service, _db) = open_service(config).await?;
    let output = service.restore_file(file, digest).await?;
    println!("restored to {}", output.display());
    Ok(())
}
