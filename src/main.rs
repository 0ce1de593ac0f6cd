mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use autoupdated::download::HttpSource;
use autoupdated::{
    CacheStore, InstanceIdentity, UpdateOutcome, Updater, UpdaterConfig, check_for_update,
};

fn main() {
    // Initialize logger with custom format for daemon
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Update {
        config: None,
        name: "default".to_string(),
    }) {
        cli::Cmd::Update { config, name } => run_update(config, name).await,
        cli::Cmd::Check { config, name } => handle_check(config, name).await,
        cli::Cmd::Status { name } => handle_status(name),
    }
}

/// Explicit path, else `<config dir>/autoupdated/autoupdated.toml`
fn config_path(explicit: Option<String>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("autoupdated")
            .join("autoupdated.toml")),
    }
}

fn load_config(explicit: Option<String>) -> Result<UpdaterConfig> {
    let path = config_path(explicit)?;
    let cfg = UpdaterConfig::load(&path).context("Failed to load configuration")?;
    info!("Using config from: {}", path.display());
    Ok(cfg)
}

async fn run_update(config: Option<String>, name: String) -> Result<()> {
    let cfg = load_config(config)?;
    let mut updater = Updater::builder(cfg)
        .identity(InstanceIdentity::named(name))
        .start()
        .context("Failed to start updater")?;

    // Ctrl-C cancels the wait and any inline download
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling update");
            on_signal.cancel();
        }
    });

    let result = updater.trigger(&cancel).await;
    updater.close().await;

    match result.context("Update failed")? {
        UpdateOutcome::NoUpdateNeeded => println!("no update needed"),
        UpdateOutcome::Installed(report) => {
            println!("installed {}", report.installer.display());
            if let Err(e) = &report.uninstall {
                println!("uninstall reported errors: {e}");
            }
        }
    }
    Ok(())
}

/// Handle check command - exit 0 when an update is needed, 1 otherwise
async fn handle_check(config: Option<String>, name: String) -> Result<()> {
    let cfg = load_config(config)?;
    let store = CacheStore::for_instance(&InstanceIdentity::named(name));
    let source = HttpSource::new().context("Failed to build HTTP client")?;

    let check = check_for_update(&source, &cfg, &store.read()).await;
    println!("{check}");
    std::process::exit(if check.needs_update() { 0 } else { 1 });
}

/// Handle status command - print the cached record
fn handle_status(name: String) -> Result<()> {
    let store = CacheStore::for_instance(&InstanceIdentity::named(name));
    let details = serde_json::to_string_pretty(&store.read())
        .context("Failed to serialize cache details")?;
    println!("{}", store.file().display());
    println!("{details}");
    Ok(())
}
