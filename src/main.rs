mod app;
mod backend;
mod cache;
mod commands;
mod config;
mod connection;
mod error;
mod event;
mod keepalive;
mod query;
mod report;
mod retry;
mod session;
mod store;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::backend::types::Role;
use crate::backend::{BackendClient, WorkshopClient};
use crate::cache::{CacheLayer, FetchOptions, MemoryStorage};
use crate::config::Config;
use crate::report::{assets_with_repairs, AssetFilter, HistoryReport};
use crate::store::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "taller")]
#[command(about = "A terminal client for a vehicle and machine repair workshop")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./taller.yaml, then $XDG_CONFIG_HOME/taller/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Keep the session in memory only
  #[arg(long, global = true)]
  no_persist: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the terminal UI (default)
  Tui,
  /// Write the repair history PDF without starting the UI
  Report {
    /// Only repairs of the asset with this code
    #[arg(long)]
    asset: Option<String>,

    /// Directory to write the PDF to (default: report.output_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sign in with this email; the password is read from TALLER_PASSWORD.
    /// Without it the stored session is used.
    #[arg(long)]
    email: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.verbose)?;

  let config = Config::load(args.config.as_deref())?;
  // a one-off --email sign-in must not replace the stored session
  let one_off = matches!(&args.command, Some(Command::Report { email: Some(_), .. }));
  let shutdown = CancellationToken::new();
  let workshop = connect(&config, args.no_persist || one_off, shutdown.clone())?;

  match args.command.unwrap_or(Command::Tui) {
    Command::Tui => {
      tracing::info!(backend = %config.backend.url, "Starting taller");
      let mut app = app::App::new(config, workshop);
      let result = app.run().await;
      // stop retries still waiting in background fetches
      shutdown.cancel();
      result?;
    }
    Command::Report {
      asset,
      output,
      email,
    } => {
      let path = export_report(&config, &workshop, asset.as_deref(), output, email).await?;
      println!("{}", path.display());
    }
  }

  Ok(())
}

/// Log to a daily file under the data dir; the terminal belongs to the UI.
fn init_logging(verbose: bool) -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("taller")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "taller.log"));

  let default_filter = if verbose { "taller=debug" } else { "taller=info" };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn connect(config: &Config, no_persist: bool, shutdown: CancellationToken) -> Result<WorkshopClient> {
  let store = if no_persist {
    SessionStore::in_memory()?
  } else {
    SessionStore::open()?
  };
  let backend = BackendClient::new(config, Config::get_anon_key()?, store)
    .wrap_err("Failed to create backend client")?;
  let cache = CacheLayer::new(MemoryStorage::new())
    .with_retry(config.retry_policy())
    .with_default_duration(config.cache_duration())
    .with_cancellation(shutdown);
  Ok(WorkshopClient::new(backend, cache))
}

async fn export_report(
  config: &Config,
  workshop: &WorkshopClient,
  asset_code: Option<&str>,
  output: Option<PathBuf>,
  email: Option<String>,
) -> Result<PathBuf> {
  let backend = workshop.backend();
  let signed_in_here = email.is_some();
  let session = match email {
    Some(email) => backend.sign_in(&email, &Config::get_password()?).await?,
    None => {
      // an expired stored token is refreshed before use
      let margin = chrono::Duration::seconds(config.keepalive.refresh_margin_secs as i64);
      backend.ensure_fresh_session(margin).await;
      backend
        .current_session()
        .ok_or_else(|| eyre!("Not signed in. Pass --email or sign in through the UI first."))?
    }
  };

  let result: Result<PathBuf> = async {
    let user = workshop.profile(&session.user_id).await?.data;
    if user.role != Role::Admin {
      bail!("Repair history export is available to administrators only");
    }

    let data = workshop.history(FetchOptions::forced()).await?;
    let filter = match asset_code {
      None => AssetFilter::All,
      Some(code) => assets_with_repairs(&data.vehicles, &data.machines, &data.repairs)
        .into_iter()
        .find(|a| a.code().eq_ignore_ascii_case(code))
        .map(AssetFilter::Only)
        .ok_or_else(|| eyre!("No repairs found for asset {}", code))?,
    };

    let generated_by = if user.full_name.trim().is_empty() {
      user.email.clone()
    } else {
      user.full_name.clone()
    };
    let report = HistoryReport::build(&data.repairs, &filter, &generated_by, chrono::Local::now());
    let logo = report::load_logo(workshop, config).await;
    let dir = output.unwrap_or_else(|| config.output_dir());
    Ok(report.write_to(&dir, logo.as_deref())?)
  }
  .await;

  if signed_in_here {
    backend.sign_out().await;
  }
  result
}
