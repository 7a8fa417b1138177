mod brands;
mod config;
mod error;
mod i18n;
mod intercept;
mod liveness;
mod store;
#[cfg(test)]
mod testutil;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use brands::client::RegistryClient;
use brands::coordinator::{SyncCoordinator, SyncOutcome};
use brands::types::{Brand, BrandDraft, BrandPatch, BrandStatus};
use config::Config;
use i18n::{Locale, LocaleContext, MessageKey};
use intercept::{FetchGate, GateRequest, ResponseCache};
use liveness::{BackendStatus, LivenessMonitor};
use store::BrandStore;

#[derive(Parser, Debug)]
#[command(name = "marq")]
#[command(about = "Offline-first client for a brand registry")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/marq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Locale for messages (en, es); defaults to the configured default_lang
  #[arg(short, long)]
  lang: Option<String>,

  /// Tell marq the device has no connectivity; skips the startup probe
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List brand records (server listing when reachable, local otherwise)
  List,
  /// Register a new brand record
  Add {
    name: String,
    owner: String,
    /// Locale the record is created under (defaults to the message locale)
    #[arg(long)]
    lang: Option<String>,
  },
  /// Update fields of an existing record
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    owner: Option<String>,
    /// New status: pending, active or rejected
    #[arg(long)]
    status: Option<String>,
  },
  /// Delete a record wherever it currently lives
  Delete { id: String },
  /// Show backend reachability and device connectivity
  Status,
  /// Re-probe the backend and reconcile with the local store
  Refresh,
  /// Re-pull the server listing once the backend is reachable again
  Sync,
  /// Wipe the local store (explicit reset; the backend is untouched)
  Reset,
  /// Issue a raw request through the offline-aware fetch gate
  Fetch {
    path: String,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Activate the current cache generations before fetching
    #[arg(long)]
    activate: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = init_logging(&data_dir)?;

  let lang = args
    .lang
    .clone()
    .or_else(|| config.default_lang.clone())
    .unwrap_or_default();
  let ctx = LocaleContext::new(Locale::parse(&lang));

  match args.command {
    Command::Fetch {
      path,
      method,
      activate,
    } => run_fetch(&config, path, method, activate).await,
    command => run_coordinator(command, args.offline, &config, ctx).await,
  }
}

async fn run_coordinator(
  command: Command,
  offline: bool,
  config: &Config,
  ctx: LocaleContext,
) -> Result<()> {
  let api_base = config.api_base()?;
  let api_key = Config::get_api_key()?;

  let status = Arc::new(BackendStatus::new());
  let monitor = LivenessMonitor::new(&api_base, api_key.clone(), Arc::clone(&status));
  let store = open_store(config)?;

  if offline {
    status.set_device_online(false);
    status.set_backend_reachable(false);
  } else {
    monitor.check_backend().await;
    monitor.clone().spawn();
  }

  let client = RegistryClient::new(&api_base, api_key);
  let store_view = store.clone();
  let mut coordinator = SyncCoordinator::new(client, store, monitor);

  match command {
    Command::List => {
      let listing = coordinator.list().await?;
      render_listing(ctx, &listing);
    }
    Command::Add { name, owner, lang } => {
      let draft = BrandDraft {
        name,
        owner,
        lang: lang.unwrap_or_else(|| ctx.locale().as_str().to_string()),
      };
      let created = coordinator.add(draft).await?;
      let key = if created.is_offline() {
        MessageKey::CreatedOffline
      } else {
        MessageKey::CreatedRemote
      };
      println!("{} ({})", ctx.text(key), created.data.id);
    }
    Command::Update {
      id,
      name,
      owner,
      status: new_status,
    } => {
      let new_status = new_status
        .map(|s| s.parse::<BrandStatus>())
        .transpose()
        .map_err(|e| eyre!("{e}"))?;
      let patch = BrandPatch {
        name,
        owner,
        lang: None,
        status: new_status,
      };
      let updated = coordinator.update(&id, patch).await?;
      let key = if updated.is_offline() {
        MessageKey::UpdatedOffline
      } else {
        MessageKey::UpdatedRemote
      };
      println!("{}", ctx.text(key));
      println!("{}", format_brand(&updated.data));
    }
    Command::Delete { id } => {
      let deleted = coordinator.delete(&id).await?;
      let key = if deleted.is_offline() {
        MessageKey::DeletedOffline
      } else {
        MessageKey::DeletedRemote
      };
      println!("{}", ctx.text(key));
    }
    Command::Status => {
      render_connection(ctx, &status);
      match coordinator.list().await {
        Ok(_) => println!("records: {}", coordinator.records().len()),
        Err(e) => {
          let message = coordinator
            .last_error()
            .map(str::to_owned)
            .unwrap_or_else(|| e.to_string());
          println!("{message}");
        }
      }
    }
    Command::Refresh => {
      let listing = coordinator.refresh().await?;
      render_connection(ctx, &status);
      render_listing(ctx, &listing);
    }
    Command::Sync => match coordinator.sync_offline_data().await? {
      Some(listing) => render_listing(ctx, &listing),
      None => render_connection(ctx, &status),
    },
    Command::Reset => {
      store_view.clear()?;
      println!("{}", ctx.text(MessageKey::NoRecords));
    }
    Command::Fetch { .. } => {
      // Routed in main before the coordinator is built.
    }
  }

  Ok(())
}

async fn run_fetch(config: &Config, path: String, method: String, activate: bool) -> Result<()> {
  let api_key = Config::get_api_key()?;
  let data_dir = config.data_dir()?;

  let store = open_store(config)?;
  let cache = match ResponseCache::open_at(&data_dir.join("responses.db")) {
    Ok(cache) => cache,
    Err(e) => {
      tracing::warn!(error = %e, "response cache unavailable, serving without one");
      ResponseCache::open_in_memory()?
    }
  };

  let method = method.to_uppercase();
  let method: reqwest::Method = method
    .parse()
    .map_err(|_| eyre!("Unknown HTTP method: {method}"))?;

  let handle = FetchGate::new(config.origin()?, api_key, store, cache)
    .with_static_paths(config.offline.prefetch.clone())
    .spawn();

  if activate {
    handle.activate_now();
  }

  let response = handle.fetch(GateRequest::new(method, path)).await?;

  println!("{} (served from {:?})", response.status, response.served);
  if !response.body.is_empty() {
    println!("{}", String::from_utf8_lossy(&response.body));
  }

  Ok(())
}

fn render_listing(ctx: LocaleContext, outcome: &SyncOutcome<Vec<Brand>>) {
  let key = if outcome.is_offline() {
    MessageKey::ListFromStore
  } else {
    MessageKey::ListFromServer
  };
  println!("{}", ctx.text(key));

  if outcome.data.is_empty() {
    println!("{}", ctx.text(MessageKey::NoRecords));
    return;
  }
  for brand in &outcome.data {
    println!("{}", format_brand(brand));
  }
}

fn render_connection(ctx: LocaleContext, status: &BackendStatus) {
  let backend = if status.backend_reachable() {
    MessageKey::BackendReachable
  } else {
    MessageKey::BackendUnreachable
  };
  let device = if status.device_online() {
    MessageKey::DeviceOnline
  } else {
    MessageKey::DeviceOffline
  };
  println!("{}", ctx.text(backend));
  println!("{}", ctx.text(device));
}

fn format_brand(brand: &Brand) -> String {
  format!(
    "{}  {:<20} {:<16} {:<8} {}  {}",
    brand.id,
    brand.name,
    brand.owner,
    brand.status,
    brand.lang,
    brand.updated_at.format("%Y-%m-%d %H:%M")
  )
}

/// Open the durable store, degrading to an in-memory one (online-only mode,
/// nothing persists) when the host denies durable storage. The degradation
/// is surfaced once, here.
fn open_store(config: &Config) -> Result<BrandStore> {
  match BrandStore::open_at(&config.data_dir()?.join("brands.db")) {
    Ok(store) => Ok(store),
    Err(e) => {
      tracing::warn!(error = %e, "durable store unavailable, degrading to online-only mode");
      eprintln!("offline storage unavailable ({e}); changes will not persist locally");
      Ok(BrandStore::open_in_memory()?)
    }
  }
}

fn init_logging(dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  std::fs::create_dir_all(dir)?;

  let appender = tracing_appender::rolling::never(dir, "marq.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_env("MARQ_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
