use boundres::config::Config;
use boundres::http::url_key;
use boundres::{
  Coordinator, ExecutionContexts, HttpSource, JsonEndpoint, Resource, SqliteStore, StalePolicy,
};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "boundres")]
#[command(about = "Cache JSON endpoints locally and refresh them when stale")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/boundres/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the stored document for a URL, fetching it first when stale
  Get {
    url: String,

    /// Store key (default: derived from the URL)
    #[arg(short, long)]
    key: Option<String>,

    /// Refetch documents older than this many seconds
    #[arg(long)]
    max_age: Option<u64>,

    /// Fetch even if the stored document is fresh
    #[arg(short, long)]
    refresh: bool,
  },
  /// Print a stored document without touching the network
  Show {
    /// Store key or URL
    key: String,
  },
  /// Delete a stored document
  Forget {
    /// Store key or URL
    key: String,
  },
  /// List stored keys
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _logging = boundres::logging::init_logging(&boundres::logging::default_log_dir()?, args.verbose)?;

  let store = match &config.store.path {
    Some(path) => SqliteStore::open(path)?,
    None => SqliteStore::open_default()?,
  };
  let store = Arc::new(store);

  match args.command {
    Command::Get {
      url,
      key,
      max_age,
      refresh,
    } => get(&config, store, &url, key, max_age, refresh).await,
    Command::Show { key } => {
      let key = resolve_key(&key);
      match store.get::<Value>(&key)? {
        Some(doc) => {
          let out = json!({ "key": doc.key, "stored_at": doc.stored_at, "data": doc.data });
          println!("{}", serde_json::to_string_pretty(&out)?);
          Ok(())
        }
        None => Err(eyre!("Nothing stored under {}", key)),
      }
    }
    Command::Forget { key } => {
      let key = resolve_key(&key);
      if store.remove(&key)? {
        info!(%key, "removed document");
      } else {
        info!(%key, "nothing stored");
      }
      Ok(())
    }
    Command::List => {
      for key in store.keys()? {
        println!("{}", key);
      }
      Ok(())
    }
  }
}

/// Run one coordinator for `url` and print its states as JSON lines until the
/// fetch (if any) settles.
async fn get(
  config: &Config,
  store: Arc<SqliteStore>,
  url: &str,
  key: Option<String>,
  max_age: Option<u64>,
  refresh: bool,
) -> Result<()> {
  let source = HttpSource::new(url, &config.http)?;
  let policy = if refresh {
    // The explicit trigger below does the fetching
    StalePolicy::Never
  } else {
    StalePolicy::max_age_secs(max_age.unwrap_or(config.refresh.max_age_secs))
  };

  let mut endpoint = JsonEndpoint::<Value>::new(source, store, policy);
  if let Some(key) = key {
    endpoint = endpoint.with_key(key);
  }
  info!(%url, key = endpoint.key(), "binding resource");

  // A stalled cycle would leave the CLI waiting forever
  let coordinator_config = boundres::CoordinatorConfig {
    surface_storage_errors: true,
    ..config.coordinator
  };

  let (coordinator, mut states) =
    Coordinator::start_subscribed(endpoint, ExecutionContexts::current()?, coordinator_config);

  if refresh {
    let first = states
      .recv()
      .await
      .ok_or_else(|| eyre!("Coordinator stopped before reading the store"))?;
    print_state(first)?;
    coordinator.trigger_fetch();
  }

  let mut fetching = false;
  while let Some(state) = states.recv().await {
    fetching |= state.is_loading();
    let terminal = state.is_terminal();
    let failure = state.error_message().map(String::from);
    print_state(state)?;

    if let Some(message) = failure {
      return Err(eyre!("{}", message));
    }
    if terminal && (fetching || !refresh) {
      break;
    }
  }

  coordinator.shutdown();
  Ok(())
}

fn print_state(state: Resource<Option<boundres::StoredDocument<Value>>>) -> Result<()> {
  let state = state.map(|doc| doc.map(|d| d.data));
  println!("{}", serde_json::to_string(&state)?);
  Ok(())
}

/// Accept either a raw store key or the URL it was derived from.
fn resolve_key(arg: &str) -> String {
  match Url::parse(arg) {
    Ok(url) if matches!(url.scheme(), "http" | "https") => url_key(&url),
    _ => arg.to_string(),
  }
}
