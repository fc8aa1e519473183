use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use articlesync::cache::{ArticleStore, MemoryStore, PersistedCache, SqliteStore};
use articlesync::config::Config;
use articlesync::connectivity::{ConnectivityMonitor, TcpProbe};
use articlesync::search::{ArticleFetcher, DisplayArticle, FetchError, RemoteArticle, SearchClient};
use articlesync::settings::{CachingPreference, SettingsStore};
use articlesync::sync::{ArticleFeed, FeedEvent, FeedView, RefreshOutcome, SyncEngine, ViewSource};

#[derive(Parser, Debug)]
#[command(name = "articlesync")]
#[command(about = "Article search with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/articlesync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Refresh once and print the articles (cached ones when offline)
  Show,
  /// Keep the feed live, refreshing when the network comes back
  Watch,
  /// Print the cached articles without touching the network
  Cached,
  /// Remove all cached articles
  ClearCache,
  /// Show or change preferences
  Settings {
    /// Whether fetched articles are written to the cache
    #[arg(long)]
    cache_data: Option<bool>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = articlesync::logging::init(Config::data_dir().ok().as_deref(), args.verbose);

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  match args.command.unwrap_or(Command::Show) {
    Command::Show => show(&config).await,
    Command::Watch => watch(&config).await,
    Command::Cached => {
      let cache = open_cache(&config).await;
      let snapshot = cache.current();
      let articles: Vec<DisplayArticle> = snapshot.articles.iter().map(DisplayArticle::from).collect();
      print_view(&FeedView {
        articles: Arc::new(articles),
        source: ViewSource::Cache {
          cached_at: snapshot.cached_at,
        },
      });
      Ok(())
    }
    Command::ClearCache => {
      let cache = open_cache(&config).await;
      cache
        .clear()
        .await
        .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
      println!("Cache cleared.");
      Ok(())
    }
    Command::Settings { cache_data } => {
      let store = SettingsStore::new(config.settings_path()?);
      if let Some(enabled) = cache_data {
        store.set_cache_enabled(enabled)?;
      }
      let settings = store.load()?;
      println!("cache_data: {}", settings.cache_data);
      println!("(stored in {})", store.path().display());
      Ok(())
    }
  }
}

/// Open the on-disk cache, falling back to memory for this session.
async fn open_cache(config: &Config) -> PersistedCache {
  let store: Arc<dyn ArticleStore> = match config
    .storage_path()
    .map_err(|e| e.to_string())
    .and_then(|path| SqliteStore::open(&path).map_err(|e| e.to_string()))
  {
    Ok(store) => Arc::new(store),
    Err(e) => {
      tracing::warn!("article cache unavailable ({}), continuing in memory only", e);
      Arc::new(MemoryStore::new())
    }
  };

  PersistedCache::open(store).await
}

/// Fetcher used when no API key is configured; every refresh fails.
struct UnconfiguredFetcher(String);

#[async_trait::async_trait]
impl ArticleFetcher for UnconfiguredFetcher {
  async fn fetch(&self) -> Result<Vec<RemoteArticle>, FetchError> {
    Err(FetchError::Network {
      status: None,
      message: self.0.clone(),
    })
  }
}

async fn start_feed(config: &Config) -> Result<ArticleFeed> {
  let cache = open_cache(config).await;
  let preference: Arc<dyn CachingPreference> =
    Arc::new(SettingsStore::new(config.settings_path()?));

  let fetcher: Arc<dyn ArticleFetcher> = match SearchClient::from_config(&config.api) {
    Ok(client) => Arc::new(client),
    Err(e) => {
      tracing::warn!("{}", e);
      Arc::new(UnconfiguredFetcher(e.to_string()))
    }
  };

  let feed = SyncEngine::start(fetcher, cache, preference);
  feed.on_refresh_failed(|e| eprintln!("{}", e.user_message()));
  Ok(feed)
}

async fn show(config: &Config) -> Result<()> {
  let feed = start_feed(config).await?;

  if let RefreshOutcome::Refreshed { count } = feed.refresh().wait().await {
    tracing::debug!("refreshed {} articles", count);
  }
  print_view(&feed.view());

  feed.stop().await;
  Ok(())
}

async fn watch(config: &Config) -> Result<()> {
  let feed = start_feed(config).await?;

  feed.on_updated(|articles| {
    println!("--- {} articles ---", articles.len());
    for (i, article) in articles.iter().enumerate() {
      print_article(i + 1, article);
    }
  });
  feed.on_event(|event| match event {
    FeedEvent::Offline => {
      eprintln!("You are offline. Please check your internet connection. (type 'r' + Enter to retry)")
    }
    FeedEvent::Online => eprintln!("Back online."),
    _ => {}
  });

  let monitor = ConnectivityMonitor::new();
  feed.attach(&monitor);
  monitor.start(
    TcpProbe::new(
      config.connectivity.probe_host.clone(),
      config.connectivity.probe_port,
      config.connectivity.probe_timeout(),
    ),
    config.connectivity.interval(),
  );

  print_view(&feed.view());
  let _ = feed.refresh();

  let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      line = lines.next_line() => match line {
        Ok(Some(line)) => match line.trim() {
          "r" | "refresh" => {
            let _ = feed.refresh();
          }
          "q" | "quit" => break,
          "" => {}
          other => eprintln!("unknown input '{}': use 'r' to refresh, 'q' to quit", other),
        },
        // stdin closed; keep running until Ctrl-C
        Ok(None) => {
          tokio::signal::ctrl_c().await?;
          break;
        }
        Err(e) => return Err(eyre!("Failed to read input: {}", e)),
      },
    }
  }

  monitor.stop();
  feed.stop().await;
  Ok(())
}

fn print_view(view: &FeedView) {
  match &view.source {
    ViewSource::Empty => println!("No articles yet."),
    ViewSource::Live { fetched_at } => println!(
      "{} articles (fetched {})",
      view.articles.len(),
      fetched_at.format("%Y-%m-%d %H:%M UTC")
    ),
    ViewSource::Cache { cached_at } => match cached_at {
      Some(at) => println!(
        "{} cached articles (saved {})",
        view.articles.len(),
        at.format("%Y-%m-%d %H:%M UTC")
      ),
      None => println!("{} cached articles", view.articles.len()),
    },
  }

  for (i, article) in view.articles.iter().enumerate() {
    print_article(i + 1, article);
  }
}

fn print_article(position: usize, article: &DisplayArticle) {
  println!(
    "{:>3}. {}",
    position,
    article.headline.as_deref().unwrap_or("(untitled)")
  );
  if let Some(byline) = &article.byline {
    println!("     {}", byline);
  }
  if let Some(summary) = &article.abstract_text {
    println!("     {}", summary);
  }
  if let Some(image) = &article.media_image_url {
    println!("     {}", image);
  }
}
