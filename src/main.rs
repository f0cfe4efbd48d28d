use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gator::config::Config;
use gator::feed::FeedFetcher;
use gator::scheduler::{Aggregator, TickEvent, TickOutcome};
use gator::session::current_user;
use gator::storage::{Database, DatabaseError, User};
use gator::util::{format_duration, parse_duration, validate_feed_url};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Command-line RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List registered users
    Users,
    /// Delete every user, feed, follow and post
    Reset,
    /// Add a feed and follow it as the current user
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Poll followed feeds until interrupted
    Agg {
        /// Time between requests, e.g. "30s", "1m", "1h30m" (default from config)
        interval: Option<String>,
    },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!("Error: the database is locked by another gator process.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    match args.command {
        Command::Register { name } => {
            let user = db.create_user(&name).await?;
            config.set_user(&user.name);
            config.save(&config_path).context("Failed to save config")?;
            println!("User {} created and logged in", user.name);
        }
        Command::Login { name } => {
            let Some(user) = db.get_user_by_name(name.trim()).await? else {
                bail!("User {} is not registered", name.trim());
            };
            config.set_user(&user.name);
            config.save(&config_path).context("Failed to save config")?;
            println!("Logged in as {}", user.name);
        }
        Command::Users => {
            let current = config.current_user_name.as_deref();
            for user in db.list_users().await? {
                if Some(user.name.as_str()) == current {
                    println!("* {} (current)", user.name);
                } else {
                    println!("* {}", user.name);
                }
            }
        }
        Command::Reset => {
            let removed = db.reset().await?;
            println!("Database reset ({} users removed)", removed);
        }
        Command::Addfeed { name, url } => {
            let user = require_user(&db, &config).await?;
            let url = url.trim();
            validate_feed_url(url).with_context(|| format!("Refusing to add feed {}", url))?;
            let feed = db.create_feed(name.trim(), url, user.id).await?;
            let follow = db.follow_feed(user.id, feed.id).await?;
            println!("Added feed {} ({})", feed.name, feed.url);
            println!("{} now follows {}", follow.user_name, follow.feed_name);
        }
        Command::Feeds => {
            for feed in db.list_feeds().await? {
                println!(
                    "* {} ({}) added by {}, last fetched {}",
                    feed.name,
                    feed.url,
                    feed.owner_name,
                    format_timestamp(feed.last_fetched_at)
                );
            }
        }
        Command::Follow { url } => {
            let user = require_user(&db, &config).await?;
            let Some(feed) = db.get_feed_by_url(url.trim()).await? else {
                bail!("No feed with URL {}; add it with `gator addfeed`", url.trim());
            };
            let follow = db.follow_feed(user.id, feed.id).await?;
            println!("{} now follows {}", follow.user_name, follow.feed_name);
        }
        Command::Following => {
            let user = require_user(&db, &config).await?;
            for follow in db.follows_for_user(user.id).await? {
                println!("* {} ({})", follow.feed_name, follow.feed_url);
            }
        }
        Command::Unfollow { url } => {
            let user = require_user(&db, &config).await?;
            let Some(feed) = db.get_feed_by_url(url.trim()).await? else {
                bail!("No feed with URL {}", url.trim());
            };
            if db.unfollow_feed(user.id, feed.id).await? {
                println!("{} unfollowed {}", user.name, feed.name);
            } else {
                println!("{} was not following {}", user.name, feed.name);
            }
        }
        Command::Agg { interval } => {
            let user = require_user(&db, &config).await?;
            let interval = match interval {
                Some(expr) => parse_duration(&expr)?,
                None => config.fetch_interval()?,
            };
            run_aggregation(db, &config, user, interval).await?;
        }
        Command::Browse { limit } => {
            let user = require_user(&db, &config).await?;
            let posts = db.posts_for_user(user.id, limit).await?;
            if posts.is_empty() {
                println!("No posts yet. Run `gator agg` to fetch followed feeds.");
            }
            for post in posts {
                match post.published_at {
                    Some(_) => println!("{} ({})", post.title, format_timestamp(post.published_at)),
                    None => println!("{}", post.title),
                }
                println!("  {}", post.url);
                if !post.description.is_empty() {
                    println!("  {}", post.description);
                }
                println!();
            }
        }
    }

    Ok(())
}

async fn require_user(db: &Database, config: &Config) -> Result<User> {
    match current_user(db, config).await? {
        Some(user) => Ok(user),
        None => bail!("No user logged in. Run `gator register <name>` or `gator login <name>` first"),
    }
}

async fn run_aggregation(
    db: Database,
    config: &Config,
    user: User,
    interval: std::time::Duration,
) -> Result<()> {
    let fetcher = FeedFetcher::new(&config.user_agent, config.request_timeout())
        .context("Failed to build HTTP client")?;

    let (event_tx, mut event_rx) = mpsc::channel::<TickEvent>(16);
    let aggregator = Aggregator::new(db, fetcher, user, interval)
        .with_policy(config.entry_policy())
        .with_events(event_tx);

    println!("Collecting feeds every {}", format_duration(interval));

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_tick(&event);
        }
    });

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(wait_for_shutdown(cancel.clone()));

    let summary = aggregator.run(cancel).await;
    signals.abort();
    // Aggregator dropped its sender; the printer drains and exits
    join_logged("tick printer", printer).await;

    println!(
        "Stopped after {} ticks: {} ingested, {} failed, {} skipped",
        summary.ticks, summary.ingested, summary.failed, summary.skipped
    );
    Ok(())
}

/// Wait for a background task. A panic or abort is logged, not swallowed.
async fn join_logged(task: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(task, error = %e, "Background task failed");
            false
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn wait_for_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
                return;
            }
        };
        tokio::select! {
            biased;
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
    }
    token.cancel();
}

fn print_tick(event: &TickEvent) {
    match &event.outcome {
        TickOutcome::Skipped => {
            println!("[{}] No followed feeds", event.tick);
        }
        TickOutcome::Ingested(report) => {
            println!(
                "[{}] {} ({}): {} new, {} known, {} skipped",
                event.tick,
                report.channel_title,
                report.feed_url,
                report.inserted.len(),
                report.already_known,
                report.skipped
            );
            for title in &report.inserted {
                println!("  + {}", title);
            }
        }
        TickOutcome::Failed(e) => {
            println!("[{}] {}: {}", event.tick, e.feed_url(), e);
        }
        TickOutcome::SelectionFailed(e) => {
            println!("[{}] Could not select a feed: {}", event.tick, e);
        }
    }
}

fn format_timestamp(ts: Option<i64>) -> String {
    match ts.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "never".to_string(),
    }
}
