use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podfetch::{
    AppConfig, Filter, NewSubscription, NoopReporter, PeriodicUpdate, Podfetch, ProgressEvent,
    ProgressReporter, ReqwestClient, ServiceSet, SharedProgressReporter, Subscription,
    SubscriptionEdit, SyncError,
};
use podfetch::config::FALLBACK_FILENAME_TEMPLATE;

// Emoji with fallback for terminals without Unicode support
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static SLEEPING: Emoji<'_, '_> = Emoji("💤 ", "[=] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Keep a local collection of podcast subscriptions in sync with their feeds
#[derive(Parser, Debug)]
#[command(name = "podfetch")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors and hide progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch feeds and download new episodes
    Update {
        /// Subscription names or wildcard patterns (default: all)
        names: Vec<String>,

        /// Ignore cached validators and download everything again
        #[arg(short, long)]
        force: bool,
    },

    /// Delete episodes beyond each subscription's retention limit
    Purge {
        names: Vec<String>,

        /// Only list the files that would be deleted
        #[arg(short, long)]
        simulate: bool,
    },

    /// Subscribe to a feed
    Add {
        url: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Download directory for this subscription
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Number of episodes to keep (negative keeps all)
        #[arg(short, long, allow_negative_numbers = true)]
        keep: Option<i64>,

        /// Filename template, e.g. "{pub_date}_{title}"
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Remove subscriptions
    Del {
        #[arg(required = true)]
        names: Vec<String>,

        /// Delete the downloaded episodes as well
        #[arg(short, long)]
        episodes: bool,
    },

    /// Change a subscription
    Edit(EditArgs),

    /// List episodes by date, newest first
    Ls(LsArgs),

    /// Show subscription details
    Show {
        /// Subscription names (default: all)
        names: Vec<String>,
    },

    /// Keep updating in the background until interrupted
    Daemon,
}

#[derive(Args, Debug)]
struct LsArgs {
    /// Subscription names or wildcard patterns (default: all)
    patterns: Vec<String>,

    /// Only episodes published on or after DATE (YYYY-MM-DD); implies --all
    #[arg(short, long, value_name = "DATE")]
    since: Option<NaiveDate>,

    /// Only episodes published on or before DATE (YYYY-MM-DD); implies --all
    #[arg(short, long, value_name = "DATE")]
    until: Option<NaiveDate>,

    /// Number of episodes shown (default: the configured ls_limit)
    #[arg(short, long, value_name = "N", conflicts_with = "all")]
    newest: Option<usize>,

    /// Do not limit the number of episodes shown
    #[arg(short, long)]
    all: bool,

    /// Print the downloaded files instead of titles
    #[arg(short, long)]
    path: bool,
}

#[derive(Args, Debug)]
struct EditArgs {
    name: String,

    /// New subscription name
    #[arg(long = "name")]
    new_name: Option<String>,

    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    keep: Option<i64>,

    #[arg(long)]
    template: Option<String>,

    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long, conflicts_with = "disable")]
    enable: bool,

    #[arg(long)]
    disable: bool,

    /// Leave downloaded files where they are
    #[arg(long)]
    no_move: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(style("{spinner:.green} {wide_msg}"));
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<usize, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_or_create_bar(&self, worker: usize) -> ProgressBar {
        let mut bars = self.bars();

        if let Some(bar) = bars.get(&worker) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(
            style(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .progress_chars("█▓░"),
        );
        bars.insert(worker, bar.clone());
        bar
    }

    fn finish_bar(&self, worker: usize) {
        if let Some(bar) = self.bars().remove(&worker) {
            bar.finish_and_clear();
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::SubscriptionStarted { name, .. } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Updating {}", name.cyan()));
            }

            ProgressEvent::FeedNotModified { name, .. } => {
                self.main_bar
                    .println(format!("{SLEEPING}{} unchanged", name.dimmed()));
            }

            ProgressEvent::DownloadStarting {
                worker,
                subscription,
                episode_title,
                content_length,
            } => {
                let bar = self.get_or_create_bar(worker);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "{} {}",
                    subscription.cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                worker,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(worker);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                worker,
                episode_title,
                bytes_downloaded,
            } => {
                let bar = self.get_or_create_bar(worker);
                bar.set_position(bytes_downloaded);
                self.main_bar.println(format!(
                    "  {SUCCESS}{}",
                    truncate_title(&episode_title, 60).green()
                ));
                self.finish_bar(worker);
            }

            ProgressEvent::DownloadFailed {
                worker,
                episode_title,
                error,
            } => {
                self.main_bar.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&episode_title, 40).red(),
                    error.red()
                ));
                self.finish_bar(worker);
            }

            ProgressEvent::PartialFilesCleanedUp { name, count } => {
                self.main_bar.println(format!(
                    "{BROOM}{}: removed {} incomplete download(s)",
                    name,
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::SubscriptionFinished {
                name,
                new_episodes,
                downloaded,
                failed,
                ..
            } => {
                self.main_bar.println(format!(
                    "{} {} new, {} downloaded{}",
                    name.bold(),
                    new_episodes.to_string().cyan(),
                    downloaded.to_string().green(),
                    if failed > 0 {
                        format!(", {} failed", failed.to_string().red().bold())
                    } else {
                        String::new()
                    }
                ));
            }

            ProgressEvent::SubscriptionFailed { name, error, .. } => {
                self.main_bar
                    .println(format!("{CROSS}{} - {}", name.red().bold(), error.dimmed()));
            }

            ProgressEvent::BatchCompleted {
                succeeded,
                failed,
                downloaded,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} subscriptions updated, {} episodes downloaded, {} failed",
                    "Update complete:".bold().green(),
                    succeeded.to_string().green().bold(),
                    downloaded.to_string().cyan(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "podfetch=debug",
            (false, _) => "podfetch=trace",
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Names filter for the optional NAMES/PATTERNS arguments
fn names_filter(names: &[String]) -> Result<Filter> {
    if names.is_empty() {
        return Ok(Filter::All);
    }
    Filter::wildcard(names).context("Invalid subscription pattern")
}

fn list_episodes(app: &Podfetch, args: LsArgs) -> Result<()> {
    let mut episodes = Filter::All;
    if let Some(since) = args.since {
        episodes = episodes.and(Filter::PubdateAfter(since));
    }
    if let Some(until) = args.until {
        episodes = episodes.and(Filter::PubdateBefore(until));
    }
    let limit = if args.all || args.since.is_some() || args.until.is_some() {
        None
    } else {
        Some(args.newest.unwrap_or(app.config().ls_limit))
    };

    let listed = app.recent_episodes(&names_filter(&args.patterns)?, &episodes, limit)?;

    if args.path {
        for (_, episode) in &listed {
            for path in episode.local_paths() {
                println!("{}", path.display());
            }
        }
        return Ok(());
    }

    let mut last_day = None;
    for (subscription, episode) in &listed {
        let [year, month, day, ..] = episode.pubdate.0;
        if last_day != Some((year, month, day)) {
            println!("{}", format!("{:04}-{:02}-{:02}:", year, month, day).bold());
            last_day = Some((year, month, day));
        }
        println!(
            " - [{}] {}",
            subscription.display_title().cyan(),
            truncate_title(episode.title.as_deref().unwrap_or(&episode.id), 70)
        );
    }
    Ok(())
}

fn show_subscription(app: &Podfetch, subscription: &Subscription) -> Result<()> {
    let episodes = app.index().load(&subscription.name)?;
    let downloaded = episodes
        .iter()
        .filter(|e| e.files.iter().any(|f| f.local_path.is_some()))
        .count();
    let validators = app.cache().get(&subscription.name)?;
    let field = |label: &str, value: &dyn std::fmt::Display| {
        println!("{:<15}: {}", label, value);
    };

    println!("{}", subscription.name.bold());
    field("Title", &subscription.display_title());
    field("URL", &subscription.url.cyan());
    field("Enabled", &if subscription.enabled { "yes" } else { "no" });
    field("Directory", &app.content_dir(subscription).display());
    field(
        "Max Episodes",
        &if subscription.max_episodes < 0 {
            "unlimited".to_string()
        } else {
            subscription.max_episodes.to_string()
        },
    );
    field(
        "Template",
        &match (&subscription.filename_template, &app.config().filename_template) {
            (Some(own), _) => own.clone(),
            (None, Some(default)) => format!("[default] {}", default),
            (None, None) => format!("[default] {}", FALLBACK_FILENAME_TEMPLATE),
        },
    );
    field("Episodes", &format!("{} ({} downloaded)", episodes.len(), downloaded));
    if let Some(etag) = &validators.etag {
        field("ETag", etag);
    }
    if let Some(modified) = &validators.modified {
        field("Last-Modified", modified);
    }
    field(
        "Config File",
        &app.registry()
            .dir()
            .join(format!("{}.json", subscription.name))
            .display(),
    );
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let show_progress = !cli.quiet && matches!(cli.command, Command::Update { .. });
    let reporter: SharedProgressReporter = if show_progress {
        Arc::new(IndicatifReporter::new())
    } else {
        NoopReporter::shared()
    };

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;
    let app = Podfetch::new(config, Arc::new(client), reporter);

    match cli.command {
        Command::Update { names, force } => {
            let report = app
                .update_all(&names_filter(&names)?, force)
                .await
                .context("Failed to update subscriptions")?;

            for name in &report.skipped {
                println!("{} {}", name.dimmed(), "(disabled)".dimmed());
            }
            if report.failed_attachments() > 0 {
                println!(
                    "{FAILURE}{} attachment(s) failed and will be retried on the next update",
                    report.failed_attachments().to_string().red().bold()
                );
            }
            if report.failed() > 0 && report.succeeded() == 0 {
                std::process::exit(1);
            }
        }

        Command::Purge { names, simulate } => {
            let filter = names_filter(&names)?;
            for subscription in app.subscriptions(&filter)? {
                let paths = app
                    .purge(&subscription.name, simulate)
                    .with_context(|| format!("Failed to purge {}", subscription.name))?;
                for path in paths {
                    let verb = if simulate { "would delete" } else { "deleted" };
                    println!("{} {}", verb.yellow(), path.display());
                }
            }
        }

        Command::Add {
            url,
            name,
            dir,
            keep,
            template,
        } => {
            let subscription = app
                .add(NewSubscription {
                    url,
                    name,
                    title: None,
                    content_dir: dir,
                    max_episodes: keep,
                    filename_template: template,
                })
                .context("Failed to add subscription")?;
            println!(
                "{SUCCESS}Added {} ({})",
                subscription.name.bold().green(),
                subscription.url.cyan()
            );
        }

        Command::Del { names, episodes } => {
            for name in names {
                app.delete(&name, !episodes)
                    .with_context(|| format!("Failed to delete {}", name))?;
                println!("{CROSS}Deleted {}", name.bold());
            }
        }

        Command::Edit(args) => {
            let enabled = match (args.enable, args.disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let changes = SubscriptionEdit {
                name: args.new_name,
                url: args.url,
                title: args.title,
                enabled,
                max_episodes: args.keep,
                filename_template: args.template,
                content_dir: args.dir,
            };
            let subscription = app
                .edit(&args.name, changes, !args.no_move)
                .with_context(|| format!("Failed to edit {}", args.name))?;
            println!("{SUCCESS}Updated {}", subscription.name.bold().green());
        }

        Command::Ls(args) => list_episodes(&app, args)?,

        Command::Show { names } => {
            if names.is_empty() {
                for subscription in app.subscriptions(&Filter::All)? {
                    show_subscription(&app, &subscription)?;
                }
            }
            for name in &names {
                match app.subscription(name) {
                    Ok(subscription) => show_subscription(&app, &subscription)?,
                    Err(SyncError::NoSubscription(_)) => {
                        eprintln!("{FAILURE}No subscription named {}", name.bold());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Command::Daemon => {
            let interval = app.config().update_interval();
            let mut services = ServiceSet::new();
            services.add(Arc::new(PeriodicUpdate::new(app.clone(), interval)));
            services.start();

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            services.stop().await;
        }
    }

    Ok(())
}
