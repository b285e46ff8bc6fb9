// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

use dockpull::api::{
    ApiError, DashboardClient, ImageRef, PullTrigger, RepoInfo, SearchResult, TagInfo,
    SECTION_PREVIEW_LINES,
};
use dockpull::config::{self, Config, URL_ENV_VAR};
use dockpull::display::{SilentSink, TerminalSink};
use dockpull::format::{format_bytes, format_date, format_number, format_percent};
use dockpull::pull::{ProgressSink, PullError, PullSession, SessionPhase};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - the pull itself failed
    pub const ERROR: i32 = 1;
    /// Usage error - invalid image name or query
    pub const USAGE: i32 = 64;
    /// Data error - unexpected response from the dashboard
    pub const DATA_ERR: i32 = 65;
    /// No input - image not found on Docker Hub
    pub const NO_INPUT: i32 = 66;
    /// Service unavailable - dashboard not reachable
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// I/O error - connection dropped mid-stream
    pub const IO_ERR: i32 = 74;
    /// Temporary failure - request timed out
    pub const TEMP_FAIL: i32 = 75;
    /// Configuration error - unreadable config file
    pub const CONFIG: i32 = 78;
    /// Interrupted by Ctrl+C
    pub const CANCELLED: i32 = 130;
}

use exit_codes::*;

#[derive(Parser)]
#[command(name = "dockpull")]
#[command(version = VERSION)]
#[command(about = "Search Docker Hub and pull images with live progress.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dashboard URL (overrides the config file and DOCKPULL_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Show debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only print the final outcome of a pull
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search Docker Hub
    #[command(alias = "s")]
    Search {
        /// Image name to search for
        query: String,

        /// Pick a result and pull it
        #[arg(long)]
        pick: bool,

        /// Number of results to show (defaults to the configured value)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Pull an image and follow its progress
    #[command(alias = "p")]
    Pull {
        /// Image reference, e.g. library/nginx or bitnami/redis:7.4
        image: String,

        /// Tag to pull (overrides a tag in the reference)
        #[arg(short, long)]
        tag: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show Docker Hub details for an image
    #[command(alias = "i")]
    Info {
        /// Image reference, e.g. nginx or bitnami/redis:7.4
        image: String,

        /// Tag to describe (overrides a tag in the reference)
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Start a pull without following it
    Trigger {
        /// Image reference
        image: String,

        /// Tag to pull
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings
    Show,
    /// Store the dashboard URL
    SetUrl {
        /// Dashboard base URL, e.g. http://localhost:5000
        url: String,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "dockpull=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "[!]".red(), e);
            std::process::exit(CONFIG);
        }
    };
    let config = config.with_overrides(std::env::var(URL_ENV_VAR).ok(), cli.url.clone());

    let code = match run(cli, config) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };
    std::process::exit(code);
}

fn run(cli: Cli, config: Config) -> Result<i32> {
    if let Commands::Config { command } = &cli.command {
        return handle_config(command, &config);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(run_async(cli, config))
}

async fn run_async(cli: Cli, config: Config) -> Result<i32> {
    let client = config.client();

    match cli.command {
        Commands::Search { query, pick, limit } => {
            let limit = limit.unwrap_or(config.max_results);
            search(&client, &query, limit, pick, cli.quiet).await
        }
        Commands::Pull { image, tag, yes } => {
            let image = resolve_image(&image, tag)?;
            if !yes && !confirm_pull(&image)? {
                println!("Pull cancelled.");
                return Ok(SUCCESS);
            }
            pull(&client, &image, cli.quiet).await
        }
        Commands::Info { image, tag } => {
            let image = resolve_image(&image, tag)?;
            info(&client, &image).await
        }
        Commands::Trigger { image, tag } => {
            let image = resolve_image(&image, tag)?;
            match client.trigger_pull(&image).await? {
                PullTrigger::Accepted => {
                    println!("{} {} pull started", "✓".green(), image);
                    Ok(SUCCESS)
                }
                PullTrigger::Rejected(status) => {
                    eprintln!("{} Failed to start pull of {} (HTTP {})", "✗".red(), image, status);
                    Ok(ERROR)
                }
            }
        }
        Commands::Config { .. } => unreachable!(), // Handled before the runtime starts
    }
}

fn resolve_image(reference: &str, tag: Option<String>) -> Result<ImageRef> {
    let image = ImageRef::parse(reference)?;
    Ok(match tag {
        Some(tag) => image.with_tag(tag)?,
        None => image,
    })
}

fn confirm_pull(image: &ImageRef) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(true);
    }
    let answer = inquire::Confirm::new(&format!("Pull image {}? This may take a moment.", image))
        .with_default(true)
        .prompt()?;
    Ok(answer)
}

async fn search(
    client: &DashboardClient,
    query: &str,
    limit: usize,
    pick: bool,
    quiet: bool,
) -> Result<i32> {
    let results = client.search(query).await?;
    let shown: Vec<&SearchResult> = results.valid().into_iter().take(limit).collect();

    if shown.is_empty() {
        println!("No results found.");
        return Ok(SUCCESS);
    }

    for result in &shown {
        print_result(result);
    }

    if !pick {
        return Ok(SUCCESS);
    }

    let names: Vec<String> = shown.iter().map(|r| r.full_name()).collect();
    let choice = inquire::Select::new("Pull which image?", names).prompt()?;
    let Some(selected) = shown.iter().find(|r| r.full_name() == choice) else {
        return Ok(USAGE);
    };

    let tag = inquire::Text::new("Tag to pull:")
        .with_default(selected.tag_name())
        .prompt()?;
    let image = ImageRef::new(choice, tag)?;
    pull(client, &image, quiet).await
}

fn print_result(result: &SearchResult) {
    let badge = if result.is_official {
        format!(" {}", "[Official]".green())
    } else {
        String::new()
    };

    println!("{}{}", result.full_name().bold(), badge);
    println!(
        "  {}",
        result.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("No description")
    );
    println!(
        "  {}",
        format!(
            "Pulls: {} | Latest Tag: {} | Size: {} | Updated: {}",
            format_number(result.pull_count),
            result.tag_name(),
            format_bytes(result.size_bytes()),
            format_date(result.last_updated()),
        )
        .dimmed()
    );
    println!();
}

async fn info(client: &DashboardClient, image: &ImageRef) -> Result<i32> {
    let (repo, tag) = tokio::join!(client.repo_info(image.repo()), client.tag_info(image));

    let Some(repo) = repo? else {
        eprintln!("{} {} was not found on Docker Hub", "✗".red(), image.repo());
        return Ok(NO_INPUT);
    };
    // Missing tag details only hide the size line.
    let tag = tag.unwrap_or_else(|e| {
        tracing::warn!("Tag details for {} unavailable: {}", image, e);
        None
    });

    print_repo_info(&repo, tag.as_ref(), image);
    Ok(SUCCESS)
}

fn print_repo_info(repo: &RepoInfo, tag: Option<&TagInfo>, image: &ImageRef) {
    let badge = if repo.is_official {
        format!(" {}", "[Official]".green())
    } else {
        String::new()
    };
    println!("{}{}", repo.full_name().bold(), badge);
    println!(
        "  {}",
        repo.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("No description")
    );
    println!();

    let size = tag.and_then(|t| t.full_size).unwrap_or(0);
    println!(
        "  Stars: {} | Pulls: {} | Size ({}): {}",
        format_number(repo.star_count),
        format_number(repo.pull_count),
        image.tag(),
        format_bytes(size)
    );
    let updated = tag
        .and_then(|t| t.last_updated.as_deref())
        .or(repo.last_updated.as_deref());
    println!("  Updated: {}", format_date(updated));

    if !repo.categories.is_empty() {
        let names: Vec<&str> = repo.categories.iter().map(|c| c.name.as_str()).collect();
        println!("  Categories: {}", names.join(", "));
    }

    for section in repo.sections(SECTION_PREVIEW_LINES) {
        println!();
        println!("{}", section.title.bold());
        for line in &section.lines {
            println!("  {}", line);
        }
        if section.truncated {
            println!("  {}", "...and more".dimmed());
        }
    }

    println!();
    println!("{}", repo.hub_url().cyan());
}

async fn pull(client: &DashboardClient, image: &ImageRef, quiet: bool) -> Result<i32> {
    let body = client.pull_stream(image).await?;

    let sink: Box<dyn ProgressSink> = if quiet {
        Box::new(SilentSink::new())
    } else {
        Box::new(TerminalSink::new(&image.to_string()))
    };

    let session = PullSession::new(body, sink);
    let cancel = session.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = session.start().await;
    ctrl_c.abort();

    let code = match (outcome.phase, &outcome.error) {
        (SessionPhase::Completed, _) => {
            let layers = outcome.state.layers.len();
            if quiet {
                println!("{} pulled", image);
            } else if layers > 0 {
                println!(
                    "  {} of {} layers complete",
                    outcome.state.completed_layers(),
                    layers
                );
            }
            SUCCESS
        }
        (SessionPhase::Failed, error) => {
            if quiet {
                if let Some(error) = error {
                    eprintln!("{} {}", image, error);
                }
            }
            match error {
                Some(PullError::Transport(_)) => IO_ERR,
                _ => ERROR,
            }
        }
        (SessionPhase::Cancelled, _) => {
            eprintln!(
                "{} Pull of {} cancelled at {}",
                "[!]".yellow(),
                image,
                format_percent(outcome.state.percent()).trim()
            );
            CANCELLED
        }
        (phase, _) => {
            tracing::error!("Session ended in unexpected phase {:?}", phase);
            ERROR
        }
    };

    if outcome.parse_failures > 0 {
        tracing::info!("{} malformed progress lines skipped", outcome.parse_failures);
    }
    Ok(code)
}

fn handle_config(command: &ConfigCommands, config: &Config) -> Result<i32> {
    match command {
        ConfigCommands::Show => {
            println!("Config file:      {}", config::config_path()?.display());
            println!("Dashboard URL:    {}", config.base_url);
            println!("Request timeout:  {}s", config.request_timeout_secs);
            println!("Search results:   {}", config.max_results);
        }
        ConfigCommands::SetUrl { url } => {
            // Persist the file's own values, not the env/CLI overrides.
            let mut stored = config::load_config()?;
            stored.base_url = url.trim_end_matches('/').to_string();
            config::save_config(&stored)?;
            println!("{} Dashboard URL set to {}", "✓".green(), stored.base_url);
        }
    }
    Ok(SUCCESS)
}

/// Print an error with a hint and map it to an exit code.
fn report_error(err: &anyhow::Error) -> i32 {
    eprintln!("{} {:#}", "✗".red(), err);

    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Unreachable(_)) => {
            eprintln!("  Check the dashboard is running, or set its address with:");
            eprintln!("    dockpull config set-url <URL>   (or {}=<URL>)", URL_ENV_VAR);
            SERVICE_UNAVAILABLE
        }
        Some(ApiError::Timeout(_)) => TEMP_FAIL,
        Some(ApiError::InvalidRequest(_)) => USAGE,
        Some(ApiError::InvalidResponse(_)) => DATA_ERR,
        Some(ApiError::Http { .. }) | Some(ApiError::Network(_)) => ERROR,
        None => match err.downcast_ref::<inquire::InquireError>() {
            Some(inquire::InquireError::OperationCanceled)
            | Some(inquire::InquireError::OperationInterrupted) => CANCELLED,
            _ => ERROR,
        },
    }
}
