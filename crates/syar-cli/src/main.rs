//! syar-guard: inspect and exercise the network guard
//!
//! Commands:
//!   syar-guard rules            - Print the active rules
//!   syar-guard check <url>...   - Classify targets
//!   syar-guard fetch <url>      - Fetch through guarded primitives
//!   syar-guard config           - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use syar_guard::{FetchBlockMode, GuardConfig, InstallReport, NetworkGuard};
use syar_network::{Bindings, FetchRequest, HttpClientConfig, TaskQueue};
use syar_policy::{Decision, Outcome, RuleSummary};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "syar-guard")]
#[command(about = "Request-interception policy engine", long_about = None)]
struct Cli {
    /// Guard configuration (.toml or .json); built-in rules when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Base URL for relative targets
    #[arg(long, global = true)]
    base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active rules as JSON
    Rules,

    /// Classify each URL and print the outcome
    Check {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Issue a GET through the guarded fetch primitive
    Fetch {
        url: String,

        /// Resolve blocked fetches with a synthetic 403 instead of failing
        #[arg(long)]
        resolve: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct CheckLine<'a> {
    url: &'a str,
    outcome: Outcome,
    rule: Option<RuleSummary>,
}

impl<'a> CheckLine<'a> {
    fn new(url: &'a str, decision: Decision) -> Self {
        Self {
            url,
            outcome: decision.outcome,
            rule: decision.matched_rule.as_ref().map(|r| r.summary()),
        }
    }
}

fn load_config(cli: &Cli) -> Result<GuardConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            GuardConfig::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => GuardConfig::default(),
    };
    if let Some(base) = &cli.base {
        config.base_url = Some(base.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; command output owns stdout
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,syar_guard::audit=info")))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = load_config(&cli)?;
    let guard = NetworkGuard::from_config(&config, None)?;

    match cli.command {
        Commands::Rules => rules_command(&guard),
        Commands::Check { ref urls, json } => check_command(&guard, urls, json),
        Commands::Fetch { ref url, resolve } => {
            let mode = if resolve { FetchBlockMode::Resolve } else { config.fetch_block_mode };
            fetch_command(guard.with_fetch_mode(mode), url)
        }
        Commands::Config => {
            print!("{}", config.to_toml());
            Ok(())
        }
    }
}

fn rules_command(guard: &NetworkGuard) -> Result<()> {
    let rules = guard.diagnostics().rules();
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn check_command(guard: &NetworkGuard, urls: &[String], json: bool) -> Result<()> {
    let lines: Vec<CheckLine> = urls.iter().map(|url| CheckLine::new(url, guard.classify(url))).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }

    for line in &lines {
        match &line.rule {
            Some(rule) => println!("{:<5}  {}  ({}: {})", line.outcome.to_string(), line.url, rule.kind, rule.value),
            None => println!("{:<5}  {}", line.outcome.to_string(), line.url),
        }
    }
    Ok(())
}

fn install_guard(guard: &NetworkGuard) -> Result<InstallReport> {
    let report = guard
        .install_process_wide()
        .context("Network guard not installed: no process-wide bindings")?;
    info!(
        "Network guard installed ({} replaced, {} already guarded)",
        report.changed.len(),
        report.unchanged.len()
    );
    Ok(report)
}

fn fetch_command(guard: NetworkGuard, url: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let bindings = Bindings::network(runtime.handle().clone(), TaskQueue::new(), HttpClientConfig::default())
        .install_global()
        .map_err(|_| anyhow::anyhow!("Process-wide bindings already set"))?;

    install_guard(&guard)?;
    info!("Fetching {}", url);

    let result = runtime.block_on(bindings.fetch().fetch(FetchRequest::get(url)));
    match result {
        Ok(response) => {
            println!("{} {}", response.status, response.final_url);
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Err(e) => println!("error: {}", e),
    }

    let stats = guard.diagnostics().stats();
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
