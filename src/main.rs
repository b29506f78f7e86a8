use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mailsweep::engine::{EventLevel, ExecutionEngine, RunEvent};
use mailsweep::store::{JsonRuleStore, JsonlLogSink, RuleStore};
use mailsweep::{Config, GmailMailProvider, MailProvider, RunOutcome};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailsweep", about = "Rule-driven mailbox cleanup for Gmail")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "mailsweep.toml", global = true)]
    config: PathBuf,

    /// Path to OAuth2 credentials JSON
    #[arg(long, default_value = "credentials.json", global = true)]
    credentials: PathBuf,

    /// Path to the cached OAuth2 token
    #[arg(long, default_value = ".mailsweep/token.json", global = true)]
    token_cache: PathBuf,

    /// Path to the rules file
    #[arg(long, default_value = "rules.json", global = true)]
    rules: PathBuf,

    /// Path to the action log
    #[arg(long, default_value = ".mailsweep/actions.jsonl", global = true)]
    log_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with the Gmail API and test the connection
    Auth {
        /// Discard any cached token and re-authenticate
        #[arg(long)]
        force: bool,
    },

    /// Run enabled cleanup rules against the mailbox
    Run {
        /// Simulate actions without changing the mailbox
        #[arg(long)]
        dry_run: bool,

        /// Run only the named rule
        #[arg(long)]
        rule: Option<String>,

        /// Override the per-rule candidate ceiling
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// List configured rules
    Rules,

    /// Write an example configuration file
    InitConfig {
        /// Output path
        #[arg(long, default_value = "mailsweep.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: mailsweep --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls; dependencies pull in
    // more than one provider, so one must be chosen explicitly.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailsweep=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mailsweep=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Auth { force } => {
            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hub = mailsweep::auth::initialize_hub(&cli.credentials, &cli.token_cache).await?;
            mailsweep::auth::secure_token_file(&cli.token_cache).await?;

            println!("Successfully authenticated with the Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            let provider = GmailMailProvider::new(hub);
            let address = provider.profile().await?;
            println!("Connected to account: {}", address);

            Ok(())
        }

        Commands::Run {
            dry_run,
            rule,
            max_results,
        } => {
            let mut config = Config::load(&cli.config).await?;
            if let Some(max) = max_results {
                config.search.max_results = max;
            }

            let effective_dry_run = dry_run || config.execution.dry_run;
            if effective_dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }

            let hub = mailsweep::auth::initialize_hub(&cli.credentials, &cli.token_cache).await?;
            let provider = Arc::new(GmailMailProvider::new(hub));
            let rule_store = Arc::new(JsonRuleStore::load(&cli.rules).await?);
            let log_sink = Arc::new(JsonlLogSink::new(&cli.log_file));

            let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
            let cancel = CancellationToken::new();

            let engine = ExecutionEngine::new(
                Arc::clone(&provider) as Arc<dyn MailProvider>,
                Arc::clone(&rule_store) as Arc<dyn RuleStore>,
                log_sink,
                config,
            )
            .with_cancellation(cancel.clone())
            .with_events(event_tx);

            // First Ctrl-C requests a cooperative stop; the engine
            // finishes the in-flight message before honoring it.
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nCancellation requested; finishing current message...");
                    ctrl_c_token.cancel();
                }
            });

            let reporter = tokio::spawn(render_events(event_rx));

            let override_flag = if dry_run { Some(true) } else { None };

            match rule {
                Some(name) => {
                    let rule = rule_store
                        .all_rules()
                        .await
                        .into_iter()
                        .find(|r| r.name == name)
                        .ok_or_else(|| anyhow::anyhow!("No rule named '{}'", name))?;

                    let stats = engine.run_one(&rule, override_flag).await;
                    drop(engine);
                    let _ = reporter.await;

                    println!("\nRule '{}' results:", name);
                    println!("  Messages matched: {}", stats.matched);
                    println!("  Actions successful: {}", stats.success);
                    println!("  Actions failed: {}", stats.failed);
                }
                None => {
                    let summary = engine.run_all(override_flag).await?;
                    drop(engine);
                    let _ = reporter.await;

                    println!("\nCleanup Summary");
                    println!("========================================");
                    println!("Run ID: {}", summary.run_id);
                    if summary.outcome == RunOutcome::Cancelled {
                        println!("Outcome: CANCELLED (partial results)");
                    }
                    println!("Rules processed: {}", summary.stats.rules_processed);
                    println!("Messages matched: {}", summary.stats.matched);
                    println!("Actions successful: {}", summary.stats.success);
                    println!("Actions failed: {}", summary.stats.failed);
                    println!(
                        "Duration: {}",
                        format_duration(summary.duration_seconds() as u64)
                    );
                    println!("========================================");
                }
            }

            Ok(())
        }

        Commands::Rules => {
            let rule_store = JsonRuleStore::load(&cli.rules).await?;
            let rules = rule_store.all_rules().await;

            if rules.is_empty() {
                println!("No rules configured in {:?}", cli.rules);
                return Ok(());
            }

            println!("{} rules in {:?}:\n", rules.len(), cli.rules);
            for rule in rules {
                let state = if rule.enabled { "enabled" } else { "disabled" };
                let last_run = rule
                    .last_run_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());

                println!("  {} [{}]", rule.name, state);
                println!(
                    "    when {:?} {:?} {:?}, older than {} days",
                    rule.field, rule.operator, rule.value, rule.older_than_days
                );
                match &rule.action_param {
                    Some(param) => {
                        println!("    then {} ({})", rule.action.as_str(), param)
                    }
                    None => println!("    then {}", rule.action.as_str()),
                }
                println!("    last run: {}", last_run);
            }

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                );
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - search.max_results: candidate ceiling per rule");
            println!("  - search.exclusions: folders skipped by every rule");
            println!("  - quota.calls_per_minute: provider rate ceiling");

            Ok(())
        }
    }
}

/// Drain engine events into a progress display
///
/// Log lines print above the spinner; progress ticks update the
/// spinner message with the running fetch count.
async fn render_events(mut rx: tokio::sync::mpsc::UnboundedReceiver<RunEvent>) {
    let multi = MultiProgress::new();
    let spinner = multi.add(ProgressBar::new_spinner());
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Log { level, message } => {
                let prefix = match level {
                    EventLevel::Info => "",
                    EventLevel::Warn => "warning: ",
                    EventLevel::Error => "error: ",
                };
                let _ = multi.println(format!("{}{}", prefix, message));
            }
            RunEvent::Progress { rule_name, fetched } => {
                spinner.set_message(format!("{}: fetched {} messages", rule_name, fetched));
            }
        }
    }

    spinner.finish_and_clear();
}

/// Render a duration as h/m/s for the summary block
fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
