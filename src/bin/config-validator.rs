//! # mproc Configuration Validator
//!
//! Command-line tool for validating mproc configuration files per environment.
//! Loads `mproc-config.yaml` from a directory, applies the environment
//! section, validates the result and prints the resolved pool size and sink
//! paths. Exits 0 when the configuration is usable, 1 otherwise.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mproc_core::config::{ConfigManager, MprocConfig};
use mproc_core::state::localization::SUPPORTED_LANGUAGES;
use mproc_core::state::SystemFacts;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mproc-config-validator")]
#[command(about = "Validate mproc configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Logical CPU count to size the pool for (default: this host)
    #[arg(long)]
    cpus: Option<usize>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration components
    All,

    /// Validate a single component (logging, workers, scheduler, localization)
    Component { name: String },

    /// List environments found in the configuration file
    Environments,
}

type CliResult = anyhow::Result<()>;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            println!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<MprocConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading environment '{}'", cli.environment))?;
    Ok(manager.config().clone())
}

fn host_cpus(cli: &Cli) -> usize {
    cli.cpus.unwrap_or_else(|| SystemFacts::gather().logical_cpus)
}

fn validate_all_config(cli: &Cli) -> CliResult {
    let config = load(cli)?;
    let cpus = host_cpus(cli);

    if cli.format == "json" {
        let report = serde_json::json!({
            "environment": cli.environment,
            "pool_size": config.pool_size(cpus),
            "logical_cpus": cpus,
            "log_text_path": config.log_text_enable.then(|| config.resolved_log_text_path("<run-stamp>")),
            "log_sql_path": config.log_sql_enable.then(|| config.resolved_log_sql_path()),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🔧 Validating mproc Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!("✅ Configuration loaded and validated");
    println!();

    validate_logging_config(&config)?;
    validate_worker_config(&config, cpus)?;
    validate_scheduler_config(&config)?;
    validate_localization_config(&config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> CliResult {
    println!("🔧 Validating Component: {component_name}");
    let config = load(cli)?;

    match component_name.to_lowercase().as_str() {
        "logging" => validate_logging_config(&config)?,
        "workers" | "worker" => validate_worker_config(&config, host_cpus(cli))?,
        "scheduler" => validate_scheduler_config(&config)?,
        "localization" | "language" => validate_localization_config(&config)?,
        _ => bail!("Unknown component: {component_name}"),
    }

    println!("✅ Component '{component_name}' validation passed!");
    Ok(())
}

fn list_environments(cli: &Cli) -> CliResult {
    println!("📋 Available Environments:");
    let dir = cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"));
    let path = ["mproc-config.yaml", "mproc-config.yml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
        .with_context(|| format!("no mproc-config.yaml in {}", dir.display()))?;

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    let mut environments: Vec<String> = raw
        .as_mapping()
        .map(|map| {
            map.iter()
                .filter(|(_, value)| value.is_mapping())
                .filter_map(|(key, _)| key.as_str().map(str::to_string))
                .filter(|key| key != "scheduler")
                .collect()
        })
        .unwrap_or_default();
    environments.sort();

    for env in environments {
        println!("  • {env}");
    }
    Ok(())
}

fn validate_logging_config(config: &MprocConfig) -> CliResult {
    println!("📝 Validating Logging Configuration...");
    if !config.log_enable && !config.log_to_console {
        println!("   ⚠️  Persistence and console are both off; only counters will move");
    }
    println!("   ✅ Console: {}", config.log_to_console);
    if config.log_enable && config.log_text_enable {
        println!(
            "   ✅ Text sink: {}",
            config.resolved_log_text_path("<run-stamp>").display()
        );
    }
    if config.log_enable && config.log_sql_enable {
        println!("   ✅ SQL sink: {}", config.resolved_log_sql_path().display());
    }
    let both: Vec<_> = config
        .no_log_levels
        .intersection(&config.no_print_levels)
        .map(ToString::to_string)
        .collect();
    if !both.is_empty() {
        println!("   ℹ️  Fully suppressed levels: {}", both.join(", "));
    }
    Ok(())
}

fn validate_worker_config(config: &MprocConfig, cpus: usize) -> CliResult {
    println!("👷 Validating Worker Configuration...");
    if !config.mp_enable {
        println!("   ℹ️  mp_enable is off; tasks run inline in the orchestrator");
    }
    println!(
        "   ✅ Pool size: {} (of {} logical CPUs, {})",
        config.pool_size(cpus),
        cpus,
        if config.max_workers_use_abs { "absolute" } else { "relative" }
    );
    Ok(())
}

fn validate_scheduler_config(config: &MprocConfig) -> CliResult {
    println!("⏱️  Validating Scheduler Configuration...");
    let scheduler = &config.scheduler;
    if scheduler.tick_interval_ms == 0 {
        bail!("scheduler.tick_interval_ms must be at least 1");
    }
    println!("   ✅ Queue depth limit: {}", scheduler.max_queue_depth);
    println!("   ✅ Task retries: {}", scheduler.max_task_retries);
    println!("   ✅ Shutdown grace: {}ms", scheduler.shutdown_grace_ms);
    Ok(())
}

fn validate_localization_config(config: &MprocConfig) -> CliResult {
    println!("🌐 Validating Localization Configuration...");
    let language = config.language.trim().to_ascii_lowercase();
    if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        bail!(
            "language '{}' has no message table (supported: {})",
            config.language,
            SUPPORTED_LANGUAGES.join(", ")
        );
    }
    println!("   ✅ Language: {language}");
    Ok(())
}
