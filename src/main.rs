use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cs_classify::checkpoint::CheckpointStore;
use cs_classify::config::Config;
use cs_classify::dataset::{has_identifier, load_records, merge_results, resolve_output_path, save_records};
use cs_classify::domain::{categories_json, load_categories, preprocess::preprocess, render_system_prompt};
use cs_classify::llm::{AzureConfig, AzureOpenAiClient};
use cs_classify::scheduler::{RunReport, Scheduler, TokenEstimator};

const RAW_RESULTS_FALLBACK: &str = "raw_results_error.jsonl";

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.is_verbose() {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if cli.log_stderr {
        builder.target(env_logger::Target::Stderr).init();
        info!("Logging initialized, writing to stderr");
        return Ok(());
    }

    // Create log directory
    let log_dir = &config.storage.log_dir;
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!("{}.log", env!("CARGO_PKG_NAME")));

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    let domain = cli.domain;
    info!("Starting processing for domain: {}", domain);

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    // Original rows are kept untouched for the final merge
    let original = load_records(&cli.input).context("Failed to load input data")?;
    info!("Loaded {} rows", original.len());

    let items = preprocess(domain, original.clone()).context("Failed to preprocess input data")?;
    info!("Prepared {} items for classification", items.len());

    let categories = load_categories(&cli.categories).context("Failed to load categories")?;
    let system_prompt = render_system_prompt(domain, &categories_json(&categories)?);

    // Checked before the run; a finished run clears its checkpoint
    let output = resolve_output_path(cli.output.as_deref(), &cli.input, chrono::Local::now())
        .context("Invalid output path")?;

    let azure = AzureConfig::resolve(&config.llm).context("Missing Azure OpenAI settings")?;
    let client = Arc::new(AzureOpenAiClient::new(azure, &config.llm).context("Failed to create model client")?);

    let checkpoint_dir = cli
        .checkpoint_dir
        .clone()
        .unwrap_or_else(|| config.storage.checkpoint_dir.clone());
    let store = CheckpointStore::new(&checkpoint_dir, &cli.input, domain);
    if cli.fresh && store.clear().context("Failed to remove existing checkpoint")? {
        println!("{} {}", "Discarded checkpoint:".yellow(), store.path().display());
    }

    println!(
        "{} {} items from {} ({})",
        "Classifying:".cyan(),
        items.len(),
        cli.input.display(),
        domain
    );

    let scheduler = Scheduler::new(config.scheduler.to_scheduler_config(), client, domain)
        .with_estimator(TokenEstimator::detect())
        .with_checkpoint(store);
    let report = scheduler.run(items, &system_prompt).await;

    print_summary(&report);

    if report.results.is_empty() {
        log::warn!("No results generated");
        println!("{}", "No results generated".yellow());
        return Ok(());
    }

    let id_field = domain.id_field();
    if !has_identifier(&report.results, id_field) {
        log::error!("Results missing id field {}, cannot merge", id_field);
        save_records(Path::new(RAW_RESULTS_FALLBACK), &report.results)
            .context("Failed to save raw results")?;
        println!(
            "{} results lack '{}', raw results written to {}",
            "Error:".red(),
            id_field,
            RAW_RESULTS_FALLBACK
        );
        return Ok(());
    }

    let merged = merge_results(&original, &report.results, id_field);
    save_records(&output, &merged).context("Failed to save results")?;

    println!("{} {} rows -> {}", "Saved:".green(), merged.len(), output.display());
    Ok(())
}

fn print_summary(report: &RunReport) {
    let status = &report.status;
    println!(
        "{} {} batches ({} resumed) in {:.1}s",
        "Finished:".green(),
        report.total_batches,
        report.resumed_batches,
        report.elapsed.as_secs_f64()
    );
    println!(
        "  succeeded: {}  failed: {}",
        status.num_tasks_succeeded.to_string().green(),
        status.num_tasks_failed.to_string().red()
    );
    println!(
        "  rate limit errors: {}  api errors: {}  format errors: {}",
        status.num_rate_limit_errors, status.num_api_errors, status.num_format_errors
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the log directory is known
    setup_logging(&cli, &config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
