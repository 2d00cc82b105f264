use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::Cli;
use cli::commands::{Commands, InstructionCommands};
use promptmill::config::Config;
use promptmill::discover::collect_files;
use promptmill::domain::Instruction;
use promptmill::llm::{LlmClient, OpenAiCompatClient};
use promptmill::pipeline::Pipeline;
use promptmill::presenter::ConsolePresenter;
use promptmill::storage::{AnalysisStore, FileInstructionStore, InstructionStore};

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptmill")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("promptmill.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_instruction_store(config: &Config) -> Result<FileInstructionStore> {
    FileInstructionStore::new(&config.storage.instructions_dir).context("Failed to open instruction store")
}

fn load_instruction(store: &dyn InstructionStore, name: &str) -> Result<Instruction> {
    store
        .load(name)?
        .ok_or_else(|| eyre!("No instruction named '{}'", name))
}

/// Everything a pipeline needs, built from config
fn start_pipeline(config: &Config, verbose: bool) -> Result<Pipeline> {
    let client: Arc<dyn LlmClient> =
        Arc::new(OpenAiCompatClient::new(&config.endpoint).context("Failed to create endpoint client")?);
    let instructions = Arc::new(open_instruction_store(config)?);
    let analysis = AnalysisStore::new(&config.storage.analysis_dir).context("Failed to open analysis store")?;
    let presenter = Arc::new(ConsolePresenter::new(verbose));

    Ok(Pipeline::start(config.clone(), client, instructions, analysis, presenter))
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            paths,
            instruction,
            no_auto_tune,
            timeout,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(handle_run_command(
                paths,
                instruction,
                *no_auto_tune,
                timeout.map(Duration::from_secs),
                config,
                cli.is_verbose(),
            ))
        }
        Commands::Instructions { command } => handle_instructions_command(command, config),
        Commands::Optimize { name } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(handle_optimize_command(name, config, cli.is_verbose()))
        }
        Commands::History { limit } => handle_history_command(*limit, config),
    }
}

async fn handle_run_command(
    paths: &[PathBuf],
    instruction_name: &str,
    no_auto_tune: bool,
    timeout: Option<Duration>,
    config: &Config,
    verbose: bool,
) -> Result<()> {
    let store = open_instruction_store(config)?;
    let instruction = load_instruction(&store, instruction_name)?;

    let files = collect_files(paths, &config.pipeline)?;
    if files.is_empty() {
        println!("{}", "No supported files found".yellow());
        return Ok(());
    }
    info!("Running '{}' over {} file(s)", instruction_name, files.len());

    let pipeline = start_pipeline(config, verbose)?;
    if no_auto_tune {
        pipeline.set_auto_tune(false);
    }

    let accepted = match pipeline.start_batch(&files, instruction) {
        Ok(accepted) => accepted,
        Err(e) => {
            pipeline.stop().await;
            return Err(e.into());
        }
    };
    println!(
        "{} {} of {} file(s) queued",
        "Processing:".green(),
        accepted,
        files.len()
    );

    let finished = tokio::select! {
        done = async {
            match timeout {
                Some(limit) => pipeline.wait_for_batch_timeout(limit).await,
                None => {
                    pipeline.wait_for_batch().await;
                    true
                }
            }
        } => done,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Interrupted, stopping...".yellow());
            false
        }
    };

    let progress = pipeline.progress();
    pipeline.stop().await;

    if finished && progress.dropped == 0 {
        println!("{} {}/{} applied", "Done:".green().bold(), progress.completed, progress.total);
    } else if finished {
        println!(
            "{} {}/{} applied, {} dropped",
            "Done:".yellow().bold(),
            progress.completed,
            progress.total,
            progress.dropped
        );
    } else {
        println!(
            "{} {}/{} applied before stopping",
            "Stopped:".yellow().bold(),
            progress.completed,
            progress.total
        );
    }
    Ok(())
}

fn handle_instructions_command(command: &InstructionCommands, config: &Config) -> Result<()> {
    let store = open_instruction_store(config)?;

    match command {
        InstructionCommands::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("{}", "No instructions stored".yellow());
            }
            for name in names {
                println!("{}", name);
            }
        }
        InstructionCommands::Show { name } => {
            let instruction = load_instruction(&store, name)?;
            println!("{} {}", "Name:".green(), instruction.name);
            println!("{} {}", "Language:".green(), instruction.language);
            println!("{} {}", "Created:".green(), instruction.created);
            println!("{}\n{}", "Positive:".green(), instruction.positive);
            println!("{}\n{}", "Negative:".green(), instruction.negative);
        }
        InstructionCommands::Save {
            name,
            positive,
            negative,
            language,
        } => {
            let mut instruction = Instruction::new(name, positive, negative);
            if let Some(language) = language {
                instruction = instruction.with_language(language);
            }
            instruction.validate()?;
            store.save(&instruction)?;
            println!("{} {}", "Saved:".green(), name);
        }
        InstructionCommands::Delete { name } => {
            if store.delete(name)? {
                println!("{} {}", "Deleted:".red(), name);
            } else {
                println!("{} {}", "Not found:".yellow(), name);
            }
        }
    }
    Ok(())
}

async fn handle_optimize_command(name: &str, config: &Config, verbose: bool) -> Result<()> {
    let store = open_instruction_store(config)?;
    let instruction = load_instruction(&store, name)?;

    let pipeline = start_pipeline(config, verbose)?;
    pipeline.set_active_instruction(instruction);
    let outcome = pipeline.optimize_now().await;
    pipeline.stop().await;

    let optimized = outcome?;
    println!("{} {}", "Optimized:".green(), optimized.name);
    println!("{}\n{}", "Positive:".green(), optimized.positive);
    println!("{}\n{}", "Negative:".green(), optimized.negative);
    Ok(())
}

fn handle_history_command(limit: Option<usize>, config: &Config) -> Result<()> {
    let store = AnalysisStore::new(&config.storage.analysis_dir).context("Failed to open analysis store")?;
    let records = store.list()?;
    let skip = limit.map(|n| records.len().saturating_sub(n)).unwrap_or(0);

    if records.is_empty() {
        println!("{}", "No analysis records".yellow());
    }
    for record in records.iter().skip(skip) {
        let score = if record.score < config.pipeline.score_threshold {
            record.score.to_string().red()
        } else {
            record.score.to_string().green()
        };
        let instruction = record.instruction.as_ref().map(|i| i.name.as_str()).unwrap_or("-");
        println!("{}  {:>6}  {}  [{}]", record.timestamp, score, record.file.display(), instruction);
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
