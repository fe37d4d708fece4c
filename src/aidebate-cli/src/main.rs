//! AI Debate CLI
//!
//! A command-line tool that researches a topic and then has two models debate
//! it, streaming every turn to the terminal.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aidebate_core::{
    Config, DebateEvent, DebateOrchestrator, DebatePhase, DebateSetup, EngineSettings,
    ResearchCollector, Side, StreamingEngine, TurnOutcome, build_http_client,
};
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Config file read from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "aidebate.toml";

#[derive(Parser)]
#[command(
    name = "aidebate",
    version,
    about = "AI Debate Tool - Watch two models debate a topic",
    long_about = "Researches a topic with a search-grounded model, \
                  then streams a structured debate between two models."
)]
struct Cli {
    /// The topic to debate
    #[arg(value_name = "TOPIC", required_unless_present = "list_models")]
    topic: Option<String>,

    /// Model arguing in favor (name or model id)
    #[arg(short, long, value_name = "MODEL")]
    affirmative: Option<String>,

    /// Model arguing against (name or model id)
    #[arg(short, long, value_name = "MODEL")]
    opposition: Option<String>,

    /// Number of debate rounds
    #[arg(short, long, value_name = "ROUNDS")]
    rounds: Option<u32>,

    /// Language both debaters answer in
    #[arg(short, long, value_name = "LANGUAGE")]
    language: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the transcript as Markdown to this file
    #[arg(short, long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// List the available models and exit
    #[arg(long)]
    list_models: bool,

    /// Print debug logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    let mut config = load_config(cli.config.as_deref())?;
    config.credentials = config.credentials.with_env_overrides();

    if cli.list_models {
        print_models(&config);
        return Ok(());
    }

    let topic = cli.topic.unwrap_or_default();
    let rounds = cli.rounds.unwrap_or(config.debate.rounds);
    let language = cli.language.unwrap_or_else(|| config.debate.language.clone());
    let affirmative = config.model(
        cli.affirmative
            .as_deref()
            .unwrap_or(config.debate.affirmative_model.as_str()),
    )?;
    let opposition = config.model(
        cli.opposition
            .as_deref()
            .unwrap_or(config.debate.opposition_model.as_str()),
    )?;

    for (side, model) in [(Side::Affirmative, &affirmative), (Side::Opposition, &opposition)] {
        if config.credentials.get(model.credential).is_none() {
            eprintln!(
                "{}",
                format!(
                    "Warning: {} is not set. The {} side's turns will be skipped.",
                    model.credential.env_var(),
                    side
                )
                .yellow()
            );
        }
    }

    let settings = EngineSettings::from(&config);
    let http = build_http_client(&settings)?;
    let engine = StreamingEngine::with_client(http.clone(), settings.gemini_word_delay);
    let researcher = ResearchCollector::new(http, config.debate.research_model.clone())
        .with_language(language.clone());

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {} - Research & Debate", "AI Debate".bold()).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.bright_white());
    println!();
    println!("{}", "Participants:".bold());
    println!(
        "  1. {} - using {}",
        Side::Affirmative.display_name().bright_cyan(),
        affirmative.name.dimmed()
    );
    println!(
        "  2. {} - using {}",
        Side::Opposition.display_name().bright_cyan(),
        opposition.name.dimmed()
    );
    println!("  {} {}", "Rounds:".bold(), rounds);
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let mut orchestrator = DebateOrchestrator::new(
        Arc::new(engine),
        Arc::new(researcher),
        config.credentials.clone(),
    )
    .with_prompts(config.prompts.clone())
    .with_language(language)
    .with_callback(create_console_callback());

    let interrupts = futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    tokio::spawn(handle_interrupts(
        interrupts,
        orchestrator.cancel_handle(),
        || std::process::exit(130),
    ));

    let outcome = orchestrator
        .run(DebateSetup::new(topic, rounds, affirmative, opposition))
        .await
        .map(|session| session.was_cancelled());

    if let (Some(path), Some(session)) = (&cli.export, orchestrator.session()) {
        std::fs::write(path, session.export_markdown(Local::now()))?;
        println!("{} {}", "Transcript written to".dimmed(), path.display());
    }

    let cancelled = match outcome {
        Ok(cancelled) => cancelled,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    if cancelled {
        println!("{}", "  Debate cancelled.".yellow().bold());
    } else {
        println!("{}", "  Debate concluded.".bright_green().bold());
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Cancel the debate on the first interrupt and force quit on the second.
async fn handle_interrupts(
    interrupts: impl Stream<Item = ()>,
    cancel: CancellationToken,
    force_quit: impl FnOnce(),
) {
    let mut interrupts = std::pin::pin!(interrupts);
    if interrupts.next().await.is_none() {
        return;
    }

    tracing::info!("interrupt received, cancelling debate");
    cancel.cancel();
    eprintln!("{}", "\nCancelling... press Ctrl-C again to quit.".yellow());

    if interrupts.next().await.is_some() {
        tracing::warn!("second interrupt received, quitting");
        force_quit();
    }
}

/// Load the given config file, or `aidebate.toml` if present, or defaults.
fn load_config(path: Option<&Path>) -> Result<Config, aidebate_core::DebateError> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::load(DEFAULT_CONFIG_FILE),
        None => Ok(Config::default()),
    }
}

fn print_models(config: &Config) {
    println!("{}", "Available models:".bold());
    for model in config.catalog() {
        let key = if config.credentials.get(model.credential).is_some() {
            "key set".green()
        } else {
            "no key".red()
        };
        println!(
            "  {:<32} {:<10} {:<28} {}",
            model.name.bright_cyan(),
            model.provider.to_string(),
            model.model_id.dimmed(),
            key
        );
    }
}

/// Create a callback that prints debate events to the console.
fn create_console_callback() -> Box<dyn Fn(DebateEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DebateEvent::PhaseChanged(DebatePhase::Researching) => {
            println!("{}", "🔎 Researching the topic...".bright_magenta());
        }
        DebateEvent::PhaseChanged(DebatePhase::Debating {
            round,
            side: Side::Affirmative,
        }) => {
            println!();
            println!("{}", "═".repeat(70).bright_magenta());
            println!("{}", format!("  📢 ROUND {}", round).bright_magenta().bold());
            println!("{}", "═".repeat(70).bright_magenta());
        }
        DebateEvent::PhaseChanged(_) => {}
        DebateEvent::EntryAppended { entry, .. } => {
            println!();
            match (&entry.speaker, entry.is_system) {
                (Some(speaker), false) => {
                    println!("{} {}", "▶".bright_cyan(), speaker.bright_cyan().bold());
                }
                (Some(speaker), true) => {
                    println!("{} {}", "▶".bright_cyan(), speaker.bright_cyan().bold());
                    println!("{}", entry.text.red());
                }
                (None, _) => println!("{}", entry.text.dimmed()),
            }
        }
        DebateEvent::Fragment { fragment, .. } => {
            print!("{}", fragment);
            std::io::stdout().flush().ok();
        }
        DebateEvent::TurnFinished { entry, outcome, .. } => match outcome {
            TurnOutcome::Failed => {
                println!();
                println!("{}", entry.text.red());
            }
            TurnOutcome::Cancelled => println!("{}", " [interrupted]".yellow()),
            TurnOutcome::Completed | TurnOutcome::Skipped => println!(),
        },
        DebateEvent::DebateEnd => {
            // Handled in main
        }
    })
}
