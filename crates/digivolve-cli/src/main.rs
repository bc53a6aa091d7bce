use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use digivolve::pipeline::{scrape_file, scrape_one};
use digivolve::source::load_entities;
use digivolve::types::{Entity, Stage, Strategy};
use digivolve::utils::{entity_url, slugify};
use digivolve::{BrowserConfig, RunConfig};
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "digivolve")]
#[command(about = "A Digital Tamers 2 evolution requirements scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every entity in the input file, or only NAME when given
    Run {
        #[arg(help = "Scrape only this entity and print its records as JSON")]
        name: Option<String>,

        #[arg(
            short = 'i',
            long,
            default_value = "./database/digimons.csv",
            help = "CSV file with a 'name' (or 'name_en') column and an optional 'stage' column"
        )]
        input: PathBuf,

        #[arg(
            short = 'o',
            long,
            default_value = "./database/evolutions.json",
            help = "JSON file the records are saved to"
        )]
        output: PathBuf,

        #[arg(
            long,
            default_value_t = 10,
            value_parser = clap::value_parser!(u16).range(1..),
            help = "Save progress after this many entities"
        )]
        checkpoint_every: u16,

        #[arg(
            long,
            default_value_t = 1000,
            help = "Pause between entities in milliseconds"
        )]
        delay_ms: u64,

        #[arg(
            long,
            default_value_t = 60,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Give up on a page after this many seconds"
        )]
        timeout_secs: u64,

        #[arg(long, default_value = digivolve::BASE_URL, help = "Index URL entity pages live under")]
        base_url: String,

        #[arg(long, value_name = "PATH", help = "Chrome or Chromium executable to launch")]
        chrome: Option<PathBuf>,

        #[arg(long, help = "Show the browser window")]
        headed: bool,

        #[arg(long, help = "Stage of NAME, e.g. 'Baby I' (looked up in the input file if omitted)")]
        stage: Option<String>,

        #[arg(
            long,
            value_parser = parse_strategy,
            help = "Force an extraction strategy: requirements, hatching or links"
        )]
        strategy: Option<Strategy>,
    },
    /// Print the slug and URL derived for NAME without fetching anything
    Slug {
        name: String,

        #[arg(long, default_value = digivolve::BASE_URL)]
        base_url: String,
    },
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    Strategy::from_str(s).map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

/// Resolves the entity for single entity mode. An explicit stage wins over
/// the input file, and a missing input file is not an error here.
fn single_entity(name: String, stage: Option<String>, input: &Path) -> Entity {
    if let Some(stage) = stage {
        return Entity::new(name, Stage::parse(&stage));
    }
    match load_entities(input) {
        Ok(entities) => entities
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(&name))
            .unwrap_or_else(|| Entity::new(name, None)),
        Err(e) => {
            log::debug!("Not looking up stage: {}", e);
            Entity::new(name, None)
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted by user. Shutting down...");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Run {
            name,
            input,
            output,
            checkpoint_every,
            delay_ms,
            timeout_secs,
            base_url,
            chrome,
            headed,
            stage,
            strategy,
        } => {
            let config = RunConfig {
                base_url,
                output,
                checkpoint_every: checkpoint_every.into(),
                delay: Duration::from_millis(delay_ms),
                strategy,
            }
            .validate()
            .unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            let browser = BrowserConfig {
                headless: !headed,
                chrome_executable: chrome,
                navigation_timeout: Duration::from_secs(timeout_secs),
                ..Default::default()
            };

            let cancel = cancel_on_ctrl_c();

            if let Some(name) = name {
                let entity = single_entity(name, stage, &input);
                log::info!("Processing {}", entity);

                let records = scrape_one(&entity, config, browser, &cancel)
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("Error scraping {}: {}", entity.name, e);
                        process::exit(1);
                    });

                match records {
                    Some(records) => serialize_json(&records),
                    None => process::exit(130),
                }
                return;
            }

            let summary = scrape_file(&input, config, browser, &cancel)
                .await
                .unwrap_or_else(|e| {
                    log::error!("{}", e);
                    process::exit(1);
                });

            print!("{}", summary);
        }

        Commands::Slug { name, base_url } => {
            println!("{}", slugify(&name));
            println!("{}", entity_url(&base_url, &name));
        }
    }
}
