// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use subpilot::app_config::{self, Config};
use subpilot::events::EventSource;
use subpilot::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliEventSource {
    Plex,
    Tautulli,
}

impl From<CliEventSource> for EventSource {
    fn from(source: CliEventSource) -> Self {
        match source {
            CliEventSource::Plex => EventSource::Plex,
            CliEventSource::Tautulli => EventSource::Tautulli,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the acquisition pipeline for one media item
    Process {
        #[arg(value_name = "MEDIA_ID")]
        media_id: String,

        /// Target language code (defaults to the configured language)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Feed a saved webhook body through event parsing and dispatch
    Event {
        #[arg(value_name = "PAYLOAD_FILE")]
        payload: PathBuf,

        #[arg(short, long, value_enum, default_value = "plex")]
        source: CliEventSource,

        /// Content type of the original request (multipart for Plex)
        #[arg(long, default_value = "application/json")]
        content_type: String,

        /// Value of the X-Webhook-Secret header
        #[arg(long)]
        secret: Option<String>,
    },

    /// Re-time a media item's target subtitle against a reference subtitle
    Sync {
        #[arg(value_name = "MEDIA_ID")]
        media_id: String,

        /// Preferred reference language
        #[arg(short, long)]
        source_language: Option<String>,
    },

    /// Re-time a local SRT file against a reference SRT file
    SyncFiles {
        reference: PathBuf,
        target: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show how many anchor calls a file sync would make
    EstimateSync { reference: PathBuf, target: PathBuf },

    /// List pending translation requests
    Queue,

    /// Cost estimate of the pending translation for a media item
    Estimate { media_id: String },

    /// Approve and run the pending translation for a media item
    Approve { media_id: String },

    /// Reject the pending translation for a media item
    Reject { media_id: String },

    /// Translate a media item now, without the approval queue
    Translate {
        media_id: String,

        /// Source language code
        #[arg(short, long)]
        from: Option<String>,
    },

    /// Show counters
    Stats,

    /// Show translation history, newest first
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate shell completions for subpilot
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// subpilot - subtitle autopilot for Plex
#[derive(Parser, Debug)]
#[command(name = "subpilot")]
#[command(version)]
#[command(about = "Finds, syncs and translates subtitles for a Plex library")]
#[command(long_about = "subpilot finds, ranks, downloads, re-times and translates subtitles for Plex media items.

EXAMPLES:
    subpilot process 4242                        # Fetch a subtitle in the default language
    subpilot process 4242 -l fr                  # ... in French
    subpilot event body.txt --content-type 'multipart/form-data; boundary=X'
    subpilot sync 4242 -s en                     # Re-time against the English track
    subpilot sync-files ref.en.srt movie.vi.srt -o movie.vi.synced.srt
    subpilot queue                               # Pending translations
    subpilot approve 4242                        # Run a pending translation
    subpilot completions bash > subpilot.bash

CONFIGURATION:
    Configuration is stored in subpilot.json by default. If the file does not
    exist, a default one is written.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "subpilot.json", env = "SUBPILOT_CONFIG")]
    config: String,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {:<5} {}\x1B[0m", color, now, record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Load the config file, writing the default one when it does not exist
fn load_config(config_path: &str, cli_level: Option<&CliLogLevel>) -> Result<Config> {
    let mut config = if Path::new(config_path).exists() {
        let file = File::open(config_path).context(format!("Failed to open config file: {}", config_path))?;
        serde_json::from_reader(BufReader::new(file))
            .context(format!("Failed to parse config file: {}", config_path))?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        config
    };

    if let Some(level) = cli_level {
        config.log_level = level.clone().into();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "subpilot", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config, cli.log_level.as_ref())?;
    log::set_max_level(level_filter(config.log_level));
    config.validate().context("Configuration validation failed")?;

    let controller = Controller::from_config(config).await?;
    run_command(&controller, cli.command).await
}

async fn run_command(controller: &Controller, command: Commands) -> Result<()> {
    match command {
        Commands::Process { media_id, language } => {
            let outcome = controller.process(&media_id, language.as_deref()).await?;
            info!("{}", outcome);
            print_json(&outcome)
        }
        Commands::Event { payload, source, content_type, secret } => {
            let body = std::fs::read(&payload).context(format!("Failed to read payload: {:?}", payload))?;
            let handle = controller.handle_webhook(source.into(), &body, &content_type, secret.as_deref())?;
            match handle {
                Some(task) => {
                    let outcome = task.await.map_err(|e| anyhow!("Event task failed: {}", e))??;
                    print_json(&outcome)
                }
                None => {
                    info!("Event ignored");
                    Ok(())
                }
            }
        }
        Commands::Sync { media_id, source_language } => {
            print_json(&controller.sync_media(&media_id, source_language.as_deref()).await?)
        }
        Commands::SyncFiles { reference, target, output } => {
            print_json(&controller.sync_files(&reference, &target, &output).await?)
        }
        Commands::EstimateSync { reference, target } => {
            print_json(&controller.estimate_sync(&reference, &target).await?)
        }
        Commands::Queue => {
            let queue = controller.queue();
            if queue.is_empty() {
                info!("No pending translations");
            }
            print_json(&queue)
        }
        Commands::Estimate { media_id } => print_json(&controller.estimate(&media_id).await?),
        Commands::Approve { media_id } => print_json(&controller.approve(&media_id).await?),
        Commands::Reject { media_id } => print_json(&controller.reject(&media_id).await?),
        Commands::Translate { media_id, from } => print_json(&controller.translate(&media_id, from.as_deref()).await?),
        Commands::Stats => {
            let stats = controller.stats().await?;
            info!("{}", stats);
            print_json(&stats)
        }
        Commands::History { limit } => print_json(&controller.history(limit).await?),
        Commands::Completions { .. } => Ok(()),
    }
}
