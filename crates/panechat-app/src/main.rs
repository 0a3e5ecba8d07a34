//! panechat: chat with a language model next to an embedded shell.

mod app;
mod chat;
mod commands;
mod config;
mod editor;
mod events;
mod input;
mod logging;
mod transcript;
mod ui;
mod winch;

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::Parser;

use crate::app::App;
use crate::config::Settings;
use crate::transcript::{TimestampMode, Transcript, DEFAULT_TIMESTAMP_FORMAT};

#[derive(Parser, Debug)]
#[command(name = "panechat", version, about = "Split-pane LLM chat with an embedded terminal")]
struct Cli {
    /// Which messages get a timestamp.
    #[arg(long, value_enum, default_value_t = TimestampMode::None)]
    timestamp: TimestampMode,

    /// strftime-style timestamp format.
    #[arg(long, default_value = DEFAULT_TIMESTAMP_FORMAT)]
    timestamp_format: String,

    /// Settings file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run model and API key setup before starting.
    #[arg(long)]
    configure: bool,

    /// Shell for the terminal pane (default: $SHELL).
    #[arg(long)]
    shell: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("warning: logging disabled: {e}");
    }

    let settings_path = cli.config.clone().or_else(config::default_path);
    let mut settings = match &settings_path {
        Some(path) => config::load(path)?.unwrap_or_default(),
        None => Settings::default(),
    };

    if cli.configure || settings.model.is_none() {
        let stdin = io::stdin();
        let env = |var: &str| std::env::var(var).ok();
        match config::run_wizard(&mut stdin.lock(), &mut io::stdout(), settings, env)? {
            Some(configured) => {
                if let Some(path) = &settings_path {
                    config::save(path, &configured)?;
                    println!("Settings saved to {}", path.display());
                }
                settings = configured;
            }
            None => {
                println!("No model configured. Exiting.");
                return Ok(());
            }
        }
    }

    if let Some(shell) = cli.shell {
        settings.shell = Some(shell);
    }

    let transcript = Transcript::new(cli.timestamp, cli.timestamp_format);
    let app = App::new(settings, settings_path, transcript);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(app::run(app))?;
    log::info!("panechat exiting");
    Ok(())
}
