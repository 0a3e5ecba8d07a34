//! Log setup. The TUI owns stdout and stderr, so records go to a file.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;

use env_logger::{Builder, Env, Target};

/// Environment variable holding the log filter, e.g. `debug` or
/// `panechat_pty=trace`.
pub const LOG_ENV: &str = "PANECHAT_LOG";

/// `$XDG_STATE_HOME/panechat/panechat.log`, falling back to
/// `~/.local/state/panechat/panechat.log`.
pub fn log_path() -> Option<PathBuf> {
    let state_dir = dirs::state_dir().or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))?;
    Some(state_dir.join("panechat").join("panechat.log"))
}

/// Install the global logger. Returns the file it appends to.
pub fn init() -> io::Result<PathBuf> {
    let path = log_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory for the log file"))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    Builder::from_env(Env::default().filter_or(LOG_ENV, "info"))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .init();
    log::info!("panechat {} starting", env!("CARGO_PKG_VERSION"));
    Ok(path)
}
