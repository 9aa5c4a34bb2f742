use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Environment variable holding the log filter, e.g. `KQUEST_LOG=debug`.
pub const LOG_ENV: &str = "KQUEST_LOG";

/// Send `log` output to `path`. The terminal belongs to the UI, so nothing
/// is ever written to stdout or stderr.
pub fn init(path: &Path) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    // a second init in one process keeps the first logger
    if let Err(e) = Builder::from_env(Env::default().filter_or(LOG_ENV, "info"))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
    {
        log::debug!("logger already installed: {}", e);
    }
    Ok(())
}
