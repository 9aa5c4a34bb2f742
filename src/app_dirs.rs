use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "keystroke-quest";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/keystroke-quest`, or the platform data dir.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join(APP_NAME))
        } else {
            ProjectDirs::from("", "", APP_NAME).map(|pd| pd.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("leaderboard.db"))
    }

    pub fn history_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("history.csv"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join(format!("{APP_NAME}.log")))
    }
}
