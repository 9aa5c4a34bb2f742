use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the session, store, and persistence layers.
///
/// None of these are fatal to the process. Validation variants carry the
/// text shown to the user as a notice.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Please enter your username to save your score.")]
    EmptyUsername,

    #[error("unsupported duration {0}s (choose 60, 120, 180 or 300)")]
    UnsupportedDuration(u64),

    #[error("no snippets found in {}", .0.display())]
    NoSnippets(PathBuf),

    #[error("leaderboard store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_username_message_is_user_facing() {
        assert_eq!(
            Error::EmptyUsername.to_string(),
            "Please enter your username to save your score."
        );
    }

    #[test]
    fn unsupported_duration_names_the_value() {
        assert!(Error::UnsupportedDuration(90).to_string().contains("90s"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
