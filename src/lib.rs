// Library surface for the binary, headless integration tests, and reuse.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod history;
pub mod leaderboard;
pub mod logging;
pub mod metrics;
pub mod runtime;
pub mod session;
pub mod snippet;
pub mod timer;
pub mod ui;

pub use error::{Error, Result};
