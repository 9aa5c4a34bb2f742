// Non-interactive modes of the binary. These run without a TTY.

use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

use keystroke_quest::leaderboard::{LeaderboardStore, ScoreSubmission, SqliteLeaderboard};
use keystroke_quest::session::Score;

fn kquest(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kquest").unwrap();
    cmd.env("HOME", home)
        .arg("--log-file")
        .arg(home.join("kquest.log"))
        .arg("--config")
        .arg(home.join("config.json"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[test]
fn leaderboard_flag_on_empty_db() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("scores.db");

    let out = stdout_of(kquest(dir.path()).arg("--leaderboard").arg("--db").arg(&db));
    assert_eq!(out, "No scores yet.\n");
}

#[test]
fn leaderboard_flag_lists_saved_scores_in_rank_order() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("scores.db");
    {
        let store = SqliteLeaderboard::open(&db).unwrap();
        for (name, wpm) in [("ada", 42), ("grace", 65), ("lin", 51)] {
            store
                .submit_score(&ScoreSubmission::new(name, Score { wpm, accuracy: 97 }))
                .unwrap();
        }
    }

    let out = stdout_of(kquest(dir.path()).arg("--leaderboard").arg("--db").arg(&db));
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("1. grace - 65 WPM (97% acc"));
    assert!(lines[1].starts_with("2. lin - 51 WPM"));
    assert!(lines[2].starts_with("3. ada - 42 WPM"));
}

#[test]
fn history_flag_without_sessions() {
    let dir = tempdir().unwrap();
    let out = stdout_of(
        kquest(dir.path())
            .arg("--memory")
            .arg("--history")
            .arg("--history-file")
            .arg(dir.path().join("history.csv")),
    );
    assert_eq!(out, "No sessions recorded yet.\n");
}

#[test]
fn unsupported_duration_is_rejected() {
    let dir = tempdir().unwrap();
    let assert = kquest(dir.path()).args(["-d", "90", "--leaderboard"]).assert().failure();
    let err = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(err.contains("unsupported duration 90s"), "stderr: {err}");
}

#[test]
fn interactive_mode_requires_tty() {
    let dir = tempdir().unwrap();
    let assert = kquest(dir.path())
        .arg("--memory")
        .write_stdin("")
        .assert()
        .failure();
    let err = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(err.contains("stdin must be a tty"), "stderr: {err}");
}

#[test]
fn history_flag_leaves_leaderboard_db_alone() {
    let dir = tempdir().unwrap();
    let out = stdout_of(
        kquest(dir.path())
            .arg("--history")
            .arg("--history-file")
            .arg(dir.path().join("history.csv")),
    );
    assert_eq!(out, "No sessions recorded yet.\n");

    let default_db = dir
        .path()
        .join(".local")
        .join("state")
        .join("keystroke-quest")
        .join("leaderboard.db");
    assert!(!default_db.exists());
}
