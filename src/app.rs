use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{Config, ConfigStore};
use crate::error::Error;
use crate::history::{History, HistoryRecord};
use crate::leaderboard::{LeaderboardEntry, LeaderboardStore, ScoreSubmission, Subscription};
use crate::runtime::AppEvent;
use crate::session::{InputStatus, Score, SessionDuration, SessionEvent, TypingSession};
use crate::snippet::SnippetProvider;
use crate::timer::TickScheduler;

const MAX_USERNAME_CHARS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Typing,
    Results,
    Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// One-line, non-blocking message shown under the typing area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

pub struct App<S: TickScheduler> {
    pub session: TypingSession<S>,
    pub state: AppState,
    pub username: String,
    pub notice: Option<Notice>,
    pub config: Config,
    snippets: Box<dyn SnippetProvider>,
    store: Box<dyn LeaderboardStore>,
    leaderboard: Rc<RefCell<Vec<LeaderboardEntry>>>,
    subscription: Option<Subscription>,
    history: Option<History>,
    config_store: Option<Box<dyn ConfigStore>>,
    return_to: AppState,
    last_score: Option<Score>,
    submitted: bool,
    should_quit: bool,
}

impl<S: TickScheduler> App<S> {
    pub fn new(
        config: Config,
        scheduler: S,
        mut snippets: Box<dyn SnippetProvider>,
        store: Box<dyn LeaderboardStore>,
    ) -> Self {
        let session = TypingSession::new(snippets.next_snippet(), config.duration, scheduler);

        let leaderboard = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&leaderboard);
        let (subscription, notice) = match store.subscribe_scores(Box::new(
            move |entries: &[LeaderboardEntry]| *sink.borrow_mut() = entries.to_vec(),
        )) {
            Ok(sub) => (Some(sub), None),
            Err(e) => {
                log::warn!("leaderboard subscription failed: {}", e);
                (None, Some(Notice::error("Leaderboard is unavailable right now.")))
            }
        };

        Self {
            session,
            state: AppState::Typing,
            username: config.username.clone().unwrap_or_default(),
            notice,
            config,
            snippets,
            store,
            leaderboard,
            subscription,
            history: None,
            config_store: None,
            return_to: AppState::Typing,
            last_score: None,
            submitted: false,
            should_quit: false,
        }
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_config_store(mut self, store: Box<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn last_score(&self) -> Option<Score> {
        self.last_score
    }

    pub fn score_submitted(&self) -> bool {
        self.submitted
    }

    /// Latest leaderboard pushed by the store, trimmed to the configured size.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard
            .borrow()
            .iter()
            .take(self.config.leaderboard_size)
            .cloned()
            .collect()
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Tick(id) => {
                if let Some(SessionEvent::Finished(score)) = self.session.on_tick(id) {
                    self.on_finished(score);
                }
            }
            AppEvent::Resize | AppEvent::Redraw => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('r') if ctrl => {
                self.new_test();
                return;
            }
            KeyCode::Char('t') if ctrl => {
                self.restart_test();
                return;
            }
            _ => {}
        }

        match self.state {
            AppState::Typing => self.typing_key(key, ctrl),
            AppState::Results => self.results_key(key, ctrl),
            AppState::Leaderboard => self.leaderboard_key(key, ctrl),
        }
    }

    fn typing_key(&mut self, key: KeyEvent, ctrl: bool) {
        if key.code == KeyCode::Enter && self.last_score.is_some() {
            self.state = AppState::Results;
            return;
        }

        let status = match key.code {
            KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('l') if ctrl => {
                self.open_leaderboard();
                return;
            }
            KeyCode::Left => {
                self.change_duration(self.session.duration().previous());
                return;
            }
            KeyCode::Right => {
                self.change_duration(self.session.duration().next());
                return;
            }
            KeyCode::Backspace => self.session.backspace(),
            KeyCode::Enter => self.session.push_char('\n'),
            KeyCode::Tab => self.insert_indent(),
            KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.session.push_char(c)
            }
            _ => return,
        };

        self.on_input_status(status);
    }

    fn results_key(&mut self, key: KeyEvent, ctrl: bool) {
        match key.code {
            KeyCode::Esc => self.state = AppState::Typing,
            KeyCode::Enter => self.submit_score(),
            KeyCode::Tab => self.open_leaderboard(),
            KeyCode::Char('l') if ctrl => self.open_leaderboard(),
            KeyCode::Backspace => {
                self.username.pop();
            }
            KeyCode::Char(c) if !ctrl && !c.is_control() => {
                if self.username.chars().count() < MAX_USERNAME_CHARS {
                    self.username.push(c);
                }
            }
            _ => {}
        }
    }

    fn leaderboard_key(&mut self, key: KeyEvent, ctrl: bool) {
        match key.code {
            KeyCode::Esc | KeyCode::Backspace => self.state = self.return_to,
            KeyCode::Char('l') if ctrl => self.state = self.return_to,
            _ => {}
        }
    }

    fn on_input_status(&mut self, status: InputStatus) {
        match status {
            InputStatus::Accepted => {
                if self.notice.as_ref().is_some_and(|n| n.kind == NoticeKind::Error) {
                    self.notice = None;
                }
            }
            InputStatus::Overflow { extra } => {
                self.notice = Some(Notice::error(format!(
                    "Input runs {extra} character{} past the end of the snippet.",
                    if extra == 1 { "" } else { "s" }
                )));
            }
            InputStatus::Ignored => {
                self.notice = Some(Notice::info(
                    "Time is up. Press enter for results, ctrl+r for a new snippet.",
                ));
            }
        }
    }

    /// Tab types the run of spaces the snippet has at the cursor.
    fn insert_indent(&mut self) -> InputStatus {
        let typed = self.session.input().chars().count();
        let spaces = self
            .session
            .snippet()
            .chars()
            .skip(typed)
            .take_while(|c| *c == ' ')
            .count();

        if spaces == 0 {
            self.session.push_char('\t')
        } else {
            self.session.push_str(&" ".repeat(spaces))
        }
    }

    fn change_duration(&mut self, duration: SessionDuration) {
        if !self.session.set_duration(duration) {
            self.notice = Some(Notice::error(
                "Duration is locked until the test is reset (ctrl+r).",
            ));
            return;
        }

        self.notice = None;
        self.config.duration = duration;
        self.persist_config(|c| c.duration = duration);
    }

    fn on_finished(&mut self, score: Score) {
        self.last_score = Some(score);
        self.submitted = false;
        self.state = AppState::Results;
        self.notice = None;

        if let Some(history) = &self.history {
            let record = HistoryRecord::new(
                score,
                self.session.duration().secs(),
                self.session.snippet(),
                self.session.input(),
            );
            if let Err(e) = history.append(&record) {
                log::warn!("could not record session history: {}", e);
            }
        }
    }

    pub fn submit_score(&mut self) {
        let Some(score) = self.last_score else {
            return;
        };
        if self.submitted {
            self.notice = Some(Notice::info("Score already saved."));
            return;
        }

        let submission = ScoreSubmission::new(&self.username, score);
        match self.store.submit_score(&submission) {
            Ok(()) => {
                self.submitted = true;
                self.notice = Some(Notice::info("Score saved successfully!"));
                let name = submission.username;
                self.persist_config(|c| c.username = Some(name.clone()));
                self.config.username = Some(name);
                self.return_to = AppState::Results;
                self.state = AppState::Leaderboard;
            }
            Err(Error::EmptyUsername) => {
                self.notice = Some(Notice::error(Error::EmptyUsername.to_string()));
            }
            Err(e) => {
                log::warn!("score submission failed: {}", e);
                self.notice = Some(Notice::error("Failed to save score. Please try again."));
            }
        }
    }

    fn open_leaderboard(&mut self) {
        self.return_to = self.state;
        self.state = AppState::Leaderboard;
    }

    /// Fresh snippet, cleared input, timer back to the selected duration.
    pub fn new_test(&mut self) {
        let snippet = self.snippets.next_snippet();
        self.reset_with(snippet);
    }

    /// Same snippet again.
    pub fn restart_test(&mut self) {
        let snippet = self.session.snippet().to_string();
        self.reset_with(snippet);
    }

    fn reset_with(&mut self, snippet: String) {
        self.session.reset(snippet);
        self.state = AppState::Typing;
        self.return_to = AppState::Typing;
        self.last_score = None;
        self.submitted = false;
        self.notice = None;
    }

    /// Applies `update` to the config file as it is on disk. The in-memory
    /// config may hold command line overrides for this run only, so only the
    /// changed field is written back.
    fn persist_config(&self, update: impl FnOnce(&mut Config)) {
        if let Some(store) = &self.config_store {
            let mut saved = store.load();
            update(&mut saved);
            if let Err(e) = store.save(&saved) {
                log::warn!("could not save config: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfigStore;
    use crate::leaderboard::{MemoryLeaderboard, ScoresCallback};
    use crate::snippet::FixedSnippet;
    use crate::timer::ManualScheduler;
    use tempfile::tempdir;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn build(snippet: &str) -> (App<ManualScheduler>, ManualScheduler) {
        app_with_store(snippet, Box::new(MemoryLeaderboard::new()))
    }

    fn app_with_store(
        snippet: &str,
        store: Box<dyn LeaderboardStore>,
    ) -> (App<ManualScheduler>, ManualScheduler) {
        let sched = ManualScheduler::new();
        let app = App::new(
            Config::default(),
            sched.clone(),
            Box::new(FixedSnippet::new(snippet)),
            store,
        );
        (app, sched)
    }

    fn type_str(app: &mut App<ManualScheduler>, s: &str) {
        for c in s.chars() {
            let code = if c == '\n' { KeyCode::Enter } else { KeyCode::Char(c) };
            app.handle_event(key(code));
        }
    }

    fn run_out_clock(app: &mut App<ManualScheduler>) {
        while let Some(id) = app.session.timer().active_tick() {
            app.handle_event(AppEvent::Tick(id));
        }
    }

    struct BrokenStore;

    impl LeaderboardStore for BrokenStore {
        fn submit_score(&self, score: &ScoreSubmission) -> crate::Result<()> {
            score.validate()?;
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "offline",
            )))
        }

        fn subscribe_scores(&self, _callback: ScoresCallback) -> crate::Result<Subscription> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "offline",
            )))
        }

        fn top_scores(&self, _limit: usize) -> crate::Result<Vec<LeaderboardEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_typing_updates_session() {
        let (mut app, sched) = build("fn main() {}");
        type_str(&mut app, "fn mian");
        assert_eq!(app.session.input(), "fn mian");
        assert!(app.session.has_started());
        assert_eq!(sched.active().len(), 1);
        assert_eq!(app.session.accuracy(), 71);
    }

    #[test]
    fn test_enter_types_newline_and_backspace_deletes() {
        let (mut app, _) = build("a\nb");
        type_str(&mut app, "a\n");
        assert_eq!(app.session.input(), "a\n");
        app.handle_event(key(KeyCode::Backspace));
        assert_eq!(app.session.input(), "a");
    }

    #[test]
    fn test_tab_types_snippet_indent() {
        let (mut app, _) = build("if x {\n    y\n}");
        type_str(&mut app, "if x {\n");
        app.handle_event(key(KeyCode::Tab));
        assert_eq!(app.session.input(), "if x {\n    ");
        assert_eq!(app.session.accuracy(), 100);
    }

    #[test]
    fn test_overflow_shows_notice() {
        let (mut app, _) = build("ab");
        type_str(&mut app, "abc");
        let notice = app.notice.clone().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.text.contains("1 character past"));

        app.handle_event(key(KeyCode::Backspace));
        assert!(app.notice.is_none());
    }

    #[test]
    fn test_duration_cycles_before_start_and_locks_after() {
        let (mut app, _) = build("abc");
        app.handle_event(key(KeyCode::Right));
        assert_eq!(app.session.duration(), SessionDuration::TwoMinutes);
        assert_eq!(app.session.time_left(), 120);
        assert_eq!(app.config.duration, SessionDuration::TwoMinutes);

        type_str(&mut app, "a");
        app.handle_event(key(KeyCode::Left));
        assert_eq!(app.session.duration(), SessionDuration::TwoMinutes);
        assert_eq!(app.notice.as_ref().unwrap().kind, NoticeKind::Error);
    }

    #[test]
    fn test_expiry_moves_to_results() {
        let (mut app, _) = build("hi there");
        type_str(&mut app, "hi there");
        run_out_clock(&mut app);

        assert_eq!(app.state, AppState::Results);
        assert_eq!(
            app.last_score(),
            Some(Score {
                wpm: 2,
                accuracy: 100
            })
        );
    }

    #[test]
    fn test_submit_requires_username() {
        let (mut app, _) = build("abc");
        type_str(&mut app, "abc");
        run_out_clock(&mut app);

        app.handle_event(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Results);
        assert!(!app.score_submitted());
        assert_eq!(
            app.notice.as_ref().unwrap().text,
            "Please enter your username to save your score."
        );
    }

    #[test]
    fn test_submit_saves_and_shows_leaderboard() {
        let (mut app, _) = build("abc");
        type_str(&mut app, "abc");
        run_out_clock(&mut app);

        type_str(&mut app, "ada");
        app.handle_event(key(KeyCode::Enter));

        assert!(app.score_submitted());
        assert_eq!(app.state, AppState::Leaderboard);
        let board = app.leaderboard();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].username, "ada");
        assert_eq!(app.config.username.as_deref(), Some("ada"));

        // back to results, a second save is refused
        app.handle_event(key(KeyCode::Esc));
        assert_eq!(app.state, AppState::Results);
        app.handle_event(key(KeyCode::Enter));
        assert_eq!(app.leaderboard().len(), 1);
    }

    #[test]
    fn test_store_failure_keeps_score_for_retry() {
        let (mut app, _) = app_with_store("abc", Box::new(BrokenStore));
        assert!(!app.is_subscribed());
        assert!(app.notice.is_some());

        type_str(&mut app, "abc");
        run_out_clock(&mut app);
        type_str(&mut app, "ada");
        app.handle_event(key(KeyCode::Enter));

        assert_eq!(app.state, AppState::Results);
        assert!(!app.score_submitted());
        assert!(app.last_score().is_some());
        assert_eq!(
            app.notice.as_ref().unwrap().text,
            "Failed to save score. Please try again."
        );
    }

    #[test]
    fn test_input_after_finish_is_ignored() {
        let (mut app, _) = build("abc");
        type_str(&mut app, "ab");
        run_out_clock(&mut app);
        app.handle_event(key(KeyCode::Esc));
        assert_eq!(app.state, AppState::Typing);

        type_str(&mut app, "c");
        assert_eq!(app.session.input(), "ab");
        assert_eq!(app.notice.as_ref().unwrap().kind, NoticeKind::Info);

        app.handle_event(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Results);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut app, sched) = build("abc");
        type_str(&mut app, "abx");
        app.handle_event(ctrl('r'));

        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.session.input(), "");
        assert_eq!(app.session.accuracy(), 100);
        assert_eq!(app.session.wpm(), 0);
        assert_eq!(app.session.time_left(), 60);
        assert!(sched.active().is_empty());
    }

    #[test]
    fn test_leaderboard_round_trip_from_typing() {
        let (mut app, _) = build("abc");
        app.handle_event(ctrl('l'));
        assert_eq!(app.state, AppState::Leaderboard);
        app.handle_event(key(KeyCode::Esc));
        assert_eq!(app.state, AppState::Typing);
    }

    #[test]
    fn test_quit_keys() {
        let (mut app, _) = build("abc");
        app.handle_event(ctrl('c'));
        assert!(app.should_quit());

        let (mut app, _) = build("abc");
        app.handle_event(key(KeyCode::Esc));
        assert!(app.should_quit());
    }

    #[test]
    fn test_username_prefilled_from_config() {
        let sched = ManualScheduler::new();
        let config = Config {
            username: Some("grace".into()),
            ..Config::default()
        };
        let app = App::new(
            config,
            sched,
            Box::new(FixedSnippet::new("abc")),
            Box::new(MemoryLeaderboard::new()),
        );
        assert_eq!(app.username, "grace");
    }

    #[test]
    fn test_finished_session_recorded_in_history_and_config_saved() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.csv");
        let config_path = dir.path().join("config.json");

        let (app, _) = build("abc");
        let mut app = app
            .with_history(History::new(&history_path))
            .with_config_store(Box::new(FileConfigStore::with_path(&config_path)));

        app.handle_event(key(KeyCode::Right));
        type_str(&mut app, "abc");
        run_out_clock(&mut app);

        let records = History::new(&history_path).read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_secs, 120);
        assert_eq!(records[0].accuracy, 100);

        let saved = FileConfigStore::with_path(&config_path).load();
        assert_eq!(saved.duration, SessionDuration::TwoMinutes);
    }

    #[test]
    fn test_run_overrides_not_written_to_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&config_path);
        store
            .save(&Config {
                leaderboard_size: 5,
                ..Config::default()
            })
            .unwrap();

        let run_config = Config {
            snippet_dir: Some(dir.path().join("snips")),
            username: Some("flag-user".into()),
            leaderboard_size: 5,
            ..Config::default()
        };
        let mut app = App::new(
            run_config,
            ManualScheduler::new(),
            Box::new(FixedSnippet::new("ab")),
            Box::new(MemoryLeaderboard::new()),
        )
        .with_config_store(Box::new(store));

        app.handle_event(key(KeyCode::Right));

        let saved = FileConfigStore::with_path(&config_path).load();
        assert_eq!(saved.duration, SessionDuration::TwoMinutes);
        assert_eq!(saved.snippet_dir, None);
        assert_eq!(saved.username, None);
        assert_eq!(saved.leaderboard_size, 5);
    }
}
