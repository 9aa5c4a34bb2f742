use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metrics::{compute_accuracy, compute_wpm};
use crate::timer::{TickId, TickOutcome, TickScheduler, TimerController, TimerState};

/// Test lengths offered by the duration selector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(try_from = "u64", into = "u64")]
pub enum SessionDuration {
    #[default]
    #[strum(to_string = "1 min")]
    OneMinute,
    #[strum(to_string = "2 min")]
    TwoMinutes,
    #[strum(to_string = "3 min")]
    ThreeMinutes,
    #[strum(to_string = "5 min")]
    FiveMinutes,
}

impl SessionDuration {
    pub const ALL: [SessionDuration; 4] = [
        SessionDuration::OneMinute,
        SessionDuration::TwoMinutes,
        SessionDuration::ThreeMinutes,
        SessionDuration::FiveMinutes,
    ];

    pub fn secs(self) -> u64 {
        match self {
            SessionDuration::OneMinute => 60,
            SessionDuration::TwoMinutes => 120,
            SessionDuration::ThreeMinutes => 180,
            SessionDuration::FiveMinutes => 300,
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|d| *d == self).unwrap_or(0)
    }

    /// Next longer duration, wrapping around.
    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    /// Next shorter duration, wrapping around.
    pub fn previous(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl TryFrom<u64> for SessionDuration {
    type Error = Error;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|d| d.secs() == secs)
            .ok_or(Error::UnsupportedDuration(secs))
    }
}

impl From<SessionDuration> for u64 {
    fn from(d: SessionDuration) -> Self {
        d.secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    Started,
    Finished,
}

/// Final result of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub wpm: u32,
    pub accuracy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Finished(Score),
}

/// What happened to an input change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Accepted,
    /// Accepted, but the input runs `extra` chars past the snippet.
    Overflow {
        extra: usize,
    },
    /// Session already finished; the input was dropped.
    Ignored,
}

/// One timed attempt at typing a snippet.
#[derive(Debug)]
pub struct TypingSession<S: TickScheduler> {
    snippet: String,
    snippet_len: usize,
    input: String,
    accuracy: u32,
    wpm: u32,
    phase: SessionPhase,
    duration: SessionDuration,
    timer: TimerController<S>,
}

impl<S: TickScheduler> TypingSession<S> {
    pub fn new(snippet: String, duration: SessionDuration, scheduler: S) -> Self {
        Self {
            snippet_len: snippet.chars().count(),
            snippet,
            input: String::new(),
            accuracy: 100,
            wpm: 0,
            phase: SessionPhase::NotStarted,
            duration,
            timer: TimerController::new(scheduler, duration.secs()),
        }
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn accuracy(&self) -> u32 {
        self.accuracy
    }

    pub fn wpm(&self) -> u32 {
        self.wpm
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn duration(&self) -> SessionDuration {
        self.duration
    }

    pub fn time_left(&self) -> u64 {
        self.timer.remaining()
    }

    pub fn timer(&self) -> &TimerController<S> {
        &self.timer
    }

    pub fn has_started(&self) -> bool {
        self.phase != SessionPhase::NotStarted
    }

    pub fn has_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    pub fn score(&self) -> Score {
        Score {
            wpm: self.wpm,
            accuracy: self.accuracy,
        }
    }

    /// Chars typed beyond the end of the snippet.
    pub fn overflow(&self) -> usize {
        self.input.chars().count().saturating_sub(self.snippet_len)
    }

    pub fn on_input_change(&mut self, new_input: &str) -> InputStatus {
        if self.phase == SessionPhase::Finished {
            return InputStatus::Ignored;
        }

        if self.phase == SessionPhase::NotStarted && !new_input.is_empty() {
            self.phase = SessionPhase::Started;
            self.timer.start();
            log::debug!("session started ({})", self.duration);
        }

        self.input.clear();
        self.input.push_str(new_input);
        self.accuracy = compute_accuracy(&self.snippet, &self.input);
        self.wpm = compute_wpm(&self.input, self.timer.elapsed());

        match self.overflow() {
            0 => InputStatus::Accepted,
            extra => InputStatus::Overflow { extra },
        }
    }

    pub fn push_char(&mut self, c: char) -> InputStatus {
        let mut next = self.input.clone();
        next.push(c);
        self.on_input_change(&next)
    }

    pub fn push_str(&mut self, s: &str) -> InputStatus {
        let mut next = self.input.clone();
        next.push_str(s);
        self.on_input_change(&next)
    }

    pub fn backspace(&mut self) -> InputStatus {
        let mut next = self.input.clone();
        next.pop();
        self.on_input_change(&next)
    }

    /// The snippet character the cursor is sitting on.
    pub fn expected_char(&self) -> Option<char> {
        self.snippet.chars().nth(self.input.chars().count())
    }

    pub fn on_tick(&mut self, id: TickId) -> Option<SessionEvent> {
        match self.timer.on_tick(id) {
            TickOutcome::Ignored => None,
            TickOutcome::Ticked { .. } => {
                self.wpm = compute_wpm(&self.input, self.timer.elapsed());
                None
            }
            TickOutcome::Expired => self.finish(),
        }
    }

    fn finish(&mut self) -> Option<SessionEvent> {
        if self.phase != SessionPhase::Started {
            return None;
        }

        self.wpm = compute_wpm(&self.input, self.duration.secs());
        self.accuracy = compute_accuracy(&self.snippet, &self.input);
        self.phase = SessionPhase::Finished;
        log::info!(
            "session finished: {} wpm, {}% accuracy over {}",
            self.wpm,
            self.accuracy,
            self.duration
        );
        Some(SessionEvent::Finished(self.score()))
    }

    /// Changes the test length. Only honoured before the first keystroke.
    pub fn set_duration(&mut self, duration: SessionDuration) -> bool {
        if self.phase != SessionPhase::NotStarted || self.timer.state() != TimerState::Idle {
            return false;
        }

        self.duration = duration;
        self.timer.reset(duration.secs());
        true
    }

    pub fn reset(&mut self, new_snippet: String) {
        self.snippet_len = new_snippet.chars().count();
        self.snippet = new_snippet;
        self.input.clear();
        self.accuracy = 100;
        self.wpm = 0;
        self.phase = SessionPhase::NotStarted;
        self.timer.reset(self.duration.secs());
        log::debug!("session reset ({} chars)", self.snippet_len);
    }
}
