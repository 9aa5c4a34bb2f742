use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

use crate::timer::{TickHandle, TickId, TickScheduler};

/// How often the countdown advances.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on how long the UI waits before redrawing.
pub const REDRAW_RATE_MS: u64 = 100;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    /// One second elapsed for the given timer registration.
    Tick(TickId),
    /// Nothing arrived within the redraw interval.
    Redraw,
}

/// Source of terminal events (keyboard, resize, ticks)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;

    /// Sender that timer registrations push their ticks into.
    fn sender(&self) -> Sender<AppEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let key_tx = tx.clone();

        std::thread::spawn(move || loop {
            let sent = match event::read() {
                // windows reports releases too
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    key_tx.send(AppEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => key_tx.send(AppEvent::Resize),
                Ok(_) => Ok(()),
                Err(e) => {
                    log::error!("terminal event read failed: {}", e);
                    break;
                }
            };
            if sent.is_err() {
                break;
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for TestEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }
}

/// Schedules each tick registration on its own thread. The thread sends
/// `AppEvent::Tick(id)` every `interval` until the handle is dropped or the
/// receiver goes away.
#[derive(Clone, Debug)]
pub struct ThreadTickScheduler {
    tx: Sender<AppEvent>,
    interval: Duration,
}

impl ThreadTickScheduler {
    pub fn new(tx: Sender<AppEvent>) -> Self {
        Self::with_interval(tx, TICK_INTERVAL)
    }

    pub fn with_interval(tx: Sender<AppEvent>, interval: Duration) -> Self {
        Self { tx, interval }
    }
}

impl TickScheduler for ThreadTickScheduler {
    fn schedule(&mut self, id: TickId) -> TickHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let tx = self.tx.clone();
        let interval = self.interval;

        std::thread::spawn(move || {
            let started = Instant::now();
            let mut fired: u32 = 0;
            loop {
                fired += 1;
                // sleep to an absolute deadline so ticks don't drift
                let deadline = started + interval * fired;
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));

                if flag.load(Ordering::SeqCst) || tx.send(AppEvent::Tick(id)).is_err() {
                    break;
                }
            }
        });

        TickHandle::new(id, cancelled)
    }
}

/// Runner that advances the application one event at a time
pub struct Runner<E: EventSource> {
    event_source: E,
    redraw_interval: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(event_source: E, redraw_interval: Duration) -> Self {
        Self {
            event_source,
            redraw_interval,
        }
    }

    pub fn sender(&self) -> Sender<AppEvent> {
        self.event_source.sender()
    }

    /// Blocks up to the redraw interval and returns the next event, or Redraw on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.redraw_interval) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                AppEvent::Redraw
            }
        }
    }
}
