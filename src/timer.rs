use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifies one tick registration. Ticks from a cancelled registration
/// carry an old id and are dropped by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickId(pub u64);

/// Owned handle for a recurring one-second tick. Dropping it cancels the
/// registration.
#[derive(Debug)]
pub struct TickHandle {
    id: TickId,
    cancelled: Arc<AtomicBool>,
}

impl TickHandle {
    pub fn new(id: TickId, cancelled: Arc<AtomicBool>) -> Self {
        Self { id, cancelled }
    }

    pub fn id(&self) -> TickId {
        self.id
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Source of recurring ticks. `schedule` must arrange for `id` to be
/// delivered back to the controller once per second until the returned
/// handle is dropped.
pub trait TickScheduler {
    fn schedule(&mut self, id: TickId) -> TickHandle;
}

/// Scheduler that never fires on its own. Tests deliver ticks by hand and
/// inspect which registrations are still live.
#[derive(Clone, Debug, Default)]
pub struct ManualScheduler {
    registrations: Rc<RefCell<Vec<(TickId, Arc<AtomicBool>)>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations whose handle has not been dropped yet.
    pub fn active(&self) -> Vec<TickId> {
        self.registrations
            .borrow()
            .iter()
            .filter(|(_, cancelled)| !cancelled.load(Ordering::SeqCst))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Total number of registrations ever made.
    pub fn scheduled(&self) -> usize {
        self.registrations.borrow().len()
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule(&mut self, id: TickId) -> TickHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.registrations
            .borrow_mut()
            .push((id, Arc::clone(&cancelled)));
        TickHandle::new(id, cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Expired,
}

/// Result of delivering one tick to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a stale registration, or the timer isn't running.
    Ignored,
    Ticked { remaining: u64 },
    Expired,
}

/// Countdown clock for one typing session.
#[derive(Debug)]
pub struct TimerController<S: TickScheduler> {
    scheduler: S,
    duration: u64,
    remaining: u64,
    state: TimerState,
    handle: Option<TickHandle>,
    next_id: u64,
}

impl<S: TickScheduler> TimerController<S> {
    pub fn new(scheduler: S, duration_secs: u64) -> Self {
        Self {
            scheduler,
            duration: duration_secs,
            remaining: duration_secs,
            state: TimerState::Idle,
            handle: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Whole seconds counted down since `start`.
    pub fn elapsed(&self) -> u64 {
        self.duration - self.remaining
    }

    /// Id of the live registration, if any.
    pub fn active_tick(&self) -> Option<TickId> {
        self.handle.as_ref().map(TickHandle::id)
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Idle -> Running. Returns false if the timer was not idle.
    pub fn start(&mut self) -> bool {
        if self.state != TimerState::Idle {
            return false;
        }

        if self.remaining == 0 {
            self.state = TimerState::Expired;
            return true;
        }

        self.state = TimerState::Running;
        self.arm();
        log::debug!("timer started with {}s", self.remaining);
        true
    }

    pub fn on_tick(&mut self, id: TickId) -> TickOutcome {
        if self.state != TimerState::Running || self.active_tick() != Some(id) {
            return TickOutcome::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return TickOutcome::Ticked {
                remaining: self.remaining,
            };
        }

        self.handle = None;
        self.state = TimerState::Expired;
        log::debug!("timer expired after {}s", self.duration);
        TickOutcome::Expired
    }

    /// Any state -> Idle with `duration_secs` remaining.
    pub fn reset(&mut self, duration_secs: u64) {
        self.handle = None;
        self.duration = duration_secs;
        self.remaining = duration_secs;
        self.state = TimerState::Idle;
    }

    fn arm(&mut self) {
        // old registration goes first so two never overlap
        self.handle = None;
        self.next_id += 1;
        self.handle = Some(self.scheduler.schedule(TickId(self.next_id)));
    }
}
