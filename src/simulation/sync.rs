//! Synchronisation pieces shared by the simulator and its workers.
//!
//! - [`Countdown`]: reusable completion barrier. Armed with the number of
//!   workers each step; the worker that brings it to zero wakes the waiter.
//! - [`PauseState`]: the pause/resume/stop state machine with no locking or
//!   threads in it, so every transition can be tested directly.
//! - [`Handshake`]: `PauseState` behind a mutex with two condition variables,
//!   `requested` (caller -> simulation thread) and `completed`
//!   (simulation thread -> callers).

use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::{Condvar, Mutex};

/// Identity of a pause requester. Lower ids take priority.
pub type RequesterId = u32;

/// Reusable countdown latch.
#[derive(Debug, Default)]
pub struct Countdown {
    remaining: AtomicUsize,
    lock: Mutex<()>,
    done: Condvar,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new round expecting `n` arrivals.
    pub fn arm(&self, n: usize) {
        self.remaining.store(n, Ordering::Release);
    }

    /// Record one arrival. Returns true for the arrival that reached zero.
    pub fn count_down(&self) -> bool {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "countdown went below zero");
        if prev == 1 {
            // Take the lock so the notify cannot slip in between the waiter's
            // check and its wait.
            let _guard = self.lock.lock();
            self.done.notify_all();
            true
        } else {
            false
        }
    }

    /// Block until every arrival of the current round has been recorded.
    pub fn wait(&self) {
        if self.remaining.load(Ordering::Acquire) == 0 {
            return;
        }
        let mut guard = self.lock.lock();
        while self.remaining.load(Ordering::Acquire) > 0 {
            self.done.wait(&mut guard);
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// Externally visible phase of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    PauseRequested,
    Paused,
    Stopping,
    Stopped,
}

/// What a `pause` call has to do after updating the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseDecision {
    /// Outranked by the current owner, or the simulation is stopping.
    Ignored,
    /// Already paused; the caller now owns the pause.
    Acquired,
    /// Pause raised; wait until the simulation thread confirms it.
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpauseDecision {
    /// Caller does not own the pause.
    Ignored,
    /// A pause that was never confirmed got withdrawn. Nothing to wait for.
    Withdrawn,
    /// Wait until the simulation thread confirms it left the pause.
    Wait,
}

/// What the simulation thread does at a step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryAction {
    Continue,
    Pause,
    Stop,
}

/// Pause/resume/stop bookkeeping.
///
/// Arbitration is a total order on ids: an active owner with a lower id than
/// the caller makes the caller's `pause` a no-op, a caller with a lower id
/// takes ownership over, and only the current owner may unpause. Requests do
/// not queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PauseState {
    owner: Option<RequesterId>,
    pause_requested: bool,
    paused: bool,
    stop_requested: bool,
    stopped: bool,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<RequesterId> {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn run_state(&self) -> RunState {
        if self.stopped {
            RunState::Stopped
        } else if self.stop_requested {
            RunState::Stopping
        } else if self.paused {
            RunState::Paused
        } else if self.pause_requested {
            RunState::PauseRequested
        } else {
            RunState::Running
        }
    }

    // caller side ===========================================================================

    pub fn request_pause(&mut self, id: RequesterId) -> PauseDecision {
        if self.stop_requested || self.stopped {
            return PauseDecision::Ignored;
        }
        if let Some(owner) = self.owner {
            if owner < id {
                return PauseDecision::Ignored;
            }
        }
        self.owner = Some(id);
        self.pause_requested = true;
        if self.paused {
            PauseDecision::Acquired
        } else {
            PauseDecision::Wait
        }
    }

    pub fn request_unpause(&mut self, id: RequesterId) -> UnpauseDecision {
        if self.owner != Some(id) || self.stopped {
            return UnpauseDecision::Ignored;
        }
        self.owner = None;
        self.pause_requested = false;
        if self.paused {
            UnpauseDecision::Wait
        } else {
            UnpauseDecision::Withdrawn
        }
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// A `pause` caller may return: the pause took effect, was withdrawn, or
    /// the simulation ended.
    pub fn pause_settled(&self) -> bool {
        self.paused || !self.pause_requested || self.stopped
    }

    /// An `unpause` caller may return: the simulation left the pause, someone
    /// paused it again before it could, or it ended.
    pub fn unpause_settled(&self) -> bool {
        !self.paused || self.pause_requested || self.stopped
    }

    // simulation side =======================================================================

    pub fn at_boundary(&self) -> BoundaryAction {
        if self.stop_requested {
            BoundaryAction::Stop
        } else if self.pause_requested {
            BoundaryAction::Pause
        } else {
            BoundaryAction::Continue
        }
    }

    pub fn confirm_paused(&mut self) {
        self.paused = true;
    }

    pub fn stay_paused(&self) -> bool {
        self.pause_requested && !self.stop_requested
    }

    pub fn confirm_resumed(&mut self) {
        self.paused = false;
    }

    pub fn confirm_stopped(&mut self) {
        self.stopped = true;
        self.stop_requested = true;
        self.paused = false;
        self.pause_requested = false;
        self.owner = None;
    }
}

/// Thread-safe request/acknowledge handshake around [`PauseState`].
#[derive(Debug, Default)]
pub struct Handshake {
    state: Mutex<PauseState>,
    requested: Condvar,
    completed: Condvar,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PauseState {
        self.state.lock().clone()
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().run_state()
    }

    /// Returns true if `id` owns a confirmed pause on return.
    pub fn pause(&self, id: RequesterId) -> bool {
        let mut st = self.state.lock();
        match st.request_pause(id) {
            PauseDecision::Ignored => {
                debug!("pause({id}) ignored, owner {:?}", st.owner());
                return false;
            }
            PauseDecision::Acquired => {}
            PauseDecision::Wait => {
                while !st.pause_settled() {
                    self.completed.wait(&mut st);
                }
            }
        }
        st.is_paused() && st.owner() == Some(id)
    }

    /// Returns true if the call released a pause owned by `id`.
    pub fn unpause(&self, id: RequesterId) -> bool {
        let mut st = self.state.lock();
        match st.request_unpause(id) {
            UnpauseDecision::Ignored => {
                debug!("unpause({id}) ignored, owner {:?}", st.owner());
                false
            }
            UnpauseDecision::Withdrawn => {
                // Release anyone waiting on the withdrawn request
                self.completed.notify_all();
                true
            }
            UnpauseDecision::Wait => {
                self.requested.notify_all();
                while !st.unpause_settled() {
                    self.completed.wait(&mut st);
                }
                true
            }
        }
    }

    /// Ask the simulation thread to stop and wait until it has.
    pub fn stop(&self) {
        let mut st = self.state.lock();
        st.request_stop();
        self.requested.notify_all();
        while !st.is_stopped() {
            self.completed.wait(&mut st);
        }
    }

    /// Simulation thread: honor pending pause/stop requests at a step boundary.
    ///
    /// Blocks for as long as a pause is held. Returns `Stop` once a stop was
    /// requested, `Continue` otherwise.
    pub fn boundary(&self) -> BoundaryAction {
        let mut st = self.state.lock();
        loop {
            match st.at_boundary() {
                BoundaryAction::Continue => return BoundaryAction::Continue,
                BoundaryAction::Stop => return BoundaryAction::Stop,
                BoundaryAction::Pause => {
                    st.confirm_paused();
                    debug!("simulation paused by {:?}", st.owner());
                    self.completed.notify_all();
                    while st.stay_paused() {
                        self.requested.wait(&mut st);
                    }
                    st.confirm_resumed();
                    debug!("simulation resumed");
                    self.completed.notify_all();
                }
            }
        }
    }

    /// Simulation thread: the loop has exited and the workers are gone.
    pub fn finish(&self) {
        let mut st = self.state.lock();
        st.confirm_stopped();
        self.completed.notify_all();
    }
}
