use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use crate::game::GameModule;
use crate::input::Controller;

/// Registration handle returned by a frame clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockToken(pub u64);

/// External per-frame clock the dispatcher attaches to while playing.
pub trait FrameClock {
    fn register_frame_callback(&mut self) -> ClockToken;
    fn deregister_frame_callback(&mut self, token: ClockToken);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Lifecycle, fault latch and counters of one host instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    lifecycle: Lifecycle,
    fault_reported: bool,
    frames: u64,
    faults: u64,
    elapsed: f64,
}

impl HostState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            fault_reported: false,
            frames: 0,
            faults: 0,
            elapsed: 0.0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether a tick fault has been logged. Never resets.
    pub fn fault_reported(&self) -> bool {
        self.fault_reported
    }

    /// Frames dispatched while playing.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Tick faults observed, logged or not.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Seconds of game time handed to `tick`.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

/// Outcome of the protected `tick` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// The module has no `tick` hook.
    Absent,
    Completed,
    /// The hook failed and this was the first fault; it was logged.
    FaultReported,
    /// The hook failed after a fault had already been logged.
    FaultSuppressed,
}

impl TickStatus {
    pub fn is_fault(self) -> bool {
        matches!(self, TickStatus::FaultReported | TickStatus::FaultSuppressed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameReport {
    /// The host was not playing; nothing ran.
    Skipped,
    Dispatched { tick: TickStatus, rendered: bool },
}

/// Drives play/pause/stop and runs one frame at a time with fault isolation.
#[derive(Debug)]
pub struct TickDispatcher {
    state: HostState,
    token: Option<ClockToken>,
}

impl Default for TickDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TickDispatcher {
    pub fn new() -> Self {
        Self {
            state: HostState::new(),
            token: None,
        }
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle
    }

    pub fn is_registered(&self) -> bool {
        self.token.is_some()
    }

    /// Registers with `clock` and enters `Playing`. Returns `false` when the
    /// call changed nothing.
    pub fn play<C: FrameClock + ?Sized>(&mut self, clock: &mut C) -> bool {
        match self.state.lifecycle {
            Lifecycle::Playing => false,
            Lifecycle::Stopped => {
                warn!("play ignored: host is stopped");
                false
            }
            Lifecycle::Idle | Lifecycle::Paused => {
                if self.token.is_none() {
                    self.token = Some(clock.register_frame_callback());
                }
                self.state.lifecycle = Lifecycle::Playing;
                info!("playing");
                true
            }
        }
    }

    /// Deregisters from `clock` and enters `Paused`; a no-op unless registered.
    pub fn pause<C: FrameClock + ?Sized>(&mut self, clock: &mut C) -> bool {
        let Some(token) = self.token.take() else {
            return false;
        };
        clock.deregister_frame_callback(token);
        self.state.lifecycle = Lifecycle::Paused;
        info!("paused");
        true
    }

    /// Enters the terminal `Stopped` state. Returns `false` if already stopped.
    pub fn stop<C: FrameClock + ?Sized>(&mut self, clock: &mut C) -> bool {
        if self.state.lifecycle == Lifecycle::Stopped {
            return false;
        }
        if let Some(token) = self.token.take() {
            clock.deregister_frame_callback(token);
        }
        self.state.lifecycle = Lifecycle::Stopped;
        info!("stopped after {} frame(s)", self.state.frames);
        true
    }

    /// Runs one frame: the protected `tick` call, then `composite` when
    /// `render` is set. Tick faults never escape this call.
    pub fn dispatch<C>(
        &mut self,
        game: &mut GameModule,
        controllers: &[Controller],
        delta: f64,
        render: bool,
        composite: C,
    ) -> FrameReport
    where
        C: FnOnce() -> Result<()>,
    {
        if self.state.lifecycle != Lifecycle::Playing {
            return FrameReport::Skipped;
        }
        self.state.frames += 1;
        self.state.elapsed += delta;

        let tick = match protected_tick(game, controllers, delta, render) {
            None => TickStatus::Absent,
            Some(Ok(())) => TickStatus::Completed,
            Some(Err(err)) => self.record_fault(err),
        };

        let rendered = render
            && match composite() {
                Ok(()) => true,
                Err(err) => {
                    warn!("compositing failed: {err:#}");
                    false
                }
            };

        FrameReport::Dispatched { tick, rendered }
    }

    fn record_fault(&mut self, err: anyhow::Error) -> TickStatus {
        self.state.faults += 1;
        if self.state.fault_reported {
            return TickStatus::FaultSuppressed;
        }
        self.state.fault_reported = true;
        error!("game tick failed: {err:#}");
        TickStatus::FaultReported
    }
}

fn protected_tick(
    game: &mut GameModule,
    controllers: &[Controller],
    delta: f64,
    render: bool,
) -> Option<Result<()>> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        game.call_tick(controllers, delta, render)
    })) {
        Ok(result) => result,
        Err(panic) => Some(Err(anyhow!("tick panicked: {}", panic_message(panic)))),
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}
