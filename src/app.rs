use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde_json::Value;

use crate::capabilities::SharedRenderer;
use crate::content::{ContentProvider, DirectoryProvider};
use crate::dispatcher::{ClockToken, FrameClock, FrameReport};
use crate::header::GameHeader;
use crate::host::{GameHost, Player};
use crate::input::Controller;
use crate::resolution::Resolution;

/// Physical size of the window (or pretend window) a game is shown in.
#[derive(Debug)]
pub struct WindowViewport {
    size: RwLock<(u32, u32)>,
}

impl WindowViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width.max(1), height.max(1))),
        }
    }

    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }

    pub fn size(&self) -> (u32, u32) {
        *self.size.read()
    }
}

/// Player backed by a game directory on disk: `header.json` plus the files
/// it references.
pub struct LocalPlayer {
    header: GameHeader,
    content: Rc<DirectoryProvider>,
    viewport: Arc<WindowViewport>,
    frame_callback: Option<ClockToken>,
    next_token: u64,
    view: Option<SharedRenderer>,
}

impl LocalPlayer {
    pub fn new(header: GameHeader, content: DirectoryProvider, viewport: Arc<WindowViewport>) -> Self {
        Self {
            header,
            content: Rc::new(content),
            viewport,
            frame_callback: None,
            next_token: 0,
            view: None,
        }
    }

    /// Reads `<dir>/header.json` and serves content from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, viewport: Arc<WindowViewport>) -> Result<Self> {
        let dir = dir.as_ref();
        let header = GameHeader::from_file(dir.join("header.json"))
            .with_context(|| format!("failed to load game in {}", dir.display()))?;
        Ok(Self::new(header, DirectoryProvider::new(dir), viewport))
    }

    /// Whether the host currently wants frames.
    pub fn wants_frames(&self) -> bool {
        self.frame_callback.is_some()
    }

    pub fn view(&self) -> Option<&SharedRenderer> {
        self.view.as_ref()
    }
}

impl FrameClock for LocalPlayer {
    fn register_frame_callback(&mut self) -> ClockToken {
        self.next_token += 1;
        let token = ClockToken(self.next_token);
        self.frame_callback = Some(token);
        token
    }

    fn deregister_frame_callback(&mut self, token: ClockToken) {
        if self.frame_callback == Some(token) {
            self.frame_callback = None;
        }
    }
}

impl Player for LocalPlayer {
    fn width(&self) -> u32 {
        self.viewport.size().0
    }

    fn height(&self) -> u32 {
        self.viewport.size().1
    }

    fn header(&self) -> GameHeader {
        self.header.clone()
    }

    fn content(&self) -> Rc<dyn ContentProvider> {
        Rc::clone(&self.content) as Rc<dyn ContentProvider>
    }

    fn attach_view(&mut self, view: SharedRenderer) {
        self.view = Some(view);
    }
}

/// What a headless run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub resolution: Resolution,
    pub frames: u64,
    pub faults: u64,
    pub fault_reported: bool,
    pub agent_state: Value,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "resolution: {}", self.resolution)?;
        writeln!(f, "frames: {}", self.frames)?;
        if self.fault_reported {
            writeln!(f, "tick faults: {}", self.faults)?;
        } else {
            writeln!(f, "tick faults: none")?;
        }
        write!(f, "agent state: {}", self.agent_state)
    }
}

/// Plays `frames` frames at a fixed `delta` with idle controllers, then
/// stops the host.
pub fn run_headless(host: &mut GameHost, frames: u32, delta: f64) -> Result<RunSummary> {
    let controllers = [Controller::new()];
    host.play();
    for _ in 0..frames {
        if host.frame(&controllers, delta, true) == FrameReport::Skipped {
            break;
        }
    }
    let agent_state = host
        .state_for_agent()
        .context("getStateForAgent failed")?;
    let summary = RunSummary {
        resolution: host.resolution(),
        frames: host.state().frames(),
        faults: host.state().faults(),
        fault_reported: host.state().fault_reported(),
        agent_state,
    };
    host.stop();
    Ok(summary)
}
