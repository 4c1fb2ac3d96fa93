#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::Result;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use pixelbox_host::{
    ClockToken, ContentProvider, FrameClock, GameHeader, MemoryProvider, NodeRef, Player,
    RenderBackend, RenderTarget, SharedRenderer, SoftwareRenderer,
};

/// Logger that keeps every record so tests can count what was reported.
pub struct CaptureLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: Lazy<CaptureLogger> = Lazy::new(|| CaptureLogger {
    records: Mutex::new(Vec::new()),
});

pub fn install_logger() {
    let _ = log::set_logger(&*LOGGER);
    log::set_max_level(LevelFilter::Trace);
}

/// Number of records at `level` whose message contains `needle`.
pub fn logged(level: Level, needle: &str) -> usize {
    LOGGER
        .records
        .lock()
        .iter()
        .filter(|(record_level, message)| *record_level == level && message.contains(needle))
        .count()
}

#[derive(Debug, Default)]
pub struct PlayerLog {
    pub registered: u32,
    pub deregistered: u32,
    pub attached: bool,
}

/// In-memory player that records how the host used it.
pub struct RecordingPlayer {
    header: GameHeader,
    content: Rc<MemoryProvider>,
    width: u32,
    height: u32,
    next_token: u64,
    log: Rc<RefCell<PlayerLog>>,
}

impl RecordingPlayer {
    pub fn new(header: GameHeader, content: MemoryProvider) -> (Self, Rc<RefCell<PlayerLog>>) {
        let log = Rc::new(RefCell::new(PlayerLog::default()));
        let player = Self {
            header,
            content: Rc::new(content),
            width: 256,
            height: 144,
            next_token: 0,
            log: Rc::clone(&log),
        };
        (player, log)
    }
}

impl FrameClock for RecordingPlayer {
    fn register_frame_callback(&mut self) -> ClockToken {
        self.log.borrow_mut().registered += 1;
        self.next_token += 1;
        ClockToken(self.next_token)
    }

    fn deregister_frame_callback(&mut self, _token: ClockToken) {
        self.log.borrow_mut().deregistered += 1;
    }
}

impl Player for RecordingPlayer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn header(&self) -> GameHeader {
        self.header.clone()
    }

    fn content(&self) -> Rc<dyn ContentProvider> {
        Rc::clone(&self.content) as Rc<dyn ContentProvider>
    }

    fn attach_view(&mut self, _view: SharedRenderer) {
        self.log.borrow_mut().attached = true;
    }
}

/// What a [`RecordingBackend`] saw: the name of every root it drew and the
/// number of render targets still alive.
#[derive(Clone, Default)]
pub struct BackendLog {
    pub draws: Rc<RefCell<Vec<String>>>,
    pub live_targets: Rc<Cell<usize>>,
}

/// Software backend that also records what the host asked of it.
pub struct RecordingBackend {
    inner: SoftwareRenderer,
    log: BackendLog,
}

impl RecordingBackend {
    pub fn tracked(width: u32, height: u32) -> (SharedRenderer, BackendLog) {
        let log = BackendLog::default();
        let backend = Self {
            inner: SoftwareRenderer::new(width, height),
            log: log.clone(),
        };
        (Rc::new(RefCell::new(backend)) as SharedRenderer, log)
    }

    pub fn shared(width: u32, height: u32) -> (SharedRenderer, Rc<RefCell<Vec<String>>>) {
        let (renderer, log) = Self::tracked(width, height);
        (renderer, log.draws)
    }
}

impl RenderBackend for RecordingBackend {
    fn create_render_target(&mut self, width: u32, height: u32) -> Result<RenderTarget> {
        let target = self.inner.create_render_target(width, height)?;
        self.log.live_targets.set(self.inner.target_count());
        Ok(target)
    }

    fn release_render_target(&mut self, target: RenderTarget) {
        self.inner.release_render_target(target);
        self.log.live_targets.set(self.inner.target_count());
    }

    fn resize_screen(&mut self, width: u32, height: u32) {
        self.inner.resize_screen(width, height)
    }

    fn screen_size(&self) -> (u32, u32) {
        self.inner.screen_size()
    }

    fn draw(&mut self, node: &NodeRef, target: Option<RenderTarget>) -> Result<()> {
        let name = node.borrow().name.clone().unwrap_or_default();
        self.log.draws.borrow_mut().push(name);
        self.inner.draw(node, target)
    }

    fn pixels(&self, target: Option<RenderTarget>) -> Option<&[[u8; 4]]> {
        self.inner.pixels(target)
    }
}
