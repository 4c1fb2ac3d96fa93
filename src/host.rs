//! The game host: boots a game against an embedding player and drives it
//! frame by frame.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use log::{info, warn};
use serde_json::{json, Value};

use crate::capabilities::{Capabilities, HostContext, SharedRenderer};
use crate::compositor::BackBufferCompositor;
use crate::config::HostConfig;
use crate::content::ContentProvider;
use crate::dispatcher::{FrameClock, FrameReport, HostState, Lifecycle, TickDispatcher};
use crate::error::{BootError, HookError};
use crate::game::GameModule;
use crate::header::{Entrypoint, GameHeader};
use crate::input::Controller;
use crate::loader::GameLoader;
use crate::render::SoftwareRenderer;
use crate::resolution::{resolve_virtual_resolution, Resolution};
use crate::scene::NodeRef;

/// The embedding application: it owns the header, the content source, the
/// real viewport and the frame clock.
pub trait Player: FrameClock {
    /// Current viewport width in physical pixels.
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn header(&self) -> GameHeader;

    fn content(&self) -> Rc<dyn ContentProvider>;

    /// Called once after a successful boot with the renderer whose screen
    /// the player should present.
    fn attach_view(&mut self, view: SharedRenderer);
}

/// Construction-time choices for [`GameHost::boot`].
#[derive(Default)]
pub struct HostOptions {
    /// Replaces the header's `main` entrypoint.
    pub entrypoint: Option<Entrypoint>,
    pub config: HostConfig,
    /// Backend to draw through; a [`SoftwareRenderer`] sized to the player
    /// is created when unset.
    pub renderer: Option<SharedRenderer>,
}

impl HostOptions {
    pub fn with_entrypoint(mut self, entrypoint: Entrypoint) -> Self {
        self.entrypoint = Some(entrypoint);
        self
    }

    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_renderer(mut self, renderer: SharedRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

pub struct GameHost {
    player: Box<dyn Player>,
    context: Rc<HostContext>,
    capabilities: Capabilities,
    compositor: Option<BackBufferCompositor>,
    dispatcher: TickDispatcher,
    game: GameModule,
    config: HostConfig,
}

impl GameHost {
    /// Resolves the virtual resolution, allocates the back buffer, loads the
    /// game and attaches the view. Nothing is attached when any step fails.
    pub async fn boot(
        mut player: Box<dyn Player>,
        options: HostOptions,
    ) -> Result<Self, BootError> {
        let HostOptions {
            entrypoint,
            config,
            renderer,
        } = options;
        let header = player.header();
        let (base_width, base_height) = config.base_resolution();
        let resolution = resolve_virtual_resolution(
            header.aspect_ratio.as_deref(),
            Resolution::new(base_width, base_height),
        )?;
        info!("virtual resolution {resolution}");

        let renderer = renderer.unwrap_or_else(|| {
            let software = SoftwareRenderer::new(player.width(), player.height());
            Rc::new(RefCell::new(software)) as SharedRenderer
        });
        let compositor = BackBufferCompositor::new(&mut *renderer.borrow_mut(), resolution)
            .map_err(BootError::Renderer)?;

        let context = Rc::new(HostContext::new(
            header,
            resolution,
            player.content(),
            Rc::clone(&renderer),
            compositor.back_buffer(),
            config.auto_clear,
        ));
        let capabilities = Capabilities::new(Rc::clone(&context));

        let loader = GameLoader::new(entrypoint, config.instruction_budget);
        let game = match loader.load(&capabilities).await {
            Ok(game) => game,
            Err(err) => {
                compositor.release(&mut *renderer.borrow_mut());
                context.release_back_buffer();
                context.stage().remove_children();
                return Err(err);
            }
        };

        context.update_header(|header| {
            header.width = Some(resolution.width);
            header.height = Some(resolution.height);
            header.scale = Some(config.scale);
        });
        player.attach_view(Rc::clone(&renderer));
        info!("game ready");

        Ok(Self {
            player,
            context,
            capabilities,
            compositor: Some(compositor),
            dispatcher: TickDispatcher::new(),
            game,
            config,
        })
    }

    /// Starts or resumes dispatching and stretches the presentation to the
    /// player's current size.
    pub fn play(&mut self) {
        if self.dispatcher.play(self.player.as_mut()) {
            let (width, height) = (self.player.width(), self.player.height());
            self.resize(width, height);
        }
    }

    pub fn pause(&mut self) {
        self.dispatcher.pause(self.player.as_mut());
    }

    /// Stops for good and releases the back buffer, the presentation sprites
    /// and everything under the scene root.
    pub fn stop(&mut self) {
        if !self.dispatcher.stop(self.player.as_mut()) {
            return;
        }
        if let Some(compositor) = self.compositor.take() {
            compositor.release(&mut *self.context.renderer().borrow_mut());
        }
        self.context.release_back_buffer();
        self.context.stage().remove_children();
    }

    /// Recomputes the presentation scale for a `width` by `height` viewport.
    pub fn resize(&mut self, width: u32, height: u32) -> Option<Vec2> {
        let Some(compositor) = self.compositor.as_mut() else {
            warn!("resize ignored: host is stopped");
            return None;
        };
        Some(compositor.resize(&mut *self.context.renderer().borrow_mut(), width, height))
    }

    /// Runs one frame if playing: `tick`, then compositing when `render`.
    pub fn frame(&mut self, controllers: &[Controller], delta: f64, render: bool) -> FrameReport {
        let delta = self.config.clamp_delta(delta);
        let Self {
            context,
            compositor,
            dispatcher,
            game,
            ..
        } = self;
        dispatcher.dispatch(game, controllers, delta, render, || match compositor {
            Some(compositor) => compositor.composite(
                &mut *context.renderer().borrow_mut(),
                context.stage(),
                context.auto_clear(),
            ),
            None => Ok(()),
        })
    }

    /// Snapshot from the game's `saveState` hook; `{}` when it has none.
    pub fn save_state(&mut self) -> Result<Value, HookError> {
        if self.is_stopped("saveState") {
            return Ok(json!({}));
        }
        match self.game.call_save_state() {
            Some(result) => result.map_err(|err| HookError::new("saveState", err)),
            None => Ok(json!({})),
        }
    }

    pub fn load_state(&mut self, state: &Value) -> Result<(), HookError> {
        if self.is_stopped("loadState") {
            return Ok(());
        }
        match self.game.call_load_state(state) {
            Some(result) => result.map_err(|err| HookError::new("loadState", err)),
            None => Ok(()),
        }
    }

    /// Observation for automated agents; `{}` when the game exports none.
    pub fn state_for_agent(&mut self) -> Result<Value, HookError> {
        if self.is_stopped("getStateForAgent") {
            return Ok(json!({}));
        }
        match self.game.call_state_for_agent() {
            Some(result) => result.map_err(|err| HookError::new("getStateForAgent", err)),
            None => Ok(json!({})),
        }
    }

    fn is_stopped(&self, operation: &str) -> bool {
        let stopped = self.dispatcher.lifecycle() == Lifecycle::Stopped;
        if stopped {
            warn!("{operation} ignored: host is stopped");
        }
        stopped
    }

    /// Virtual display width.
    pub fn width(&self) -> u32 {
        self.context.resolution().width
    }

    /// Virtual display height.
    pub fn height(&self) -> u32 {
        self.context.resolution().height
    }

    pub fn resolution(&self) -> Resolution {
        self.context.resolution()
    }

    pub fn scale(&self) -> f32 {
        self.config.scale
    }

    pub fn help(&self) -> String {
        String::new()
    }

    pub fn auto_clear_back_buffer(&self) -> bool {
        self.context.auto_clear()
    }

    pub fn set_auto_clear_back_buffer(&self, value: bool) {
        self.context.set_auto_clear(value);
    }

    /// Header as seen by the game, including the values written back at boot.
    pub fn header(&self) -> GameHeader {
        self.context.header()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn stage(&self) -> &NodeRef {
        self.context.stage()
    }

    pub fn renderer(&self) -> &SharedRenderer {
        self.context.renderer()
    }

    pub fn presentation_scale(&self) -> Option<Vec2> {
        self.compositor
            .as_ref()
            .map(BackBufferCompositor::presentation_scale)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.dispatcher.lifecycle()
    }

    pub fn state(&self) -> &HostState {
        self.dispatcher.state()
    }

    pub fn player(&self) -> &dyn Player {
        self.player.as_ref()
    }
}

impl fmt::Debug for GameHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameHost")
            .field("resolution", &self.resolution())
            .field("state", self.state())
            .field("game", &self.game)
            .finish()
    }
}
