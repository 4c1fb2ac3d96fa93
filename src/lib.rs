//! Host runtime for small fixed-resolution games.
//!
//! A game is described by a [`GameHeader`] and loaded through a
//! [`GameLoader`] from either host-side code or a Lua script fetched via a
//! [`ContentProvider`]. It renders into a back buffer of a fixed virtual
//! resolution, which the [`BackBufferCompositor`] stretches onto the real
//! viewport. The [`GameHost`] ties these together and drives the game frame
//! by frame, containing any fault a tick raises.

pub mod app;
pub mod capabilities;
pub mod compositor;
pub mod config;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod header;
pub mod host;
pub mod input;
pub mod loader;
pub mod render;
pub mod resolution;
pub mod scene;
pub mod scripting;

pub use app::{run_headless, LocalPlayer, RunSummary, WindowViewport};
pub use capabilities::{Capabilities, HostContext, RendererHandle, SharedRenderer};
pub use compositor::BackBufferCompositor;
pub use config::{HostConfig, SCREEN_HEIGHT, SCREEN_SCALE, SCREEN_WIDTH};
pub use content::{Content, ContentProvider, DirectoryProvider, FetchError, MemoryProvider};
pub use dispatcher::{
    panic_message, ClockToken, FrameClock, FrameReport, HostState, Lifecycle, TickDispatcher,
    TickStatus,
};
pub use error::{BootError, HookError};
pub use game::{GameModule, GameModuleBuilder, InlineEntrypoint, HOOK_NAMES};
pub use header::{AssetHeader, Entrypoint, GameHeader};
pub use host::{GameHost, HostOptions, Player};
pub use input::{Button, Controller};
pub use loader::GameLoader;
pub use render::{RenderBackend, RenderTarget, SoftwareRenderer, WindowPresenter};
pub use resolution::{parse_aspect_ratio, resolve_virtual_resolution, AspectRatioError, Resolution};
pub use scene::{DisplayNode, GraphicsModule, NodeKind, NodeRef, Texture, TextureSource};
pub use scripting::LuaGame;
