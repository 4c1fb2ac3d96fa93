use anyhow::Result;

use crate::scene::NodeRef;

pub mod native;
pub mod software;

pub use native::WindowPresenter;
pub use software::SoftwareRenderer;

/// Offscreen surface owned by a render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    id: u32,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub const fn new(id: u32, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// The 2D rendering library the host draws through.
pub trait RenderBackend {
    fn create_render_target(&mut self, width: u32, height: u32) -> Result<RenderTarget>;

    fn release_render_target(&mut self, target: RenderTarget);

    fn resize_screen(&mut self, width: u32, height: u32);

    fn screen_size(&self) -> (u32, u32);

    /// Draws the subtree rooted at `node` into `target`, or onto the screen
    /// when `target` is `None`.
    fn draw(&mut self, node: &NodeRef, target: Option<RenderTarget>) -> Result<()>;

    /// RGBA contents of `target` (or the screen), when the backend keeps them
    /// in memory.
    fn pixels(&self, target: Option<RenderTarget>) -> Option<&[[u8; 4]]>;
}
