use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::content::ContentProvider;
use crate::header::GameHeader;
use crate::render::{RenderBackend, RenderTarget};
use crate::resolution::Resolution;
use crate::scene::{GraphicsModule, NodeRef};

pub type SharedRenderer = Rc<RefCell<dyn RenderBackend>>;

/// Authoritative host state shared by the loader, compositor and dispatcher.
pub struct HostContext {
    header: RefCell<GameHeader>,
    graphics: GraphicsModule,
    resolution: Resolution,
    content: Rc<dyn ContentProvider>,
    stage: NodeRef,
    renderer: SharedRenderer,
    back_buffer: Cell<Option<RenderTarget>>,
    auto_clear: Cell<bool>,
}

impl HostContext {
    pub(crate) fn new(
        header: GameHeader,
        resolution: Resolution,
        content: Rc<dyn ContentProvider>,
        renderer: SharedRenderer,
        back_buffer: RenderTarget,
        auto_clear: bool,
    ) -> Self {
        let stage = NodeRef::container();
        stage.borrow_mut().name = Some("stage".into());
        Self {
            header: RefCell::new(header),
            graphics: GraphicsModule,
            resolution,
            content,
            stage,
            renderer,
            back_buffer: Cell::new(Some(back_buffer)),
            auto_clear: Cell::new(auto_clear),
        }
    }

    pub fn header(&self) -> GameHeader {
        self.header.borrow().clone()
    }

    pub(crate) fn update_header<F: FnOnce(&mut GameHeader)>(&self, update: F) {
        update(&mut self.header.borrow_mut());
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn stage(&self) -> &NodeRef {
        &self.stage
    }

    pub fn renderer(&self) -> &SharedRenderer {
        &self.renderer
    }

    pub fn content(&self) -> &Rc<dyn ContentProvider> {
        &self.content
    }

    pub fn back_buffer(&self) -> Option<RenderTarget> {
        self.back_buffer.get()
    }

    pub(crate) fn release_back_buffer(&self) -> Option<RenderTarget> {
        self.back_buffer.take()
    }

    pub fn auto_clear(&self) -> bool {
        self.auto_clear.get()
    }

    pub fn set_auto_clear(&self, value: bool) {
        self.auto_clear.set(value);
    }
}

/// Read-only view of the renderer handed to games.
#[derive(Clone)]
pub struct RendererHandle {
    renderer: SharedRenderer,
}

impl RendererHandle {
    /// Size of the real screen surface, or `None` while the renderer is busy.
    pub fn screen_size(&self) -> Option<(u32, u32)> {
        self.renderer
            .try_borrow()
            .ok()
            .map(|renderer| renderer.screen_size())
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererHandle")
            .field("screen_size", &self.screen_size())
            .finish()
    }
}

/// Restricted façade over the host, given to the loaded game.
///
/// Every accessor reads the host at call time. The only writable property
/// is the auto-clear flag; the scene root is shared so games can add and
/// remove nodes under it.
#[derive(Clone)]
pub struct Capabilities {
    host: Rc<HostContext>,
}

impl Capabilities {
    pub(crate) fn new(host: Rc<HostContext>) -> Self {
        Self { host }
    }

    pub fn header(&self) -> GameHeader {
        self.host.header()
    }

    pub fn graphics(&self) -> GraphicsModule {
        self.host.graphics
    }

    /// Virtual screen width.
    pub fn width(&self) -> u32 {
        self.host.resolution.width
    }

    /// Virtual screen height.
    pub fn height(&self) -> u32 {
        self.host.resolution.height
    }

    pub fn content(&self) -> Rc<dyn ContentProvider> {
        Rc::clone(&self.host.content)
    }

    pub fn stage(&self) -> NodeRef {
        self.host.stage.clone()
    }

    pub fn renderer(&self) -> RendererHandle {
        RendererHandle {
            renderer: Rc::clone(&self.host.renderer),
        }
    }

    pub fn back_buffer(&self) -> Option<RenderTarget> {
        self.host.back_buffer()
    }

    pub fn auto_clear_back_buffer(&self) -> bool {
        self.host.auto_clear()
    }

    pub fn set_auto_clear_back_buffer(&self, value: bool) {
        self.host.set_auto_clear(value);
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("auto_clear_back_buffer", &self.auto_clear_back_buffer())
            .finish()
    }
}

/// Host context over a 64x32 software screen with a back buffer of
/// `resolution`.
#[cfg(test)]
pub(crate) fn test_host(
    resolution: Resolution,
    content: Rc<dyn ContentProvider>,
) -> Rc<HostContext> {
    use crate::render::SoftwareRenderer;

    let renderer: SharedRenderer = Rc::new(RefCell::new(SoftwareRenderer::new(64, 32)));
    let target = renderer
        .borrow_mut()
        .create_render_target(resolution.width, resolution.height)
        .unwrap();
    Rc::new(HostContext::new(
        GameHeader::default(),
        resolution,
        content,
        renderer,
        target,
        true,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryProvider;

    fn context() -> Rc<HostContext> {
        test_host(Resolution::new(16, 8), Rc::new(MemoryProvider::new()))
    }

    #[test]
    fn auto_clear_writes_through_both_ways() {
        let host = context();
        let caps = Capabilities::new(Rc::clone(&host));
        assert!(caps.auto_clear_back_buffer());
        caps.set_auto_clear_back_buffer(false);
        assert!(!host.auto_clear());
        host.set_auto_clear(true);
        assert!(caps.auto_clear_back_buffer());
    }

    #[test]
    fn reads_reflect_current_host_values() {
        let host = context();
        let caps = Capabilities::new(Rc::clone(&host));
        assert_eq!((caps.width(), caps.height()), (16, 8));
        assert!(caps.header().width.is_none());
        host.update_header(|header| header.width = Some(16));
        assert_eq!(caps.header().width, Some(16));
        assert!(caps.back_buffer().is_some());
        host.release_back_buffer();
        assert!(caps.back_buffer().is_none());
        assert_eq!(caps.renderer().screen_size(), Some((64, 32)));
    }

    #[test]
    fn stage_is_shared_with_host() {
        let host = context();
        let caps = Capabilities::new(Rc::clone(&host));
        caps.stage().add_child(caps.graphics().container());
        assert_eq!(host.stage().child_count(), 1);
    }
}
