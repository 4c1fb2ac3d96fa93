//! Retained display tree shared between the host and the loaded game.
//!
//! Games build their scene out of containers and sprites under the host's
//! scene root; the compositor draws that root into the back buffer every
//! rendered frame.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use anyhow::{anyhow, Result};
use glam::{Affine2, Vec2};

use crate::render::RenderTarget;

/// Packs `0xRRGGBB` into opaque RGBA bytes.
pub fn rgb(color: u32) -> [u8; 4] {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8, 0xff]
}

/// Pixel data a sprite samples from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    Solid([u8; 4]),
    Pixels(Rc<[[u8; 4]]>),
    Target(RenderTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub source: TextureSource,
}

impl Texture {
    /// One opaque white texel, stretched and tinted for flat fills.
    pub fn white() -> Self {
        Self::solid(1, 1, 0xffffff)
    }

    pub fn solid(width: u32, height: u32, color: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            source: TextureSource::Solid(rgb(color)),
        }
    }

    /// Wraps raw, row-major RGBA8 bytes.
    pub fn from_rgba(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 {
            return Err(anyhow!("texture must have a non-zero size"));
        }
        if bytes.len() != expected {
            return Err(anyhow!(
                "expected {expected} bytes for a {width}x{height} texture, got {}",
                bytes.len()
            ));
        }
        let pixels: Vec<[u8; 4]> = bytes
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
            .collect();
        Ok(Self {
            width,
            height,
            source: TextureSource::Pixels(Rc::from(pixels)),
        })
    }

    pub fn from_target(target: RenderTarget) -> Self {
        Self {
            width: target.width(),
            height: target.height(),
            source: TextureSource::Target(target),
        }
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    Sprite(Texture),
}

/// A drawable node. Transforms compose as translate, rotate, scale, then
/// offset by `-pivot`.
#[derive(Debug)]
pub struct DisplayNode {
    pub name: Option<String>,
    pub kind: NodeKind,
    pub position: Vec2,
    pub scale: Vec2,
    pub pivot: Vec2,
    /// Sprite origin as a fraction of the texture size.
    pub anchor: Vec2,
    /// Rotation in degrees, clockwise in screen space.
    pub angle: f32,
    /// `0xRRGGBB` multiplied into sampled texels.
    pub tint: u32,
    pub alpha: f32,
    pub visible: bool,
    children: Vec<NodeRef>,
    parent: Weak<RefCell<DisplayNode>>,
}

impl DisplayNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            name: None,
            kind,
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            pivot: Vec2::ZERO,
            anchor: Vec2::ZERO,
            angle: 0.0,
            tint: 0xffffff,
            alpha: 1.0,
            visible: true,
            children: Vec::new(),
            parent: Weak::new(),
        }
    }

    pub fn texture(&self) -> Option<&Texture> {
        match &self.kind {
            NodeKind::Sprite(texture) => Some(texture),
            NodeKind::Container => None,
        }
    }

    pub fn local_transform(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(self.scale, self.angle.to_radians(), self.position)
            * Affine2::from_translation(-self.pivot)
    }

    /// Sets the scale so the sprite covers `width` by `height` pixels.
    pub fn set_size(&mut self, width: f32, height: f32) {
        if let Some(texture) = self.texture() {
            let size = texture.size();
            self.scale = Vec2::new(width / size.x, height / size.y);
        }
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }
}

/// Shared, mutably borrowable handle to a display node.
#[derive(Clone)]
pub struct NodeRef(Rc<RefCell<DisplayNode>>);

impl NodeRef {
    pub fn new(node: DisplayNode) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    pub fn container() -> Self {
        Self::new(DisplayNode::new(NodeKind::Container))
    }

    pub fn sprite(texture: Texture) -> Self {
        Self::new(DisplayNode::new(NodeKind::Sprite(texture)))
    }

    pub fn borrow(&self) -> Ref<'_, DisplayNode> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, DisplayNode> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Appends `child`, detaching it from any previous parent. Refused when
    /// `child` is already a direct child, is this node, or is one of its
    /// ancestors, so every node has at most one parent and the tree stays
    /// acyclic.
    pub fn add_child(&self, child: NodeRef) -> bool {
        if self.ptr_eq(&child) || self.has_ancestor(&child) {
            return false;
        }
        if let Some(previous) = child.parent() {
            if previous.ptr_eq(self) {
                return false;
            }
            previous.remove_child(&child);
        }
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child);
        true
    }

    pub fn remove_child(&self, child: &NodeRef) -> bool {
        let removed = {
            let mut node = self.0.borrow_mut();
            let before = node.children.len();
            node.children.retain(|existing| !existing.ptr_eq(child));
            node.children.len() != before
        };
        if removed {
            child.0.borrow_mut().parent = Weak::new();
        }
        removed
    }

    pub fn remove_children(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in children {
            child.0.borrow_mut().parent = Weak::new();
        }
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.0.borrow().parent.upgrade().map(NodeRef)
    }

    fn has_ancestor(&self, candidate: &NodeRef) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.ptr_eq(candidate) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef> {
        self.0.borrow().children.get(index).cloned()
    }

    /// Axis-aligned bounds of this subtree in the parent's space.
    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        bounds_of(self, Affine2::IDENTITY, 0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(node) => f
                .debug_struct("NodeRef")
                .field("name", &node.name)
                .field("children", &node.children.len())
                .finish(),
            Err(_) => f.write_str("NodeRef(<borrowed>)"),
        }
    }
}

/// Deepest nesting walked by traversals.
pub const MAX_DEPTH: usize = 64;

fn bounds_of(node: &NodeRef, parent: Affine2, depth: usize) -> Option<(Vec2, Vec2)> {
    if depth > MAX_DEPTH {
        return None;
    }
    let node = node.borrow();
    let transform = parent * node.local_transform();
    let mut bounds = node.texture().map(|texture| {
        let origin = -node.anchor * texture.size();
        sprite_bounds(transform, origin, texture.size())
    });
    for child in &node.children {
        if let Some(child_bounds) = bounds_of(child, transform, depth + 1) {
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(child_bounds.0), max.max(child_bounds.1)),
                None => child_bounds,
            });
        }
    }
    bounds
}

pub(crate) fn sprite_bounds(transform: Affine2, origin: Vec2, size: Vec2) -> (Vec2, Vec2) {
    let corners = [
        origin,
        origin + Vec2::new(size.x, 0.0),
        origin + Vec2::new(0.0, size.y),
        origin + size,
    ]
    .map(|corner| transform.transform_point2(corner));
    let min = corners.iter().copied().fold(Vec2::splat(f32::MAX), Vec2::min);
    let max = corners.iter().copied().fold(Vec2::splat(f32::MIN), Vec2::max);
    (min, max)
}

/// Factory for display primitives, handed to games as their graphics module.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsModule;

impl GraphicsModule {
    pub fn container(&self) -> NodeRef {
        NodeRef::container()
    }

    pub fn sprite(&self, texture: Texture) -> NodeRef {
        NodeRef::sprite(texture)
    }

    /// Flat rectangle of `color`, `width` by `height` pixels.
    pub fn rect(&self, width: f32, height: f32, color: u32) -> NodeRef {
        let node = NodeRef::sprite(Texture::white());
        {
            let mut inner = node.borrow_mut();
            inner.tint = color;
            inner.set_size(width, height);
        }
        node
    }

    pub fn solid_texture(&self, width: u32, height: u32, color: u32) -> Texture {
        Texture::solid(width, height, color)
    }

    pub fn rgba_texture(&self, width: u32, height: u32, bytes: &[u8]) -> Result<Texture> {
        Texture::from_rgba(width, height, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_children() {
        let root = NodeRef::container();
        let child = NodeRef::container();
        assert!(root.add_child(child.clone()));
        assert!(!root.add_child(child.clone()));
        assert!(!root.add_child(root.clone()));
        assert_eq!(root.child_count(), 1);
        assert!(root.remove_child(&child));
        assert!(!root.remove_child(&child));
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn rect_covers_requested_size() {
        let rect = GraphicsModule.rect(10.0, 4.0, 0xff0000);
        rect.borrow_mut().position = Vec2::new(2.0, 3.0);
        let (min, max) = rect.bounds().unwrap();
        assert_eq!(min, Vec2::new(2.0, 3.0));
        assert_eq!(max, Vec2::new(12.0, 7.0));
    }

    #[test]
    fn pivot_and_rotation_affect_bounds() {
        let sprite = NodeRef::sprite(Texture::solid(4, 2, 0xffffff));
        {
            let mut node = sprite.borrow_mut();
            node.pivot = Vec2::new(2.0, 1.0);
            node.position = Vec2::new(10.0, 10.0);
            node.angle = 90.0;
        }
        let (min, max) = sprite.bounds().unwrap();
        assert!((min - Vec2::new(9.0, 8.0)).length() < 1e-4);
        assert!((max - Vec2::new(11.0, 12.0)).length() < 1e-4);
    }

    #[test]
    fn rgba_texture_validates_length() {
        assert!(Texture::from_rgba(2, 2, &[0u8; 16]).is_ok());
        assert!(Texture::from_rgba(2, 2, &[0u8; 15]).is_err());
        assert!(Texture::from_rgba(0, 2, &[]).is_err());
    }

    #[test]
    fn cycles_are_refused() {
        let a = NodeRef::container();
        let b = NodeRef::container();
        let c = NodeRef::sprite(Texture::white());
        assert!(a.add_child(b.clone()));
        assert!(b.add_child(c.clone()));
        assert!(!b.add_child(a.clone()));
        assert!(!c.add_child(a.clone()));
        assert!(a.parent().is_none());
        assert!(a.bounds().is_some());
    }

    #[test]
    fn adding_reparents_instead_of_sharing() {
        let a = NodeRef::container();
        let b = NodeRef::container();
        let c = NodeRef::container();
        assert!(a.add_child(b.clone()));
        assert!(a.add_child(c.clone()));
        // Fan-out back to `a` would revisit it once per path.
        assert!(!b.add_child(a.clone()));
        assert!(!c.add_child(a.clone()));

        let shared = NodeRef::sprite(Texture::white());
        assert!(b.add_child(shared.clone()));
        assert!(c.add_child(shared.clone()));
        assert_eq!(b.child_count(), 0);
        assert_eq!(c.child_count(), 1);
        assert!(shared.parent().unwrap().ptr_eq(&c));
    }

    #[test]
    fn removed_children_lose_their_parent() {
        let root = NodeRef::container();
        let child = NodeRef::container();
        root.add_child(child.clone());
        root.remove_children();
        assert!(child.parent().is_none());
        assert!(child.add_child(root.clone()));
    }
}
