use std::collections::HashMap;

use anyhow::{anyhow, Result};
use glam::{Affine2, Vec2};
use log::debug;

use super::{RenderBackend, RenderTarget};
use crate::scene::{sprite_bounds, DisplayNode, NodeRef, Texture, TextureSource, MAX_DEPTH};

#[derive(Debug, Clone, Default)]
struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0, 0, 0, 0xff]; width as usize * height as usize],
        }
    }

    fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// CPU rasterizer that keeps every surface as RGBA8 in memory.
#[derive(Debug)]
pub struct SoftwareRenderer {
    screen: Surface,
    targets: HashMap<u32, Surface>,
    next_id: u32,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Surface::new(width.max(1), height.max(1)),
            targets: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Screen pixel at `(x, y)`.
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.screen.texel(x, y)
    }

    pub fn target_pixel(&self, target: RenderTarget, x: u32, y: u32) -> Option<[u8; 4]> {
        self.targets.get(&target.id())?.texel(x, y)
    }

    fn take_surface(&mut self, target: Option<RenderTarget>) -> Result<Surface> {
        match target {
            None => Ok(std::mem::take(&mut self.screen)),
            Some(target) => self
                .targets
                .remove(&target.id())
                .ok_or_else(|| anyhow!("render target {} does not exist", target.id())),
        }
    }

    fn restore_surface(&mut self, target: Option<RenderTarget>, surface: Surface) {
        match target {
            None => self.screen = surface,
            Some(target) => {
                self.targets.insert(target.id(), surface);
            }
        }
    }

    fn draw_node(
        &self,
        dst: &mut Surface,
        node: &NodeRef,
        parent: Affine2,
        parent_alpha: f32,
        depth: usize,
    ) {
        if depth > MAX_DEPTH {
            debug!("display tree deeper than {MAX_DEPTH}; skipping subtree");
            return;
        }
        let node = node.borrow();
        if !node.visible || node.alpha <= 0.0 {
            return;
        }
        let transform = parent * node.local_transform();
        let alpha = parent_alpha * node.alpha.min(1.0);
        if let Some(texture) = node.texture() {
            self.draw_sprite(dst, &node, texture, transform, alpha);
        }
        for child in node.children() {
            self.draw_node(dst, child, transform, alpha, depth + 1);
        }
    }

    fn draw_sprite(
        &self,
        dst: &mut Surface,
        node: &DisplayNode,
        texture: &Texture,
        transform: Affine2,
        alpha: f32,
    ) {
        if transform.matrix2.determinant().abs() <= f32::EPSILON {
            return;
        }
        let source = match &texture.source {
            TextureSource::Target(target) => match self.targets.get(&target.id()) {
                Some(surface) => Some(surface),
                None => {
                    debug!("sprite samples unavailable render target {}", target.id());
                    return;
                }
            },
            _ => None,
        };

        let size = texture.size();
        let origin = -node.anchor * size;
        let (min, max) = sprite_bounds(transform, origin, size);
        let x0 = min.x.floor().max(0.0) as u32;
        let y0 = min.y.floor().max(0.0) as u32;
        let x1 = (max.x.ceil().max(0.0) as u32).min(dst.width);
        let y1 = (max.y.ceil().max(0.0) as u32).min(dst.height);
        let inverse = transform.inverse();
        let tint = crate::scene::rgb(node.tint);

        for y in y0..y1 {
            for x in x0..x1 {
                let local =
                    inverse.transform_point2(Vec2::new(x as f32 + 0.5, y as f32 + 0.5)) - origin;
                if local.x < 0.0 || local.y < 0.0 || local.x >= size.x || local.y >= size.y {
                    continue;
                }
                let (u, v) = (local.x as u32, local.y as u32);
                let texel = match (&texture.source, source) {
                    (TextureSource::Solid(color), _) => *color,
                    (TextureSource::Pixels(pixels), _) => {
                        match pixels.get(v as usize * texture.width as usize + u as usize) {
                            Some(texel) => *texel,
                            None => continue,
                        }
                    }
                    (TextureSource::Target(_), Some(surface)) => match surface.texel(u, v) {
                        Some(texel) => texel,
                        None => continue,
                    },
                    (TextureSource::Target(_), None) => continue,
                };
                let index = y as usize * dst.width as usize + x as usize;
                dst.pixels[index] = blend(dst.pixels[index], texel, tint, alpha);
            }
        }
    }
}

fn blend(dst: [u8; 4], src: [u8; 4], tint: [u8; 4], alpha: f32) -> [u8; 4] {
    let a = (src[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
    if a <= 0.0 {
        return dst;
    }
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let tinted = src[channel] as f32 * tint[channel] as f32 / 255.0;
        out[channel] = (tinted * a + dst[channel] as f32 * (1.0 - a)).round() as u8;
    }
    out[3] = ((a + (dst[3] as f32 / 255.0) * (1.0 - a)) * 255.0).round() as u8;
    out
}

impl RenderBackend for SoftwareRenderer {
    fn create_render_target(&mut self, width: u32, height: u32) -> Result<RenderTarget> {
        if width == 0 || height == 0 {
            return Err(anyhow!("render target must have a non-zero size"));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.targets.insert(id, Surface::new(width, height));
        Ok(RenderTarget::new(id, width, height))
    }

    fn release_render_target(&mut self, target: RenderTarget) {
        self.targets.remove(&target.id());
    }

    fn resize_screen(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (self.screen.width, self.screen.height) != (width, height) {
            self.screen = Surface::new(width, height);
        }
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn draw(&mut self, node: &NodeRef, target: Option<RenderTarget>) -> Result<()> {
        let mut surface = self.take_surface(target)?;
        self.draw_node(&mut surface, node, Affine2::IDENTITY, 1.0, 0);
        self.restore_surface(target, surface);
        Ok(())
    }

    fn pixels(&self, target: Option<RenderTarget>) -> Option<&[[u8; 4]]> {
        match target {
            None => Some(&self.screen.pixels),
            Some(target) => self.targets.get(&target.id()).map(|s| s.pixels.as_slice()),
        }
    }
}
