use anyhow::{Context, Result};
use glam::Vec2;
use log::debug;

use crate::render::{RenderBackend, RenderTarget};
use crate::resolution::Resolution;
use crate::scene::{NodeRef, Texture};

/// Owns the fixed-resolution back buffer and its stretched presentation.
#[derive(Debug)]
pub struct BackBufferCompositor {
    resolution: Resolution,
    back_buffer: RenderTarget,
    clear: NodeRef,
    presentation: NodeRef,
}

impl BackBufferCompositor {
    /// Allocates the back buffer at `resolution`; it keeps that size for the
    /// compositor's whole lifetime.
    pub fn new(backend: &mut dyn RenderBackend, resolution: Resolution) -> Result<Self> {
        let back_buffer = backend
            .create_render_target(resolution.width, resolution.height)
            .with_context(|| format!("unable to create {resolution} back buffer"))?;

        let clear = NodeRef::sprite(Texture::white());
        {
            let mut node = clear.borrow_mut();
            node.name = Some("clear".into());
            node.tint = 0x000000;
            node.set_size(resolution.width as f32, resolution.height as f32);
        }

        let presentation = NodeRef::sprite(Texture::from_target(back_buffer));
        presentation.borrow_mut().name = Some("presentation".into());

        Ok(Self {
            resolution,
            back_buffer,
            clear,
            presentation,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn back_buffer(&self) -> RenderTarget {
        self.back_buffer
    }

    pub fn presentation_scale(&self) -> Vec2 {
        self.presentation.borrow().scale
    }

    /// Clears (optionally), draws `root` into the back buffer, then draws the
    /// back buffer onto the screen.
    pub fn composite(
        &self,
        backend: &mut dyn RenderBackend,
        root: &NodeRef,
        auto_clear: bool,
    ) -> Result<()> {
        if auto_clear {
            backend.draw(&self.clear, Some(self.back_buffer))?;
        }
        backend.draw(root, Some(self.back_buffer))?;
        backend.draw(&self.presentation, None)?;
        Ok(())
    }

    /// Stretches the presentation sprite to cover a `real_width` by
    /// `real_height` viewport, independently per axis.
    pub fn resize(
        &mut self,
        backend: &mut dyn RenderBackend,
        real_width: u32,
        real_height: u32,
    ) -> Vec2 {
        let (real_width, real_height) = (real_width.max(1), real_height.max(1));
        backend.resize_screen(real_width, real_height);
        let scale = Vec2::new(
            real_width as f32 / self.resolution.width as f32,
            real_height as f32 / self.resolution.height as f32,
        );
        self.presentation.borrow_mut().scale = scale;
        debug!(
            "viewport {real_width}x{real_height}, presentation scale {:.3}x{:.3}",
            scale.x, scale.y
        );
        scale
    }

    /// Frees the back buffer and drops the compositor's sprites.
    pub fn release(self, backend: &mut dyn RenderBackend) {
        backend.release_render_target(self.back_buffer);
    }
}
