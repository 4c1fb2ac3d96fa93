use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Native width of the virtual display before any aspect-ratio adjustment.
pub const SCREEN_WIDTH: u32 = 128;
/// Native height of the virtual display before any aspect-ratio adjustment.
pub const SCREEN_HEIGHT: u32 = 128;
/// Scale of the native resolution relative to the resolution the game should
/// ideally be shown at.
pub const SCREEN_SCALE: f32 = 0.5;

/// Tunables for a host instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub base_width: u32,
    pub base_height: u32,
    pub scale: f32,
    /// Initial value of the auto-clear flag exposed to games.
    pub auto_clear: bool,
    /// Lua instructions allowed per hook call. Zero disables the limit.
    pub instruction_budget: u64,
    /// Upper bound applied to the delta handed to `tick`, in seconds; `0`
    /// passes the clock's delta through unchanged.
    pub max_delta: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_width: SCREEN_WIDTH,
            base_height: SCREEN_HEIGHT,
            scale: SCREEN_SCALE,
            auto_clear: true,
            instruction_budget: 10_000_000,
            max_delta: 0.0,
        }
    }
}

impl HostConfig {
    /// Reads a JSON config file; missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn base_resolution(&self) -> (u32, u32) {
        (self.base_width.max(1), self.base_height.max(1))
    }

    pub fn clamp_delta(&self, delta: f64) -> f64 {
        if !delta.is_finite() || delta < 0.0 {
            return 0.0;
        }
        if self.max_delta > 0.0 {
            delta.min(self.max_delta)
        } else {
            delta
        }
    }
}
