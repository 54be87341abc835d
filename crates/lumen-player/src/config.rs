//! Player configuration for lumen-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/lumen/player.yaml

use lumen_core::config::PresenterConfig;
use lumen_core::{fourcc, MediaType, Ratio, Size};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Presenter tunables (pool, scheduler, events)
    pub presenter: PresenterConfig,
    /// Synthetic source
    pub source: SourceConfig,
    /// Simulated display
    pub display: DisplayConfig,
}

/// Synthetic source section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    /// Frames per second, as numerator/denominator
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    /// Frames the source produces before signalling end of stream
    pub frames: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate_num: 30,
            frame_rate_den: 1,
            frames: 150,
        }
    }
}

impl SourceConfig {
    pub fn media_type(&self) -> MediaType {
        MediaType::new(
            Size::new(self.width, self.height),
            Ratio::new(self.frame_rate_num, self.frame_rate_den),
            fourcc(b"NV12"),
        )
    }
}

/// Simulated display section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How long a presented frame stays on screen before its surface is returned
    pub scanout_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { scanout_ms: 8 }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/lumen/player.yaml
pub fn default_config_path() -> PathBuf {
    lumen_core::config::default_config_path("player.yaml")
}
