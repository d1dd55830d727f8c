//! Renderer configuration
//!
//! All knobs the renderer exposes, with defaults that render a frame out of
//! the box. Loadable from TOML so applications can ship a config file instead
//! of recompiling.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed as TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Shadow pass tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Resolution of the square depth-only shadow target. Deliberately much
    /// higher than the swapchain to keep shadow edges stable.
    pub map_size: u32,
    /// Half-extent of the orthographic light volume, centered on the world
    /// origin.
    pub volume_extent: f32,
    /// Depth range of the light volume along the light direction.
    pub depth_range: f32,
    /// Constant depth bias applied while recording shadow draws.
    pub bias_constant: f32,
    /// Slope-scaled depth bias applied while recording shadow draws.
    pub bias_slope: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 2048,
            volume_extent: 60.0,
            depth_range: 200.0,
            bias_constant: 1.25,
            bias_slope: 1.75,
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name passed to instance creation
    pub application_name: String,
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Maximum number of cached texture descriptor sets. Exhausting this
    /// capacity is a fatal error, not a silent eviction.
    pub texture_pool_capacity: u32,
    /// Maximum particle instances buffered per frame slot
    pub max_particle_instances: u32,
    /// Enable validation layers; `None` enables them in debug builds only
    pub enable_validation: Option<bool>,
    /// Directory containing compiled SPIR-V shaders
    pub shader_dir: String,
    /// Shadow pass tuning
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "ember".to_string(),
            frames_in_flight: 2,
            texture_pool_capacity: 100,
            max_particle_instances: 8192,
            enable_validation: None,
            shader_dir: "target/shaders".to_string(),
            shadow: ShadowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Whether validation layers should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Resolve a shader file name against the configured shader directory
    pub fn shader_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.shader_dir.trim_end_matches('/'), file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.texture_pool_capacity, 100);
        assert_eq!(config.shadow.map_size, 2048);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "island"
            [shadow]
            map_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.application_name, "island");
        assert_eq!(config.shadow.map_size, 4096);
        // Untouched fields keep their defaults
        assert_eq!(config.frames_in_flight, 2);
        assert!((config.shadow.bias_slope - 1.75).abs() < f32::EPSILON);
    }

    #[test]
    fn shader_path_joins_cleanly() {
        let mut config = RendererConfig::default();
        config.shader_dir = "shaders/".to_string();
        assert_eq!(config.shader_path("scene.vert.spv"), "shaders/scene.vert.spv");
    }
}
