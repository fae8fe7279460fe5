//! Bake configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Error, Result};

/// Largest sample target side, wgpu's default `max_texture_dimension_2d`.
pub const MAX_SAMPLE_RESOLUTION: u32 = 8192;

/// Parameters for one baking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Number of full passes over the target's vertices.
    pub max_bounces: u32,
    /// Vertices sampled per `tick()`.
    pub batch_size: usize,
    /// Side length of the square sample target in pixels.
    pub sample_resolution: u32,

    // Sample camera
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,

    /// Clear color of the sample target.
    pub background: [f32; 3],
    /// Clamp written colors to [0, 1]. Off by default; RGBA8 readback already
    /// stays in range, custom samplers may not.
    pub clamp_channels: bool,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            max_bounces: 3,
            batch_size: 32,
            sample_resolution: 32,
            fov_y_degrees: 90.0,
            near: 0.01,
            far: 100.0,
            background: [0.0, 0.0, 0.0],
            clamp_channels: false,
        }
    }
}

impl BakeConfig {
    /// Defaults with the three parameters hosts usually tune.
    pub fn new(max_bounces: u32, batch_size: usize, sample_resolution: u32) -> Self {
        Self {
            max_bounces,
            batch_size,
            sample_resolution,
            ..Self::default()
        }
    }

    /// Check ranges. Called by the engine before baking starts.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.sample_resolution == 0 || self.sample_resolution > MAX_SAMPLE_RESOLUTION {
            return Err(Error::config(format!(
                "sample_resolution must be in 1..={MAX_SAMPLE_RESOLUTION}, got {}",
                self.sample_resolution
            )));
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(Error::config(format!(
                "fov_y_degrees must be in (0, 180), got {}",
                self.fov_y_degrees
            )));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(Error::config(format!(
                "need 0 < near < far, got near={} far={}",
                self.near, self.far
            )));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = BakeConfig::default();
        assert_eq!(config.max_bounces, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.sample_resolution, 32);
        assert!(!config.clamp_channels);
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn test_validate_rejects() {
        assert!(BakeConfig::new(3, 0, 32).validate().is_err());
        assert!(BakeConfig::new(3, 32, 0).validate().is_err());
        BakeConfig::new(3, 32, MAX_SAMPLE_RESOLUTION).validate().unwrap();
        assert!(matches!(
            BakeConfig::new(3, 32, MAX_SAMPLE_RESOLUTION + 1).validate(),
            Err(Error::InvalidConfig(_))
        ));
        let bad_fov = BakeConfig { fov_y_degrees: 180.0, ..Default::default() };
        assert!(bad_fov.validate().is_err());
        let bad_clip = BakeConfig { near: 1.0, far: 0.5, ..Default::default() };
        assert!(matches!(bad_clip.validate(), Err(Error::InvalidConfig(_))));
        // Zero bounces is a valid (immediately finished) bake.
        BakeConfig::new(0, 32, 32).validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BakeConfig = serde_json::from_str(r#"{ "batch_size": 8 }"#).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_bounces, 3);
        assert_eq!(config.far, 100.0);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bake.json");
        let config = BakeConfig {
            clamp_channels: true,
            background: [0.1, 0.2, 0.3],
            ..BakeConfig::new(2, 16, 8)
        };
        config.save(&path).unwrap();
        assert_eq!(BakeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bake.json");
        std::fs::write(&path, r#"{ "batch_size": 0 }"#).unwrap();
        assert!(matches!(BakeConfig::load(&path), Err(Error::InvalidConfig(_))));
    }
}
