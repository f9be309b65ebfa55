//! Configuration loading

use anyhow::{ensure, Context, Result};
use camlink_host::HostConfig;
use camlink_scene::{OrbitSettings, SurfaceConfig, Viewport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSection {
    /// Quiet period before RESIZE is sent
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    /// Changes smaller than this on both axes are ignored
    #[serde(default = "default_resize_threshold_px")]
    pub resize_threshold_px: f64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            resize_debounce_ms: default_resize_debounce_ms(),
            resize_threshold_px: default_resize_threshold_px(),
        }
    }
}

fn default_resize_debounce_ms() -> u64 {
    50
}

fn default_resize_threshold_px() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceSection {
    /// Render loop ticks per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    /// 0 disables damping
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,
    #[serde(default = "default_pan_speed")]
    pub pan_speed: f64,
    #[serde(default = "default_one")]
    pub rotate_speed: f64,
    #[serde(default = "default_one")]
    pub zoom_speed: f64,
    /// HTTP texture fetch timeout
    #[serde(default = "default_texture_timeout_secs")]
    pub texture_timeout_secs: u64,
    /// Initial viewport
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            damping_factor: default_damping_factor(),
            pan_speed: default_pan_speed(),
            rotate_speed: default_one(),
            zoom_speed: default_one(),
            texture_timeout_secs: default_texture_timeout_secs(),
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_frame_rate() -> u32 {
    60
}

fn default_min_distance() -> f64 {
    2.0
}

fn default_max_distance() -> f64 {
    20.0
}

fn default_damping_factor() -> f64 {
    0.05
}

fn default_pan_speed() -> f64 {
    2.0
}

fn default_one() -> f64 {
    1.0
}

fn default_texture_timeout_secs() -> u64 {
    30
}

fn default_width() -> f64 {
    320.0
}

fn default_height() -> f64 {
    400.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Host/surface pairs sharing the bus
    #[serde(default = "default_instances")]
    pub instances: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            instances: default_instances(),
        }
    }
}

fn default_instances() -> usize {
    1
}

impl Config {
    /// Reject values the host and surface cannot run with
    pub fn validate(&self) -> Result<()> {
        let h = &self.host;
        ensure!(
            h.resize_threshold_px.is_finite() && h.resize_threshold_px >= 0.0,
            "host.resize_threshold_px must be a non-negative number"
        );

        let s = &self.surface;
        ensure!(s.frame_rate > 0, "surface.frame_rate must be positive");
        ensure!(
            s.min_distance.is_finite() && s.max_distance.is_finite(),
            "surface distance limits must be finite"
        );
        ensure!(
            s.min_distance > 0.0 && s.min_distance <= s.max_distance,
            "surface.min_distance ({}) must be positive and at most max_distance ({})",
            s.min_distance,
            s.max_distance
        );
        ensure!(
            (0.0..=1.0).contains(&s.damping_factor),
            "surface.damping_factor must be within 0..=1"
        );
        for (name, value) in [
            ("pan_speed", s.pan_speed),
            ("rotate_speed", s.rotate_speed),
            ("zoom_speed", s.zoom_speed),
        ] {
            ensure!(value.is_finite(), "surface.{} must be finite", name);
        }
        ensure!(
            s.width > 0.0 && s.height > 0.0 && s.width.is_finite() && s.height.is_finite(),
            "surface width and height must be positive"
        );
        Ok(())
    }

    /// Convert to HostConfig
    pub fn to_host_config(&self) -> HostConfig {
        HostConfig {
            resize_debounce: Duration::from_millis(self.host.resize_debounce_ms),
            resize_threshold: self.host.resize_threshold_px,
        }
    }

    /// Convert to SurfaceConfig
    pub fn to_surface_config(&self) -> SurfaceConfig {
        let s = &self.surface;
        SurfaceConfig {
            frame_rate: s.frame_rate,
            orbit: OrbitSettings {
                min_distance: s.min_distance,
                max_distance: s.max_distance,
                damping_factor: s.damping_factor,
                rotate_speed: s.rotate_speed,
                pan_speed: s.pan_speed,
                zoom_speed: s.zoom_speed,
            },
            viewport: Viewport::new(s.width, s.height),
            texture_timeout: Duration::from_secs(s.texture_timeout_secs),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Render the default configuration as TOML
pub fn default_config_toml() -> Result<String> {
    Ok(toml::to_string_pretty(&Config::default())?)
}
