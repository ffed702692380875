//! Configuration management for tessera
//!
//! Loads and validates the TOML configuration of the headless compositor:
//! outputs to create, scene behaviour, the swap profiler and the demo
//! clients generating damage. Every section is optional and falls back to
//! its defaults.
//!
//! # Example
//!
//! ```toml
//! [general]
//! frames = 120
//! refresh_rate = 60
//!
//! [scene]
//! fractional_damage_padding = true
//! background = "#202020"
//!
//! [[outputs]]
//! name = "HEADLESS-1"
//! width = 1920
//! height = 1080
//! scale = 1.25
//! ```

use crate::geometry::RectF;
use crate::scene::SceneSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TesseraConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Scene graph behaviour
    #[serde(default)]
    pub scene: SceneConfig,

    /// Swap profiling
    #[serde(default)]
    pub profiler: ProfilerConfig,

    /// Outputs, each getting its own main view
    #[serde(default = "TesseraConfig::default_outputs")]
    pub outputs: Vec<OutputConfig>,

    /// Synthetic clients of the headless driver
    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Frames to render before exiting (0 = until interrupted)
    #[serde(default = "GeneralConfig::default_frames")]
    pub frames: u32,

    /// Simulated refresh rate (Hz)
    #[serde(default = "GeneralConfig::default_refresh_rate")]
    pub refresh_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfig {
    /// Pad accumulated repaints by a device pixel on fractional scales
    #[serde(default = "default_true")]
    pub fractional_damage_padding: bool,

    /// Allow handing a fullscreen surface to the output directly
    #[serde(default = "default_true")]
    pub direct_scanout: bool,

    /// Planes available for direct scanout
    #[serde(default = "SceneConfig::default_max_scanout_candidates")]
    pub max_scanout_candidates: usize,

    /// Background colour ("#RRGGBB" or "#RRGGBBAA")
    #[serde(default = "SceneConfig::default_background")]
    pub background: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Presents folded into one buffering verdict
    #[serde(default = "ProfilerConfig::default_samples")]
    pub samples: u32,

    /// Mean present time above which presents count as blocking (µs)
    #[serde(default = "ProfilerConfig::default_blocking_threshold_us")]
    pub blocking_threshold_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub name: String,

    /// Position in the global logical space
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,

    /// Mode size in device pixels
    pub width: u32,
    pub height: u32,

    /// Device pixels per logical pixel
    #[serde(default = "OutputConfig::default_scale")]
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemoConfig {
    /// Number of client windows
    #[serde(default = "DemoConfig::default_windows")]
    pub windows: u32,

    /// Seed of the damage generator
    #[serde(default)]
    pub seed: u64,

    /// Damage rectangles each client reports per frame
    #[serde(default = "DemoConfig::default_damage_rects_per_frame")]
    pub damage_rects_per_frame: u32,
}

fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            frames: Self::default_frames(),
            refresh_rate: Self::default_refresh_rate(),
        }
    }
}

impl GeneralConfig {
    fn default_frames() -> u32 {
        120
    }
    fn default_refresh_rate() -> u32 {
        60
    }

    /// Time between two simulated vblanks
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate.max(1) as f64)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fractional_damage_padding: true,
            direct_scanout: true,
            max_scanout_candidates: Self::default_max_scanout_candidates(),
            background: Self::default_background(),
        }
    }
}

impl SceneConfig {
    fn default_max_scanout_candidates() -> usize {
        1
    }
    fn default_background() -> String {
        "#000000".to_string()
    }

    /// Settings handed to the scene
    pub fn to_settings(&self) -> Result<SceneSettings> {
        Ok(SceneSettings {
            fractional_damage_padding: self.fractional_damage_padding,
            direct_scanout: self.direct_scanout,
            max_scanout_candidates: self.max_scanout_candidates,
            background: parse_color(&self.background)?,
        })
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: Self::default_samples(),
            blocking_threshold_us: Self::default_blocking_threshold_us(),
        }
    }
}

impl ProfilerConfig {
    fn default_samples() -> u32 {
        500
    }
    fn default_blocking_threshold_us() -> u64 {
        1000
    }

    pub fn blocking_threshold(&self) -> Duration {
        Duration::from_micros(self.blocking_threshold_us)
    }
}

impl OutputConfig {
    fn default_scale() -> f64 {
        1.0
    }

    /// Logical area of the scene shown on this output
    pub fn viewport(&self) -> RectF {
        RectF::new(
            self.x as f64,
            self.y as f64,
            self.width as f64 / self.scale,
            self.height as f64 / self.scale,
        )
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            windows: Self::default_windows(),
            seed: 0,
            damage_rects_per_frame: Self::default_damage_rects_per_frame(),
        }
    }
}

impl DemoConfig {
    fn default_windows() -> u32 {
        3
    }
    fn default_damage_rects_per_frame() -> u32 {
        2
    }
}

/// Parses "#RRGGBB" or "#RRGGBBAA" into straight RGBA
pub fn parse_color(value: &str) -> Result<[u8; 4]> {
    let hex = value
        .strip_prefix('#')
        .with_context(|| format!("Colour must start with '#': {}", value))?;
    if hex.len() != 6 && hex.len() != 8 {
        anyhow::bail!("Colour must be #RRGGBB or #RRGGBBAA: {}", value);
    }
    let channel = |index: usize| -> Result<u8> {
        let digits = hex
            .get(index * 2..index * 2 + 2)
            .with_context(|| format!("Invalid colour: {}", value))?;
        u8::from_str_radix(digits, 16).with_context(|| format!("Invalid colour: {}", value))
    };
    let alpha = if hex.len() == 8 { channel(3)? } else { 0xff };
    Ok([channel(0)?, channel(1)?, channel(2)?, alpha])
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scene: SceneConfig::default(),
            profiler: ProfilerConfig::default(),
            outputs: Self::default_outputs(),
            demo: DemoConfig::default(),
        }
    }
}

impl TesseraConfig {
    fn default_outputs() -> Vec<OutputConfig> {
        vec![OutputConfig {
            name: "HEADLESS-1".to_string(),
            x: 0,
            y: 0,
            width: 1280,
            height: 720,
            scale: 1.0,
        }]
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: TesseraConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.refresh_rate == 0 {
            anyhow::bail!("Invalid refresh_rate: must be at least 1 Hz");
        }

        parse_color(&self.scene.background).context("Invalid scene background")?;

        if self.profiler.samples == 0 {
            anyhow::bail!("Invalid profiler samples: must be at least 1");
        }

        if self.outputs.is_empty() {
            anyhow::bail!("At least one output is required");
        }
        let mut names = HashSet::new();
        for output in &self.outputs {
            if !output.scale.is_finite() || output.scale <= 0.0 {
                anyhow::bail!("Invalid scale for output {}: {}", output.name, output.scale);
            }
            if output.width == 0 || output.height == 0 {
                anyhow::bail!("Output {} has zero size", output.name);
            }
            if !names.insert(output.name.as_str()) {
                anyhow::bail!("Duplicate output name: {}", output.name);
            }
        }

        Ok(())
    }
}

/// Expands a leading `~` to the home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}


#[cfg(test)]
mod property_tests;
