//! Tunables for every stage of the pipeline.
//!
//! Each stage owns a small serde struct; [`Config`] aggregates them and can be
//! loaded from a JSON file where any missing field falls back to its default.
//! Durations are stored in milliseconds.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub geometry: GeometryConfig,
    pub uniformity: UniformityConfig,
    pub temporal: TemporalConfig,
    pub scorer: ScorerConfig,
    pub gesture: GestureConfig,
    pub mapper: MapperConfig,
    pub interaction: InteractionConfig,
    pub calibration: CalibrationFlowConfig,
    pub marker_size: MarkerSizeConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// HSV band in OpenCV convention: hue 0..180, saturation and value 0..255.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Hue ranges (inclusive); red needs two because it wraps at 0/180.
    pub hue_ranges: Vec<(u8, u8)>,
    pub min_saturation: u8,
    pub min_value: u8,
    /// Center of the target hue, used by the color score.
    pub target_hue: f32,
    pub hue_tolerance: f32,
    pub open_iterations: usize,
    pub close_iterations: usize,
    pub min_component_pixels: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hue_ranges: vec![(0, 10), (170, 179)],
            min_saturation: 190,
            min_value: 190,
            target_hue: 0.0,
            hue_tolerance: 10.0,
            open_iterations: 1,
            close_iterations: 1,
            min_component_pixels: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub min_area: f32,
    pub max_area: f32,
    pub min_circularity: f32,
    pub min_convexity: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_compactness: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_area: 50.0,
            max_area: 800.0,
            min_circularity: 0.75,
            min_convexity: 0.9,
            min_aspect: 0.8,
            max_aspect: 1.2,
            min_compactness: 0.7,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformityConfig {
    /// Upper bound on hue + saturation + value variance.
    pub max_color_variance: f32,
    pub max_brightness_range: f32,
    pub min_saturation_consistency: f32,
    pub min_samples: usize,
}

impl Default for UniformityConfig {
    fn default() -> Self {
        Self {
            max_color_variance: 400.0,
            max_brightness_range: 40.0,
            min_saturation_consistency: 0.85,
            min_samples: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub history_capacity: usize,
    pub max_jump_px: f32,
    pub jump_penalty: f32,
    /// Size coefficient of variation above which confidence is discounted.
    pub max_size_variation: f32,
    pub size_penalty: f32,
    pub stable_window: usize,
    pub stable_threshold_px: f32,
    pub max_missed_frames: u32,
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            max_jump_px: 30.0,
            jump_penalty: 0.5,
            max_size_variation: 0.3,
            size_penalty: 0.75,
            stable_window: 5,
            stable_threshold_px: 15.0,
            max_missed_frames: 5,
            process_noise: 5_000.0,
            measurement_noise: 4.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub geometric_weight: f32,
    pub color_weight: f32,
    pub uniformity_weight: f32,
    pub temporal_weight: f32,
    pub min_component_score: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            geometric_weight: 0.30,
            color_weight: 0.25,
            uniformity_weight: 0.25,
            temporal_weight: 0.20,
            min_component_score: 0.6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub movement_threshold_px: f32,
    pub dwell_ms: u64,
    pub min_confidence: f32,
}

impl GestureConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            movement_threshold_px: 20.0,
            dwell_ms: 1_000,
            min_confidence: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Edge length of the rendered board in pixels.
    pub board_pixels: f32,
    pub grid_size: u8,
    pub smoothing_window: usize,
    /// Weight ratio between consecutive samples, oldest weighted least.
    pub smoothing_decay: f32,
    pub mirror_x: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            board_pixels: 640.0,
            grid_size: 8,
            smoothing_window: 5,
            smoothing_decay: 0.6,
            mirror_x: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub min_confidence: f32,
    pub select_dwell_ms: u64,
    pub drag_grace_ms: u64,
    pub release_hold_ms: u64,
    pub release_timeout_ms: u64,
    pub idle_grace_ms: u64,
    pub hover_grace_ms: u64,
    pub select_grace_ms: u64,
    pub drag_loss_grace_ms: u64,
    pub max_consecutive_gaps: u32,
}

impl InteractionConfig {
    pub fn select_dwell(&self) -> Duration {
        Duration::from_millis(self.select_dwell_ms)
    }

    pub fn drag_grace(&self) -> Duration {
        Duration::from_millis(self.drag_grace_ms)
    }

    pub fn release_hold(&self) -> Duration {
        Duration::from_millis(self.release_hold_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            select_dwell_ms: 1_000,
            drag_grace_ms: 0,
            release_hold_ms: 300,
            release_timeout_ms: 1_000,
            idle_grace_ms: 200,
            hover_grace_ms: 200,
            select_grace_ms: 500,
            drag_loss_grace_ms: 300,
            max_consecutive_gaps: 45,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationFlowConfig {
    pub min_confidence: f32,
    pub hold_ms: u64,
}

impl CalibrationFlowConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

impl Default for CalibrationFlowConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            hold_ms: 800,
        }
    }
}

/// Bounds for fitting marker area against camera distance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSizeConfig {
    pub min_samples: usize,
    /// Closest and farthest expected play distance, in centimeters.
    pub near_cm: f32,
    pub far_cm: f32,
    /// Hard limits on the derived area range.
    pub area_floor: f32,
    pub area_ceiling: f32,
    /// Relative slack around the area predicted for a known distance.
    pub tolerance: f32,
}

impl Default for MarkerSizeConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            near_cm: 25.0,
            far_cm: 120.0,
            area_floor: 30.0,
            area_ceiling: 1000.0,
            tolerance: 0.4,
        }
    }
}
