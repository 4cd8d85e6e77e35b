//! Color consistency inside a candidate's mask.

use super::detector::{Candidate, HsvImage};
use crate::config::{DetectorConfig, UniformityConfig};

/// Hue axis length in OpenCV units.
const HUE_PERIOD: f32 = 180.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformityCheck {
    TooFewSamples,
    ColorVariance,
    BrightnessRange,
    SaturationConsistency,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformityReport {
    pub samples: usize,
    pub mean_hue: f32,
    pub mean_saturation: f32,
    pub mean_value: f32,
    /// Sum of hue, saturation and value variances.
    pub color_variance: f32,
    pub brightness_range: f32,
    pub saturation_consistency: f32,
    pub passed: bool,
    pub failed: Option<UniformityCheck>,
    pub color_score: f32,
    pub uniformity_score: f32,
}

pub fn analyze_uniformity(
    candidate: &Candidate,
    hsv: &HsvImage,
    detector: &DetectorConfig,
    config: &UniformityConfig,
) -> UniformityReport {
    let samples: Vec<[u8; 3]> = candidate
        .pixels
        .iter()
        .filter(|&&(x, y)| x < hsv.width && y < hsv.height)
        .map(|&(x, y)| hsv.get(x, y))
        .collect();
    let n = samples.len();

    if n < config.min_samples.max(1) {
        return UniformityReport {
            samples: n,
            mean_hue: 0.0,
            mean_saturation: 0.0,
            mean_value: 0.0,
            color_variance: 0.0,
            brightness_range: 0.0,
            saturation_consistency: 0.0,
            passed: false,
            failed: Some(UniformityCheck::TooFewSamples),
            color_score: 0.0,
            uniformity_score: 0.0,
        };
    }

    let nf = n as f32;
    let mean_hue = circular_mean(samples.iter().map(|px| px[0] as f32));
    let hue_variance = samples
        .iter()
        .map(|px| hue_distance(px[0] as f32, mean_hue).powi(2))
        .sum::<f32>()
        / nf;

    let (mean_saturation, sat_variance) =
        mean_and_variance(samples.iter().map(|px| px[1] as f32), nf);
    let (mean_value, value_variance) = mean_and_variance(samples.iter().map(|px| px[2] as f32), nf);

    let (v_min, v_max) = samples
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), px| (lo.min(px[2]), hi.max(px[2])));
    let brightness_range = (v_max - v_min) as f32;

    let saturation_consistency = if mean_saturation > 0.0 {
        1.0 - sat_variance.sqrt() / mean_saturation
    } else {
        0.0
    };

    let color_variance = hue_variance + sat_variance + value_variance;

    let failed = if color_variance > config.max_color_variance {
        Some(UniformityCheck::ColorVariance)
    } else if brightness_range > config.max_brightness_range {
        Some(UniformityCheck::BrightnessRange)
    } else if saturation_consistency < config.min_saturation_consistency {
        Some(UniformityCheck::SaturationConsistency)
    } else {
        None
    };

    let hue_closeness = if detector.hue_tolerance > 0.0 {
        (1.0 - hue_distance(mean_hue, detector.target_hue).abs() / (2.0 * detector.hue_tolerance))
            .clamp(0.0, 1.0)
    } else {
        0.0
    };
    let color_score =
        0.5 * hue_closeness + 0.3 * mean_saturation / 255.0 + 0.2 * mean_value / 255.0;

    let consistency_floor = config.min_saturation_consistency.min(0.999);
    let uniformity_score = ((1.0 - color_variance / config.max_color_variance).clamp(0.0, 1.0)
        + (1.0 - brightness_range / config.max_brightness_range).clamp(0.0, 1.0)
        + ((saturation_consistency - consistency_floor) / (1.0 - consistency_floor))
            .clamp(0.0, 1.0))
        / 3.0;

    UniformityReport {
        samples: n,
        mean_hue,
        mean_saturation,
        mean_value,
        color_variance,
        brightness_range,
        saturation_consistency,
        passed: failed.is_none(),
        failed,
        color_score: color_score.clamp(0.0, 1.0),
        uniformity_score,
    }
}

fn mean_and_variance(values: impl Iterator<Item = f32> + Clone, n: f32) -> (f32, f32) {
    let mean = values.clone().sum::<f32>() / n;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance)
}

/// Mean on the hue circle, in `[0, 180)`.
fn circular_mean(hues: impl Iterator<Item = f32>) -> f32 {
    let (sin, cos) = hues.fold((0.0f32, 0.0f32), |(s, c), h| {
        let angle = h / HUE_PERIOD * std::f32::consts::TAU;
        (s + angle.sin(), c + angle.cos())
    });
    let mean = sin.atan2(cos) / std::f32::consts::TAU * HUE_PERIOD;
    mean.rem_euclid(HUE_PERIOD)
}

/// Signed shortest distance from `b` to `a` on the hue circle.
fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(HUE_PERIOD);
    if d > HUE_PERIOD / 2.0 { d - HUE_PERIOD } else { d }
}
