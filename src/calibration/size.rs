//! Marker size against camera distance.
//!
//! A marker of fixed physical size covers an area that falls off with the
//! square of its distance. Fitting `area = a / d² + b` over a few measured
//! distances gives the area band the geometry check should accept for the
//! current camera setup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{GeometryConfig, MarkerSizeConfig};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizeCalibrationError {
    #[error("need at least {needed} measurements, have {found}")]
    TooFewSamples { found: usize, needed: usize },
    #[error("invalid measurement: {area} px at {distance_cm} cm")]
    InvalidSample { distance_cm: f32, area: f32 },
    #[error("measurements need at least two different distances")]
    SingleDistance,
    #[error("marker area does not shrink with distance")]
    NotShrinking,
    #[error("area range {min_area}..{max_area} is empty")]
    EmptyRange { min_area: f32, max_area: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeSample {
    pub distance_cm: f32,
    /// Pixel area of the detected marker.
    pub area: f32,
}

impl SizeSample {
    pub fn new(distance_cm: f32, area: f32) -> Result<Self, SizeCalibrationError> {
        let valid = distance_cm.is_finite() && distance_cm > 0.0 && area.is_finite() && area > 0.0;
        if !valid {
            return Err(SizeCalibrationError::InvalidSample { distance_cm, area });
        }
        Ok(Self { distance_cm, area })
    }
}

/// `area = a / distance² + b`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaModel {
    pub a: f64,
    pub b: f64,
}

impl AreaModel {
    /// Least squares over `1 / d²`.
    pub fn fit(samples: &[SizeSample]) -> Result<Self, SizeCalibrationError> {
        let n = samples.len() as f64;
        let xs: Vec<f64> = samples
            .iter()
            .map(|s| 1.0 / (s.distance_cm as f64).powi(2))
            .collect();
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = samples.iter().map(|s| s.area as f64).sum::<f64>() / n;

        let (mut sxx, mut sxy) = (0.0, 0.0);
        for (x, s) in xs.iter().zip(samples) {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (s.area as f64 - mean_y);
        }
        if sxx <= f64::EPSILON * mean_x * mean_x {
            return Err(SizeCalibrationError::SingleDistance);
        }
        let a = sxy / sxx;
        if a <= 0.0 {
            return Err(SizeCalibrationError::NotShrinking);
        }
        Ok(Self {
            a,
            b: mean_y - a * mean_x,
        })
    }

    pub fn predict_area(&self, distance_cm: f32) -> f32 {
        (self.a / (distance_cm as f64).powi(2) + self.b) as f32
    }

    /// Distance at which the marker would cover `area`; `None` when the
    /// model never gets that small.
    pub fn estimate_distance(&self, area: f32) -> Option<f32> {
        let excess = area as f64 - self.b;
        (excess > 0.0).then(|| (self.a / excess).sqrt() as f32)
    }
}

/// A fitted size model and the area band it implies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSizeCalibration {
    pub samples: Vec<SizeSample>,
    pub model: AreaModel,
    pub min_area: f32,
    pub max_area: f32,
}

impl MarkerSizeCalibration {
    pub fn fit(
        samples: Vec<SizeSample>,
        config: &MarkerSizeConfig,
    ) -> Result<Self, SizeCalibrationError> {
        let needed = config.min_samples.max(2);
        if samples.len() < needed {
            return Err(SizeCalibrationError::TooFewSamples {
                found: samples.len(),
                needed,
            });
        }
        let model = AreaModel::fit(&samples)?;
        let min_area = model.predict_area(config.far_cm).max(config.area_floor);
        let max_area = model.predict_area(config.near_cm).min(config.area_ceiling);
        let calibration = Self {
            samples,
            model,
            min_area,
            max_area,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<(), SizeCalibrationError> {
        let finite = self.min_area.is_finite()
            && self.max_area.is_finite()
            && self.model.a.is_finite()
            && self.model.b.is_finite();
        if !finite || self.min_area <= 0.0 || self.min_area >= self.max_area {
            return Err(SizeCalibrationError::EmptyRange {
                min_area: self.min_area,
                max_area: self.max_area,
            });
        }
        if self.model.a <= 0.0 {
            return Err(SizeCalibrationError::NotShrinking);
        }
        Ok(())
    }

    /// Area band for a marker believed to be `distance_cm` away.
    pub fn area_range_at(&self, distance_cm: f32, config: &MarkerSizeConfig) -> (f32, f32) {
        let predicted = self.model.predict_area(distance_cm);
        (
            (predicted * (1.0 - config.tolerance)).max(config.area_floor),
            (predicted * (1.0 + config.tolerance)).min(config.area_ceiling),
        )
    }

    pub fn apply(&self, geometry: &mut GeometryConfig) {
        geometry.min_area = self.min_area;
        geometry.max_area = self.max_area;
    }
}

/// Collects measurements until there are enough to fit.
#[derive(Clone, Debug, Default)]
pub struct MarkerSizeCalibrator {
    config: MarkerSizeConfig,
    samples: Vec<SizeSample>,
}

impl MarkerSizeCalibrator {
    pub fn new(config: MarkerSizeConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, distance_cm: f32, area: f32) -> Result<(), SizeCalibrationError> {
        let sample = SizeSample::new(distance_cm, area)?;
        log::info!("marker size: {area:.0} px at {distance_cm} cm");
        self.samples.push(sample);
        Ok(())
    }

    pub fn samples(&self) -> &[SizeSample] {
        &self.samples
    }

    pub fn finish(&self) -> Result<MarkerSizeCalibration, SizeCalibrationError> {
        let mut samples = self.samples.clone();
        samples.sort_by(|l, r| l.distance_cm.total_cmp(&r.distance_cm));
        let calibration = MarkerSizeCalibration::fit(samples, &self.config)?;
        log::info!(
            "marker size model: area = {:.1} / d^2 + {:.1}, accepting {:.0}..{:.0} px",
            calibration.model.a,
            calibration.model.b,
            calibration.min_area,
            calibration.max_area
        );
        Ok(calibration)
    }
}
