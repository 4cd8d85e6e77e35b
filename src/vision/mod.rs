//! Enhanced marker detection: candidates, shape and color validation,
//! temporal consistency and a combined confidence per frame.

pub mod detector;
pub mod geometry;
pub mod kalman;
pub mod scorer;
pub mod temporal;
pub mod uniformity;

use std::time::Instant;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    types::{DetectionState, Frame, MarkerPosition, QualityMetrics},
};
use detector::{Candidate, HsvImage};
use scorer::SubScores;
use temporal::TemporalValidator;

/// Per-frame stage counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub candidates_found: usize,
    pub passed_geometry: usize,
    pub passed_uniformity: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionOutcome {
    pub marker: Option<MarkerPosition>,
    pub debug: DebugInfo,
    pub state: DetectionState,
}

impl DetectionOutcome {
    fn searching(debug: DebugInfo) -> Self {
        Self {
            marker: None,
            debug,
            state: DetectionState::Searching,
        }
    }
}

struct Scored<'a> {
    candidate: &'a Candidate,
    confidence: f32,
    quality: QualityMetrics,
}

pub struct MarkerDetector {
    config: Config,
    temporal: TemporalValidator,
}

impl MarkerDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            temporal: TemporalValidator::new(config.temporal.clone()),
            config: config.clone(),
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> DetectionOutcome {
        match HsvImage::from_frame(frame) {
            Some(hsv) => self.detect_hsv(&hsv, frame.timestamp),
            None => {
                log::warn!(
                    "malformed frame {}x{} with {} bytes, treating as no detection",
                    frame.width,
                    frame.height,
                    frame.rgba.len()
                );
                self.temporal.note_gap();
                DetectionOutcome::searching(DebugInfo::default())
            }
        }
    }

    pub fn detect_hsv(&mut self, hsv: &HsvImage, timestamp: Instant) -> DetectionOutcome {
        let candidates = detector::find_candidates(hsv, &self.config.detector);
        let mut debug = DebugInfo {
            candidates_found: candidates.len(),
            ..DebugInfo::default()
        };

        let mut best: Option<Scored> = None;
        for candidate in &candidates {
            let geometry = geometry::validate_geometry(candidate, &self.config.geometry);
            if !geometry.passed {
                log::trace!("candidate rejected: {:?}", geometry.failed);
                continue;
            }
            debug.passed_geometry += 1;

            let uniformity = uniformity::analyze_uniformity(
                candidate,
                hsv,
                &self.config.detector,
                &self.config.uniformity,
            );
            if !uniformity.passed {
                log::trace!("candidate rejected: {:?}", uniformity.failed);
                continue;
            }
            debug.passed_uniformity += 1;

            let temporal = self.temporal.assess(candidate.centroid, candidate.area);
            let subs = SubScores {
                geometric: geometry.score,
                color: uniformity.color_score,
                uniformity: uniformity.uniformity_score,
                temporal: temporal.score,
            };
            let confidence =
                (scorer::score(&subs, &self.config.scorer) * temporal.multiplier).clamp(0.0, 1.0);
            if confidence <= 0.0 {
                continue;
            }

            if best.as_ref().is_none_or(|b| confidence > b.confidence) {
                best = Some(Scored {
                    candidate,
                    confidence,
                    quality: QualityMetrics {
                        geometric_score: subs.geometric,
                        color_score: subs.color,
                        uniformity_score: subs.uniformity,
                        temporal_score: subs.temporal,
                        area: geometry.area,
                        circularity: geometry.circularity,
                        convexity: geometry.convexity,
                    },
                });
            }
        }

        log::debug!(
            "detection: {} candidates, {} geometry, {} uniformity",
            debug.candidates_found,
            debug.passed_geometry,
            debug.passed_uniformity
        );

        let Some(best) = best else {
            self.temporal.note_gap();
            return DetectionOutcome::searching(debug);
        };

        let raw: Point2<f32> = best.candidate.centroid;
        let smoothed = self.temporal.commit(raw, best.candidate.area, timestamp);
        let stable = self.temporal.is_stable(self.temporal.stable_threshold());

        DetectionOutcome {
            marker: Some(MarkerPosition {
                x: smoothed.x,
                y: smoothed.y,
                raw,
                confidence: best.confidence,
                stable,
                detection_state: DetectionState::Confirmed,
                quality: best.quality,
            }),
            debug,
            state: DetectionState::Confirmed,
        }
    }

    /// A frame that never reached the detector.
    pub fn note_gap(&mut self) {
        self.temporal.note_gap();
    }

    pub fn temporal(&self) -> &TemporalValidator {
        &self.temporal
    }

    pub fn reset(&mut self) {
        self.temporal.reset();
    }
}
