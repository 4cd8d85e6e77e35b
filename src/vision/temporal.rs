//! Frame-to-frame consistency of marker detections.

use std::{collections::VecDeque, time::Instant};

use nalgebra::Point2;

use super::kalman::KalmanFilter;
use crate::config::TemporalConfig;

const JUMP_WEIGHT: f32 = 0.15;
const SIZE_WEIGHT: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEntry {
    pub position: Point2<f32>,
    pub area: f32,
    pub timestamp: Instant,
}

/// Fixed-capacity ring of recent detections; pushing past capacity drops the
/// oldest entry.
#[derive(Clone, Debug)]
pub struct PositionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemporalAssessment {
    /// Temporal sub-score in 0..1.
    pub score: f32,
    /// Applied to the final confidence.
    pub multiplier: f32,
    /// Distance from the previous raw position, 0 without history.
    pub jump: f32,
    /// Coefficient of variation of area across history plus this sample.
    pub size_variation: f32,
}

#[derive(Clone, Debug)]
pub struct TemporalValidator {
    config: TemporalConfig,
    history: PositionHistory,
    filter: KalmanFilter,
    missed_frames: u32,
}

impl TemporalValidator {
    pub fn new(config: TemporalConfig) -> Self {
        Self {
            history: PositionHistory::new(config.history_capacity),
            filter: KalmanFilter::new(config.process_noise, config.measurement_noise),
            missed_frames: 0,
            config,
        }
    }

    /// Scores a candidate position against history without recording it.
    pub fn assess(&self, position: Point2<f32>, area: f32) -> TemporalAssessment {
        let jump = self
            .history
            .last()
            .map(|prev| nalgebra::distance(&prev.position, &position))
            .unwrap_or(0.0);

        let areas: Vec<f32> = self
            .history
            .iter()
            .map(|e| e.area)
            .chain(std::iter::once(area))
            .collect();
        let size_variation = coefficient_of_variation(&areas);

        let mut multiplier = 1.0;
        if jump > self.config.max_jump_px {
            multiplier *= self.config.jump_penalty;
        }
        if size_variation > self.config.max_size_variation {
            multiplier *= self.config.size_penalty;
        }

        let jump_term = if self.config.max_jump_px > 0.0 {
            (jump / self.config.max_jump_px).min(1.0)
        } else {
            0.0
        };
        let size_term = if self.config.max_size_variation > 0.0 {
            (size_variation / self.config.max_size_variation).min(1.0)
        } else {
            0.0
        };

        // Bottoms out at 0.65, above the scorer floor: motion discounts
        // confidence through the multiplier and never rejects on its own.
        TemporalAssessment {
            score: (1.0 - JUMP_WEIGHT * jump_term - SIZE_WEIGHT * size_term).clamp(0.0, 1.0),
            multiplier,
            jump,
            size_variation,
        }
    }

    /// Records the winning detection and returns the smoothed position.
    pub fn commit(&mut self, position: Point2<f32>, area: f32, timestamp: Instant) -> Point2<f32> {
        let previous = self.history.last().map(|e| e.timestamp);
        self.history.push(HistoryEntry {
            position,
            area,
            timestamp,
        });
        self.missed_frames = 0;

        match previous {
            Some(prev) if self.filter.is_initialized() => {
                let dt = timestamp.saturating_duration_since(prev).as_secs_f32();
                self.filter.predict(dt);
                self.filter.update(position.x, position.y);
            }
            _ => self.filter.initialize(position.x, position.y),
        }
        self.filter.position()
    }

    /// True once the last `stable_window` positions all sit within
    /// `threshold` of their mean.
    pub fn is_stable(&self, threshold: f32) -> bool {
        let window = self.config.stable_window.max(1);
        if self.history.len() < window {
            return false;
        }
        let recent: Vec<Point2<f32>> = self
            .history
            .iter()
            .rev()
            .take(window)
            .map(|e| e.position)
            .collect();
        let n = recent.len() as f32;
        let mean = Point2::new(
            recent.iter().map(|p| p.x).sum::<f32>() / n,
            recent.iter().map(|p| p.y).sum::<f32>() / n,
        );
        recent
            .iter()
            .all(|p| nalgebra::distance(p, &mean) <= threshold)
    }

    /// Counts a frame without detection. Returns true when the miss streak
    /// reset the tracker.
    pub fn note_gap(&mut self) -> bool {
        self.missed_frames += 1;
        if self.missed_frames >= self.config.max_missed_frames && !self.history.is_empty() {
            log::debug!("temporal: {} missed frames, resetting", self.missed_frames);
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.filter.reset();
        self.missed_frames = 0;
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn stable_threshold(&self) -> f32 {
        self.config.stable_threshold_px
    }
}

fn coefficient_of_variation(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    variance.sqrt() / mean
}
