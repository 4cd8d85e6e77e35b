use std::time::{Duration, Instant};

use nalgebra::Point2;

use crate::{
    config::GestureConfig,
    types::{GestureLabel, GestureState, MarkerPosition},
};

/// Turns a stream of marker positions into hover, select and drag gestures.
///
/// A still marker hovers until the dwell elapses and then selects for as long
/// as it stays still. Any jump over the movement threshold is a drag and
/// restarts the dwell.
pub struct GestureClassifier {
    config: GestureConfig,
    last_position: Option<Point2<f32>>,
    label: GestureLabel,
    label_since: Option<Instant>,
    dwell_start: Option<Instant>,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            last_position: None,
            label: GestureLabel::None,
            label_since: None,
            dwell_start: None,
        }
    }

    pub fn classify(&mut self, marker: Option<&MarkerPosition>, now: Instant) -> GestureState {
        let Some(marker) = marker.filter(|m| m.confidence >= self.config.min_confidence) else {
            self.reset();
            return GestureState::none();
        };

        let position = marker.point();
        let movement = self
            .last_position
            .map(|prev| nalgebra::distance(&prev, &position))
            .unwrap_or(0.0);
        self.last_position = Some(position);

        let label = if movement > self.config.movement_threshold_px {
            self.dwell_start = Some(now);
            GestureLabel::Drag
        } else {
            let dwell_start = *self.dwell_start.get_or_insert(now);
            if now.saturating_duration_since(dwell_start) >= self.config.dwell() {
                GestureLabel::Select
            } else {
                GestureLabel::Hover
            }
        };

        if label != self.label || self.label_since.is_none() {
            log::trace!("gesture {} -> {}", self.label.label(), label.label());
            self.label = label;
            self.label_since = Some(now);
        }

        let duration = self
            .label_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO);
        let stability = if self.config.movement_threshold_px > 0.0 {
            (1.0 - movement / self.config.movement_threshold_px).clamp(0.0, 1.0)
        } else {
            0.0
        };

        GestureState {
            label,
            position: Some(position),
            duration,
            stability,
        }
    }

    pub fn reset(&mut self) {
        self.last_position = None;
        self.label = GestureLabel::None;
        self.label_since = None;
        self.dwell_start = None;
    }
}
