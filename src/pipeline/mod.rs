//! Per-frame wiring of detection, gestures, mapping and interaction.

#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod source;

use std::time::Instant;

use crate::{
    config::Config,
    gesture::GestureClassifier,
    interaction::{InteractionEvent, InteractionInput, InteractionMachine},
    mapping::{BoardMapping, CoordinateMapper},
    message::DetectionFrame,
    render::BoardRenderer,
    rules::RulesEngine,
    types::{Frame, GestureState, MarkerPosition, VisionMarker},
    vision::{DebugInfo, MarkerDetector},
};

/// Everything one frame produced.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub marker: Option<MarkerPosition>,
    pub gesture: GestureState,
    pub mapping: Option<BoardMapping>,
    pub debug: Option<DebugInfo>,
    pub events: Vec<InteractionEvent>,
}

pub struct Controller<R, V> {
    detector: MarkerDetector,
    classifier: GestureClassifier,
    mapper: CoordinateMapper,
    machine: InteractionMachine<R, V>,
    /// Consecutive samples without a marker.
    missed: u32,
    max_missed: u32,
}

impl<R: RulesEngine, V: BoardRenderer> Controller<R, V> {
    pub fn new(config: &Config, rules: R, renderer: V) -> Self {
        Self {
            detector: MarkerDetector::new(config),
            classifier: GestureClassifier::new(config.gesture.clone()),
            mapper: CoordinateMapper::new(config.mapper.clone()),
            machine: InteractionMachine::new(config.interaction.clone(), rules, renderer),
            missed: 0,
            max_missed: config.temporal.max_missed_frames.max(1),
        }
    }

    /// Full pass over a camera frame.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let outcome = self.detector.detect(frame);
        let gesture = self
            .classifier
            .classify(outcome.marker.as_ref(), frame.timestamp);
        self.drive(
            outcome.marker,
            gesture,
            frame.width as f32,
            frame.height as f32,
            frame.timestamp,
            Some(outcome.debug),
        )
    }

    /// Pass over a detection computed elsewhere; `now` is its capture time on
    /// our clock.
    pub fn process_message(&mut self, message: &DetectionFrame, now: Instant) -> FrameReport {
        self.drive(
            message.marker,
            message.gesture,
            message.camera_width,
            message.camera_height,
            now,
            message.debug,
        )
    }

    /// No frame arrived in time.
    pub fn on_gap(&mut self, now: Instant) -> Vec<InteractionEvent> {
        self.detector.note_gap();
        self.note_missing();
        self.classifier.classify(None, now);
        self.machine.renderer_mut().update_vision_marker(None);
        self.machine.on_gap(now)
    }

    fn drive(
        &mut self,
        marker: Option<MarkerPosition>,
        gesture: GestureState,
        cam_width: f32,
        cam_height: f32,
        now: Instant,
        debug: Option<DebugInfo>,
    ) -> FrameReport {
        match marker {
            Some(_) => self.missed = 0,
            None => self.note_missing(),
        }
        let mapping = marker.map(|m| self.mapper.camera_to_board(m.x, m.y, cam_width, cam_height));

        let vision = marker.zip(mapping).map(|(m, map)| VisionMarker {
            x: map.pixel.x,
            y: map.pixel.y,
            confidence: m.confidence,
        });
        self.machine.renderer_mut().update_vision_marker(vision);

        let events = match (marker, mapping) {
            (Some(m), Some(mapping)) => self.machine.update(&InteractionInput {
                mapping,
                gesture: gesture.label,
                stable: m.stable,
                confidence: m.confidence,
                detection_state: m.detection_state,
                now,
            }),
            _ => self.machine.on_gap(now),
        };

        if let Some(m) = &marker {
            log::debug!(
                "{} | {} | {}",
                m.display_text(),
                gesture.label.label(),
                self.machine.phase()
            );
        }

        FrameReport {
            marker,
            gesture,
            mapping,
            debug,
            events,
        }
    }

    /// A long enough loss forgets the board-space smoothing window, so a
    /// marker that comes back elsewhere maps to where it is now.
    fn note_missing(&mut self) {
        self.missed = self.missed.saturating_add(1);
        if self.missed == self.max_missed {
            log::debug!("{} samples without a marker, clearing smoothing", self.missed);
            self.mapper.reset_smoothing();
        }
    }

    /// Clears interaction, smoothing and gesture state. Calibration survives.
    pub fn reset(&mut self) -> Vec<InteractionEvent> {
        self.missed = 0;
        self.detector.reset();
        self.classifier.reset();
        self.mapper.reset_smoothing();
        self.machine.reset()
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut CoordinateMapper {
        &mut self.mapper
    }

    pub fn machine(&self) -> &InteractionMachine<R, V> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut InteractionMachine<R, V> {
        &mut self.machine
    }

    pub fn detector(&self) -> &MarkerDetector {
        &self.detector
    }
}
