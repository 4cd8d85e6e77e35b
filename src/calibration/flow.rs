use std::time::Instant;

use super::{CalibrationData, CalibrationError, Corner};
use crate::{
    config::CalibrationFlowConfig,
    mapping::CoordinateMapper,
    types::{DetectionState, MarkerPosition},
};

#[derive(Clone, Debug, PartialEq)]
pub enum FlowStatus {
    /// Waiting for a steady, confident marker over this corner.
    Waiting(Corner),
    /// Holding over the corner; progress runs 0..1.
    Holding { corner: Corner, progress: f32 },
    Captured(Corner),
    Completed(CalibrationData),
    Failed(CalibrationError),
}

/// Walks the user through the four board corners, capturing each from a
/// marker held still long enough.
pub struct CalibrationFlow {
    config: CalibrationFlowConfig,
    next: usize,
    hold_start: Option<Instant>,
    finished: Option<FlowStatus>,
}

impl CalibrationFlow {
    pub fn new(config: CalibrationFlowConfig) -> Self {
        Self {
            config,
            next: 0,
            hold_start: None,
            finished: None,
        }
    }

    pub fn current_corner(&self) -> Option<Corner> {
        if self.finished.is_some() {
            return None;
        }
        Corner::ALL.get(self.next).copied()
    }

    pub fn restart(&mut self, mapper: &mut CoordinateMapper) {
        log::info!("calibration restarted");
        self.next = 0;
        self.hold_start = None;
        self.finished = None;
        mapper.discard_pending_corners();
    }

    pub fn update(
        &mut self,
        marker: Option<&MarkerPosition>,
        cam_width: f32,
        cam_height: f32,
        now: Instant,
        mapper: &mut CoordinateMapper,
    ) -> FlowStatus {
        if let Some(done) = &self.finished {
            return done.clone();
        }
        let Some(corner) = Corner::ALL.get(self.next).copied() else {
            return FlowStatus::Waiting(Corner::TopLeft);
        };

        let Some(marker) = marker.filter(|m| {
            m.detection_state == DetectionState::Confirmed
                && m.stable
                && m.confidence >= self.config.min_confidence
        }) else {
            self.hold_start = None;
            return FlowStatus::Waiting(corner);
        };

        let started = *self.hold_start.get_or_insert(now);
        let held = now.saturating_duration_since(started);
        if held < self.config.hold() {
            let progress = held.as_secs_f32() / self.config.hold().as_secs_f32().max(f32::EPSILON);
            return FlowStatus::Holding { corner, progress };
        }

        self.hold_start = None;
        match mapper.set_calibration_point(corner, marker.x, marker.y, cam_width, cam_height) {
            Ok(None) => {
                self.next += 1;
                FlowStatus::Captured(corner)
            }
            Ok(Some(data)) => {
                log::info!("calibration complete");
                let status = FlowStatus::Completed(data);
                self.finished = Some(status.clone());
                status
            }
            Err(err) => {
                log::warn!("calibration failed: {err}");
                let status = FlowStatus::Failed(err);
                self.finished = Some(status.clone());
                status
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::MapperConfig, types::QualityMetrics};
    use nalgebra::Point2;
    use std::time::Duration;

    fn marker(x: f32, y: f32, stable: bool) -> MarkerPosition {
        MarkerPosition {
            x,
            y,
            raw: Point2::new(x, y),
            confidence: 0.9,
            stable,
            detection_state: DetectionState::Confirmed,
            quality: QualityMetrics::default(),
        }
    }

    #[test]
    fn captures_four_corners_in_order() {
        let mut mapper = CoordinateMapper::new(MapperConfig::default());
        let mut flow = CalibrationFlow::new(CalibrationFlowConfig::default());
        let t0 = Instant::now();
        let spots = [(100.0, 50.0), (540.0, 60.0), (560.0, 430.0), (90.0, 420.0)];

        let mut t = t0;
        let mut last = FlowStatus::Waiting(Corner::TopLeft);
        for (i, (x, y)) in spots.into_iter().enumerate() {
            assert_eq!(flow.current_corner(), Some(Corner::ALL[i]));
            let m = marker(x, y, true);
            assert!(matches!(
                flow.update(Some(&m), 640.0, 480.0, t, &mut mapper),
                FlowStatus::Holding { .. }
            ));
            t += Duration::from_millis(800);
            last = flow.update(Some(&m), 640.0, 480.0, t, &mut mapper);
            t += Duration::from_millis(100);
        }
        assert!(matches!(last, FlowStatus::Completed(_)));
        assert!(mapper.is_calibrated());
        assert_eq!(flow.current_corner(), None);
    }

    #[test]
    fn unsteady_marker_restarts_the_hold() {
        let mut mapper = CoordinateMapper::new(MapperConfig::default());
        let mut flow = CalibrationFlow::new(CalibrationFlowConfig::default());
        let t0 = Instant::now();
        let steady = marker(100.0, 50.0, true);
        flow.update(Some(&steady), 640.0, 480.0, t0, &mut mapper);
        let status = flow.update(
            Some(&marker(100.0, 50.0, false)),
            640.0,
            480.0,
            t0 + Duration::from_millis(500),
            &mut mapper,
        );
        assert_eq!(status, FlowStatus::Waiting(Corner::TopLeft));
        let status = flow.update(
            Some(&steady),
            640.0,
            480.0,
            t0 + Duration::from_millis(900),
            &mut mapper,
        );
        assert!(matches!(status, FlowStatus::Holding { .. }));
    }

    #[test]
    fn degenerate_corners_fail_the_flow() {
        let mut mapper = CoordinateMapper::new(MapperConfig::default());
        let mut flow = CalibrationFlow::new(CalibrationFlowConfig::default());
        let mut t = Instant::now();
        let mut last = FlowStatus::Waiting(Corner::TopLeft);
        for x in [100.0, 200.0, 300.0, 400.0] {
            let m = marker(x, 100.0, true);
            flow.update(Some(&m), 640.0, 480.0, t, &mut mapper);
            t += Duration::from_millis(800);
            last = flow.update(Some(&m), 640.0, 480.0, t, &mut mapper);
        }
        assert!(matches!(last, FlowStatus::Failed(CalibrationError::Degenerate(_))));
        assert!(!mapper.is_calibrated());

        flow.restart(&mut mapper);
        assert_eq!(flow.current_corner(), Some(Corner::TopLeft));
    }
}
