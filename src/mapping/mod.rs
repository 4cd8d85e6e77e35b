//! Camera pixel to board coordinate mapping.

pub mod homography;

use std::collections::VecDeque;

use nalgebra::Point2;

use crate::{
    calibration::{CalibrationData, CalibrationError, Corner, CornerPoint},
    config::MapperConfig,
    types::Square,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardMapping {
    /// Smoothed position in board pixels.
    pub pixel: Point2<f32>,
    /// Nearest square, clamped onto the board.
    pub grid: Square,
    /// Position in board units, 0..1 on the board.
    pub normalized: Point2<f32>,
    pub is_on_board: bool,
}

impl BoardMapping {
    fn off_board() -> Self {
        Self {
            pixel: Point2::new(-1.0, -1.0),
            grid: Square::new(0, 0),
            normalized: Point2::new(-1.0, -1.0),
            is_on_board: false,
        }
    }

    pub fn square(&self) -> Option<Square> {
        self.is_on_board.then_some(self.grid)
    }
}

pub struct CoordinateMapper {
    config: MapperConfig,
    calibration: Option<CalibrationData>,
    pending: [Option<CornerPoint>; 4],
    recent: VecDeque<Point2<f32>>,
}

impl CoordinateMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.smoothing_window.max(1)),
            config,
            calibration: None,
            pending: [None; 4],
        }
    }

    /// Maps and smooths one camera-space sample.
    pub fn camera_to_board(
        &mut self,
        cam_x: f32,
        cam_y: f32,
        cam_w: f32,
        cam_h: f32,
    ) -> BoardMapping {
        let Some(raw) = self.project(cam_x, cam_y, cam_w, cam_h) else {
            return BoardMapping::off_board();
        };

        let window = self.config.smoothing_window.max(1);
        if self.recent.len() == window {
            self.recent.pop_front();
        }
        self.recent.push_back(raw);

        let mut weight = 1.0;
        let mut total = 0.0;
        let mut sum = Point2::new(0.0f32, 0.0);
        for p in self.recent.iter().rev() {
            sum.x += p.x * weight;
            sum.y += p.y * weight;
            total += weight;
            weight *= self.config.smoothing_decay;
        }
        self.mapping_for(Point2::new(sum.x / total, sum.y / total))
    }

    /// Unsmoothed board-pixel position of a camera sample, `None` for an
    /// invalid sample or a point the calibration sends to infinity.
    pub fn project(&self, cam_x: f32, cam_y: f32, cam_w: f32, cam_h: f32) -> Option<Point2<f32>> {
        if !(cam_x.is_finite() && cam_y.is_finite()) || !(cam_w > 0.0 && cam_h > 0.0) {
            return None;
        }
        let cam_x = if self.config.mirror_x { cam_w - cam_x } else { cam_x };

        let normalized = match &self.calibration {
            Some(data) => {
                let p = data.project((cam_x / cam_w) as f64, (cam_y / cam_h) as f64)?;
                Point2::new(p.x as f32, p.y as f32)
            }
            None => {
                // Centered square of the shorter frame side.
                let side = cam_w.min(cam_h);
                Point2::new(
                    (cam_x - (cam_w - side) / 2.0) / side,
                    (cam_y - (cam_h - side) / 2.0) / side,
                )
            }
        };

        let pixel = normalized * self.config.board_pixels;
        (pixel.x.is_finite() && pixel.y.is_finite()).then_some(pixel)
    }

    fn mapping_for(&self, pixel: Point2<f32>) -> BoardMapping {
        let normalized = pixel / self.config.board_pixels;
        let n = self.config.grid_size.max(1);
        let cell = |v: f32| ((v * n as f32).floor().max(0.0) as u32).min(n as u32 - 1) as u8;
        BoardMapping {
            pixel,
            grid: Square::new(cell(normalized.y), cell(normalized.x)),
            normalized,
            is_on_board: (0.0..=1.0).contains(&normalized.x) && (0.0..=1.0).contains(&normalized.y),
        }
    }

    /// Records one corner; the fourth finalizes the calibration.
    ///
    /// On degenerate input all pending corners are dropped and any existing
    /// calibration stays in effect.
    pub fn set_calibration_point(
        &mut self,
        corner: Corner,
        cam_x: f32,
        cam_y: f32,
        cam_w: f32,
        cam_h: f32,
    ) -> Result<Option<CalibrationData>, CalibrationError> {
        if !(cam_x.is_finite() && cam_y.is_finite()) || !(cam_w > 0.0 && cam_h > 0.0) {
            self.pending = [None; 4];
            return Err(CalibrationError::Degenerate("invalid camera sample"));
        }
        let cam_x = if self.config.mirror_x { cam_w - cam_x } else { cam_x };
        let point = CornerPoint::new((cam_x / cam_w) as f64, (cam_y / cam_h) as f64);
        self.pending[corner.index()] = Some(point);
        log::info!(
            "calibration corner {} at ({:.3}, {:.3})",
            corner.label(),
            point.x,
            point.y
        );

        let [Some(tl), Some(tr), Some(br), Some(bl)] = self.pending else {
            return Ok(None);
        };
        self.pending = [None; 4];

        match CalibrationData::from_corners([tl, tr, br, bl]) {
            Ok(data) => {
                self.set_calibration(data);
                Ok(Some(data))
            }
            Err(err) => {
                log::warn!("calibration rejected: {err}");
                Err(err)
            }
        }
    }

    pub fn set_calibration(&mut self, data: CalibrationData) {
        log::info!("board calibration applied");
        self.calibration = Some(data);
        self.reset_smoothing();
    }

    pub fn discard_pending_corners(&mut self) {
        self.pending = [None; 4];
    }

    pub fn clear_calibration(&mut self) {
        self.calibration = None;
        self.pending = [None; 4];
        self.reset_smoothing();
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref()
    }

    pub fn reset_smoothing(&mut self) {
        self.recent.clear();
    }
}
