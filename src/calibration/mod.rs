//! Board and marker calibration: four-corner board capture, the marker
//! size model, and persistence for both.

mod flow;
mod size;
mod store;

pub use flow::{CalibrationFlow, FlowStatus};
pub use size::{
    AreaModel, MarkerSizeCalibration, MarkerSizeCalibrator, SizeCalibrationError, SizeSample,
};
pub use store::{CalibrationStore, MarkerSizeStore, StoreError};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::homography::{Homography, homography_from_4pt, is_convex_quad};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("degenerate calibration: {0}")]
    Degenerate(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// Capture order, clockwise from the top left.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomRight => "bottom-right",
            Corner::BottomLeft => "bottom-left",
        }
    }

    /// Where this corner lands on the unit board.
    fn target(self) -> Point2<f64> {
        match self {
            Corner::TopLeft => Point2::new(0.0, 0.0),
            Corner::TopRight => Point2::new(1.0, 0.0),
            Corner::BottomRight => Point2::new(1.0, 1.0),
            Corner::BottomLeft => Point2::new(0.0, 1.0),
        }
    }
}

/// Camera position normalized to the frame size, 0..1 on each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerPoint {
    pub x: f64,
    pub y: f64,
}

impl CornerPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn point(self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// A complete calibration; there is no partially populated form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationData {
    pub top_left: CornerPoint,
    pub top_right: CornerPoint,
    pub bottom_right: CornerPoint,
    pub bottom_left: CornerPoint,
    /// Normalized camera coordinates to unit board coordinates.
    pub transform: [[f64; 3]; 3],
}

impl CalibrationData {
    /// Corners in [`Corner::ALL`] order.
    pub fn from_corners(corners: [CornerPoint; 4]) -> Result<Self, CalibrationError> {
        let src = corners.map(CornerPoint::point);
        if src.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(CalibrationError::Degenerate("non-finite corner"));
        }
        if !is_convex_quad(&src) {
            return Err(CalibrationError::Degenerate(
                "corners do not form a convex quadrilateral",
            ));
        }
        let dst = Corner::ALL.map(Corner::target);
        let homography = homography_from_4pt(&src, &dst)
            .ok_or(CalibrationError::Degenerate("singular projective system"))?;

        let [top_left, top_right, bottom_right, bottom_left] = corners;
        Ok(Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
            transform: homography.to_array(),
        })
    }

    pub fn corners(&self) -> [CornerPoint; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn corner(&self, corner: Corner) -> CornerPoint {
        self.corners()[corner.index()]
    }

    /// Normalized camera point to unit board coordinates.
    pub fn project(&self, x: f64, y: f64) -> Option<Point2<f64>> {
        Homography::from_array(self.transform).apply(Point2::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn skewed() -> [CornerPoint; 4] {
        [
            CornerPoint::new(0.2, 0.15),
            CornerPoint::new(0.85, 0.2),
            CornerPoint::new(0.8, 0.9),
            CornerPoint::new(0.15, 0.85),
        ]
    }

    #[test]
    fn corners_project_to_board_corners() {
        let data = CalibrationData::from_corners(skewed()).expect("valid");
        for corner in Corner::ALL {
            let c = data.corner(corner);
            let p = data.project(c.x, c.y).expect("finite");
            let t = corner.target();
            assert_abs_diff_eq!(p.x, t.x, epsilon = 1e-7);
            assert_abs_diff_eq!(p.y, t.y, epsilon = 1e-7);
        }
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let corners = [
            CornerPoint::new(0.1, 0.1),
            CornerPoint::new(0.5, 0.1),
            CornerPoint::new(0.9, 0.1),
            CornerPoint::new(0.1, 0.9),
        ];
        assert!(matches!(
            CalibrationData::from_corners(corners),
            Err(CalibrationError::Degenerate(_))
        ));
    }

    #[test]
    fn non_finite_corner_is_degenerate() {
        let mut corners = skewed();
        corners[2].x = f64::INFINITY;
        assert!(CalibrationData::from_corners(corners).is_err());
    }

    #[test]
    fn serializes_as_flat_record() {
        let data = CalibrationData::from_corners(skewed()).expect("valid");
        let json = serde_json::to_value(data).expect("json");
        assert_eq!(json["topLeft"]["x"], 0.2);
        assert_eq!(json["bottomLeft"]["y"], 0.85);
        assert_eq!(json["transform"].as_array().map(Vec::len), Some(3));
    }
}
