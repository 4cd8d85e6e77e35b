//! Shape checks that separate a round marker from arbitrary red blobs.

use std::f32::consts::PI;

use nalgebra::Point2;

use super::detector::Candidate;
use crate::config::GeometryConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryCheck {
    Area,
    Circularity,
    Convexity,
    AspectRatio,
    Compactness,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryReport {
    pub area: f32,
    pub perimeter: f32,
    pub circularity: f32,
    pub convexity: f32,
    pub aspect_ratio: f32,
    pub compactness: f32,
    pub passed: bool,
    pub failed: Option<GeometryCheck>,
    pub score: f32,
}

pub fn validate_geometry(candidate: &Candidate, config: &GeometryConfig) -> GeometryReport {
    let area = candidate.area;
    let perimeter = candidate.perimeter;

    // Perimeter runs through boundary pixel centers, so circularity pairs it
    // with the area enclosed by that same polygon, not the pixel count.
    let contour_area = polygon_area(&candidate.contour);
    let circularity = if perimeter > 0.0 {
        4.0 * PI * contour_area / (perimeter * perimeter)
    } else {
        0.0
    };

    let hull_area = polygon_area(&convex_hull(&candidate.contour));
    let convexity = if hull_area > 0.0 {
        contour_area / hull_area
    } else {
        0.0
    };

    let aspect_ratio = candidate.bbox.aspect_ratio();
    let bbox_area = candidate.bbox.area();
    let compactness = if bbox_area > 0.0 { area / bbox_area } else { 0.0 };

    let checks = [
        (
            GeometryCheck::Area,
            (config.min_area..=config.max_area).contains(&area),
        ),
        (
            GeometryCheck::Circularity,
            circularity >= config.min_circularity,
        ),
        (GeometryCheck::Convexity, convexity >= config.min_convexity),
        (
            GeometryCheck::AspectRatio,
            (config.min_aspect..=config.max_aspect).contains(&aspect_ratio),
        ),
        (
            GeometryCheck::Compactness,
            compactness >= config.min_compactness,
        ),
    ];
    let failed = checks.iter().find(|(_, ok)| !ok).map(|(check, _)| *check);

    // A perfect disc fills pi/4 of its bounding box.
    let aspect_balance = if aspect_ratio > 0.0 {
        aspect_ratio.min(1.0 / aspect_ratio)
    } else {
        0.0
    };
    let score = (circularity.min(1.0)
        + convexity.min(1.0)
        + aspect_balance
        + (compactness / (PI / 4.0)).min(1.0))
        / 4.0;

    GeometryReport {
        area,
        perimeter,
        circularity,
        convexity,
        aspect_ratio,
        compactness,
        passed: failed.is_none(),
        failed,
        score: score.clamp(0.0, 1.0),
    }
}

/// Andrew's monotone chain. Returns the hull counter-clockwise without the
/// closing point.
pub fn convex_hull(points: &[Point2<i32>]) -> Vec<Point2<i32>> {
    let mut pts: Vec<Point2<i32>> = points.to_vec();
    pts.sort_by(|a, b| a.x.cmp(&b.x).then(a.y.cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: Point2<i32>, a: Point2<i32>, b: Point2<i32>| -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    };

    let mut lower: Vec<Point2<i32>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point2<i32>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Shoelace area, always non-negative.
pub fn polygon_area(points: &[Point2<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice.abs() as f32) / 2.0
}
