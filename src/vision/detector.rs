//! Candidate detection: HSV band mask, morphological cleanup, connected
//! components and outer contour tracing.

use std::collections::VecDeque;

use nalgebra::Point2;
use rayon::prelude::*;

use crate::{config::DetectorConfig, types::Frame};

/// 8-neighbourhood in clockwise order (image y axis points down).
const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Per-pixel HSV in OpenCV 8-bit convention (H 0..180, S and V 0..255).
#[derive(Clone, Debug)]
pub struct HsvImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[u8; 3]>,
}

impl HsvImage {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if !frame.is_well_formed() {
            return None;
        }
        let data = frame
            .rgba
            .par_chunks_exact(4)
            .map(|px| rgb_to_hsv(px[0], px[1], px[2]))
            .collect();
        Some(Self {
            width: frame.width,
            height: frame.height,
            data,
        })
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<[u8; 3]>) -> Option<Self> {
        (width > 0 && height > 0 && data.len() == width as usize * height as usize).then_some(
            Self {
                width,
                height,
                data,
            },
        )
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let mut h = if delta <= 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    let h = ((h / 2.0).round() as u32 % 180) as u8;

    [h, s.round() as u8, max as u8]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.width * self.height) as f32
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// A connected region of in-band pixels.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Outer boundary pixels in tracing order.
    pub contour: Vec<Point2<i32>>,
    pub pixels: Vec<(u32, u32)>,
    /// Pixel count of the region.
    pub area: f32,
    pub perimeter: f32,
    pub bbox: BoundingBox,
    pub centroid: Point2<f32>,
}

/// Scan a frame for marker-colored regions.
///
/// A malformed frame is treated as an empty detection.
pub fn detect_candidates(frame: &Frame, config: &DetectorConfig) -> Vec<Candidate> {
    match HsvImage::from_frame(frame) {
        Some(hsv) => find_candidates(&hsv, config),
        None => {
            log::warn!(
                "malformed frame {}x{} with {} bytes, skipping",
                frame.width,
                frame.height,
                frame.rgba.len()
            );
            Vec::new()
        }
    }
}

pub fn find_candidates(hsv: &HsvImage, config: &DetectorConfig) -> Vec<Candidate> {
    let width = hsv.width as usize;
    let height = hsv.height as usize;

    let mut mask: Vec<bool> = hsv
        .data
        .par_iter()
        .map(|px| in_band(*px, config))
        .collect();

    for _ in 0..config.open_iterations {
        mask = dilate(&erode(&mask, width, height), width, height);
    }
    for _ in 0..config.close_iterations {
        mask = erode(&dilate(&mask, width, height), width, height);
    }

    let candidates = connected_components(&mask, width, height, config.min_component_pixels);
    log::debug!("detector: {} candidates", candidates.len());
    candidates
}

fn in_band(px: [u8; 3], config: &DetectorConfig) -> bool {
    let [h, s, v] = px;
    s >= config.min_saturation
        && v >= config.min_value
        && config
            .hue_ranges
            .iter()
            .any(|&(lo, hi)| (lo..=hi).contains(&h))
}

fn erode(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, true)
}

fn dilate(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, false)
}

/// 3x3 square structuring element. Pixels beyond the border count as background.
fn morph(mask: &[bool], width: usize, height: usize, erode: bool) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, dst) in row.iter_mut().enumerate() {
                let mut all = true;
                let mut any = false;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        let set = nx >= 0
                            && ny >= 0
                            && (nx as usize) < width
                            && (ny as usize) < height
                            && mask[ny as usize * width + nx as usize];
                        all &= set;
                        any |= set;
                    }
                }
                *dst = if erode { all } else { any };
            }
        });
    out
}

fn connected_components(
    mask: &[bool],
    width: usize,
    height: usize,
    min_pixels: usize,
) -> Vec<Candidate> {
    let mut labels = vec![0u32; mask.len()];
    let mut next_label = 0u32;
    let mut out = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        next_label += 1;
        let label = next_label;

        let mut pixels = Vec::new();
        let mut queue = VecDeque::from([start]);
        labels[start] = label;
        while let Some(idx) = queue.pop_front() {
            let x = (idx % width) as i32;
            let y = (idx / width) as i32;
            pixels.push((x as u32, y as u32));
            for (dx, dy) in NEIGHBOURS {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if mask[n] && labels[n] == 0 {
                    labels[n] = label;
                    queue.push_back(n);
                }
            }
        }

        if pixels.len() < min_pixels {
            continue;
        }

        // Raster order guarantees `start` is the top-left-most pixel.
        let seed = Point2::new((start % width) as i32, (start / width) as i32);
        let contour = trace_contour(&labels, width, height, label, seed);
        out.push(build_candidate(pixels, contour));
    }

    out
}

/// Moore-neighbour tracing of the outer boundary, clockwise, starting at
/// `seed` whose west neighbour is background.
fn trace_contour(
    labels: &[u32],
    width: usize,
    height: usize,
    label: u32,
    seed: Point2<i32>,
) -> Vec<Point2<i32>> {
    let inside = |p: Point2<i32>| {
        p.x >= 0
            && p.y >= 0
            && (p.x as usize) < width
            && (p.y as usize) < height
            && labels[p.y as usize * width + p.x as usize] == label
    };

    let mut contour = vec![seed];
    let mut current = seed;
    let mut backtrack = Point2::new(seed.x - 1, seed.y);
    let mut second: Option<Point2<i32>> = None;
    let max_steps = 4 * labels.len() + 8;

    for _ in 0..max_steps {
        let from = (backtrack.x - current.x, backtrack.y - current.y);
        let Some(start_dir) = NEIGHBOURS.iter().position(|&d| d == from) else {
            break;
        };

        let mut next = None;
        for i in 1..=8 {
            let dir = (start_dir + i) % 8;
            let (dx, dy) = NEIGHBOURS[dir];
            let candidate = Point2::new(current.x + dx, current.y + dy);
            if inside(candidate) {
                let (bx, by) = NEIGHBOURS[(dir + 7) % 8];
                backtrack = Point2::new(current.x + bx, current.y + by);
                next = Some(candidate);
                break;
            }
        }

        // Isolated pixel.
        let Some(next) = next else {
            break;
        };

        match second {
            None => second = Some(next),
            Some(s) if current == seed && next == s => break,
            Some(_) => {}
        }

        current = next;
        if current != seed {
            contour.push(current);
        }
    }

    contour
}

fn build_candidate(pixels: Vec<(u32, u32)>, contour: Vec<Point2<i32>>) -> Candidate {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;

    for &(x, y) in &pixels {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
        sum_x += x as f64;
        sum_y += y as f64;
    }

    let n = pixels.len().max(1) as f64;
    let perimeter = contour_length(&contour);

    Candidate {
        area: pixels.len() as f32,
        perimeter,
        bbox: BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        },
        centroid: Point2::new((sum_x / n) as f32, (sum_y / n) as f32),
        contour,
        pixels,
    }
}

/// Closed polyline length through the contour points.
fn contour_length(contour: &[Point2<i32>]) -> f32 {
    if contour.len() < 2 {
        return 0.0;
    }
    contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(a, b)| (((b.x - a.x).pow(2) + (b.y - a.y).pow(2)) as f32).sqrt())
        .sum()
}
