use std::{
    fmt,
    time::{Duration, Instant},
};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    Searching,
    Confirmed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityMetrics {
    pub geometric_score: f32,
    pub color_score: f32,
    pub uniformity_score: f32,
    pub temporal_score: f32,
    pub area: f32,
    pub circularity: f32,
    pub convexity: f32,
}

/// Best marker detection of one frame, in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerPosition {
    /// Smoothed position.
    pub x: f32,
    pub y: f32,
    /// Raw centroid before smoothing.
    pub raw: Point2<f32>,
    pub confidence: f32,
    pub stable: bool,
    pub detection_state: DetectionState,
    pub quality: QualityMetrics,
}

impl MarkerPosition {
    pub fn point(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }

    pub fn display_text(&self) -> String {
        format!(
            "marker ({:.0}, {:.0}) {:.0}%{}",
            self.x,
            self.y,
            self.confidence * 100.0,
            if self.stable { " stable" } else { "" }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureLabel {
    None,
    Hover,
    Select,
    Drag,
}

impl GestureLabel {
    pub fn label(&self) -> &'static str {
        match self {
            GestureLabel::None => "none",
            GestureLabel::Hover => "hover",
            GestureLabel::Select => "select",
            GestureLabel::Drag => "drag",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureState {
    pub label: GestureLabel,
    pub position: Option<Point2<f32>>,
    /// Time spent in the current label.
    pub duration: Duration,
    pub stability: f32,
}

impl GestureState {
    pub fn none() -> Self {
        Self {
            label: GestureLabel::None,
            position: None,
            duration: Duration::ZERO,
            stability: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

impl Square {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Offsets by `(dr, dc)`, returning `None` off an 8x8 board.
    pub fn offset(self, dr: i8, dc: i8) -> Option<Square> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        ((0..8).contains(&row) && (0..8).contains(&col)).then(|| Square::new(row as u8, col as u8))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Red,
    Black,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::Red => Player::Black,
            Player::Black => Player::Red,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Player::Red => "red",
            Player::Black => "black",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub owner: Player,
    pub king: bool,
}

impl Piece {
    pub fn man(owner: Player) -> Self {
        Self { owner, king: false }
    }

    pub fn king(owner: Player) -> Self {
        Self { owner, king: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Move,
    Jump,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub kind: MoveKind,
    pub captured: Option<Square>,
}

impl Move {
    pub fn step(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            kind: MoveKind::Move,
            captured: None,
        }
    }

    pub fn jump(from: Square, to: Square, captured: Square) -> Self {
        Self {
            from,
            to,
            kind: MoveKind::Jump,
            captured: Some(captured),
        }
    }
}

/// Marker overlay handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisionMarker {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}
