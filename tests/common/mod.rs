#![allow(dead_code)]

use std::time::{Duration, Instant};

use gesture_checkers::{
    checkers::Checkers,
    config::Config,
    interaction::InteractionEvent,
    message::DetectionFrame,
    pipeline::Controller,
    render::BoardRenderer,
    types::{Move, Piece, Square, VisionMarker},
};
use nalgebra::Point2;

pub const CAMERA_WIDTH: f32 = 640.0;
pub const CAMERA_HEIGHT: f32 = 480.0;

/// Renderer that keeps what the interaction layer asked for.
#[derive(Debug, Default)]
pub struct Recorder {
    pub selection: Option<Square>,
    pub drags_started: Vec<Square>,
    pub drags_cancelled: usize,
    pub invalid: Vec<Square>,
    pub markers_seen: usize,
}

impl BoardRenderer for Recorder {
    fn update_hover(&mut self, _square: Option<Square>) {}

    fn update_selection(&mut self, square: Option<Square>, _valid_moves: &[Move]) {
        self.selection = square;
    }

    fn start_drag(&mut self, from: Square, _piece: Piece) {
        self.drags_started.push(from);
    }

    fn update_drag(&mut self, _pixel: Point2<f32>, _target: Option<Square>) {}

    fn cancel_drag(&mut self) {
        self.drags_cancelled += 1;
    }

    fn update_vision_marker(&mut self, marker: Option<VisionMarker>) {
        self.markers_seen += marker.is_some() as usize;
    }

    fn show_invalid_selection(&mut self, square: Square) {
        self.invalid.push(square);
    }
}

pub fn controller(game: Checkers) -> Controller<Checkers, Recorder> {
    Controller::new(&Config::default(), game, Recorder::default())
}

/// Camera pixel at the center of `square` for an uncalibrated 640x480 feed,
/// where the board is the centered 480 px square.
pub fn square_center(row: u8, col: u8) -> (f32, f32) {
    let side = CAMERA_HEIGHT;
    let cell = side / 8.0;
    let left = (CAMERA_WIDTH - side) / 2.0;
    (
        left + (col as f32 + 0.5) * cell,
        (row as f32 + 0.5) * cell,
    )
}

/// One detection message as the capture process would emit it.
pub fn message_line(at: (f32, f32), gesture: &str, stable: bool, t_ms: u64) -> String {
    format!(
        r#"{{"camera":{{"width":{CAMERA_WIDTH},"height":{CAMERA_HEIGHT}}},"marker":{{"x":{},"y":{},"confidence":0.9,"stable":{stable}}},"gesture":{{"state":"{gesture}","duration":0,"stability":0.8}},"timestampMs":{t_ms}}}"#,
        at.0, at.1
    )
}

pub fn lost_line(t_ms: u64) -> String {
    format!(
        r#"{{"camera":{{"width":{CAMERA_WIDTH},"height":{CAMERA_HEIGHT}}},"marker":null,"gesture":{{"state":"NONE"}},"timestampMs":{t_ms}}}"#
    )
}

/// Scripted marker motion, expanded into messages every 100 ms.
pub struct Script {
    lines: Vec<String>,
}

impl Script {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn hold(
        mut self,
        square: (u8, u8),
        gesture: &str,
        stable: bool,
        from_ms: u64,
        to_ms: u64,
    ) -> Self {
        let at = square_center(square.0, square.1);
        for t in (from_ms..=to_ms).step_by(100) {
            self.lines.push(message_line(at, gesture, stable, t));
        }
        self
    }

    pub fn lost(mut self, from_ms: u64, to_ms: u64) -> Self {
        for t in (from_ms..=to_ms).step_by(100) {
            self.lines.push(lost_line(t));
        }
        self
    }

    /// Dwell on `from`, drag to `to`, settle there until released. The dwell
    /// is long enough for the smoothed position to arrive from elsewhere.
    /// Returns the script and the time of the last message.
    pub fn play_move(self, from: (u8, u8), to: (u8, u8), start_ms: u64) -> (Self, u64) {
        let selected = start_ms + 1_500;
        let dragged = selected + 600;
        let released = dragged + 400;
        let script = self
            .hold(from, "HOVER", true, start_ms, selected)
            .hold(to, "DRAG", false, selected + 100, dragged)
            .hold(to, "HOVER", true, dragged + 100, released);
        (script, released)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Feeds every line through the controller, timestamps relative to `t0`.
pub fn feed(
    controller: &mut Controller<Checkers, Recorder>,
    t0: Instant,
    lines: &[String],
) -> Vec<InteractionEvent> {
    let mut events = Vec::new();
    for line in lines {
        let frame = DetectionFrame::parse_line(line).expect("valid message");
        let offset = frame.timestamp.unwrap_or(Duration::ZERO);
        events.extend(controller.process_message(&frame, t0 + offset).events);
    }
    events
}

pub fn moves_applied(events: &[InteractionEvent]) -> Vec<Move> {
    events
        .iter()
        .filter_map(|e| match e {
            InteractionEvent::MoveApplied { mv, .. } => Some(*mv),
            _ => None,
        })
        .collect()
}
