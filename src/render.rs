use nalgebra::Point2;

use crate::types::{Move, Piece, Square, VisionMarker};

/// Visual feedback sink driven by the interaction layer.
pub trait BoardRenderer {
    fn update_hover(&mut self, square: Option<Square>);

    /// `None` clears the selection highlight.
    fn update_selection(&mut self, square: Option<Square>, valid_moves: &[Move]);

    fn start_drag(&mut self, from: Square, piece: Piece);

    /// Dragged piece follows `pixel` (board pixels); `target` is the square
    /// under it when on the board.
    fn update_drag(&mut self, pixel: Point2<f32>, target: Option<Square>);

    fn cancel_drag(&mut self);

    fn update_vision_marker(&mut self, marker: Option<VisionMarker>);

    fn show_invalid_selection(&mut self, square: Square);
}

/// Renderer for headless runs; everything goes to the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    hover: Option<Square>,
}

impl BoardRenderer for LogRenderer {
    fn update_hover(&mut self, square: Option<Square>) {
        if square != self.hover {
            log::debug!("hover {:?}", square);
            self.hover = square;
        }
    }

    fn update_selection(&mut self, square: Option<Square>, valid_moves: &[Move]) {
        match square {
            Some(sq) => log::info!("selected {sq} with {} moves", valid_moves.len()),
            None => log::debug!("selection cleared"),
        }
    }

    fn start_drag(&mut self, from: Square, piece: Piece) {
        log::info!("drag {} piece from {from}", piece.owner.label());
    }

    fn update_drag(&mut self, pixel: Point2<f32>, target: Option<Square>) {
        log::trace!("drag at ({:.0}, {:.0}) over {:?}", pixel.x, pixel.y, target);
    }

    fn cancel_drag(&mut self) {
        log::debug!("drag cancelled");
    }

    fn update_vision_marker(&mut self, marker: Option<VisionMarker>) {
        if let Some(m) = marker {
            log::trace!("marker ({:.0}, {:.0}) {:.2}", m.x, m.y, m.confidence);
        }
    }

    fn show_invalid_selection(&mut self, square: Square) {
        log::info!("invalid selection at {square}");
    }
}
