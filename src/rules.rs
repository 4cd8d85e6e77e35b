//! Boundary between the interaction layer and whatever decides legality.

use thiserror::Error;

use crate::types::{Move, Piece, Player, Square};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MoveReport {
    /// Follow-up captures the same piece must play before the turn ends.
    pub additional_jumps: Vec<Move>,
    /// Whether the side to move is now obliged to capture.
    pub must_jump: bool,
    pub game_end: bool,
    pub winner: Option<Player>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("the game is over")]
    GameOver,
    #[error("no piece on {0}")]
    EmptySquare(Square),
    #[error("piece on {0} belongs to the other player")]
    NotYourPiece(Square),
    #[error("a capture is mandatory")]
    CaptureRequired,
    #[error("the piece on {0} must keep jumping")]
    ContinuationRequired(Square),
    #[error("illegal move {from} -> {to}")]
    IllegalMove { from: Square, to: Square },
}

pub trait RulesEngine {
    /// Legal moves for the piece on `from`, empty when it may not move now.
    fn valid_moves(&self, from: Square) -> Vec<Move>;

    fn make_move(&mut self, mv: &Move) -> Result<MoveReport, RulesError>;

    fn piece_at(&self, square: Square) -> Option<Piece>;

    fn is_game_over(&self) -> bool;

    fn current_player(&self) -> Player;
}
