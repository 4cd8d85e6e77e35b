//! Reference American checkers engine.

use crate::{
    rules::{MoveReport, RulesEngine, RulesError},
    types::{Move, Piece, Player, Square},
};

const SIZE: u8 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PieceCounts {
    pub red: usize,
    pub black: usize,
    pub red_kings: usize,
    pub black_kings: usize,
}

#[derive(Clone, Debug)]
pub struct Checkers {
    board: [[Option<Piece>; SIZE as usize]; SIZE as usize],
    current: Player,
    /// Piece that is mid multi-jump and must keep capturing.
    continuation: Option<Square>,
    winner: Option<Player>,
    game_over: bool,
}

impl Default for Checkers {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkers {
    /// Standard opening: black on rows 0-2, red on rows 5-7, red to move.
    pub fn new() -> Self {
        let mut game = Self::empty();
        for row in 0..SIZE {
            for col in 0..SIZE {
                let square = Square::new(row, col);
                if !is_dark(square) {
                    continue;
                }
                if row < 3 {
                    game.place(square, Piece::man(Player::Black));
                } else if row > 4 {
                    game.place(square, Piece::man(Player::Red));
                }
            }
        }
        game
    }

    pub fn empty() -> Self {
        Self {
            board: [[None; SIZE as usize]; SIZE as usize],
            current: Player::Red,
            continuation: None,
            winner: None,
            game_over: false,
        }
    }

    pub fn place(&mut self, square: Square, piece: Piece) {
        self.board[square.row as usize][square.col as usize] = Some(piece);
    }

    pub fn remove(&mut self, square: Square) -> Option<Piece> {
        self.board[square.row as usize][square.col as usize].take()
    }

    pub fn set_current_player(&mut self, player: Player) {
        self.current = player;
        self.continuation = None;
    }

    pub fn winner(&self) -> Option<Player> {
        self.winner
    }

    pub fn piece_counts(&self) -> PieceCounts {
        let mut counts = PieceCounts::default();
        for piece in self.board.iter().flatten().flatten() {
            match (piece.owner, piece.king) {
                (Player::Red, king) => {
                    counts.red += 1;
                    counts.red_kings += king as usize;
                }
                (Player::Black, king) => {
                    counts.black += 1;
                    counts.black_kings += king as usize;
                }
            }
        }
        counts
    }

    fn squares_of(&self, player: Player) -> impl Iterator<Item = Square> + '_ {
        (0..SIZE)
            .flat_map(|row| (0..SIZE).map(move |col| Square::new(row, col)))
            .filter(move |sq| self.piece_at(*sq).is_some_and(|p| p.owner == player))
    }

    fn directions(piece: Piece) -> &'static [(i8, i8)] {
        const RED: [(i8, i8); 2] = [(-1, -1), (-1, 1)];
        const BLACK: [(i8, i8); 2] = [(1, -1), (1, 1)];
        const KING: [(i8, i8); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
        match (piece.king, piece.owner) {
            (true, _) => &KING,
            (false, Player::Red) => &RED,
            (false, Player::Black) => &BLACK,
        }
    }

    fn jumps_from(&self, from: Square) -> Vec<Move> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        Self::directions(piece)
            .iter()
            .filter_map(|&(dr, dc)| {
                let over = from.offset(dr, dc)?;
                let to = from.offset(2 * dr, 2 * dc)?;
                let victim = self.piece_at(over)?;
                (victim.owner != piece.owner && self.piece_at(to).is_none())
                    .then(|| Move::jump(from, to, over))
            })
            .collect()
    }

    fn steps_from(&self, from: Square) -> Vec<Move> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        Self::directions(piece)
            .iter()
            .filter_map(|&(dr, dc)| {
                let to = from.offset(dr, dc)?;
                self.piece_at(to).is_none().then(|| Move::step(from, to))
            })
            .collect()
    }

    fn player_can_jump(&self, player: Player) -> bool {
        self.squares_of(player)
            .any(|sq| !self.jumps_from(sq).is_empty())
    }

    fn player_has_moves(&self, player: Player) -> bool {
        self.squares_of(player)
            .any(|sq| !self.jumps_from(sq).is_empty() || !self.steps_from(sq).is_empty())
    }

    fn check_game_over(&mut self) {
        let side = self.current;
        if self.squares_of(side).next().is_none() || !self.player_has_moves(side) {
            self.game_over = true;
            self.winner = Some(side.opponent());
            log::info!(
                "game over: {} wins, {} cannot move",
                side.opponent().label(),
                side.label()
            );
        }
    }
}

fn is_dark(square: Square) -> bool {
    (square.row + square.col) % 2 == 1
}

impl RulesEngine for Checkers {
    fn valid_moves(&self, from: Square) -> Vec<Move> {
        if self.game_over {
            return Vec::new();
        }
        match self.piece_at(from) {
            Some(piece) if piece.owner == self.current => {}
            _ => return Vec::new(),
        }
        if let Some(chain) = self.continuation {
            return if chain == from {
                self.jumps_from(from)
            } else {
                Vec::new()
            };
        }
        if self.player_can_jump(self.current) {
            self.jumps_from(from)
        } else {
            self.steps_from(from)
        }
    }

    fn make_move(&mut self, mv: &Move) -> Result<MoveReport, RulesError> {
        if self.game_over {
            return Err(RulesError::GameOver);
        }
        let piece = self
            .piece_at(mv.from)
            .ok_or(RulesError::EmptySquare(mv.from))?;
        if piece.owner != self.current {
            return Err(RulesError::NotYourPiece(mv.from));
        }
        if let Some(chain) = self.continuation.filter(|&chain| chain != mv.from) {
            return Err(RulesError::ContinuationRequired(chain));
        }

        // Trust our own move list over the caller's kind/captured fields.
        let legal = self
            .valid_moves(mv.from)
            .into_iter()
            .find(|m| m.to == mv.to);
        let Some(legal) = legal else {
            if self.player_can_jump(self.current) && self.jumps_from(mv.from).is_empty() {
                return Err(RulesError::CaptureRequired);
            }
            return Err(RulesError::IllegalMove {
                from: mv.from,
                to: mv.to,
            });
        };

        self.remove(legal.from);
        if let Some(captured) = legal.captured {
            self.remove(captured);
        }

        let promote = !piece.king
            && match piece.owner {
                Player::Red => legal.to.row == 0,
                Player::Black => legal.to.row == SIZE - 1,
            };
        let landed = if promote {
            log::info!("{} piece crowned at {}", piece.owner.label(), legal.to);
            Piece::king(piece.owner)
        } else {
            piece
        };
        self.place(legal.to, landed);
        log::info!(
            "{} {:?} {} -> {}",
            piece.owner.label(),
            legal.kind,
            legal.from,
            legal.to
        );

        let additional_jumps = if legal.captured.is_some() && !promote {
            self.jumps_from(legal.to)
        } else {
            Vec::new()
        };

        if additional_jumps.is_empty() {
            self.continuation = None;
            self.current = self.current.opponent();
            self.check_game_over();
        } else {
            self.continuation = Some(legal.to);
        }

        Ok(MoveReport {
            must_jump: !additional_jumps.is_empty()
                || (!self.game_over && self.player_can_jump(self.current)),
            additional_jumps,
            game_end: self.game_over,
            winner: self.winner,
        })
    }

    fn piece_at(&self, square: Square) -> Option<Piece> {
        self.board
            .get(square.row as usize)
            .and_then(|row| row.get(square.col as usize))
            .copied()
            .flatten()
    }

    fn is_game_over(&self) -> bool {
        self.game_over
    }

    fn current_player(&self) -> Player {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MoveKind;

    fn sq(row: u8, col: u8) -> Square {
        Square::new(row, col)
    }

    #[test]
    fn opening_position() {
        let game = Checkers::new();
        let counts = game.piece_counts();
        assert_eq!((counts.red, counts.black), (12, 12));
        assert_eq!(game.current_player(), Player::Red);
        assert_eq!(game.piece_at(sq(5, 0)), Some(Piece::man(Player::Red)));
        assert_eq!(game.piece_at(sq(0, 1)), Some(Piece::man(Player::Black)));
        assert_eq!(game.piece_at(sq(4, 1)), None);
    }

    #[test]
    fn red_steps_forward_and_turn_passes() {
        let mut game = Checkers::new();
        let moves = game.valid_moves(sq(5, 0));
        assert_eq!(moves, vec![Move::step(sq(5, 0), sq(4, 1))]);
        let report = game.make_move(&moves[0]).expect("legal");
        assert!(report.additional_jumps.is_empty());
        assert!(!report.game_end);
        assert_eq!(game.current_player(), Player::Black);
        assert_eq!(game.piece_at(sq(4, 1)), Some(Piece::man(Player::Red)));
    }

    #[test]
    fn back_rank_pieces_are_blocked() {
        let game = Checkers::new();
        assert!(game.valid_moves(sq(6, 1)).is_empty());
        assert!(game.valid_moves(sq(2, 1)).is_empty(), "black cannot move on red's turn");
    }

    #[test]
    fn capture_is_mandatory() {
        let mut game = Checkers::empty();
        game.place(sq(5, 2), Piece::man(Player::Red));
        game.place(sq(5, 6), Piece::man(Player::Red));
        game.place(sq(4, 1), Piece::man(Player::Black));
        assert!(game.valid_moves(sq(5, 6)).is_empty());
        assert_eq!(
            game.make_move(&Move::step(sq(5, 6), sq(4, 5))),
            Err(RulesError::CaptureRequired)
        );
        assert_eq!(
            game.valid_moves(sq(5, 2)),
            vec![Move::jump(sq(5, 2), sq(3, 0), sq(4, 1))]
        );
    }

    #[test]
    fn multi_jump_keeps_the_turn() {
        let mut game = Checkers::empty();
        game.place(sq(5, 2), Piece::man(Player::Red));
        game.place(sq(4, 1), Piece::man(Player::Black));
        game.place(sq(2, 1), Piece::man(Player::Black));
        game.place(sq(0, 7), Piece::man(Player::Black));

        let report = game
            .make_move(&Move::step(sq(5, 2), sq(3, 0)))
            .expect("jump resolved from the move list");
        assert_eq!(game.piece_at(sq(4, 1)), None);
        assert_eq!(
            report.additional_jumps,
            vec![Move::jump(sq(3, 0), sq(1, 2), sq(2, 1))]
        );
        assert!(report.must_jump);
        assert_eq!(game.current_player(), Player::Red);
        assert_eq!(
            game.make_move(&Move::step(sq(0, 7), sq(1, 6))),
            Err(RulesError::NotYourPiece(sq(0, 7)))
        );

        let report = game.make_move(&report.additional_jumps[0]).expect("continue");
        assert!(report.additional_jumps.is_empty());
        assert_eq!(game.current_player(), Player::Black);
    }

    #[test]
    fn reaching_the_far_row_crowns_and_ends_the_turn() {
        let mut game = Checkers::empty();
        game.place(sq(1, 2), Piece::man(Player::Red));
        game.place(sq(7, 0), Piece::man(Player::Black));
        game.make_move(&Move::step(sq(1, 2), sq(0, 1))).expect("legal");
        assert_eq!(game.piece_at(sq(0, 1)), Some(Piece::king(Player::Red)));
        assert_eq!(game.current_player(), Player::Black);
        assert_eq!(game.piece_counts().red_kings, 1);
    }

    #[test]
    fn capturing_the_last_piece_ends_the_game() {
        let mut game = Checkers::empty();
        game.place(sq(5, 2), Piece::man(Player::Red));
        game.place(sq(4, 3), Piece::man(Player::Black));
        let report = game
            .make_move(&Move::jump(sq(5, 2), sq(3, 4), sq(4, 3)))
            .expect("legal");
        assert!(report.game_end);
        assert_eq!(report.winner, Some(Player::Red));
        assert!(game.is_game_over());
        assert_eq!(
            game.make_move(&Move::step(sq(3, 4), sq(2, 5))),
            Err(RulesError::GameOver)
        );
    }

    #[test]
    fn kings_move_backwards() {
        let mut game = Checkers::empty();
        game.place(sq(3, 2), Piece::king(Player::Red));
        game.place(sq(0, 7), Piece::man(Player::Black));
        let moves = game.valid_moves(sq(3, 2));
        assert_eq!(moves.len(), 4);
        assert!(moves.iter().all(|m| m.kind == MoveKind::Move));
    }

    #[test]
    fn illegal_destination_is_rejected() {
        let mut game = Checkers::new();
        assert_eq!(
            game.make_move(&Move::step(sq(5, 0), sq(3, 0))),
            Err(RulesError::IllegalMove {
                from: sq(5, 0),
                to: sq(3, 0)
            })
        );
        assert_eq!(
            game.make_move(&Move::step(sq(4, 1), sq(3, 0))),
            Err(RulesError::EmptySquare(sq(4, 1)))
        );
    }
}
