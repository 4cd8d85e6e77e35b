//! Turns gestures over board squares into piece selection, dragging and
//! move attempts.

use std::{fmt, time::Instant};

use nalgebra::Point2;

use crate::{
    config::InteractionConfig,
    mapping::BoardMapping,
    render::BoardRenderer,
    rules::{MoveReport, RulesEngine, RulesError},
    types::{DetectionState, GestureLabel, Move, Square},
};

/// One frame's worth of input to the state machine.
#[derive(Clone, Copy, Debug)]
pub struct InteractionInput {
    pub mapping: BoardMapping,
    pub gesture: GestureLabel,
    pub stable: bool,
    pub confidence: f32,
    pub detection_state: DetectionState,
    pub now: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionPhase {
    Idle,
    Hovering,
    Selecting,
    Dragging,
    Releasing,
}

impl InteractionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            InteractionPhase::Idle => "IDLE",
            InteractionPhase::Hovering => "HOVERING",
            InteractionPhase::Selecting => "SELECTING",
            InteractionPhase::Dragging => "DRAGGING",
            InteractionPhase::Releasing => "RELEASING",
        }
    }
}

impl fmt::Display for InteractionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragPreview {
    pub from: Square,
    /// Board pixel position of the dragged piece.
    pub pixel: Point2<f32>,
    pub target: Option<Square>,
    /// Whether dropping on `target` matches a legal move.
    pub valid_target: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    MarkerLost,
    TooManyGaps,
    Reset,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InteractionEvent {
    PhaseChanged {
        from: InteractionPhase,
        to: InteractionPhase,
    },
    InvalidSelection(Square),
    PieceSelected {
        square: Square,
        moves: Vec<Move>,
    },
    DragStarted(Square),
    MoveApplied {
        mv: Move,
        report: MoveReport,
    },
    MoveRejected {
        mv: Move,
        error: RulesError,
    },
    Cancelled(CancelReason),
}

/// Phase data; the selected piece only exists in the phases that hold one.
#[derive(Clone, Debug, PartialEq)]
enum Session {
    Idle,
    Hovering {
        square: Square,
        since: Instant,
        rejected: Option<Square>,
    },
    Selecting {
        piece: Square,
        moves: Vec<Move>,
        since: Instant,
    },
    Dragging {
        piece: Square,
        moves: Vec<Move>,
        preview: DragPreview,
    },
    Releasing {
        piece: Square,
        moves: Vec<Move>,
        preview: DragPreview,
        target: Square,
        target_since: Instant,
        entered: Instant,
    },
}

impl Session {
    fn phase(&self) -> InteractionPhase {
        match self {
            Session::Idle => InteractionPhase::Idle,
            Session::Hovering { .. } => InteractionPhase::Hovering,
            Session::Selecting { .. } => InteractionPhase::Selecting,
            Session::Dragging { .. } => InteractionPhase::Dragging,
            Session::Releasing { .. } => InteractionPhase::Releasing,
        }
    }
}

pub struct InteractionMachine<R, V> {
    config: InteractionConfig,
    rules: R,
    renderer: V,
    session: Session,
    loss_since: Option<Instant>,
    consecutive_gaps: u32,
}

impl<R: RulesEngine, V: BoardRenderer> InteractionMachine<R, V> {
    pub fn new(config: InteractionConfig, rules: R, renderer: V) -> Self {
        Self {
            config,
            rules,
            renderer,
            session: Session::Idle,
            loss_since: None,
            consecutive_gaps: 0,
        }
    }

    pub fn phase(&self) -> InteractionPhase {
        self.session.phase()
    }

    pub fn selected_piece(&self) -> Option<Square> {
        match &self.session {
            Session::Selecting { piece, .. }
            | Session::Dragging { piece, .. }
            | Session::Releasing { piece, .. } => Some(*piece),
            Session::Idle | Session::Hovering { .. } => None,
        }
    }

    pub fn valid_moves(&self) -> &[Move] {
        match &self.session {
            Session::Selecting { moves, .. }
            | Session::Dragging { moves, .. }
            | Session::Releasing { moves, .. } => moves,
            Session::Idle | Session::Hovering { .. } => &[],
        }
    }

    pub fn drag_preview(&self) -> Option<DragPreview> {
        match &self.session {
            Session::Dragging { preview, .. } | Session::Releasing { preview, .. } => {
                Some(*preview)
            }
            _ => None,
        }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn renderer(&self) -> &V {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut V {
        &mut self.renderer
    }

    /// Drops any selection or drag and returns to IDLE.
    pub fn reset(&mut self) -> Vec<InteractionEvent> {
        let mut events = Vec::new();
        if self.session != Session::Idle {
            events.push(InteractionEvent::Cancelled(CancelReason::Reset));
            self.go_idle(&mut events);
        }
        self.loss_since = None;
        self.consecutive_gaps = 0;
        events
    }

    /// A frame with no usable detection at all.
    pub fn on_gap(&mut self, now: Instant) -> Vec<InteractionEvent> {
        let mut events = Vec::new();
        self.handle_loss(now, &mut events);
        events
    }

    pub fn update(&mut self, input: &InteractionInput) -> Vec<InteractionEvent> {
        let mut events = Vec::new();

        let lost = input.confidence < self.config.min_confidence
            || input.detection_state == DetectionState::Searching
            || input.gesture == GestureLabel::None;
        if lost {
            self.handle_loss(input.now, &mut events);
            return events;
        }
        self.loss_since = None;
        self.consecutive_gaps = 0;

        let session = std::mem::replace(&mut self.session, Session::Idle);
        self.session = match session {
            Session::Idle => self.from_idle(input, &mut events),
            Session::Hovering {
                square,
                since,
                rejected,
            } => self.from_hovering(input, square, since, rejected, &mut events),
            Session::Selecting { piece, moves, since } => {
                self.from_selecting(input, piece, moves, since, &mut events)
            }
            Session::Dragging { piece, moves, .. } => {
                self.from_dragging(input, piece, moves, &mut events)
            }
            Session::Releasing {
                piece,
                moves,
                target,
                target_since,
                entered,
                ..
            } => self.from_releasing(
                input,
                piece,
                moves,
                target,
                target_since,
                entered,
                &mut events,
            ),
        };
        events
    }

    fn from_idle(
        &mut self,
        input: &InteractionInput,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        let Some(square) = input.mapping.square() else {
            return Session::Idle;
        };
        self.renderer.update_hover(Some(square));
        self.transition(InteractionPhase::Idle, InteractionPhase::Hovering, events);
        Session::Hovering {
            square,
            since: input.now,
            rejected: None,
        }
    }

    fn from_hovering(
        &mut self,
        input: &InteractionInput,
        square: Square,
        since: Instant,
        rejected: Option<Square>,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        let Some(current) = input.mapping.square() else {
            self.renderer.update_hover(None);
            self.transition(InteractionPhase::Hovering, InteractionPhase::Idle, events);
            return Session::Idle;
        };

        let (since, rejected) = if current != square {
            self.renderer.update_hover(Some(current));
            (input.now, None)
        } else {
            (since, rejected)
        };

        let dwelled = input.now.saturating_duration_since(since) >= self.config.select_dwell();
        let wants_select = match input.gesture {
            GestureLabel::Select => rejected != Some(current) || dwelled,
            GestureLabel::Hover => input.stable && dwelled,
            _ => false,
        };
        if !wants_select {
            return Session::Hovering {
                square: current,
                since,
                rejected,
            };
        }

        let owner = self.rules.current_player();
        match self.rules.piece_at(current) {
            Some(piece) if piece.owner == owner => {
                let moves = self.rules.valid_moves(current);
                log::info!("selected {current} ({} moves)", moves.len());
                self.renderer.update_hover(None);
                self.renderer.update_selection(Some(current), &moves);
                events.push(InteractionEvent::PieceSelected {
                    square: current,
                    moves: moves.clone(),
                });
                self.transition(InteractionPhase::Hovering, InteractionPhase::Selecting, events);
                Session::Selecting {
                    piece: current,
                    moves,
                    since: input.now,
                }
            }
            _ => {
                log::info!("invalid selection at {current}");
                self.renderer.show_invalid_selection(current);
                events.push(InteractionEvent::InvalidSelection(current));
                Session::Hovering {
                    square: current,
                    since: input.now,
                    rejected: Some(current),
                }
            }
        }
    }

    fn from_selecting(
        &mut self,
        input: &InteractionInput,
        piece: Square,
        moves: Vec<Move>,
        since: Instant,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        let grace_done = input.now.saturating_duration_since(since) >= self.config.drag_grace();
        if input.gesture != GestureLabel::Drag || !grace_done {
            return Session::Selecting { piece, moves, since };
        }

        let Some(dragged) = self.rules.piece_at(piece) else {
            log::warn!("selected square {piece} is empty, dropping selection");
            events.push(InteractionEvent::Cancelled(CancelReason::MarkerLost));
            self.renderer.update_selection(None, &[]);
            self.transition(InteractionPhase::Selecting, InteractionPhase::Idle, events);
            return Session::Idle;
        };

        self.renderer.start_drag(piece, dragged);
        events.push(InteractionEvent::DragStarted(piece));
        self.transition(InteractionPhase::Selecting, InteractionPhase::Dragging, events);
        let preview = self.preview(piece, &moves, &input.mapping);
        Session::Dragging {
            piece,
            moves,
            preview,
        }
    }

    fn from_dragging(
        &mut self,
        input: &InteractionInput,
        piece: Square,
        moves: Vec<Move>,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        let preview = self.preview(piece, &moves, &input.mapping);
        let settling = input.stable
            && matches!(input.gesture, GestureLabel::Hover | GestureLabel::Select);

        match input.mapping.square().filter(|_| settling) {
            Some(target) => {
                self.transition(InteractionPhase::Dragging, InteractionPhase::Releasing, events);
                Session::Releasing {
                    piece,
                    moves,
                    preview,
                    target,
                    target_since: input.now,
                    entered: input.now,
                }
            }
            None => Session::Dragging {
                piece,
                moves,
                preview,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn from_releasing(
        &mut self,
        input: &InteractionInput,
        piece: Square,
        moves: Vec<Move>,
        target: Square,
        target_since: Instant,
        entered: Instant,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        if input.now.saturating_duration_since(entered) >= self.config.release_timeout() {
            log::debug!("release timed out, dropping on {target}");
            return self.complete(piece, &moves, target, input.now, events);
        }

        let preview = self.preview(piece, &moves, &input.mapping);
        let square = input.mapping.square();
        if input.gesture == GestureLabel::Drag || !input.stable || square.is_none() {
            self.transition(InteractionPhase::Releasing, InteractionPhase::Dragging, events);
            return Session::Dragging {
                piece,
                moves,
                preview,
            };
        }

        let (target, target_since) = match square {
            Some(sq) if sq != target => (sq, input.now),
            _ => (target, target_since),
        };
        if input.now.saturating_duration_since(target_since) >= self.config.release_hold() {
            return self.complete(piece, &moves, target, input.now, events);
        }

        Session::Releasing {
            piece,
            moves,
            preview,
            target,
            target_since,
            entered,
        }
    }

    fn complete(
        &mut self,
        piece: Square,
        moves: &[Move],
        target: Square,
        now: Instant,
        events: &mut Vec<InteractionEvent>,
    ) -> Session {
        let mv = moves
            .iter()
            .find(|m| m.to == target)
            .copied()
            .unwrap_or_else(|| Move::step(piece, target));

        self.renderer.cancel_drag();
        match self.rules.make_move(&mv) {
            Ok(report) => {
                log::info!("move {} -> {} applied", mv.from, mv.to);
                let continuation = report.additional_jumps.clone();
                let game_end = report.game_end;
                events.push(InteractionEvent::MoveApplied { mv, report });

                if !continuation.is_empty() && !game_end {
                    self.renderer.update_selection(Some(mv.to), &continuation);
                    events.push(InteractionEvent::PieceSelected {
                        square: mv.to,
                        moves: continuation.clone(),
                    });
                    self.transition(
                        InteractionPhase::Releasing,
                        InteractionPhase::Selecting,
                        events,
                    );
                    return Session::Selecting {
                        piece: mv.to,
                        moves: continuation,
                        since: now,
                    };
                }
            }
            Err(error) => {
                log::info!("move {} -> {} rejected: {error}", mv.from, mv.to);
                self.renderer.show_invalid_selection(target);
                events.push(InteractionEvent::MoveRejected { mv, error });
            }
        }

        self.renderer.update_selection(None, &[]);
        self.transition(InteractionPhase::Releasing, InteractionPhase::Idle, events);
        Session::Idle
    }

    fn preview(&mut self, piece: Square, moves: &[Move], mapping: &BoardMapping) -> DragPreview {
        let target = mapping.square();
        self.renderer.update_drag(mapping.pixel, target);
        DragPreview {
            from: piece,
            pixel: mapping.pixel,
            target,
            valid_target: target.is_some_and(|t| moves.iter().any(|m| m.to == t)),
        }
    }

    fn handle_loss(&mut self, now: Instant, events: &mut Vec<InteractionEvent>) {
        self.consecutive_gaps = self.consecutive_gaps.saturating_add(1);
        let lost_at = *self.loss_since.get_or_insert(now);

        // A pending release resolves against its last square even while the marker is gone.
        if let Session::Releasing {
            piece,
            target,
            entered,
            ..
        } = self.session
        {
            if now.saturating_duration_since(entered) >= self.config.release_timeout() {
                let moves = self.valid_moves().to_vec();
                self.session = self.complete(piece, &moves, target, now, events);
                return;
            }
        }

        if self.session == Session::Idle {
            return;
        }

        let grace_ms = match self.session.phase() {
            InteractionPhase::Idle => self.config.idle_grace_ms,
            InteractionPhase::Hovering => self.config.hover_grace_ms,
            InteractionPhase::Selecting => self.config.select_grace_ms,
            InteractionPhase::Dragging => self.config.drag_loss_grace_ms,
            InteractionPhase::Releasing => self.config.release_timeout_ms,
        };
        let lost_for = now.saturating_duration_since(lost_at);

        let reason = if self.consecutive_gaps >= self.config.max_consecutive_gaps {
            CancelReason::TooManyGaps
        } else if lost_for.as_millis() > grace_ms as u128 {
            CancelReason::MarkerLost
        } else {
            return;
        };

        log::info!(
            "marker lost in {} for {} ms, returning to IDLE",
            self.session.phase(),
            lost_for.as_millis()
        );
        events.push(InteractionEvent::Cancelled(reason));
        self.go_idle(events);
    }

    fn go_idle(&mut self, events: &mut Vec<InteractionEvent>) {
        let from = self.session.phase();
        match from {
            InteractionPhase::Dragging | InteractionPhase::Releasing => {
                self.renderer.cancel_drag();
                self.renderer.update_selection(None, &[]);
            }
            InteractionPhase::Selecting => self.renderer.update_selection(None, &[]),
            InteractionPhase::Hovering | InteractionPhase::Idle => {}
        }
        self.renderer.update_hover(None);
        self.session = Session::Idle;
        self.transition(from, InteractionPhase::Idle, events);
    }

    fn transition(
        &self,
        from: InteractionPhase,
        to: InteractionPhase,
        events: &mut Vec<InteractionEvent>,
    ) {
        if from != to {
            log::info!("interaction {from} -> {to}");
            events.push(InteractionEvent::PhaseChanged { from, to });
        }
    }
}
