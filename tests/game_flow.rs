mod common;

use std::{
    io::Cursor,
    time::{Duration, Instant},
};

use common::{Script, controller, feed, moves_applied};
use crossbeam_channel::bounded;
use gesture_checkers::{
    checkers::Checkers,
    interaction::{CancelReason, InteractionEvent, InteractionPhase},
    pipeline::source::{Sample, next_sample, spawn_message_reader},
    rules::RulesEngine,
    types::{Move, Piece, Player, Square},
};

fn sq(row: u8, col: u8) -> Square {
    Square::new(row, col)
}

#[test]
fn dwell_drag_and_release_plays_an_opening_move() {
    let mut c = controller(Checkers::new());
    let t0 = Instant::now();
    let (script, _) = Script::new().play_move((5, 0), (4, 1), 0);

    let events = feed(&mut c, t0, script.lines());

    assert_eq!(moves_applied(&events), vec![Move::step(sq(5, 0), sq(4, 1))]);
    let game = c.machine().rules();
    assert_eq!(game.piece_at(sq(4, 1)), Some(Piece::man(Player::Red)));
    assert_eq!(game.piece_at(sq(5, 0)), None);
    assert_eq!(game.current_player(), Player::Black);
    assert_eq!(c.machine().phase(), InteractionPhase::Idle);
    assert_eq!(c.machine().renderer().drags_started, vec![sq(5, 0)]);
    assert_eq!(c.machine().renderer().selection, None);
}

#[test]
fn capture_continues_with_the_same_piece() {
    let mut game = Checkers::empty();
    game.place(sq(5, 2), Piece::man(Player::Red));
    game.place(sq(4, 1), Piece::man(Player::Black));
    game.place(sq(2, 1), Piece::man(Player::Black));
    let mut c = controller(game);
    let t0 = Instant::now();

    let (first, end) = Script::new().play_move((5, 2), (3, 0), 0);
    let events = feed(&mut c, t0, first.lines());

    assert_eq!(
        moves_applied(&events),
        vec![Move::jump(sq(5, 2), sq(3, 0), sq(4, 1))]
    );
    assert_eq!(c.machine().rules().piece_at(sq(4, 1)), None);
    assert_eq!(c.machine().phase(), InteractionPhase::Selecting);
    assert_eq!(c.machine().selected_piece(), Some(sq(3, 0)));
    assert_eq!(
        c.machine().valid_moves(),
        &[Move::jump(sq(3, 0), sq(1, 2), sq(2, 1))]
    );
    assert_eq!(c.machine().rules().current_player(), Player::Red);

    let (second, _) = Script::new().play_move((3, 0), (1, 2), end + 100);
    let events = feed(&mut c, t0, second.lines());

    assert_eq!(
        moves_applied(&events),
        vec![Move::jump(sq(3, 0), sq(1, 2), sq(2, 1))]
    );
    let report = events.iter().find_map(|e| match e {
        InteractionEvent::MoveApplied { report, .. } => Some(report.clone()),
        _ => None,
    });
    let report = report.expect("move report");
    assert!(report.game_end);
    assert_eq!(report.winner, Some(Player::Red));
    assert_eq!(c.machine().phase(), InteractionPhase::Idle);
    assert!(c.machine().rules().is_game_over());
}

#[test]
fn losing_the_marker_mid_drag_leaves_the_board_alone() {
    let mut c = controller(Checkers::new());
    let t0 = Instant::now();
    let script = Script::new()
        .hold((5, 0), "HOVER", true, 0, 1_000)
        .hold((4, 1), "DRAG", false, 1_100, 1_300)
        .lost(1_400, 1_800);

    let events = feed(&mut c, t0, script.lines());

    assert!(moves_applied(&events).is_empty());
    assert!(events.contains(&InteractionEvent::Cancelled(CancelReason::MarkerLost)));
    assert_eq!(c.machine().phase(), InteractionPhase::Idle);
    let game = c.machine().rules();
    assert_eq!(game.piece_at(sq(5, 0)), Some(Piece::man(Player::Red)));
    assert_eq!(game.current_player(), Player::Red);
    assert!(c.machine().renderer().drags_cancelled >= 1);
}

#[test]
fn selecting_an_opponent_piece_is_signalled_not_selected() {
    let mut c = controller(Checkers::new());
    let t0 = Instant::now();
    let script = Script::new().hold((2, 1), "HOVER", true, 0, 1_200);

    let events = feed(&mut c, t0, script.lines());

    assert!(events.contains(&InteractionEvent::InvalidSelection(sq(2, 1))));
    assert_eq!(c.machine().selected_piece(), None);
    assert_eq!(c.machine().renderer().invalid, vec![sq(2, 1)]);
}

#[test]
fn replayed_messages_drive_a_game_through_the_reader_thread() {
    let (red, end) = Script::new().play_move((5, 2), (4, 3), 0);
    let (black, _) = red.play_move((2, 1), (3, 2), end + 100);
    let text = format!("{}\nnot a message\n", black.text());

    let (tx, rx) = bounded(4);
    let reader = spawn_message_reader(Cursor::new(text), tx);

    let mut c = controller(Checkers::new());
    let t0 = Instant::now();
    let mut applied = Vec::new();
    loop {
        match next_sample(&rx, Duration::from_secs(5)) {
            Sample::Item(frame) => {
                let now = t0 + frame.timestamp.expect("timestamped");
                applied.extend(moves_applied(&c.process_message(&frame, now).events));
            }
            Sample::Gap => panic!("reader stalled"),
            Sample::Closed => break,
        }
    }
    let stats = reader.join().expect("reader thread");

    assert_eq!(stats.rejected, 1);
    assert_eq!(
        applied,
        vec![
            Move::step(sq(5, 2), sq(4, 3)),
            Move::step(sq(2, 1), sq(3, 2)),
        ]
    );
    assert_eq!(c.machine().rules().current_player(), Player::Red);
    assert!(c.machine().renderer().markers_seen > 0);
}
