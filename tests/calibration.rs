mod common;

use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use common::{CAMERA_HEIGHT, CAMERA_WIDTH, controller};
use gesture_checkers::{
    calibration::{CalibrationFlow, CalibrationStore, Corner, FlowStatus},
    checkers::Checkers,
    config::{CalibrationFlowConfig, MapperConfig},
    mapping::CoordinateMapper,
    types::{DetectionState, MarkerPosition, QualityMetrics, Square},
};
use nalgebra::Point2;

/// Board corners as seen by the camera: an inset 400x360 rectangle.
const CORNERS: [(f32, f32); 4] = [
    (120.0, 60.0),
    (520.0, 60.0),
    (520.0, 420.0),
    (120.0, 420.0),
];

fn held_marker(x: f32, y: f32) -> MarkerPosition {
    MarkerPosition {
        x,
        y,
        raw: Point2::new(x, y),
        confidence: 0.95,
        stable: true,
        detection_state: DetectionState::Confirmed,
        quality: QualityMetrics::default(),
    }
}

/// Holds the marker over `at` every 100 ms until the flow moves on.
fn hold_corner(
    flow: &mut CalibrationFlow,
    mapper: &mut CoordinateMapper,
    at: (f32, f32),
    t0: Instant,
    start_ms: u64,
) -> (FlowStatus, u64) {
    let marker = held_marker(at.0, at.1);
    let mut t = start_ms;
    loop {
        let now = t0 + Duration::from_millis(t);
        match flow.update(Some(&marker), CAMERA_WIDTH, CAMERA_HEIGHT, now, mapper) {
            FlowStatus::Waiting(_) | FlowStatus::Holding { .. } => t += 100,
            done => return (done, t),
        }
        assert!(t < start_ms + 5_000, "corner never captured");
    }
}

fn calibrate(mapper: &mut CoordinateMapper) -> FlowStatus {
    let mut flow = CalibrationFlow::new(CalibrationFlowConfig::default());
    let t0 = Instant::now();
    let mut t = 0;
    let mut last = FlowStatus::Waiting(Corner::TopLeft);
    for (corner, at) in Corner::ALL.into_iter().zip(CORNERS) {
        assert_eq!(flow.current_corner(), Some(corner));
        let (status, end) = hold_corner(&mut flow, mapper, at, t0, t);
        assert_eq!(end - t, 800, "{} held for {} ms", corner.label(), end - t);
        last = status;
        t = end + 100;
    }
    last
}

#[test]
fn guided_calibration_survives_a_save_and_load() {
    let mut mapper = CoordinateMapper::new(MapperConfig::default());
    let data = match calibrate(&mut mapper) {
        FlowStatus::Completed(data) => data,
        other => panic!("calibration did not complete: {other:?}"),
    };
    assert!(mapper.is_calibrated());
    assert_abs_diff_eq!(data.top_right.x, 520.0 / 640.0, epsilon = 1e-6);

    let board = [(0.0, 0.0), (640.0, 0.0), (640.0, 640.0), (0.0, 640.0)];
    for (at, expected) in CORNERS.into_iter().zip(board) {
        let p = mapper
            .project(at.0, at.1, CAMERA_WIDTH, CAMERA_HEIGHT)
            .expect("finite");
        assert_abs_diff_eq!(p.x, expected.0, epsilon = 1e-2);
        assert_abs_diff_eq!(p.y, expected.1, epsilon = 1e-2);
    }

    let dir = tempfile::tempdir().expect("temp dir");
    let store = CalibrationStore::new(dir.path().join("calibration.json"));
    store.save(&data).expect("save");
    let loaded = store.load().expect("load").expect("stored calibration");
    assert_eq!(loaded, data);

    let mut c = controller(Checkers::new());
    c.mapper_mut().set_calibration(loaded);
    let center = c
        .mapper()
        .project(320.0, 240.0, CAMERA_WIDTH, CAMERA_HEIGHT)
        .expect("finite");
    assert_abs_diff_eq!(center.x, 320.0, epsilon = 1e-2);
    assert_abs_diff_eq!(center.y, 320.0, epsilon = 1e-2);

    // Square (5, 0) spans 50 px by 45 px of the calibrated camera rectangle.
    let mapping = c
        .mapper_mut()
        .camera_to_board(145.0, 307.5, CAMERA_WIDTH, CAMERA_HEIGHT);
    assert!(mapping.is_on_board);
    assert_eq!(mapping.square(), Some(Square::new(5, 0)));

    // Outside the calibrated rectangle but inside the centered square.
    c.mapper_mut().reset_smoothing();
    let outside = c
        .mapper_mut()
        .camera_to_board(100.0, 240.0, CAMERA_WIDTH, CAMERA_HEIGHT);
    assert!(!outside.is_on_board);
}

#[test]
fn collinear_corners_fail_and_keep_the_previous_calibration() {
    let mut mapper = CoordinateMapper::new(MapperConfig::default());
    assert!(matches!(calibrate(&mut mapper), FlowStatus::Completed(_)));
    let before = *mapper.calibration().expect("calibrated");

    let mut flow = CalibrationFlow::new(CalibrationFlowConfig::default());
    let t0 = Instant::now();
    let mut t = 0;
    let mut last = None;
    for x in [100.0, 200.0, 300.0, 400.0] {
        let (status, end) = hold_corner(&mut flow, &mut mapper, (x, 240.0), t0, t);
        last = Some(status);
        t = end + 100;
    }
    assert!(matches!(last, Some(FlowStatus::Failed(_))));
    assert_eq!(mapper.calibration(), Some(&before));
}

#[test]
fn missing_store_means_uncalibrated() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CalibrationStore::new(dir.path().join("absent.json"));
    assert_eq!(store.load().expect("load"), None);
    store.clear().expect("clearing a missing file is fine");
}
