use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use gesture_checkers::{
    calibration::{
        CalibrationFlow, CalibrationStore, FlowStatus, MarkerSizeCalibrator, MarkerSizeStore,
    },
    checkers::Checkers,
    config::Config,
    interaction::InteractionEvent,
    message::DetectionFrame,
    pipeline::{
        Controller,
        source::{Sample, next_sample, spawn_message_reader},
    },
    render::LogRenderer,
    rules::RulesEngine,
    types::{Frame, MoveKind},
    vision::{MarkerDetector, detector::detect_candidates},
};

/// Longest wait for the next sample before it counts as a missed frame.
const FRAME_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    name = "gesture-checkers",
    version,
    about = "Checkers played with a camera-tracked marker"
)]
struct Cli {
    /// JSON file overriding detection and interaction tunables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the board calibration is stored.
    #[arg(long, global = true, default_value = "calibration.json")]
    calibration: PathBuf,

    /// Where the fitted marker size range is stored.
    #[arg(long, global = true, default_value = "marker_calibration.json")]
    marker_size: PathBuf,

    /// Repeat for more log output.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play from detection messages, one JSON object per line.
    Replay {
        /// Message file; reads stdin when omitted.
        file: Option<PathBuf>,
        /// Capture the four board corners before playing.
        #[arg(long)]
        calibrate: bool,
    },
    /// Run marker detection on a still image.
    Detect { image: PathBuf },
    /// Fit the accepted marker area from stills taken at known distances.
    Size {
        /// `DISTANCE_CM:IMAGE`, at least three different distances.
        #[arg(required = true, value_parser = parse_size_input)]
        samples: Vec<SizeInput>,
    },
    /// Delete the stored board and marker size calibrations.
    Forget,
    /// Play with a live camera.
    #[cfg(feature = "camera-nokhwa")]
    Camera {
        #[arg(long, default_value_t = 0)]
        index: u32,
        /// List cameras and exit.
        #[arg(long)]
        list: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path).context("loading config")?,
        None => Config::default(),
    };
    let store = CalibrationStore::new(&cli.calibration);
    let size_store = MarkerSizeStore::new(&cli.marker_size);
    let fitted = size_store
        .load()
        .with_context(|| format!("loading marker size from {}", size_store.path().display()))?;
    if let Some(fitted) = fitted {
        fitted.apply(&mut config.geometry);
    }

    match cli.command {
        Command::Replay { file, calibrate } => replay(&config, &store, file.as_deref(), calibrate),
        Command::Detect { image } => detect(&config, &image),
        Command::Size { samples } => measure_size(&config, &size_store, &samples),
        Command::Forget => {
            store
                .clear()
                .with_context(|| format!("removing {}", store.path().display()))?;
            size_store
                .clear()
                .with_context(|| format!("removing {}", size_store.path().display()))
        }
        #[cfg(feature = "camera-nokhwa")]
        Command::Camera { index, list } => live::run(&config, &store, index, list),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn controller(
    config: &Config,
    store: &CalibrationStore,
) -> Result<Controller<Checkers, LogRenderer>> {
    let mut controller = Controller::new(config, Checkers::new(), LogRenderer::default());
    let saved = store
        .load()
        .with_context(|| format!("loading calibration from {}", store.path().display()))?;
    match saved {
        Some(data) => {
            log::info!("using calibration from {}", store.path().display());
            controller.mapper_mut().set_calibration(data);
        }
        None => log::info!("no calibration stored, using the centered square"),
    }
    Ok(controller)
}

/// Maps producer timestamps onto our clock. Gaps advance time by one frame
/// timeout so replays run independent of wall time.
struct ReplayClock {
    base: Instant,
    last: Instant,
}

impl ReplayClock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            base: now,
            last: now,
        }
    }

    fn message(&mut self, offset: Option<Duration>) -> Instant {
        let now = offset.map_or_else(Instant::now, |offset| self.base + offset);
        self.last = self.last.max(now);
        self.last
    }

    fn gap(&mut self) -> Instant {
        self.last += FRAME_TIMEOUT;
        self.last
    }
}

fn replay(
    config: &Config,
    store: &CalibrationStore,
    file: Option<&Path>,
    calibrate: bool,
) -> Result<()> {
    let input: Box<dyn BufRead + Send> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (tx, rx) = bounded::<DetectionFrame>(16);
    let reader = spawn_message_reader(input, tx);

    let mut controller = controller(config, store)?;
    let mut flow = calibrate.then(|| CalibrationFlow::new(config.calibration.clone()));
    let mut clock = ReplayClock::new();

    let input_done = loop {
        match next_sample(&rx, FRAME_TIMEOUT) {
            Sample::Item(message) => {
                let now = clock.message(message.timestamp);
                if let Some(active) = flow.as_mut() {
                    let status = active.update(
                        message.marker.as_ref(),
                        message.camera_width,
                        message.camera_height,
                        now,
                        controller.mapper_mut(),
                    );
                    if calibration_finished(status, store)? {
                        flow = None;
                    }
                    continue;
                }
                let report = controller.process_message(&message, now);
                print_events(&report.events);
            }
            Sample::Gap => {
                let events = controller.on_gap(clock.gap());
                print_events(&events);
            }
            Sample::Closed => break true,
        }
        if controller.machine().rules().is_game_over() {
            break false;
        }
    };
    drop(rx);

    // A game that ends early leaves the reader blocked on its input.
    if input_done {
        match reader.join() {
            Ok(stats) => log::info!(
                "replayed {} messages, {} rejected",
                stats.accepted,
                stats.rejected
            ),
            Err(_) => log::error!("message reader panicked"),
        }
    }
    print_summary(controller.machine().rules());
    Ok(())
}

/// Saves a finished calibration; `true` once the flow is done.
fn calibration_finished(status: FlowStatus, store: &CalibrationStore) -> Result<bool> {
    match status {
        FlowStatus::Captured(corner) => {
            println!("captured {}", corner.label());
            Ok(false)
        }
        FlowStatus::Completed(data) => {
            store
                .save(&data)
                .with_context(|| format!("saving calibration to {}", store.path().display()))?;
            println!("calibration saved to {}", store.path().display());
            Ok(true)
        }
        FlowStatus::Failed(err) => Err(err).context("calibration failed"),
        FlowStatus::Waiting(_) | FlowStatus::Holding { .. } => Ok(false),
    }
}

fn print_events(events: &[InteractionEvent]) {
    for event in events {
        match event {
            InteractionEvent::MoveApplied { mv, report } => {
                let verb = match mv.kind {
                    MoveKind::Move => "moved",
                    MoveKind::Jump => "jumped",
                };
                println!("{verb} {} -> {}", mv.from, mv.to);
                if !report.additional_jumps.is_empty() {
                    println!("  must keep jumping from {}", mv.to);
                }
                if let Some(winner) = report.winner {
                    println!("{} wins", winner.label());
                }
            }
            InteractionEvent::MoveRejected { mv, error } => {
                println!("rejected {} -> {}: {error}", mv.from, mv.to)
            }
            InteractionEvent::InvalidSelection(square) => println!("cannot select {square}"),
            _ => {}
        }
    }
}

fn print_summary(game: &Checkers) {
    let counts = game.piece_counts();
    println!(
        "red {} ({} kings), black {} ({} kings), {} to move",
        counts.red,
        counts.red_kings,
        counts.black,
        counts.black_kings,
        game.current_player().label()
    );
}

#[derive(Clone, Debug)]
struct SizeInput {
    distance_cm: f32,
    image: PathBuf,
}

fn parse_size_input(arg: &str) -> Result<SizeInput, String> {
    let (distance, image) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected DISTANCE_CM:IMAGE, got {arg:?}"))?;
    let distance_cm = distance
        .trim()
        .parse()
        .map_err(|err| format!("bad distance {distance:?}: {err}"))?;
    Ok(SizeInput {
        distance_cm,
        image: PathBuf::from(image),
    })
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("reading image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame {
        rgba: image.into_raw(),
        width,
        height,
        timestamp: Instant::now(),
    })
}

/// Takes the largest marker-colored region of each still as the marker.
fn measure_size(config: &Config, store: &MarkerSizeStore, samples: &[SizeInput]) -> Result<()> {
    let mut calibrator = MarkerSizeCalibrator::new(config.marker_size.clone());
    for sample in samples {
        let frame = load_frame(&sample.image)?;
        let largest = detect_candidates(&frame, &config.detector)
            .into_iter()
            .map(|c| c.area)
            .max_by(f32::total_cmp)
            .with_context(|| format!("no marker-colored region in {}", sample.image.display()))?;
        calibrator
            .add_sample(sample.distance_cm, largest)
            .with_context(|| format!("measuring {}", sample.image.display()))?;
        println!("{} cm: {largest:.0} px", sample.distance_cm);
    }

    let fitted = calibrator.finish().context("fitting marker size")?;
    store
        .save(&fitted)
        .with_context(|| format!("saving marker size to {}", store.path().display()))?;
    println!(
        "accepting {:.0}..{:.0} px, saved to {}",
        fitted.min_area,
        fitted.max_area,
        store.path().display()
    );
    Ok(())
}

fn detect(config: &Config, path: &Path) -> Result<()> {
    let frame = load_frame(path)?;

    let outcome = MarkerDetector::new(config).detect(&frame);
    println!("{}", serde_json::to_string_pretty(&outcome.debug)?);
    match outcome.marker {
        Some(marker) => {
            println!("{}", marker.display_text());
            println!("{}", serde_json::to_string_pretty(&marker.quality)?);
        }
        None => println!("no marker"),
    }
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
mod live {
    use anyhow::Result;
    use crossbeam_channel::bounded;
    use gesture_checkers::{
        calibration::CalibrationStore,
        config::Config,
        pipeline::{
            camera::{available_cameras, start_camera_stream},
            source::{Sample, latest_sample},
        },
        rules::RulesEngine,
    };
    use std::time::Instant;

    use super::{FRAME_TIMEOUT, controller, print_events, print_summary};

    pub fn run(config: &Config, store: &CalibrationStore, index: u32, list: bool) -> Result<()> {
        if list {
            for device in available_cameras()? {
                println!("{}: {}", device.index, device.name);
            }
            return Ok(());
        }

        let (tx, rx) = bounded(1);
        let stream = start_camera_stream(index, tx)?;
        let mut controller = controller(config, store)?;

        loop {
            match latest_sample(&rx, FRAME_TIMEOUT) {
                Sample::Item(frame) => {
                    let report = controller.process_frame(&frame);
                    print_events(&report.events);
                }
                Sample::Gap => print_events(&controller.on_gap(Instant::now())),
                Sample::Closed => break,
            }
            if controller.machine().rules().is_game_over() {
                break;
            }
        }

        stream.stop();
        print_summary(controller.machine().rules());
        Ok(())
    }
}
