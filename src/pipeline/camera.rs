//! Live capture through nokhwa.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};
use rayon::prelude::*;

use crate::types::Frame;

const CAPTURE_FORMATS: &[FrameFormat] =
    &[FrameFormat::MJPEG, FrameFormat::RAWRGB, FrameFormat::YUYV];

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub name: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto).context("querying cameras")?;
    Ok(cameras
        .into_iter()
        .filter_map(|info| {
            let index = info.index().as_index().ok()?;
            Some(CameraDevice {
                index,
                name: info.human_name(),
            })
        })
        .collect())
}

fn open_camera(index: u32) -> Result<Camera> {
    let requests = [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            CAPTURE_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ];
    let mut last_err = None;
    for requested in requests {
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(anyhow!(err)),
            },
            Err(err) => last_err = Some(anyhow!(err)),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("camera {index} offers no usable format")))
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = vec![255u8; rgb.len() / 3 * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| dst[..3].copy_from_slice(src));
    rgba
}

/// Handle to a running capture thread; dropping it stops the camera.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Captures frames into `tx`. Frames are dropped while the consumer is busy.
pub fn start_camera_stream(index: u32, tx: Sender<Frame>) -> Result<CameraStream> {
    // Opening once up front surfaces a missing device before the thread starts.
    drop(open_camera(index).with_context(|| format!("opening camera {index}"))?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = thread::spawn(move || {
        let mut camera = match open_camera(index) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("failed to reopen camera {index}: {err:?}");
                return;
            }
        };
        log::info!("camera {index} streaming at {:?}", camera.camera_format());

        while !stop_flag.load(Ordering::Relaxed) {
            let decoded = match camera.frame().and_then(|buf| buf.decode_image::<RgbFormat>()) {
                Ok(img) => img,
                Err(err) => {
                    log::warn!("camera frame dropped: {err}");
                    continue;
                }
            };
            let (width, height) = decoded.dimensions();
            let frame = Frame {
                rgba: rgb_to_rgba(decoded.as_raw()),
                width,
                height,
                timestamp: Instant::now(),
            };
            if let Err(TrySendError::Disconnected(_)) = tx.try_send(frame) {
                log::debug!("frame consumer disconnected");
                break;
            }
        }
        let _ = camera.stop_stream();
    });

    Ok(CameraStream {
        stop,
        handle: Some(handle),
    })
}
