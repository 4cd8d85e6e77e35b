//! Per-frame detection messages produced by an external capture process.
//!
//! Messages arrive as one JSON object per line and are validated once here;
//! everything past this module works with typed values.

use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    types::{DetectionState, GestureLabel, GestureState, MarkerPosition, QualityMetrics},
    vision::DebugInfo,
};

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed detection message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: f64 },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RawCamera {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarker {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    #[serde(default)]
    pub stable: bool,
    #[serde(default = "confirmed")]
    pub detection_state: DetectionState,
    #[serde(default)]
    pub quality_metrics: QualityMetrics,
}

fn confirmed() -> DetectionState {
    DetectionState::Confirmed
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RawGesture {
    pub state: GestureLabel,
    /// Seconds in the current state.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub stability: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub camera: RawCamera,
    pub marker: Option<RawMarker>,
    pub gesture: RawGesture,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<f64>,
}

/// A validated detection message.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFrame {
    pub camera_width: f32,
    pub camera_height: f32,
    pub marker: Option<MarkerPosition>,
    pub gesture: GestureState,
    pub debug: Option<DebugInfo>,
    /// Capture time relative to the producer's clock.
    pub timestamp: Option<Duration>,
}

impl DetectionFrame {
    pub fn parse_line(line: &str) -> Result<Self, MessageError> {
        let raw: RawMessage = serde_json::from_str(line)?;
        Self::try_from(raw)
    }
}

fn positive(field: &'static str, value: f64) -> Result<f32, MessageError> {
    if value.is_finite() && value > 0.0 {
        Ok(value as f32)
    } else {
        Err(MessageError::Invalid { field, value })
    }
}

fn finite(field: &'static str, value: f64) -> Result<f32, MessageError> {
    if value.is_finite() {
        Ok(value as f32)
    } else {
        Err(MessageError::Invalid { field, value })
    }
}

fn unit(field: &'static str, value: f64) -> Result<f32, MessageError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value as f32)
    } else {
        Err(MessageError::Invalid { field, value })
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, MessageError> {
    if value.is_finite() && value >= 0.0 {
        Ok(Duration::from_secs_f64(value))
    } else {
        Err(MessageError::Invalid { field, value })
    }
}

fn millis(field: &'static str, value: f64) -> Result<Duration, MessageError> {
    seconds(field, value / 1_000.0)
}

impl TryFrom<RawMessage> for DetectionFrame {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let camera_width = positive("camera.width", raw.camera.width)?;
        let camera_height = positive("camera.height", raw.camera.height)?;

        let marker = raw
            .marker
            .map(|m| -> Result<MarkerPosition, MessageError> {
                let x = finite("marker.x", m.x)?;
                let y = finite("marker.y", m.y)?;
                Ok(MarkerPosition {
                    x,
                    y,
                    raw: Point2::new(x, y),
                    confidence: unit("marker.confidence", m.confidence)?,
                    stable: m.stable,
                    detection_state: m.detection_state,
                    quality: m.quality_metrics,
                })
            })
            .transpose()?;

        let position = marker
            .as_ref()
            .filter(|_| raw.gesture.state != GestureLabel::None)
            .map(MarkerPosition::point);
        let gesture = GestureState {
            label: raw.gesture.state,
            position,
            duration: seconds("gesture.duration", raw.gesture.duration)?,
            stability: unit("gesture.stability", raw.gesture.stability)?,
        };

        Ok(Self {
            camera_width,
            camera_height,
            marker,
            gesture,
            debug: raw.debug_info,
            timestamp: raw
                .timestamp_ms
                .map(|ms| millis("timestampMs", ms))
                .transpose()?,
        })
    }
}
