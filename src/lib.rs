//! Checkers played with a colored marker tracked by a camera.
//!
//! Frames flow through [`vision::MarkerDetector`] (candidate extraction,
//! shape and color validation, temporal smoothing), the
//! [`gesture::GestureClassifier`], the [`mapping::CoordinateMapper`] and
//! finally the [`interaction::InteractionMachine`], which turns marker
//! gestures into moves on a [`rules::RulesEngine`]. [`pipeline::Controller`]
//! wires the stages together for one frame at a time.

pub mod calibration;
pub mod checkers;
pub mod config;
pub mod gesture;
pub mod interaction;
pub mod mapping;
pub mod message;
pub mod pipeline;
pub mod render;
pub mod rules;
pub mod types;
pub mod vision;
