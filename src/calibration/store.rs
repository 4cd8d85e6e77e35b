use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use super::{CalibrationData, CalibrationError, MarkerSizeCalibration, SizeCalibrationError};

/// Largest per-entry difference tolerated between a stored transform and the
/// one re-derived from its corners.
const TRANSFORM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("calibration file {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("malformed calibration file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("stored calibration is unusable: {0}")]
    Invalid(#[from] CalibrationError),
    #[error("stored marker size calibration is unusable: {0}")]
    InvalidSize(#[from] SizeCalibrationError),
    #[error("stored transform does not match its corners")]
    TransformMismatch,
}

/// JSON file holding the last accepted calibration. A missing file means the
/// board is uncalibrated.
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CalibrationData>, StoreError> {
        let Some(stored) = read_json::<CalibrationData>(&self.path)? else {
            return Ok(None);
        };

        let derived = CalibrationData::from_corners(stored.corners())?;
        let matches = stored
            .transform
            .iter()
            .flatten()
            .zip(derived.transform.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= TRANSFORM_TOLERANCE);
        if !matches {
            return Err(StoreError::TransformMismatch);
        }

        log::info!("loaded calibration from {}", self.path.display());
        Ok(Some(derived))
    }

    pub fn save(&self, data: &CalibrationData) -> Result<(), StoreError> {
        write_json(&self.path, data)?;
        log::info!("saved calibration to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        remove(&self.path)
    }
}

/// JSON file holding the fitted marker size model. A missing file keeps the
/// configured area range.
pub struct MarkerSizeStore {
    path: PathBuf,
}

impl MarkerSizeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<MarkerSizeCalibration>, StoreError> {
        let Some(stored) = read_json::<MarkerSizeCalibration>(&self.path)? else {
            return Ok(None);
        };
        stored.validate()?;
        log::info!(
            "loaded marker size range {:.0}..{:.0} px from {}",
            stored.min_area,
            stored.max_area,
            self.path.display()
        );
        Ok(Some(stored))
    }

    pub fn save(&self, calibration: &MarkerSizeCalibration) -> Result<(), StoreError> {
        write_json(&self.path, calibration)?;
        log::info!("saved marker size calibration to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        remove(&self.path)
    }
}

fn io_error(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn parse_error(path: &Path, source: serde_json::Error) -> StoreError {
    StoreError::Parse {
        path: path.display().to_string(),
        source,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_error(path, source)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| parse_error(path, source))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(path, source))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| parse_error(path, source))?;
    fs::write(path, json).map_err(|source| io_error(path, source))
}

fn remove(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_error(path, source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::{CornerPoint, MarkerSizeCalibrator},
        config::MarkerSizeConfig,
    };
    use approx::assert_relative_eq;

    fn sample() -> CalibrationData {
        CalibrationData::from_corners([
            CornerPoint::new(0.15, 0.1),
            CornerPoint::new(0.85, 0.12),
            CornerPoint::new(0.9, 0.92),
            CornerPoint::new(0.1, 0.88),
        ])
        .expect("valid")
    }

    #[test]
    fn missing_file_is_uncalibrated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CalibrationStore::new(dir.path().join("calibration.json"));
        assert!(store.load().expect("load").is_none());
        store.clear().expect("clearing nothing is fine");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CalibrationStore::new(dir.path().join("nested/calibration.json"));
        let data = sample();
        store.save(&data).expect("save");
        let loaded = store.load().expect("load").expect("present");
        assert_eq!(loaded.corners(), data.corners());

        store.clear().expect("clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn tampered_transform_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CalibrationStore::new(dir.path().join("calibration.json"));
        let mut data = sample();
        data.transform[0][2] += 0.5;
        store.save(&data).expect("save");
        assert!(matches!(store.load(), Err(StoreError::TransformMismatch)));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, "{\"topLeft\": 3}").expect("write");
        assert!(matches!(
            CalibrationStore::new(path).load(),
            Err(StoreError::Parse { .. })
        ));
    }

    fn fitted_size() -> MarkerSizeCalibration {
        let mut calibrator = MarkerSizeCalibrator::new(MarkerSizeConfig::default());
        for (distance, area) in [(30.0, 560.0), (50.0, 205.0), (80.0, 80.0)] {
            calibrator.add_sample(distance, area).expect("valid sample");
        }
        calibrator.finish().expect("fit")
    }

    #[test]
    fn marker_size_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MarkerSizeStore::new(dir.path().join("marker_calibration.json"));
        assert!(store.load().expect("load").is_none());

        let fitted = fitted_size();
        store.save(&fitted).expect("save");
        let loaded = store.load().expect("load").expect("stored");
        assert_eq!(loaded.samples, fitted.samples);
        assert_eq!(loaded.min_area, fitted.min_area);
        assert_eq!(loaded.max_area, fitted.max_area);
        assert_relative_eq!(loaded.model.a, fitted.model.a, max_relative = 1e-12);

        store.clear().expect("clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn inverted_size_range_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MarkerSizeStore::new(dir.path().join("marker_calibration.json"));
        let mut fitted = fitted_size();
        std::mem::swap(&mut fitted.min_area, &mut fitted.max_area);
        store.save(&fitted).expect("save");
        assert!(matches!(store.load(), Err(StoreError::InvalidSize(_))));
    }
}
