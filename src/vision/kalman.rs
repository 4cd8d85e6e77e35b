//! Constant-velocity Kalman filter for marker position smoothing.
//!
//! State vector: [x, y, vx, vy]ᵀ in frame pixels and pixels/second.
//! Process noise follows the continuous white-noise acceleration model, so
//! `predict` uses the real time between frames rather than a fixed rate.

use nalgebra::{Point2, SMatrix, SVector};

type State = SVector<f32, 4>;
type Matrix4 = SMatrix<f32, 4, 4>;
type Matrix2x4 = SMatrix<f32, 2, 4>;
type Matrix4x2 = SMatrix<f32, 4, 2>;
type Matrix2 = SMatrix<f32, 2, 2>;
type Vector2 = SVector<f32, 2>;

/// Velocity is unknown until a few measurements arrive.
const INITIAL_VELOCITY_VARIANCE: f32 = 1.0e4;

#[derive(Clone, Debug)]
pub struct KalmanFilter {
    state: State,
    covariance: Matrix4,
    /// Acceleration noise spectral density (px²/s³).
    process_noise: f32,
    measurement_noise: Matrix2,
    initialized: bool,
}

impl KalmanFilter {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            state: State::zeros(),
            covariance: Matrix4::identity(),
            process_noise,
            measurement_noise: Matrix2::identity() * measurement_noise,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Seed the filter with a first measurement at rest.
    pub fn initialize(&mut self, x: f32, y: f32) {
        let r = self.measurement_noise[(0, 0)];
        self.state = State::new(x, y, 0.0, 0.0);
        self.covariance = Matrix4::from_diagonal(&SVector::<f32, 4>::new(
            r,
            r,
            INITIAL_VELOCITY_VARIANCE,
            INITIAL_VELOCITY_VARIANCE,
        ));
        self.initialized = true;
    }

    /// ```text
    /// | 1  0  dt 0  |
    /// | 0  1  0  dt |
    /// | 0  0  1  0  |
    /// | 0  0  0  1  |
    /// ```
    fn transition_matrix(dt: f32) -> Matrix4 {
        Matrix4::new(
            1.0, 0.0, dt, 0.0, //
            0.0, 1.0, 0.0, dt, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn process_noise_matrix(&self, dt: f32) -> Matrix4 {
        let q = self.process_noise;
        let pp = q * dt * dt * dt / 3.0;
        let pv = q * dt * dt / 2.0;
        let vv = q * dt;
        Matrix4::new(
            pp, 0.0, pv, 0.0, //
            0.0, pp, 0.0, pv, //
            pv, 0.0, vv, 0.0, //
            0.0, pv, 0.0, vv,
        )
    }

    fn observation_matrix() -> Matrix2x4 {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0,
        )
    }

    pub fn predict(&mut self, dt: f32) {
        let f = Self::transition_matrix(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise_matrix(dt);
    }

    pub fn update(&mut self, measured_x: f32, measured_y: f32) {
        let h = Self::observation_matrix();
        let z = Vector2::new(measured_x, measured_y);

        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        let Some(s_inv) = s.try_inverse() else {
            // Degenerate covariance: fall back to the raw measurement.
            self.initialize(measured_x, measured_y);
            return;
        };
        let k: Matrix4x2 = self.covariance * h.transpose() * s_inv;

        self.state += k * innovation;
        self.covariance = (Matrix4::identity() - k * h) * self.covariance;
    }

    pub fn position(&self) -> Point2<f32> {
        Point2::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[2], self.state[3])
    }

    pub fn reset(&mut self) {
        self.state = State::zeros();
        self.covariance = Matrix4::identity();
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 30.0;

    fn filter() -> KalmanFilter {
        KalmanFilter::new(5_000.0, 4.0)
    }

    #[test]
    fn smooths_jitter_around_a_fixed_point() {
        let mut kf = filter();
        kf.initialize(100.0, 100.0);
        let mut max_dev: f32 = 0.0;
        for i in 0..60 {
            let noise = if i % 2 == 0 { 2.0 } else { -2.0 };
            kf.predict(DT);
            kf.update(100.0 + noise, 100.0 - noise);
            if i >= 20 {
                max_dev = max_dev.max((kf.position().x - 100.0).abs());
            }
        }
        assert!(max_dev < 2.0, "deviation {max_dev} not below raw jitter");
    }

    #[test]
    fn follows_constant_velocity_without_lag() {
        let mut kf = filter();
        kf.initialize(0.0, 0.0);
        for i in 1..=40 {
            kf.predict(DT);
            kf.update(i as f32 * 10.0, 50.0);
        }
        let p = kf.position();
        assert!((p.x - 400.0).abs() < 1.0, "x = {}", p.x);
        assert!((p.y - 50.0).abs() < 1.0, "y = {}", p.y);
        let (vx, _) = kf.velocity();
        assert!((vx - 300.0).abs() < 10.0, "vx = {vx}");
    }

    #[test]
    fn reset_forgets_state() {
        let mut kf = filter();
        kf.initialize(10.0, 10.0);
        kf.reset();
        assert!(!kf.is_initialized());
        assert_eq!(kf.position(), Point2::new(0.0, 0.0));
    }
}
