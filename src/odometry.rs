// Dead-reckoning odometry for the Nav2 base
//
// The base reports absolute poses relative to wherever its controller last
// started. BaseOdometry turns those samples into an accumulated pose and an
// instantaneous velocity, and carries an offset so the published trajectory
// stays continuous when the controller restarts at its own origin.

use std::f64::consts::PI;
use std::ops::{Add, AddAssign};
use std::time::Instant;

use tracing::debug;

/// Variance for axes the Nav2 base observes (x, y, yaw)
pub const COVARIANCE_SMALL: f64 = 1e-3;
/// Variance for axes it does not observe (z, roll, pitch)
pub const COVARIANCE_LARGE: f64 = 1e6;

/// Planar pose in meters / radians. Theta is never normalized here.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Difference `self - previous`, with theta corrected for wraparound.
    ///
    /// When the raw heading change exceeds π the sample crossed the ±π seam,
    /// so it is shifted by a full turn toward the side `previous` was on
    /// before subtracting.
    pub fn delta_from(&self, previous: &Pose2D) -> Pose2D {
        let mut theta = self.theta;
        if (theta - previous.theta).abs() > PI {
            if previous.theta > 0.0 {
                theta += 2.0 * PI;
            } else {
                theta -= 2.0 * PI;
            }
        }

        Pose2D {
            x: self.x - previous.x,
            y: self.y - previous.y,
            theta: theta - previous.theta,
        }
    }
}

impl Add for Pose2D {
    type Output = Pose2D;

    fn add(self, other: Pose2D) -> Pose2D {
        Pose2D::new(self.x + other.x, self.y + other.y, self.theta + other.theta)
    }
}

impl AddAssign for Pose2D {
    fn add_assign(&mut self, other: Pose2D) {
        *self = *self + other;
    }
}

/// Planar velocity: m/s on x/y, rad/s around z
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist2D {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl Twist2D {
    /// Velocity that covers `delta` in `seconds`
    pub fn from_delta(delta: &Pose2D, seconds: f64) -> Self {
        Self {
            vx: delta.x / seconds,
            vy: delta.y / seconds,
            omega: delta.theta / seconds,
        }
    }
}

/// Row-major 6x6 diagonal covariance over (x, y, z, roll, pitch, yaw)
pub fn diagonal_covariance() -> [f64; 36] {
    let diagonal = [
        COVARIANCE_SMALL,
        COVARIANCE_SMALL,
        COVARIANCE_LARGE,
        COVARIANCE_LARGE,
        COVARIANCE_LARGE,
        COVARIANCE_SMALL,
    ];

    let mut covariance = [0.0; 36];
    for (i, variance) in diagonal.into_iter().enumerate() {
        covariance[i * 7] = variance;
    }
    covariance
}

/// Published odometry state at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometrySnapshot {
    pub pose: Pose2D,
    pub twist: Twist2D,
    pub updated_at: Instant,
}

/// Accumulates absolute pose samples from the base into a continuous estimate
#[derive(Debug, Clone)]
pub struct BaseOdometry {
    pose: Pose2D,
    velocity: Twist2D,
    previous: Pose2D,
    offset: Pose2D,
    last_update: Instant,
}

impl BaseOdometry {
    pub fn new() -> Self {
        Self::with_offset(Pose2D::zero())
    }

    pub fn with_offset(offset: Pose2D) -> Self {
        Self::with_offset_at(offset, Instant::now())
    }

    pub fn with_offset_at(offset: Pose2D, now: Instant) -> Self {
        Self {
            pose: Pose2D::zero(),
            velocity: Twist2D::default(),
            previous: Pose2D::zero(),
            offset,
            last_update: now,
        }
    }

    /// Feed an absolute pose sample from the base
    pub fn update_with_absolute(&mut self, sample: Pose2D) {
        self.update_with_absolute_at(sample, Instant::now());
    }

    pub fn update_with_absolute_at(&mut self, sample: Pose2D, now: Instant) {
        let delta = sample.delta_from(&self.previous);
        self.update_with_relative_at(delta, now);
        self.previous = sample;
    }

    /// Feed a pose change since the previous update
    pub fn update_with_relative(&mut self, delta: Pose2D) {
        self.update_with_relative_at(delta, Instant::now());
    }

    pub fn update_with_relative_at(&mut self, delta: Pose2D, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        self.pose += delta;

        // Two samples in the same instant carry no rate information
        if elapsed > 0.0 {
            self.velocity = Twist2D::from_delta(&delta, elapsed);
        }
    }

    /// Restart accumulation around a new offset.
    ///
    /// Called with the current published pose right before the connection to
    /// the base is rebuilt: the new connection reports poses from the
    /// controller's origin again, so the accumulated pose and last raw sample
    /// restart at zero and the old trajectory lives on in the offset.
    pub fn reset_offset(&mut self, offset: Pose2D) {
        self.reset_offset_at(offset, Instant::now());
    }

    pub fn reset_offset_at(&mut self, offset: Pose2D, now: Instant) {
        debug!(
            "Odometry offset reset to ({:.3}, {:.3}, {:.3})",
            offset.x, offset.y, offset.theta
        );
        *self = Self::with_offset_at(offset, now);
    }

    /// Accumulated pose plus offset
    pub fn published_pose(&self) -> Pose2D {
        self.pose + self.offset
    }

    pub fn twist(&self) -> Twist2D {
        self.velocity
    }

    pub fn offset(&self) -> Pose2D {
        self.offset
    }

    pub fn snapshot(&self) -> OdometrySnapshot {
        OdometrySnapshot {
            pose: self.published_pose(),
            twist: self.velocity,
            updated_at: self.last_update,
        }
    }
}

impl Default for BaseOdometry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_delta_crossing_pi_forward() {
        // Counter-clockwise across +π: 3.0 -> -3.1 is a small positive turn
        let delta = Pose2D::new(0.0, 0.0, -3.1).delta_from(&Pose2D::new(0.0, 0.0, 3.0));
        assert_close(delta.theta, 2.0 * PI - 6.1);
        assert!(delta.theta.abs() < 0.2);
    }

    #[test]
    fn test_delta_crossing_pi_backward() {
        let delta = Pose2D::new(0.0, 0.0, 3.0).delta_from(&Pose2D::new(0.0, 0.0, -3.1));
        assert_close(delta.theta, 6.1 - 2.0 * PI);
        assert!(delta.theta < 0.0);
    }

    #[test]
    fn test_delta_without_wrap() {
        let delta = Pose2D::new(1.5, -0.5, 0.4).delta_from(&Pose2D::new(1.0, 0.5, -0.2));
        assert_close(delta.x, 0.5);
        assert_close(delta.y, -1.0);
        assert_close(delta.theta, 0.6);
    }

    #[test]
    fn test_accumulates_absolute_samples() {
        let start = Instant::now();
        let mut odom = BaseOdometry::with_offset_at(Pose2D::zero(), start);

        odom.update_with_absolute_at(Pose2D::new(0.1, 0.0, 0.0), start + Duration::from_millis(100));
        odom.update_with_absolute_at(Pose2D::new(0.3, 0.1, 0.5), start + Duration::from_millis(300));

        let pose = odom.published_pose();
        assert_close(pose.x, 0.3);
        assert_close(pose.y, 0.1);
        assert_close(pose.theta, 0.5);

        // Velocity comes from the latest delta only: (0.2, 0.1, 0.5) over 0.2 s
        let twist = odom.twist();
        assert_close(twist.vx, 1.0);
        assert_close(twist.vy, 0.5);
        assert_close(twist.omega, 2.5);
    }

    #[test]
    fn test_heading_keeps_unwrapping() {
        let start = Instant::now();
        let mut odom = BaseOdometry::with_offset_at(Pose2D::zero(), start);

        for (i, theta) in [3.0, -3.1, -2.9].into_iter().enumerate() {
            let at = start + Duration::from_millis(100 * (i as u64 + 1));
            odom.update_with_absolute_at(Pose2D::new(0.0, 0.0, theta), at);
        }

        // 3.0 + 0.183 + 0.2, not wrapped back into (-π, π]
        assert_close(odom.published_pose().theta, 3.0 + (2.0 * PI - 6.1) + 0.2);
    }

    #[test]
    fn test_zero_elapsed_keeps_velocity() {
        let start = Instant::now();
        let later = start + Duration::from_millis(500);
        let mut odom = BaseOdometry::with_offset_at(Pose2D::zero(), start);

        odom.update_with_absolute_at(Pose2D::new(0.5, 0.0, 0.0), later);
        odom.update_with_absolute_at(Pose2D::new(0.6, 0.0, 0.0), later);

        assert_close(odom.twist().vx, 1.0);
        assert_close(odom.published_pose().x, 0.6);
    }

    #[test]
    fn test_snapshot_carries_sample_time() {
        let start = Instant::now();
        let sampled = start + Duration::from_millis(250);
        let mut odom = BaseOdometry::with_offset_at(Pose2D::zero(), start);
        assert_eq!(odom.snapshot().updated_at, start);

        odom.update_with_absolute_at(Pose2D::new(0.1, 0.0, 0.0), sampled);
        assert_eq!(odom.snapshot().updated_at, sampled);

        odom.reset_offset_at(Pose2D::zero(), start);
        assert_eq!(odom.snapshot().updated_at, start);
    }

    #[test]
    fn test_reset_offset_keeps_trajectory_continuous() {
        let start = Instant::now();
        let mut odom = BaseOdometry::with_offset_at(Pose2D::zero(), start);
        odom.update_with_absolute_at(Pose2D::new(2.0, 1.0, 0.7), start + Duration::from_millis(100));

        let before = odom.published_pose();
        odom.reset_offset_at(before, start + Duration::from_millis(200));

        // Fresh controller reports its origin
        odom.update_with_absolute_at(Pose2D::zero(), start + Duration::from_millis(300));
        assert_eq!(odom.published_pose(), before);
        assert_eq!(odom.twist(), Twist2D::default());

        odom.update_with_absolute_at(Pose2D::new(0.1, 0.0, 0.0), start + Duration::from_millis(400));
        assert_close(odom.published_pose().x, 2.1);
        assert_close(odom.published_pose().theta, 0.7);
    }

    #[test]
    fn test_relative_update() {
        let start = Instant::now();
        let mut odom = BaseOdometry::with_offset_at(Pose2D::new(1.0, 1.0, 0.0), start);
        odom.update_with_relative_at(Pose2D::new(0.0, 0.2, 0.1), start + Duration::from_millis(50));

        assert_eq!(odom.offset(), Pose2D::new(1.0, 1.0, 0.0));
        assert_close(odom.published_pose().y, 1.2);
        assert_close(odom.twist().vy, 4.0);
        assert_close(odom.twist().omega, 2.0);
    }

    #[test]
    fn test_covariance_is_diagonal() {
        let covariance = diagonal_covariance();
        for row in 0..6 {
            for col in 0..6 {
                let value = covariance[row * 6 + col];
                if row != col {
                    assert_eq!(value, 0.0);
                }
            }
        }
        assert_eq!(covariance[0], COVARIANCE_SMALL);
        assert_eq!(covariance[7], COVARIANCE_SMALL);
        assert_eq!(covariance[14], COVARIANCE_LARGE);
        assert_eq!(covariance[21], COVARIANCE_LARGE);
        assert_eq!(covariance[28], COVARIANCE_LARGE);
        assert_eq!(covariance[35], COVARIANCE_SMALL);
    }
}
