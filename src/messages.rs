// Message types exchanged with the rest of the robot over zenoh

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{FRAME_BASE_FOOTPRINT, FRAME_BASE_LINK, FRAME_ODOM};
use crate::odometry::{diagonal_covariance, OdometrySnapshot, Pose2D};

// Velocity command from teleop/planner -> driver
// linear in m/s relative to the robot's heading, angular_z in rad/s (CCW positive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl VelocityCommand {
    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.linear_y == 0.0 && self.angular_z == 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Rotation of `yaw` radians around z
    pub fn from_yaw(yaw: f64) -> Self {
        let (sin, cos) = (yaw / 2.0).sin_cos();
        Self {
            x: 0.0,
            y: 0.0,
            z: sin,
            w: cos,
        }
    }
}

/// Frame ids, optionally prefixed with the robot name
#[derive(Debug, Clone, PartialEq)]
pub struct Frames {
    pub odom: String,
    pub base_link: String,
    pub base_footprint: String,
}

impl Frames {
    /// "alpha" -> alpha_odom, alpha_base_link, ...; "" -> unprefixed
    pub fn with_robot_name(robot_name: &str) -> Self {
        let prefix = if robot_name.is_empty() {
            String::new()
        } else {
            format!("{}_", robot_name)
        };

        Self {
            odom: format!("{}{}", prefix, FRAME_ODOM),
            base_link: format!("{}{}", prefix, FRAME_BASE_LINK),
            base_footprint: format!("{}{}", prefix, FRAME_BASE_FOOTPRINT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub position: Vector3,
    pub orientation: Quaternion,
    /// Unwrapped heading in radians
    pub theta: f64,
    /// Row-major 6x6 over (x, y, z, roll, pitch, yaw)
    pub covariance: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub linear: Vector3,
    pub angular: Vector3,
    pub covariance: Vec<f64>,
}

// Odometry output from driver -> localization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub stamp_ms: u64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    pub twist: TwistWithCovariance,
}

impl Odometry {
    pub fn from_snapshot(snapshot: &OdometrySnapshot, frames: &Frames, stamp_ms: u64) -> Self {
        let pose = snapshot.pose;
        let twist = snapshot.twist;
        let covariance = diagonal_covariance().to_vec();

        Self {
            stamp_ms,
            frame_id: frames.odom.clone(),
            child_frame_id: frames.base_link.clone(),
            pose: PoseWithCovariance {
                position: Vector3 {
                    x: pose.x,
                    y: pose.y,
                    z: 0.0,
                },
                orientation: Quaternion::from_yaw(pose.theta),
                theta: pose.theta,
                covariance: covariance.clone(),
            },
            twist: TwistWithCovariance {
                linear: Vector3 {
                    x: twist.vx,
                    y: twist.vy,
                    z: 0.0,
                },
                angular: Vector3 {
                    x: 0.0,
                    y: 0.0,
                    z: twist.omega,
                },
                covariance,
            },
        }
    }
}

// odom -> base_footprint transform, or its inverse for filters that expect
// the robot frame as parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    pub stamp_ms: u64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub translation: Vector3,
    pub rotation: Quaternion,
}

impl FrameTransform {
    pub fn from_pose(pose: &Pose2D, frames: &Frames, invert: bool, stamp_ms: u64) -> Self {
        let (pose, frame_id, child_frame_id) = if invert {
            (
                invert_pose(pose),
                frames.base_footprint.clone(),
                frames.odom.clone(),
            )
        } else {
            (*pose, frames.odom.clone(), frames.base_footprint.clone())
        };

        Self {
            stamp_ms,
            frame_id,
            child_frame_id,
            translation: Vector3 {
                x: pose.x,
                y: pose.y,
                z: 0.0,
            },
            rotation: Quaternion::from_yaw(pose.theta),
        }
    }
}

/// Inverse of a planar rigid transform
fn invert_pose(pose: &Pose2D) -> Pose2D {
    let (sin, cos) = pose.theta.sin_cos();
    Pose2D::new(
        -(pose.x * cos + pose.y * sin),
        pose.x * sin - pose.y * cos,
        -pose.theta,
    )
}

/// Health status published by the driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DriverHealth {
    Ok,
    CmdStale,
}

/// Wall-clock stamp for outgoing messages
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock stamp for something observed at `at`
pub fn stamp_ms_at(at: Instant) -> u64 {
    unix_millis().saturating_sub(at.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odometry::Twist2D;
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
    }

    #[test]
    fn test_frames_prefix() {
        let frames = Frames::with_robot_name("alpha");
        assert_eq!(frames.odom, "alpha_odom");
        assert_eq!(frames.base_link, "alpha_base_link");
        assert_eq!(frames.base_footprint, "alpha_base_footprint");

        assert_eq!(Frames::with_robot_name("").odom, "odom");
    }

    #[test]
    fn test_quaternion_from_yaw() {
        let q = Quaternion::from_yaw(FRAC_PI_2);
        assert_close(q.z, (0.5f64).sqrt());
        assert_close(q.w, (0.5f64).sqrt());
    }

    #[test]
    fn test_odometry_from_snapshot() {
        let snapshot = OdometrySnapshot {
            pose: Pose2D::new(1.0, 2.0, 0.5),
            twist: Twist2D {
                vx: 0.1,
                vy: 0.2,
                omega: 0.3,
            },
            updated_at: Instant::now(),
        };
        let msg = Odometry::from_snapshot(&snapshot, &Frames::with_robot_name(""), 42);

        assert_eq!(msg.stamp_ms, 42);
        assert_eq!(msg.frame_id, "odom");
        assert_eq!(msg.child_frame_id, "base_link");
        assert_eq!(msg.pose.position.x, 1.0);
        assert_eq!(msg.pose.theta, 0.5);
        assert_eq!(msg.twist.linear.y, 0.2);
        assert_eq!(msg.twist.angular.z, 0.3);
        assert_eq!(msg.pose.covariance.len(), 36);
        assert_eq!(msg.twist.covariance, msg.pose.covariance);
    }

    #[test]
    fn test_transform_direct() {
        let tf = FrameTransform::from_pose(
            &Pose2D::new(1.0, 0.0, FRAC_PI_2),
            &Frames::with_robot_name("r1"),
            false,
            0,
        );
        assert_eq!(tf.frame_id, "r1_odom");
        assert_eq!(tf.child_frame_id, "r1_base_footprint");
        assert_eq!(tf.translation.x, 1.0);
    }

    #[test]
    fn test_transform_inverted() {
        // Robot at (1, 0) facing +y: odom origin is at (0, 1) in the robot frame
        let tf = FrameTransform::from_pose(
            &Pose2D::new(1.0, 0.0, FRAC_PI_2),
            &Frames::with_robot_name(""),
            true,
            0,
        );
        assert_eq!(tf.frame_id, "base_footprint");
        assert_eq!(tf.child_frame_id, "odom");
        assert_close(tf.translation.x, 0.0);
        assert_close(tf.translation.y, 1.0);
        assert_close(tf.rotation.z, -(0.5f64).sqrt());
    }

    #[test]
    fn test_velocity_command_json() {
        let cmd: VelocityCommand =
            serde_json::from_str(r#"{"linear_x":0.2,"linear_y":0.0,"angular_z":-0.5}"#).unwrap();
        assert_eq!(cmd.linear_x, 0.2);
        assert_eq!(cmd.angular_z, -0.5);
        assert!(!cmd.is_zero());
        assert!(VelocityCommand::default().is_zero());
    }

    #[test]
    fn test_stamp_is_taken_from_sample_time() {
        let sampled = Instant::now() - Duration::from_millis(400);
        let now = unix_millis();
        let stamp = stamp_ms_at(sampled);

        // Allow for clock granularity between the two reads
        assert!((stamp + 400).abs_diff(now) <= 50);
    }

    #[test]
    fn test_health_json() {
        assert_eq!(serde_json::to_string(&DriverHealth::CmdStale).unwrap(), "\"cmd_stale\"");
    }
}
