// Turtle command encoding and response parsing
//
// Commands are single ASCII lines: a verb followed by space-separated decimal
// arguments, terminated by '\n'. Angles are radians in the API and degrees on
// the wire.

use crate::odometry::Pose2D;

use super::client::{Result, TurtleError};

/// One turtle command. Angle fields are in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `o`: target orientation in world coordinates
    SetOrientation { angle: f64 },
    /// `av`: velocity in world coordinates, clears the queue
    AbsoluteVelocity { vx: f64, vy: f64 },
    /// `v`: velocity relative to heading plus turn rate (rad/s), clears the queue
    RelativeVelocity { vx: f64, vy: f64, turn_rate: f64 },
    /// `p`: ground-truth position for future estimates
    SetPosition { x: f64, y: f64, angle: f64 },
    /// `s`
    Stop,
    /// `lt`: queued turn, positive is counter-clockwise
    Turn { angle: f64 },
    /// `mv`: queued move of `dist` meters toward `direction` relative to heading
    Move { dist: f64, direction: f64 },
    /// `sms`
    SetMaxSpeed(f64),
    /// `sma`
    SetMaxAccel(f64),
    /// `smce`
    SetMaxCorneringError(f64),
    /// `q`: pose and queue depth
    QueryPosition,
    /// `qms`
    QueryMaxSpeed,
    /// `qma`
    QueryMaxAccel,
    /// `qmce`
    QueryMaxCorneringError,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::SetOrientation { .. } => "o",
            Command::AbsoluteVelocity { .. } => "av",
            Command::RelativeVelocity { .. } => "v",
            Command::SetPosition { .. } => "p",
            Command::Stop => "s",
            Command::Turn { .. } => "lt",
            Command::Move { .. } => "mv",
            Command::SetMaxSpeed(_) => "sms",
            Command::SetMaxAccel(_) => "sma",
            Command::SetMaxCorneringError(_) => "smce",
            Command::QueryPosition => "q",
            Command::QueryMaxSpeed => "qms",
            Command::QueryMaxAccel => "qma",
            Command::QueryMaxCorneringError => "qmce",
        }
    }

    /// Arguments in wire units
    fn wire_args(&self) -> Vec<f64> {
        match *self {
            Command::SetOrientation { angle } => vec![angle.to_degrees()],
            Command::AbsoluteVelocity { vx, vy } => vec![vx, vy],
            Command::RelativeVelocity { vx, vy, turn_rate } => vec![vx, vy, turn_rate.to_degrees()],
            Command::SetPosition { x, y, angle } => vec![x, y, angle.to_degrees()],
            Command::Turn { angle } => vec![angle.to_degrees()],
            Command::Move { dist, direction } => vec![dist, direction.to_degrees()],
            Command::SetMaxSpeed(value)
            | Command::SetMaxAccel(value)
            | Command::SetMaxCorneringError(value) => vec![value],
            Command::Stop
            | Command::QueryPosition
            | Command::QueryMaxSpeed
            | Command::QueryMaxAccel
            | Command::QueryMaxCorneringError => Vec::new(),
        }
    }

    /// Whether the base answers this command with a line
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            Command::QueryPosition
                | Command::QueryMaxSpeed
                | Command::QueryMaxAccel
                | Command::QueryMaxCorneringError
        )
    }

    /// Wire line including the trailing newline
    pub fn encode(&self) -> String {
        let mut line = String::from(self.verb());
        for arg in self.wire_args() {
            line.push_str(&format!(" {:.6}", arg));
        }
        line.push('\n');
        line
    }
}

/// Reply to `q`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    pub pose: Pose2D,
    pub queue_depth: u32,
}

/// Parse `"<x> <y> <theta_deg> <queue_depth>"`. Extra trailing fields are ignored.
pub fn parse_position(line: &str) -> Result<PositionEstimate> {
    let mut fields = line.split_whitespace();
    let x = next_number(&mut fields, line, "x")?;
    let y = next_number(&mut fields, line, "y")?;
    let theta_deg = next_number(&mut fields, line, "theta")?;

    let depth_field = fields
        .next()
        .ok_or_else(|| malformed(line, "missing queue depth"))?;
    let queue_depth = depth_field
        .parse::<u32>()
        .map_err(|e| malformed(line, format!("queue depth {:?}: {}", depth_field, e)))?;

    Ok(PositionEstimate {
        pose: Pose2D::new(x, y, theta_deg.to_radians()),
        queue_depth,
    })
}

/// Parse a single decimal reply (`qms`, `qma`, `qmce`)
pub fn parse_scalar(line: &str) -> Result<f64> {
    let mut fields = line.split_whitespace();
    next_number(&mut fields, line, "value")
}

fn next_number<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line: &str,
    name: &str,
) -> Result<f64> {
    let field = fields
        .next()
        .ok_or_else(|| malformed(line, format!("missing {}", name)))?;
    let value = field
        .parse::<f64>()
        .map_err(|e| malformed(line, format!("{} {:?}: {}", name, field, e)))?;

    if !value.is_finite() {
        return Err(malformed(line, format!("{} is not finite", name)));
    }
    Ok(value)
}

fn malformed(line: &str, reason: impl Into<String>) -> TurtleError {
    TurtleError::Parse {
        line: line.to_string(),
        reason: reason.into(),
    }
}
