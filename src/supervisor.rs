// Connection supervision for the Nav2 base
//
// Owns the active turtle client and the odometry state. Every call goes
// through `call()`: an I/O failure tears the connection down, a new one is
// established, and the call is retried. Because a fresh connection reports
// poses from the controller's origin, the odometry is re-based on the last
// published pose before the new client is used.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread::sleep;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY, DEFAULT_MAX_RECONNECT_CYCLES};
use crate::messages::VelocityCommand;
use crate::odometry::{BaseOdometry, OdometrySnapshot};
use crate::turtle::{ConnectOptions, PositionEstimate, TurtleClient, TurtleError};

/// Opens new turtle connections
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&mut self) -> std::result::Result<TurtleClient<Self::Stream>, TurtleError>;

    /// Human-readable target, for logs and errors
    fn endpoint(&self) -> String;
}

/// Connects over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    options: ConnectOptions,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, options: ConnectOptions) -> Self {
        Self {
            host: host.into(),
            port,
            options,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> std::result::Result<TurtleClient<TcpStream>, TurtleError> {
        TurtleClient::connect_with(&self.host, self.port, &self.options)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Connect attempts per `ensure_connected()`
    pub connect_attempts: u32,
    /// Delay between connect attempts
    pub retry_delay: Duration,
    /// Reconnects a single call may trigger before it gives up
    pub max_reconnect_cycles: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: CONNECT_ATTEMPTS,
            retry_delay: CONNECT_RETRY_DELAY,
            max_reconnect_cycles: DEFAULT_MAX_RECONNECT_CYCLES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to connect to Nav2 base on {endpoint} after {attempts} attempts: {source}")]
    ConnectExhausted {
        endpoint: String,
        attempts: u32,
        source: TurtleError,
    },

    #[error("Nav2 base on {endpoint} still failing after {cycles} reconnects: {source}")]
    ReconnectCyclesExceeded {
        endpoint: String,
        cycles: u32,
        source: TurtleError,
    },

    #[error("Protocol error: {0}")]
    Protocol(TurtleError),
}

impl SupervisorError {
    /// The base can't be reached; the owner has to escalate
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SupervisorError::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Keeps a turtle connection alive and odometry continuous across reconnects.
///
/// Not thread-safe by itself: every operation takes `&mut self` and holds the
/// connection for a full round trip. Share it behind a single lock if needed.
pub struct Supervisor<C: Connector> {
    connector: C,
    client: Option<TurtleClient<C::Stream>>,
    state: LinkState,
    odometry: BaseOdometry,
    policy: RetryPolicy,
    // A connection was torn down; re-base odometry on the next connect
    rebase_pending: bool,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            client: None,
            state: LinkState::Disconnected,
            odometry: BaseOdometry::new(),
            policy,
            rebase_pending: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn odometry(&self) -> &BaseOdometry {
        &self.odometry
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect unless already connected
    pub fn ensure_connected(&mut self) -> Result<()> {
        self.connected_client().map(|_| ())
    }

    fn connected_client(&mut self) -> Result<&mut TurtleClient<C::Stream>> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                let client = self.establish()?;
                if self.rebase_pending {
                    let offset = self.odometry.published_pose();
                    info!(
                        "Re-basing odometry at ({:.3}, {:.3}, {:.3})",
                        offset.x, offset.y, offset.theta
                    );
                    self.odometry.reset_offset(offset);
                    self.rebase_pending = false;
                }
                self.state = LinkState::Connected;
                client
            }
        };
        Ok(self.client.insert(client))
    }

    fn establish(&mut self) -> Result<TurtleClient<C::Stream>> {
        self.state = LinkState::Connecting;
        let endpoint = self.connector.endpoint();
        let attempts = self.policy.connect_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.connector.connect() {
                Ok(client) => {
                    info!("Connected to Nav2 base on {}", endpoint);
                    return Ok(client);
                }
                Err(source) if attempt >= attempts => {
                    self.state = LinkState::Disconnected;
                    error!("Failed to connect to Nav2 base on {}", endpoint);
                    return Err(SupervisorError::ConnectExhausted {
                        endpoint,
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                    sleep(self.policy.retry_delay);
                }
            }
        }
    }

    /// Close the connection. The base stops immediately.
    fn teardown(&mut self) {
        if let Some(client) = self.client.take() {
            client.close();
            self.rebase_pending = true;
        }
        self.state = LinkState::Disconnected;
    }

    /// Run `op` against the live client, reconnecting and retrying on I/O errors
    pub fn call<T>(
        &mut self,
        mut op: impl FnMut(&mut TurtleClient<C::Stream>) -> std::result::Result<T, TurtleError>,
    ) -> Result<T> {
        let mut cycles = 0;
        loop {
            let client = self.connected_client()?;
            match op(client) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_io() => {
                    warn!("Lost connection to Nav2 base: {}", e);
                    self.teardown();
                    cycles += 1;
                    if cycles > self.policy.max_reconnect_cycles {
                        error!("Giving up after {} reconnects", cycles);
                        return Err(SupervisorError::ReconnectCyclesExceeded {
                            endpoint: self.connector.endpoint(),
                            cycles,
                            source: e,
                        });
                    }
                    info!("Resetting connection to Nav2 base");
                }
                Err(e) => return Err(SupervisorError::Protocol(e)),
            }
        }
    }

    /// Fetch a pose sample, integrate it, and return the published state
    pub fn poll_odometry(&mut self) -> Result<OdometrySnapshot> {
        let estimate = self.estimate_position()?;
        self.odometry.update_with_absolute(estimate.pose);
        Ok(self.odometry.snapshot())
    }

    /// Forward a velocity command as a relative velocity
    pub fn apply_velocity(&mut self, cmd: &VelocityCommand) -> Result<()> {
        self.set_relative_velocity(cmd.linear_x, cmd.linear_y, cmd.angular_z)
    }

    /// Stop the base if reachable, then close the connection regardless.
    /// A later call reconnects and re-bases odometry like any other reconnect.
    pub fn shutdown(&mut self) {
        if let Some(client) = self.client.as_mut()
            && let Err(e) = client.stop()
        {
            warn!("Failed to stop Nav2 base on shutdown: {}", e);
        }
        self.teardown();
    }

    // === Supervised turtle operations ===

    pub fn set_target_orientation(&mut self, orientation: f64) -> Result<()> {
        self.call(|c| c.set_target_orientation(orientation))
    }

    pub fn set_absolute_velocity(&mut self, vx: f64, vy: f64) -> Result<()> {
        self.call(|c| c.set_absolute_velocity(vx, vy))
    }

    pub fn set_relative_velocity(&mut self, vx: f64, vy: f64, turn_rate: f64) -> Result<()> {
        self.call(|c| c.set_relative_velocity(vx, vy, turn_rate))
    }

    pub fn set_position(&mut self, x: f64, y: f64, orientation: f64) -> Result<()> {
        self.call(|c| c.set_position(x, y, orientation))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.call(|c| c.stop())
    }

    pub fn turn_left(&mut self, angle: f64) -> Result<()> {
        self.call(|c| c.turn_left(angle))
    }

    pub fn turn_right(&mut self, angle: f64) -> Result<()> {
        self.call(|c| c.turn_right(angle))
    }

    pub fn move_by(&mut self, dist: f64, direction: f64) -> Result<()> {
        self.call(|c| c.move_by(dist, direction))
    }

    pub fn forward(&mut self, dist: f64) -> Result<()> {
        self.call(|c| c.forward(dist))
    }

    pub fn back(&mut self, dist: f64) -> Result<()> {
        self.call(|c| c.back(dist))
    }

    pub fn set_max_speed(&mut self, max_speed: f64) -> Result<()> {
        self.call(|c| c.set_max_speed(max_speed))
    }

    pub fn set_max_accel(&mut self, max_accel: f64) -> Result<()> {
        self.call(|c| c.set_max_accel(max_accel))
    }

    pub fn set_max_cornering_error(&mut self, error: f64) -> Result<()> {
        self.call(|c| c.set_max_cornering_error(error))
    }

    pub fn estimate_position(&mut self) -> Result<PositionEstimate> {
        self.call(|c| c.estimate_position())
    }

    pub fn max_speed(&mut self) -> Result<f64> {
        self.call(|c| c.max_speed())
    }

    pub fn max_accel(&mut self) -> Result<f64> {
        self.call(|c| c.max_accel())
    }

    pub fn max_cornering_error(&mut self) -> Result<f64> {
        self.call(|c| c.max_cornering_error())
    }

    /// Queue depth; a reconnect in between reports the new, empty queue
    pub fn queue_size(&mut self) -> Result<u32> {
        self.call(|c| c.queue_size())
    }

    pub fn wait(&mut self) -> Result<()> {
        self.call(|c| c.wait())
    }
}

impl<C: Connector> Drop for Supervisor<C> {
    fn drop(&mut self) {
        // Closing the stream halts the base; make sure it happens on every path
        self.shutdown();
    }
}
