// Blocking client for the Nav2 turtle interface
//
// Each call is one synchronous round trip: write one command line, and for
// queries block for one filtered response line. Turtle commands run
// asynchronously on the base: motion commands are added to its path plan and
// return immediately. Use queue_size() or wait() to track completion.
//
// Dropping the client closes the stream, and the base stops immediately even
// with commands still queued.

use std::fmt;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::config::WAIT_POLL_INTERVAL;

use super::command::{parse_position, parse_scalar, Command, PositionEstimate};

/// Line buffer growth step
pub const LINE_CHUNK: usize = 32;

/// Error types for turtle communication
#[derive(Debug, thiserror::Error)]
pub enum TurtleError {
    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Can't get address info for {endpoint}: {source}")]
    Resolve { endpoint: String, source: io::Error },

    #[error("Can't connect to robot at {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Connection closed by robot")]
    Closed,

    #[error("Malformed response {line:?}: {reason}")]
    Parse { line: String, reason: String },
}

impl TurtleError {
    /// The stream is unusable; reconnecting may help
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            TurtleError::Io(_) | TurtleError::ShortWrite { .. } | TurtleError::Closed
        )
    }

    /// No stream could be established
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            TurtleError::InvalidPort(_) | TurtleError::Resolve { .. } | TurtleError::Connect { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TurtleError>;

/// Socket options applied when connecting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectOptions {
    /// Per-address connect timeout, `None` blocks
    pub connect_timeout: Option<Duration>,
    /// Response read timeout, `None` blocks. A timed-out read is an I/O error.
    pub read_timeout: Option<Duration>,
}

/// Turtle interface client over one stream
pub struct TurtleClient<S: Read + Write = TcpStream> {
    reader: BufReader<S>,
    line: Vec<u8>,
    peer: String,
}

impl<S: Read + Write> fmt::Debug for TurtleClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurtleClient")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl TurtleClient<TcpStream> {
    /// Connect to a turtle interface, blocking on each candidate address
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(host, port, &ConnectOptions::default())
    }

    /// Resolve `host` and try every address in turn; the first success wins
    pub fn connect_with(host: &str, port: u16, options: &ConnectOptions) -> Result<Self> {
        if port == 0 {
            return Err(TurtleError::InvalidPort(port));
        }

        let endpoint = format!("{}:{}", host, port);
        let candidates: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TurtleError::Resolve {
                endpoint: endpoint.clone(),
                source,
            })?
            .collect();

        Self::connect_candidates(&endpoint, candidates, options)
    }

    /// Try each address in order; the first successful connection wins
    pub fn connect_candidates(
        endpoint: &str,
        candidates: impl IntoIterator<Item = SocketAddr>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let mut last_error =
            io::Error::new(ErrorKind::NotFound, "host resolved to no addresses");
        for addr in candidates {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };

            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(options.read_timeout)?;
                    debug!("Connected to {} ({})", endpoint, addr);
                    return Ok(Self::from_stream(stream, addr.to_string()));
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = e;
                }
            }
        }

        Err(TurtleError::Connect {
            endpoint: endpoint.to_string(),
            source: last_error,
        })
    }
}

impl<S: Read + Write> TurtleClient<S> {
    /// Wrap an already connected stream
    pub fn from_stream(stream: S, peer: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(stream),
            line: Vec::with_capacity(LINE_CHUNK),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Close the connection. The base halts and drops its queue, so the queue
    /// must be considered empty afterwards.
    pub fn close(self) {
        info!("Closing connection to {}", self.peer);
    }

    /// Write one command line with a single write call, retried only on EINTR
    pub fn send(&mut self, command: Command) -> Result<()> {
        let line = command.encode();
        trace!("-> {}", line.trim_end());

        let stream = self.reader.get_mut();
        let written = loop {
            match stream.write(line.as_bytes()) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if written != line.len() {
            return Err(TurtleError::ShortWrite {
                expected: line.len(),
                written,
            });
        }
        stream.flush()?;
        Ok(())
    }

    /// Send a query and block for its filtered response line
    fn query(&mut self, command: Command) -> Result<String> {
        debug_assert!(command.expects_response());
        self.send(command)?;
        self.read_line()
    }

    /// Read the next line that isn't `|` / `+` chatter, without '\r' or '\n'
    pub fn read_line(&mut self) -> Result<String> {
        self.line.clear();

        loop {
            let (consumed, complete) = {
                let available = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if available.is_empty() {
                    return Err(TurtleError::Closed);
                }

                match available.iter().position(|&b| b == b'\n') {
                    Some(end) => {
                        append_stripped(&mut self.line, &available[..end]);
                        (end + 1, true)
                    }
                    None => {
                        append_stripped(&mut self.line, available);
                        (available.len(), false)
                    }
                }
            };
            self.reader.consume(consumed);

            if !complete {
                continue;
            }

            if matches!(self.line.first(), Some(b'|') | Some(b'+')) {
                trace!("<- (ignored) {}", String::from_utf8_lossy(&self.line));
                self.line.clear();
                continue;
            }

            let line = String::from_utf8_lossy(&self.line).into_owned();
            trace!("<- {}", line);
            return Ok(line);
        }
    }

    // === Motion commands ===

    /// Target orientation in world coordinates (radians)
    pub fn set_target_orientation(&mut self, orientation: f64) -> Result<()> {
        self.send(Command::SetOrientation { angle: orientation })
    }

    /// Velocity in world coordinates (m/s). Clears the turtle queue.
    pub fn set_absolute_velocity(&mut self, vx: f64, vy: f64) -> Result<()> {
        self.send(Command::AbsoluteVelocity { vx, vy })
    }

    /// Velocity relative to the robot's heading (m/s) and turn rate (rad/s,
    /// positive counter-clockwise). Clears the turtle queue.
    pub fn set_relative_velocity(&mut self, vx: f64, vy: f64, turn_rate: f64) -> Result<()> {
        self.send(Command::RelativeVelocity { vx, vy, turn_rate })
    }

    /// Ground truth for future position estimates
    pub fn set_position(&mut self, x: f64, y: f64, orientation: f64) -> Result<()> {
        self.send(Command::SetPosition {
            x,
            y,
            angle: orientation,
        })
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Queue a counter-clockwise turn (radians)
    pub fn turn_left(&mut self, angle: f64) -> Result<()> {
        self.send(Command::Turn { angle })
    }

    pub fn turn_right(&mut self, angle: f64) -> Result<()> {
        self.turn_left(-angle)
    }

    /// Queue a move of `dist` meters toward `direction` (radians, positive to
    /// the robot's left) relative to the current heading
    pub fn move_by(&mut self, dist: f64, direction: f64) -> Result<()> {
        self.send(Command::Move { dist, direction })
    }

    pub fn forward(&mut self, dist: f64) -> Result<()> {
        self.move_by(dist, 0.0)
    }

    pub fn back(&mut self, dist: f64) -> Result<()> {
        self.forward(-dist)
    }

    /// Maximum speed for turtle commands (m/s)
    pub fn set_max_speed(&mut self, max_speed: f64) -> Result<()> {
        self.send(Command::SetMaxSpeed(max_speed))
    }

    /// Maximum acceleration for turtle commands (m/s²)
    pub fn set_max_accel(&mut self, max_accel: f64) -> Result<()> {
        self.send(Command::SetMaxAccel(max_accel))
    }

    /// How close (m) the path must pass each corner; 0 stops at every corner
    pub fn set_max_cornering_error(&mut self, error: f64) -> Result<()> {
        self.send(Command::SetMaxCorneringError(error))
    }

    // === Queries ===

    pub fn estimate_position(&mut self) -> Result<PositionEstimate> {
        let line = self.query(Command::QueryPosition)?;
        parse_position(&line)
    }

    pub fn max_speed(&mut self) -> Result<f64> {
        let line = self.query(Command::QueryMaxSpeed)?;
        parse_scalar(&line)
    }

    pub fn max_accel(&mut self) -> Result<f64> {
        let line = self.query(Command::QueryMaxAccel)?;
        parse_scalar(&line)
    }

    pub fn max_cornering_error(&mut self) -> Result<f64> {
        let line = self.query(Command::QueryMaxCorneringError)?;
        parse_scalar(&line)
    }

    /// Number of turtle segments still queued
    pub fn queue_size(&mut self) -> Result<u32> {
        Ok(self.estimate_position()?.queue_depth)
    }

    /// Block until the turtle queue is empty, polling every 100 ms
    pub fn wait(&mut self) -> Result<()> {
        self.wait_with_interval(WAIT_POLL_INTERVAL)
    }

    pub fn wait_with_interval(&mut self, interval: Duration) -> Result<()> {
        loop {
            let depth = self.queue_size()?;
            if depth < 1 {
                return Ok(());
            }
            debug!("Waiting for {} queued segments", depth);
            sleep(interval);
        }
    }
}

/// Append `bytes` minus carriage returns, growing the buffer in LINE_CHUNK steps
fn append_stripped(line: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes.iter().filter(|&&b| b != b'\r') {
        if line.len() == line.capacity() {
            line.reserve_exact(LINE_CHUNK);
        }
        line.push(byte);
    }
}
