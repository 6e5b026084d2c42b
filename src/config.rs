// Timeouts, topics, retry budgets and command-line configuration
use std::time::Duration;

use clap::Parser;

use crate::supervisor::RetryPolicy;
use crate::turtle::ConnectOptions;

// Turtle interface TCP port on the Nav2 base
pub const DEFAULT_PORT: u16 = 5010;

// Odometry publishing frequency
pub const DEFAULT_TICK_HZ: u64 = 10;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Connection supervision
pub const CONNECT_ATTEMPTS: u32 = 5;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_RECONNECT_CYCLES: u32 = 3;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

// Delay between queue polls in wait()
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "nav2/cmd/vel"; // velocity commands
pub const TOPIC_ODOM: &str = "nav2/state/odom"; // odometry
pub const TOPIC_TF: &str = "nav2/state/tf"; // odom <-> base_footprint transform
pub const TOPIC_HEALTH: &str = "nav2/state/health"; // health status

// Frame names, prefixed with "<robot_name>_" when a robot name is given
pub const FRAME_ODOM: &str = "odom";
pub const FRAME_BASE_LINK: &str = "base_link";
pub const FRAME_BASE_FOOTPRINT: &str = "base_footprint";

/// Command-line options for the driver binary
#[derive(Debug, Clone, Parser)]
#[command(name = "nav2-zenoh-driver", about = "Zenoh driver for the CrossWing Nav2 base")]
pub struct DriverArgs {
    /// Hostname or IP address of the Nav2 base
    #[arg(long)]
    pub robot_address: String,

    /// Turtle interface port
    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub robot_port: u16,

    /// Robot name used to prefix frame ids (e.g. "alpha" -> "alpha_odom")
    #[arg(long, default_value = "")]
    pub robot_name: String,

    /// Publish the inverted odom transform (base_footprint -> odom)
    #[arg(long)]
    pub invert_odom: bool,

    /// Odometry publishing rate
    #[arg(long, default_value_t = DEFAULT_TICK_HZ, value_parser = clap::value_parser!(u64).range(1..=100))]
    pub tick_hz: u64,

    /// Reconnect cycles a single call may trigger before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_RECONNECT_CYCLES)]
    pub max_reconnect_cycles: u32,

    /// Per-address connect timeout in milliseconds (0 = block)
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Response read timeout in milliseconds (0 = block)
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,
}

impl DriverArgs {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / self.tick_hz.max(1))
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: millis_or_none(self.connect_timeout_ms),
            read_timeout: millis_or_none(self.read_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_reconnect_cycles: self.max_reconnect_cycles,
            ..RetryPolicy::default()
        }
    }
}

fn millis_or_none(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = DriverArgs::try_parse_from(["nav2-zenoh-driver", "--robot-address", "10.0.0.7"])
            .unwrap();
        assert_eq!(args.robot_port, 5010);
        assert_eq!(args.robot_name, "");
        assert!(!args.invert_odom);
        assert_eq!(args.tick_period(), Duration::from_millis(100));

        let policy = args.retry_policy();
        assert_eq!(policy.connect_attempts, CONNECT_ATTEMPTS);
        assert_eq!(policy.retry_delay, CONNECT_RETRY_DELAY);
        assert_eq!(policy.max_reconnect_cycles, DEFAULT_MAX_RECONNECT_CYCLES);
    }

    #[test]
    fn test_address_is_required() {
        assert!(DriverArgs::try_parse_from(["nav2-zenoh-driver"]).is_err());
    }

    #[test]
    fn test_port_zero_rejected() {
        let result = DriverArgs::try_parse_from([
            "nav2-zenoh-driver",
            "--robot-address",
            "nav2.local",
            "--robot-port",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeouts_mean_blocking() {
        let args = DriverArgs::try_parse_from([
            "nav2-zenoh-driver",
            "--robot-address",
            "nav2.local",
            "--connect-timeout-ms",
            "0",
            "--read-timeout-ms",
            "0",
        ])
        .unwrap();
        let options = args.connect_options();
        assert_eq!(options.connect_timeout, None);
        assert_eq!(options.read_timeout, None);
    }
}
