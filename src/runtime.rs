// Tick-driven driver loop with command watchdog
// Note: the odometry publishing rate equals the tick rate; nothing inside the
// driver refreshes odometry on its own.

use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::{CMD_TIMEOUT, DriverArgs, TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_ODOM, TOPIC_TF};
use crate::messages::{DriverHealth, FrameTransform, Frames, Odometry, VelocityCommand, stamp_ms_at};
use crate::supervisor::{Connector, Result, Supervisor, SupervisorError, TcpConnector};

/// Messages produced by one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub odometry: Odometry,
    pub transform: FrameTransform,
}

/// Glue between the injected tick/command ports and the supervised base
pub struct Driver<C: Connector> {
    supervisor: Supervisor<C>,
    frames: Frames,
    invert_odom: bool,
    cmd_timeout: Duration,
    latest_cmd: Option<VelocityCommand>,
    cmd_received_at: Instant,
    health: DriverHealth,
}

impl<C: Connector> Driver<C> {
    pub fn new(supervisor: Supervisor<C>, frames: Frames, invert_odom: bool) -> Self {
        Self {
            supervisor,
            frames,
            invert_odom,
            cmd_timeout: CMD_TIMEOUT,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: DriverHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn with_cmd_timeout(mut self, cmd_timeout: Duration) -> Self {
        self.cmd_timeout = cmd_timeout;
        self
    }

    pub fn health(&self) -> DriverHealth {
        self.health
    }

    pub fn supervisor(&self) -> &Supervisor<C> {
        &self.supervisor
    }

    /// Establish the first connection
    pub fn connect(&mut self) -> Result<()> {
        self.supervisor.ensure_connected()
    }

    /// Forward an incoming velocity command to the base
    pub fn on_command(&mut self, cmd: VelocityCommand) -> Result<()> {
        debug!("Received command: {:?}", &cmd);
        self.supervisor.apply_velocity(&cmd)?;
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
        self.health = DriverHealth::Ok;
        Ok(())
    }

    /// Stop the base once if commands stopped arriving
    pub fn check_watchdog(&mut self) -> Result<()> {
        self.check_watchdog_at(Instant::now())
    }

    pub fn check_watchdog_at(&mut self, now: Instant) -> Result<()> {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        if self.health == DriverHealth::Ok && cmd_age > self.cmd_timeout {
            // Watchdog triggered - stop the robot
            let moving = self.latest_cmd.is_some_and(|cmd| !cmd.is_zero());
            if moving {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
                self.supervisor.stop()?;
            }
            self.health = DriverHealth::CmdStale;
        }
        Ok(())
    }

    /// Run the watchdog, sample odometry, and build the outgoing messages.
    ///
    /// A malformed reply skips this tick; connection failures that the
    /// supervisor could not recover are returned.
    pub fn tick(&mut self) -> Result<Option<TickOutput>> {
        self.check_watchdog()?;

        let snapshot = match self.supervisor.poll_odometry() {
            Ok(snapshot) => snapshot,
            Err(SupervisorError::Protocol(e)) => {
                warn!("Skipping odometry sample: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let stamp_ms = stamp_ms_at(snapshot.updated_at);
        Ok(Some(TickOutput {
            odometry: Odometry::from_snapshot(&snapshot, &self.frames, stamp_ms),
            transform: FrameTransform::from_pose(
                &snapshot.pose,
                &self.frames,
                self.invert_odom,
                stamp_ms,
            ),
        }))
    }

    /// Stop and disconnect the base
    pub fn shutdown(&mut self) {
        info!("Shutting down Nav2 connection");
        self.supervisor.shutdown();
    }
}

pub async fn run(args: DriverArgs) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let connector = TcpConnector::new(&args.robot_address, args.robot_port, args.connect_options());
    let supervisor = Supervisor::new(connector, args.retry_policy());
    let mut driver = Driver::new(
        supervisor,
        Frames::with_robot_name(&args.robot_name),
        args.invert_odom,
    );

    info!(
        "Connecting to Nav2 base on {}:{}...",
        args.robot_address, args.robot_port
    );
    tokio::task::block_in_place(|| driver.connect())?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_tf = session.declare_publisher(TOPIC_TF).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(args.tick_period());
    // A slow round trip pushes the schedule back instead of bursting stale samples
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Driver started: {}Hz odometry, {}ms watchdog timeout",
        args.tick_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_VEL);
    info!("Publishing to: {}, {}, {}", TOPIC_ODOM, TOPIC_TF, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        let mut latest = None;
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityCommand>(&payload) {
                Ok(cmd) => latest = Some(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Forward the command and sample odometry (blocking round trips)
        let output = tokio::task::block_in_place(|| -> Result<Option<TickOutput>> {
            if let Some(cmd) = latest {
                driver.on_command(cmd)?;
            }
            driver.tick()
        });
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                error!("Nav2 base unreachable: {}", e);
                driver.shutdown();
                return Err(e.into());
            }
        };

        // 3. Publish odometry and transform
        if let Some(output) = output {
            pub_odom.put(serde_json::to_string(&output.odometry)?).await?;
            pub_tf.put(serde_json::to_string(&output.transform)?).await?;
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&driver.health())?;
        pub_health.put(health_json).await?;
    }

    driver.shutdown();
    Ok(())
}
