// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Q quit
// Publishes VelocityCommand JSON on nav2/cmd/vel for the driver.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use nav2_zenoh_driver::config::TOPIC_CMD_VEL;
use nav2_zenoh_driver::messages::VelocityCommand;
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s
const TURN_RATES: [f64; 3] = [0.3, 0.8, 1.5]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 150; // Reset velocities after this much time with no input
const PUBLISH_PERIOD_MS: u64 = 50; // 20Hz

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_VEL).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Leave the base at rest
    publisher
        .put(serde_json::to_string(&VelocityCommand::default())?)
        .await?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut cmd = VelocityCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        if event::poll(Duration::from_millis(PUBLISH_PERIOD_MS))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if !pressed {
                    continue;
                }

                match code {
                    KeyCode::Char('w') => cmd.linear_x = SPEEDS[speed_idx],
                    KeyCode::Char('s') => cmd.linear_x = -SPEEDS[speed_idx],
                    KeyCode::Char('a') => cmd.linear_y = SPEEDS[speed_idx],
                    KeyCode::Char('d') => cmd.linear_y = -SPEEDS[speed_idx],
                    KeyCode::Char('z') => cmd.angular_z = TURN_RATES[speed_idx],
                    KeyCode::Char('x') => cmd.angular_z = -TURN_RATES[speed_idx],

                    KeyCode::Char('r') => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        print_speed(speed_idx);
                        continue;
                    }
                    KeyCode::Char('f') => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                        continue;
                    }

                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => continue,
                }
                last_movement_input = Instant::now();
            }
        }

        // Key repeat keeps refreshing the command; release lets it lapse
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = VelocityCommand::default();
        }

        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!(
        "Speed: {} ({} m/s, {} rad/s)",
        label, SPEEDS[idx], TURN_RATES[idx]
    );
}
