// Turtle path demo: drive a square with queued turtle commands
//
// Usage: cargo run --example turtle_square -- <host> [side_m]
// Example: cargo run --example turtle_square -- 192.168.1.40 0.5
//
// Safety:
// - Explicit confirmation before any motion
// - Conservative speed and acceleration limits
// - Ctrl+C drops the connection, which stops the base immediately

use nav2_zenoh_driver::config::DEFAULT_PORT;
use nav2_zenoh_driver::turtle::TurtleClient;
use std::f64::consts::FRAC_PI_2;
use std::io::{self, Write};

const MAX_SPEED: f64 = 0.2; // m/s
const MAX_ACCEL: f64 = 0.2; // m/s²
const CORNERING_ERROR: f64 = 0.0; // stop at every corner

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(host) = args.next() else {
        println!("Usage: turtle_square <host> [side_m]");
        return Ok(());
    };
    let side: f64 = match args.next() {
        Some(arg) => arg.parse()?,
        None => 0.5,
    };

    println!("Nav2 base: {}:{}", host, DEFAULT_PORT);
    println!("Path: {:.2} m square, counter-clockwise", side);
    println!();

    if !confirm("Is there at least a clear square of this size around the robot?")? {
        println!("Aborted.");
        return Ok(());
    }

    let mut client = TurtleClient::connect(&host, DEFAULT_PORT)?;
    println!("✓ Connected to {}", client.peer());

    // ========== STEP 1: Limits ==========
    client.set_max_speed(MAX_SPEED)?;
    client.set_max_accel(MAX_ACCEL)?;
    client.set_max_cornering_error(CORNERING_ERROR)?;
    println!(
        "  Limits: speed={:.2} m/s accel={:.2} m/s² cornering={:.2} m",
        client.max_speed()?,
        client.max_accel()?,
        client.max_cornering_error()?
    );

    let start = client.estimate_position()?;
    println!(
        "  Start: x={:.3} y={:.3} theta={:.1}°",
        start.pose.x,
        start.pose.y,
        start.pose.theta.to_degrees()
    );

    // ========== STEP 2: Queue the path ==========
    for _ in 0..4 {
        client.forward(side)?;
        client.turn_left(FRAC_PI_2)?;
    }
    println!("  Queued {} segments", client.queue_size()?);

    // ========== STEP 3: Wait for the queue to drain ==========
    client.wait()?;

    let end = client.estimate_position()?;
    println!(
        "✓ Done. End: x={:.3} y={:.3} theta={:.1}° (drift {:.3} m)",
        end.pose.x,
        end.pose.y,
        end.pose.theta.to_degrees(),
        ((end.pose.x - start.pose.x).powi(2) + (end.pose.y - start.pose.y).powi(2)).sqrt()
    );

    client.close();
    Ok(())
}
