use clap::Parser;
use tracing_subscriber::EnvFilter;

use nav2_zenoh_driver::config::DriverArgs;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = DriverArgs::parse();

    if let Err(e) = nav2_zenoh_driver::runtime::run(args).await {
        eprintln!("Driver error: {}", e);
        std::process::exit(1);
    }
}
