use clap::Parser;
use tracing_subscriber::EnvFilter;

use mecanum_drive_runtime::config::{LINK_BAUDRATE, LINK_PORT};
use mecanum_drive_runtime::runtime::{self, Backend, RunOptions};

/// Motion-control runtime for the Mecanum base
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial device connected to the upstream controller
    #[arg(short, long, default_value = LINK_PORT)]
    port: String,

    #[arg(short, long, default_value_t = LINK_BAUDRATE)]
    baudrate: u32,

    /// Motor backend
    #[arg(long, value_enum, default_value_t = Backend::Sim)]
    backend: Backend,

    /// Do not mirror telemetry on Zenoh
    #[arg(long)]
    no_mirror: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RunOptions {
        port: args.port,
        baudrate: args.baudrate,
        backend: args.backend,
        mirror: !args.no_mirror,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
