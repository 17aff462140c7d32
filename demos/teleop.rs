// Keyboard teleop over the serial link
// WASD drive/strafe, Z/X rotate, R/F speed, M manual, N closed-loop,
// space stop, Q quit
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use mecanum_drive_runtime::config::{LINK_BAUDRATE, LINK_PORT};
use mecanum_drive_runtime::link::{Link, SerialLink};
use mecanum_drive_runtime::messages::{BodyVelocity, ControlMode, EncoderTelemetry};

const SPEEDS: [f32; 3] = [0.3, 0.6, 1.0]; // normalized
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input
const SEND_PERIOD: Duration = Duration::from_millis(50); // well inside the robot watchdog

#[derive(Debug, Parser)]
#[command(about = "Keyboard teleop for the Mecanum base")]
struct Args {
    #[arg(short, long, default_value = LINK_PORT)]
    port: String,

    #[arg(short, long, default_value_t = LINK_BAUDRATE)]
    baudrate: u32,
}

/// Outcome of one key press
#[derive(Debug, PartialEq)]
enum Action {
    None,
    Send(String),
    Quit,
}

struct Teleop {
    speed_idx: usize,
    velocity: BodyVelocity,
    last_movement_input: Instant,
}

impl Teleop {
    fn new(now: Instant) -> Self {
        Self {
            speed_idx: 0,
            velocity: BodyVelocity::zero(),
            last_movement_input: now,
        }
    }

    fn on_key(&mut self, code: KeyCode, now: Instant) -> Action {
        let speed = SPEEDS[self.speed_idx];
        match code {
            KeyCode::Char('w') => self.velocity.vx = speed,
            KeyCode::Char('s') => self.velocity.vx = -speed,
            KeyCode::Char('a') => self.velocity.vy = speed,
            KeyCode::Char('d') => self.velocity.vy = -speed,
            KeyCode::Char('z') => self.velocity.w = speed,
            KeyCode::Char('x') => self.velocity.w = -speed,

            KeyCode::Char(' ') => {
                self.velocity = BodyVelocity::zero();
                return Action::Send(vel_line(self.velocity));
            }

            KeyCode::Char('r') => {
                self.speed_idx = (self.speed_idx + 1).min(SPEEDS.len() - 1);
                info!("Speed: {}", SPEEDS[self.speed_idx]);
                return Action::None;
            }
            KeyCode::Char('f') => {
                self.speed_idx = self.speed_idx.saturating_sub(1);
                info!("Speed: {}", SPEEDS[self.speed_idx]);
                return Action::None;
            }

            KeyCode::Char('m') => return Action::Send(mode_line(ControlMode::Manual)),
            KeyCode::Char('n') => return Action::Send(mode_line(ControlMode::ClosedLoop)),

            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,

            _ => return Action::None,
        }
        self.last_movement_input = now;
        Action::None
    }

    /// Velocity to send this period, zeroed when keys were released
    fn current(&mut self, now: Instant) -> BodyVelocity {
        if now.duration_since(self.last_movement_input) > Duration::from_millis(INPUT_TIMEOUT_MS) {
            self.velocity = BodyVelocity::zero();
        }
        self.velocity
    }
}

fn vel_line(v: BodyVelocity) -> String {
    format!(
        "VEL {:.2} {:.2} {:.2}",
        v.vx.clamp(-1.0, 1.0),
        v.vy.clamp(-1.0, 1.0),
        v.w.clamp(-1.0, 1.0)
    )
}

fn mode_line(mode: ControlMode) -> String {
    format!("MODE {}", mode.protocol_name())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let mut link = SerialLink::open(&args.port, args.baudrate)?;
    link.write_line("PING")?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, M/N=mode, SPACE=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&mut link);
    disable_raw_mode()?;

    // Leave the robot stopped
    link.write_line(&vel_line(BodyVelocity::zero()))?;
    result
}

fn run_teleop(link: &mut SerialLink) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new(Instant::now());
    let mut inbound = Vec::new();
    let mut last_send = Instant::now();

    loop {
        if event::poll(Duration::from_millis(10))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed {
                    match teleop.on_key(code, Instant::now()) {
                        Action::Send(line) => link.write_line(&line)?,
                        Action::Quit => break,
                        Action::None => {}
                    }
                }
            }
        }

        if last_send.elapsed() >= SEND_PERIOD {
            last_send = Instant::now();
            let velocity = teleop.current(last_send);
            link.write_line(&vel_line(velocity))?;
        }

        drain_inbound(link, &mut inbound)?;
    }

    Ok(())
}

// Log whatever the robot sent back, one line at a time
fn drain_inbound(
    link: &mut SerialLink,
    inbound: &mut Vec<u8>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut chunk = [0u8; 256];
    loop {
        let n = link.read_available(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        for &byte in &chunk[..n] {
            if byte != b'\n' && byte != b'\r' {
                inbound.push(byte);
                continue;
            }
            if inbound.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(inbound).to_string();
            inbound.clear();
            match line.parse::<EncoderTelemetry>() {
                Ok(telemetry) => info!("ticks {:?} speeds {:?}", telemetry.ticks, telemetry.speeds),
                Err(_) if line.starts_with("ENC") => warn!("Malformed telemetry: {}", line),
                Err(_) => info!("Robot: {}", line),
            }
        }
    }
}
