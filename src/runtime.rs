// Fixed-cadence control loop with watchdog
// Each tick runs one non-blocking cycle, always in this order:
//   1. drain the command link and apply commands
//   2. estimate wheel velocities from the encoders
//   3. service the wheel PIDs (closed-loop only)
//   4. watchdog check, which overrides anything decided above
//   5. ENC telemetry on its own cadence

use std::fmt::Display;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{LOOP_HZ, TELEMETRY_PERIOD, TOPIC_ENCODERS, TOPIC_HEALTH, WATCHDOG_TIMEOUT};
use crate::link::{Link, SerialLink};
use crate::messages::{EncoderTelemetry, RuntimeHealth};
use crate::motor::{
    DriveConfig, DriveController, EncoderBank, MotorActuator, PlantParams, RecordingActuator,
    SimulatedBase,
};
use crate::protocol::CommandChannel;
use crate::watchdog::Watchdog;

/// What one cycle produced
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    pub health: RuntimeHealth,
    /// Set on cycles where an ENC line went out
    pub telemetry: Option<EncoderTelemetry>,
}

pub struct Runtime<A: MotorActuator, L: Link> {
    drive: DriveController<A>,
    channel: CommandChannel,
    watchdog: Watchdog,
    link: L,
    health: RuntimeHealth,
    last_telemetry: Instant,
}

impl<A: MotorActuator, L: Link> Runtime<A, L> {
    pub fn new(drive: DriveController<A>, link: L, now: Instant) -> Self {
        Self {
            drive,
            channel: CommandChannel::new(now),
            watchdog: Watchdog::new(WATCHDOG_TIMEOUT),
            link,
            // The watchdog window starts now, not at the first command
            health: RuntimeHealth::Ok,
            last_telemetry: now,
        }
    }

    pub fn drive(&self) -> &DriveController<A> {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut DriveController<A> {
        &mut self.drive
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Run one control cycle at `now`
    pub fn cycle(&mut self, now: Instant) -> CycleReport {
        // 1. Drain all pending bytes (non-blocking)
        if let Err(e) = self.channel.poll(&mut self.link, &mut self.drive, now) {
            warn!("Command link error: {}", e);
        }

        // 2. Velocity estimation runs in every mode, telemetry depends on it
        self.drive.estimate_velocities(now);

        // 3. PID service (mode and period gated inside)
        self.drive.service_pid(now);

        // 4. Watchdog last so a stale link always wins
        let health = self
            .watchdog
            .check(self.channel.last_accepted(), now, &mut self.drive);
        if health != self.health {
            match health {
                RuntimeHealth::CmdStale => warn!(
                    "No command for {:?}, emergency stop",
                    now.saturating_duration_since(self.channel.last_accepted())
                ),
                RuntimeHealth::Ok => info!("Command traffic resumed"),
            }
            self.health = health;
        }

        // 5. Telemetry
        let telemetry = if now.saturating_duration_since(self.last_telemetry) >= TELEMETRY_PERIOD {
            self.last_telemetry = now;
            let telemetry = self.drive.telemetry();
            debug!("{}", telemetry);
            if let Err(e) = self.link.write_line(&telemetry.to_string()) {
                warn!("Failed to send telemetry: {}", e);
            }
            Some(telemetry)
        } else {
            None
        };

        CycleReport { health, telemetry }
    }
}

/// Motor backend selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// First-order wheel model feeding simulated encoder edges
    Sim,
    /// Outputs are only recorded, encoders never move
    DryRun,
}

/// Process bring-up options
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub port: String,
    pub baudrate: u32,
    pub backend: Backend,
    /// Mirror telemetry and health as JSON on Zenoh
    pub mirror: bool,
}

struct Mirror<'a> {
    encoders: zenoh::pubsub::Publisher<'a>,
    health: zenoh::pubsub::Publisher<'a>,
}

impl Mirror<'_> {
    async fn publish(&self, report: &CycleReport) {
        let Some(telemetry) = report.telemetry else {
            return;
        };
        match serde_json::to_string(&telemetry) {
            Ok(json) => {
                publish_or_warn(TOPIC_ENCODERS, self.encoders.put(json)).await;
            }
            Err(e) => warn!("Failed to encode telemetry: {}", e),
        }
        match serde_json::to_string(&report.health) {
            Ok(json) => {
                publish_or_warn(TOPIC_HEALTH, self.health.put(json)).await;
            }
            Err(e) => warn!("Failed to encode health: {}", e),
        }
    }
}

/// Await one mirror publication, logging a failure instead of returning it
///
/// The mirror is an observer. Losing it never stops the control loop.
async fn publish_or_warn<P, E>(topic: &str, put: P) -> bool
where
    P: IntoFuture<Output = Result<(), E>>,
    E: Display,
{
    match put.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to publish on {}: {}", topic, e);
            false
        }
    }
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let link = SerialLink::open(&options.port, options.baudrate)?;

    let encoders = Arc::new(EncoderBank::new());
    let actuator: Box<dyn MotorActuator + Send> = match options.backend {
        Backend::Sim => Box::new(SimulatedBase::spawn(Arc::clone(&encoders), PlantParams::default())),
        Backend::DryRun => Box::new(RecordingActuator::new()),
    };

    let now = Instant::now();
    let drive = DriveController::with_encoders(actuator, encoders, DriveConfig::default(), now);
    let mut runtime = Runtime::new(drive, link, now);

    let session = if options.mirror {
        info!("Opening Zenoh session...");
        Some(zenoh::open(zenoh::Config::default()).await?)
    } else {
        None
    };
    let mirror = match &session {
        Some(session) => Some(Mirror {
            encoders: session.declare_publisher(TOPIC_ENCODERS).await?,
            health: session.declare_publisher(TOPIC_HEALTH).await?,
        }),
        None => None,
    };

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, {:?} backend",
        LOOP_HZ,
        WATCHDOG_TIMEOUT.as_millis(),
        options.backend
    );
    if mirror.is_some() {
        info!("Mirroring to: {}, {}", TOPIC_ENCODERS, TOPIC_HEALTH);
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping motors");
                runtime.drive_mut().emergency_stop();
                break;
            }
        }

        let report = runtime.cycle(Instant::now());

        if let Some(mirror) = &mirror {
            mirror.publish(&report).await;
        }
    }

    Ok(())
}
