// Compiled-in control constants, loop cadences, link defaults and topics
use std::time::Duration;

use crate::motor::pid::PidGains;

// Runtime superloop frequency (each tick runs one full control cycle)
pub const LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(500);

// Velocity estimation cadence (dt is still measured, this is only the gate)
pub const ESTIMATION_PERIOD: Duration = Duration::from_millis(100);

// ENC telemetry cadence, independent of the PID cadence
pub const TELEMETRY_PERIOD: Duration = Duration::from_millis(100);

// PID service frequency and the minimum period derived from it
pub const PID_FREQ_HZ: u64 = 50;
pub const PID_PERIOD: Duration = Duration::from_millis(1000 / PID_FREQ_HZ);

/// Actuator output ceiling. The driver accepts [0, 255], we stay below to
/// spare the motors.
pub const ACTUATOR_OUTPUT_MAX: u8 = 200;

/// Maximum wheel speed in ticks/s. Scales normalized mixer output into
/// closed-loop targets, must match the fastest speed the wheels really reach.
pub const MAX_WHEEL_SPEED: f32 = 500.0;

// Per-wheel PID tuning, order: front-left, front-right, rear-right, rear-left
pub const PID_GAINS: [PidGains; 4] = [PidGains::DEFAULT; 4];

// Per-wheel polarity correction (-1 for a wheel wired backwards)
pub const MOTOR_POLARITY: [i8; 4] = [1, 1, 1, 1];

// Instability clamp: near-zero forward demand with large strafe and rotate
pub const CLAMP_VX_BELOW: f32 = 0.1;
pub const CLAMP_VY_ABOVE: f32 = 0.3;
pub const CLAMP_W_ABOVE: f32 = 0.3;

// Line buffer bound for the command link
pub const MAX_LINE_LEN: usize = 128;

// Serial link to the upstream controller
pub const LINK_PORT: &str = "/dev/ttyAMA0";
pub const LINK_BAUDRATE: u32 = 115_200;

// Zenoh topics for the JSON mirror of telemetry and health
pub const TOPIC_ENCODERS: &str = "mecanum/state/encoders";
pub const TOPIC_HEALTH: &str = "mecanum/state/health";
