// Define message types for the runtime

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// High-level control mode of the base
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Open-loop: every VEL command is mixed straight into motor outputs
    #[default]
    Manual,
    /// Velocity PID per wheel tracks mixed targets
    ClosedLoop,
}

impl ControlMode {
    /// Name used on the serial protocol (`MODE <name>`)
    pub fn protocol_name(self) -> &'static str {
        match self {
            ControlMode::Manual => "MANUAL",
            ControlMode::ClosedLoop => "AI",
        }
    }
}

// Body-frame velocity command, each axis nominally in [-1, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct BodyVelocity {
    pub vx: f32,
    pub vy: f32,
    pub w: f32,
}

impl BodyVelocity {
    pub fn new(vx: f32, vy: f32, w: f32) -> Self {
        Self { vx, vy, w }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Recognized inbound commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Vel(BodyVelocity),
    /// `MODE` with an unknown or missing suffix carries `None`
    Mode(Option<ControlMode>),
    Ping,
}

/// Outbound acknowledgments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Pong,
    Mode(ControlMode),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Pong => write!(f, "PONG"),
            Reply::Mode(mode) => write!(f, "MODE {}", mode.protocol_name()),
        }
    }
}

/// Encoder feedback sent upstream on the telemetry cadence
///
/// Wheel order is front-left, front-right, rear-right, rear-left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct EncoderTelemetry {
    pub ticks: [i64; 4],
    /// ticks/s
    pub speeds: [f32; 4],
}

impl fmt::Display for EncoderTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ENC")?;
        for ticks in &self.ticks {
            write!(f, " {}", ticks)?;
        }
        for speed in &self.speeds {
            write!(f, " {:.2}", speed)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TelemetryParseError {
    #[error("not an ENC line")]
    WrongTag,

    #[error("expected 8 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid field {index}: {value:?}")]
    InvalidField { index: usize, value: String },
}

impl FromStr for EncoderTelemetry {
    type Err = TelemetryParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("ENC") {
            return Err(TelemetryParseError::WrongTag);
        }

        let fields: Vec<&str> = fields.collect();
        if fields.len() != 8 {
            return Err(TelemetryParseError::FieldCount(fields.len()));
        }

        let invalid = |index: usize| TelemetryParseError::InvalidField {
            index,
            value: fields[index].to_string(),
        };

        let mut telemetry = EncoderTelemetry::default();
        for i in 0..4 {
            telemetry.ticks[i] = fields[i].parse().map_err(|_| invalid(i))?;
            telemetry.speeds[i] = fields[i + 4].parse().map_err(|_| invalid(i + 4))?;
        }
        Ok(telemetry)
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_lines() {
        assert_eq!(Reply::Pong.to_string(), "PONG");
        assert_eq!(Reply::Mode(ControlMode::Manual).to_string(), "MODE MANUAL");
        assert_eq!(Reply::Mode(ControlMode::ClosedLoop).to_string(), "MODE AI");
    }

    #[test]
    fn test_telemetry_line_format() {
        let telemetry = EncoderTelemetry {
            ticks: [10, -3, 0, 1200],
            speeds: [50.0, -12.5, 0.0, 333.333],
        };
        assert_eq!(
            telemetry.to_string(),
            "ENC 10 -3 0 1200 50.00 -12.50 0.00 333.33"
        );
    }

    #[test]
    fn test_telemetry_parse_from_line() {
        let parsed: EncoderTelemetry = "ENC 1 2 3 -4 10.00 -20.50 0.00 1.25".parse().unwrap();
        assert_eq!(parsed.ticks, [1, 2, 3, -4]);
        assert_eq!(parsed.speeds, [10.0, -20.5, 0.0, 1.25]);
    }

    #[test]
    fn test_telemetry_parse_rejects_bad_lines() {
        assert_eq!(
            "PONG".parse::<EncoderTelemetry>(),
            Err(TelemetryParseError::WrongTag)
        );
        assert_eq!(
            "ENC 1 2 3".parse::<EncoderTelemetry>(),
            Err(TelemetryParseError::FieldCount(3))
        );
        assert!(matches!(
            "ENC 1 2 x 4 0 0 0 0".parse::<EncoderTelemetry>(),
            Err(TelemetryParseError::InvalidField { index: 2, .. })
        ));
    }

    #[test]
    fn test_health_serializes_snake_case() {
        let json = serde_json::to_string(&RuntimeHealth::CmdStale).unwrap();
        assert_eq!(json, "\"cmd_stale\"");
    }
}
