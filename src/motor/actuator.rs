// Motor actuation boundary
//
// The motor-driver peripheral is an external collaborator. Implementors take
// a per-wheel `MotorOutput` (magnitude + direction) and push it to hardware.

use super::kinematics::Wheel;
use crate::config::ACTUATOR_OUTPUT_MAX;

/// Direction line state for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Forward,
    Backward,
    /// Coast, no drive
    #[default]
    Release,
}

/// Output for one motor: magnitude in [0, ACTUATOR_OUTPUT_MAX] and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorOutput {
    pub magnitude: u8,
    pub direction: Direction,
}

impl MotorOutput {
    pub fn released() -> Self {
        Self::default()
    }

    /// Translate a normalized command in [-1, 1] into magnitude and direction
    ///
    /// `polarity` flips wheels that are wired backwards. Out-of-range commands
    /// are capped at the output ceiling.
    pub fn from_command(command: f32, polarity: i8) -> Self {
        let command = command * polarity as f32;
        if command.is_nan() {
            return Self::released();
        }

        let magnitude = (command.abs() * ACTUATOR_OUTPUT_MAX as f32).min(ACTUATOR_OUTPUT_MAX as f32) as u8;

        let direction = if command > 0.0 {
            Direction::Forward
        } else if command < 0.0 {
            Direction::Backward
        } else {
            Direction::Release
        };

        Self {
            magnitude,
            direction,
        }
    }

    /// Signed view: magnitude with the direction sign, 0 when released
    pub fn signed(&self) -> i32 {
        match self.direction {
            Direction::Forward => self.magnitude as i32,
            Direction::Backward => -(self.magnitude as i32),
            Direction::Release => 0,
        }
    }
}

/// Error types for motor actuation
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Motor {wheel:?} rejected output: {reason}")]
    Rejected { wheel: Wheel, reason: String },
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// Anything that can drive the four wheel motors
pub trait MotorActuator {
    fn apply(&mut self, wheel: Wheel, output: MotorOutput) -> Result<()>;
}

impl<A: MotorActuator + ?Sized> MotorActuator for Box<A> {
    fn apply(&mut self, wheel: Wheel, output: MotorOutput) -> Result<()> {
        (**self).apply(wheel, output)
    }
}

/// Keeps the last output per wheel, used by tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    outputs: [MotorOutput; 4],
    writes: usize,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self, wheel: Wheel) -> MotorOutput {
        self.outputs[wheel.index()]
    }

    pub fn outputs(&self) -> [MotorOutput; 4] {
        self.outputs
    }

    /// Total number of apply calls so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn all_released(&self) -> bool {
        self.outputs.iter().all(|o| *o == MotorOutput::released())
    }
}

impl MotorActuator for RecordingActuator {
    fn apply(&mut self, wheel: Wheel, output: MotorOutput) -> Result<()> {
        self.outputs[wheel.index()] = output;
        self.writes += 1;
        Ok(())
    }
}
