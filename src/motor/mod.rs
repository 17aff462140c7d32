// Motor control module for the Mecanum base
//
// Provides:
// - Mecanum mixing (body velocity -> wheel commands)
// - Per-wheel velocity PID
// - Quadrature encoder capture and velocity estimation
// - The drive controller tying them to a motor actuator
// - A simulated base for running without hardware

pub mod actuator;
mod drive;
pub mod encoder;
pub mod kinematics;
pub mod pid;
pub mod sim;

pub use actuator::{ActuatorError, Direction, MotorActuator, MotorOutput, RecordingActuator};
pub use drive::{DriveConfig, DriveController};
pub use encoder::{EncoderBank, VelocityEstimator, WheelEncoder};
pub use kinematics::{clamp_unstable, mix, Wheel, WheelCommands};
pub use pid::{PidController, PidGains};
pub use sim::{PlantParams, SimulatedBase};
