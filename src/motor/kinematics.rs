// Mecanum mixing for the 4-wheel base
// Converts a body-frame velocity (forward, strafe, rotate) into per-wheel commands.

use crate::config::{CLAMP_VX_BELOW, CLAMP_VY_ABOVE, CLAMP_W_ABOVE};
use crate::messages::BodyVelocity;

/// Wheel positions in mixer order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    FrontLeft = 0,
    FrontRight = 1,
    RearRight = 2,
    RearLeft = 3,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearRight,
        Wheel::RearLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One value per wheel, in mixer order
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelCommands {
    pub front_left: f32,
    pub front_right: f32,
    pub rear_right: f32,
    pub rear_left: f32,
}

impl WheelCommands {
    pub fn new(front_left: f32, front_right: f32, rear_right: f32, rear_left: f32) -> Self {
        Self {
            front_left,
            front_right,
            rear_right,
            rear_left,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_array(values: [f32; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Returns commands as array [front_left, front_right, rear_right, rear_left]
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_right,
            self.rear_left,
        ]
    }

    pub fn get(&self, wheel: Wheel) -> f32 {
        self.as_array()[wheel.index()]
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::from_array(self.as_array().map(|value| value * factor))
    }
}

/// Defuse the strafe+rotate combination the platform handles badly
///
/// When forward demand is near zero while strafe and rotate are both large,
/// rotation is dropped. The command is never rejected.
pub fn clamp_unstable(cmd: BodyVelocity) -> BodyVelocity {
    if cmd.vx.abs() < CLAMP_VX_BELOW && cmd.vy.abs() > CLAMP_VY_ABOVE && cmd.w.abs() > CLAMP_W_ABOVE
    {
        BodyVelocity { w: 0.0, ..cmd }
    } else {
        cmd
    }
}

/// Mix a body velocity into normalized wheel commands in [-1, 1]
///
/// If any wheel exceeds unit magnitude, all four are divided by the largest
/// magnitude so the direction of motion is preserved.
pub fn mix(cmd: BodyVelocity) -> WheelCommands {
    let BodyVelocity { vx, vy, w } = cmd;

    let mut wheels = [
        vx - vy - w, // front-left
        vx + vy + w, // front-right
        vx - vy + w, // rear-right
        vx + vy - w, // rear-left
    ];

    let max_magnitude = wheels.iter().fold(0.0f32, |acc, m| acc.max(m.abs()));
    if max_magnitude > 1.0 {
        for m in &mut wheels {
            *m /= max_magnitude;
        }
    }

    WheelCommands::from_array(wheels)
}
