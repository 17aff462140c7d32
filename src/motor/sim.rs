// Simulated base for running the full loop without hardware
//
// Each wheel is a first-order lag from motor output to speed. A background
// thread integrates the model and feeds whole ticks into the encoder bank
// through the same capture entry point a GPIO interrupt would use.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::actuator::{MotorActuator, MotorOutput, Result};
use super::encoder::EncoderBank;
use super::kinematics::Wheel;
use crate::config::ACTUATOR_OUTPUT_MAX;

/// Physical parameters of a simulated wheel
#[derive(Debug, Clone, Copy)]
pub struct PlantParams {
    /// Steady-state speed at full output, ticks/s
    pub free_speed: f32,
    /// Time constant of the speed response, seconds
    pub time_constant: f32,
    pub step: Duration,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            free_speed: 600.0,
            time_constant: 0.15,
            step: Duration::from_millis(1),
        }
    }
}

/// Speed model of one wheel
#[derive(Debug, Clone, Default)]
pub struct WheelPlant {
    speed: f32,
    // Fractional ticks not yet emitted
    accumulator: f32,
}

impl WheelPlant {
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Advance by `dt` seconds under `drive` in [-1, 1]
    ///
    /// Returns the signed number of whole ticks produced during the step.
    pub fn step(&mut self, drive: f32, dt: f32, params: &PlantParams) -> i64 {
        if dt <= 0.0 {
            return 0;
        }
        let steady = drive.clamp(-1.0, 1.0) * params.free_speed;
        let blend = (dt / params.time_constant).min(1.0);
        self.speed += (steady - self.speed) * blend;

        self.accumulator += self.speed * dt;
        let whole = self.accumulator.trunc();
        self.accumulator -= whole;
        whole as i64
    }
}

pub struct SimulatedBase {
    // Signed output per wheel as last applied
    outputs: Arc<[AtomicI32; 4]>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedBase {
    /// Start the plant thread feeding `encoders`
    pub fn spawn(encoders: Arc<EncoderBank>, params: PlantParams) -> Self {
        let outputs: Arc<[AtomicI32; 4]> = Arc::new(Default::default());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let outputs = Arc::clone(&outputs);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let mut plants: [WheelPlant; 4] = Default::default();
                let mut last = Instant::now();

                while running.load(Ordering::Relaxed) {
                    thread::sleep(params.step);
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;

                    for wheel in Wheel::ALL {
                        let i = wheel.index();
                        let drive =
                            outputs[i].load(Ordering::Relaxed) as f32 / ACTUATOR_OUTPUT_MAX as f32;
                        let ticks = plants[i].step(drive, dt, &params);
                        for _ in 0..ticks.abs() {
                            encoders.capture(wheel, ticks > 0);
                        }
                    }
                }
                debug!("Simulated base thread stopped");
            })
        };

        info!(
            "Simulated base started: {} ticks/s free speed, {}s time constant",
            params.free_speed, params.time_constant
        );

        Self {
            outputs,
            running,
            thread_handle: Some(handle),
        }
    }

    /// Signed outputs currently applied [front_left, front_right, rear_right, rear_left]
    pub fn outputs(&self) -> [i32; 4] {
        Wheel::ALL.map(|wheel| self.outputs[wheel.index()].load(Ordering::Relaxed))
    }
}

impl MotorActuator for SimulatedBase {
    fn apply(&mut self, wheel: Wheel, output: MotorOutput) -> Result<()> {
        self.outputs[wheel.index()].store(output.signed(), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for SimulatedBase {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_settles_at_free_speed() {
        let params = PlantParams::default();
        let mut plant = WheelPlant::default();
        let mut ticks = 0;
        for _ in 0..2000 {
            ticks += plant.step(1.0, 0.001, &params);
        }
        assert!(
            (plant.speed() - params.free_speed).abs() < 1.0,
            "Plant speed {} did not settle",
            plant.speed()
        );
        assert!(ticks > 900 && ticks < 1200, "Unexpected tick count {}", ticks);
    }

    #[test]
    fn test_plant_reverse_produces_negative_ticks() {
        let params = PlantParams::default();
        let mut plant = WheelPlant::default();
        let ticks: i64 = (0..500).map(|_| plant.step(-0.5, 0.001, &params)).sum();
        assert!(ticks < 0);
    }

    #[test]
    fn test_plant_zero_dt() {
        let mut plant = WheelPlant::default();
        assert_eq!(plant.step(1.0, 0.0, &PlantParams::default()), 0);
        assert_eq!(plant.speed(), 0.0);
    }

    #[test]
    fn test_simulated_base_moves_encoders() {
        let encoders = Arc::new(EncoderBank::new());
        let mut base = SimulatedBase::spawn(Arc::clone(&encoders), PlantParams::default());

        base.apply(Wheel::FrontRight, MotorOutput::from_command(1.0, 1))
            .unwrap();
        assert_eq!(base.outputs()[1], ACTUATOR_OUTPUT_MAX as i32);

        thread::sleep(Duration::from_millis(300));
        drop(base);

        let positions = encoders.positions();
        assert!(positions[1] > 0, "Front-right did not move: {:?}", positions);
        assert_eq!(positions[0], 0);
    }
}
