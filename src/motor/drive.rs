// Drive controller for the Mecanum base
//
// Owns the encoder bank, the per-wheel PID loops, the control mode and the
// last body command. Mode changes only happen through `set_mode`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::actuator::{MotorActuator, MotorOutput};
use super::encoder::{EncoderBank, VelocityEstimator};
use super::kinematics::{clamp_unstable, mix, Wheel, WheelCommands};
use super::pid::{PidController, PidGains};
use crate::config::{ESTIMATION_PERIOD, MAX_WHEEL_SPEED, MOTOR_POLARITY, PID_GAINS, PID_PERIOD};
use crate::messages::{BodyVelocity, ControlMode, EncoderTelemetry};

/// Tuning the drive controller is built with
#[derive(Debug, Clone, Copy)]
pub struct DriveConfig {
    pub pid_gains: [PidGains; 4],
    pub polarity: [i8; 4],
    /// ticks/s at full normalized command
    pub max_wheel_speed: f32,
    pub pid_period: Duration,
    pub estimation_period: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            pid_gains: PID_GAINS,
            polarity: MOTOR_POLARITY,
            max_wheel_speed: MAX_WHEEL_SPEED,
            pid_period: PID_PERIOD,
            estimation_period: ESTIMATION_PERIOD,
        }
    }
}

pub struct DriveController<A: MotorActuator> {
    actuator: A,
    encoders: Arc<EncoderBank>,
    estimator: VelocityEstimator,
    pids: [PidController; 4],
    config: DriveConfig,
    mode: ControlMode,
    command: BodyVelocity,
    targets: WheelCommands, // ticks/s, closed-loop only
    last_pid: Instant,
}

impl<A: MotorActuator> DriveController<A> {
    /// Create a controller with its own encoder bank
    pub fn new(actuator: A, config: DriveConfig, now: Instant) -> Self {
        Self::with_encoders(actuator, Arc::new(EncoderBank::new()), config, now)
    }

    /// Create a controller reading an encoder bank fed by an existing capture source
    ///
    /// Starts in manual mode with every motor released.
    pub fn with_encoders(
        actuator: A,
        encoders: Arc<EncoderBank>,
        config: DriveConfig,
        now: Instant,
    ) -> Self {
        let mut drive = Self {
            actuator,
            encoders,
            estimator: VelocityEstimator::new(config.estimation_period, now),
            pids: config.pid_gains.map(PidController::new),
            config,
            mode: ControlMode::Manual,
            command: BodyVelocity::zero(),
            targets: WheelCommands::zero(),
            last_pid: now,
        };
        drive.release_all();
        drive
    }

    /// Handle for the capture path (interrupt handler, simulator)
    pub fn encoders(&self) -> Arc<EncoderBank> {
        Arc::clone(&self.encoders)
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn command(&self) -> BodyVelocity {
        self.command
    }

    /// Closed-loop wheel targets in ticks/s
    pub fn targets(&self) -> WheelCommands {
        self.targets
    }

    /// Latest velocity estimate in ticks/s
    pub fn speeds(&self) -> [f32; 4] {
        self.estimator.speeds()
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// Switch control mode
    ///
    /// Always clears the body command and wheel targets. Entering manual
    /// releases every motor right away. PID state carries over in both
    /// directions; entering closed-loop only restarts the PID timer.
    pub fn set_mode(&mut self, mode: ControlMode, now: Instant) {
        info!("Control mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.command = BodyVelocity::zero();
        self.targets = WheelCommands::zero();

        match mode {
            ControlMode::Manual => self.release_all(),
            // The manual period must not show up as one huge PID dt
            ControlMode::ClosedLoop => self.last_pid = now,
        }
    }

    /// Take a new body velocity command
    ///
    /// Manual mode actuates immediately, once. Closed-loop mode only updates
    /// the wheel targets; the PID service does the actuation.
    pub fn set_command(&mut self, cmd: BodyVelocity) {
        let cmd = clamp_unstable(cmd);
        self.command = cmd;

        let wheels = mix(cmd);
        match self.mode {
            ControlMode::Manual => {
                debug!("Open-loop wheels: {:?}", wheels.as_array());
                for wheel in Wheel::ALL {
                    self.drive_wheel(wheel, wheels.get(wheel));
                }
            }
            ControlMode::ClosedLoop => {
                self.targets = wheels.scaled(self.config.max_wheel_speed);
                debug!("Closed-loop targets: {:?}", self.targets.as_array());
            }
        }
    }

    /// Refresh wheel speeds from the encoders, in every mode
    pub fn estimate_velocities(&mut self, now: Instant) -> bool {
        self.estimator.sample(&self.encoders, now)
    }

    /// Run one PID step per wheel if in closed-loop and a period has elapsed
    ///
    /// Calls inside the period are no-ops. Returns true when the motors were
    /// driven.
    pub fn service_pid(&mut self, now: Instant) -> bool {
        if self.mode != ControlMode::ClosedLoop {
            return false;
        }

        let elapsed = now.saturating_duration_since(self.last_pid);
        if elapsed < self.config.pid_period {
            return false;
        }
        let dt = elapsed.as_secs_f32();
        self.last_pid = now;

        let speeds = self.estimator.speeds();
        for wheel in Wheel::ALL {
            let i = wheel.index();
            let output = self.pids[i].update(self.targets.get(wheel), speeds[i], dt);
            self.drive_wheel(wheel, output);
        }
        true
    }

    /// Stop everything, regardless of mode. Safe to call repeatedly.
    pub fn emergency_stop(&mut self) {
        self.command = BodyVelocity::zero();
        self.targets = WheelCommands::zero();
        self.release_all();
    }

    pub fn telemetry(&self) -> EncoderTelemetry {
        EncoderTelemetry {
            ticks: self.encoders.positions(),
            speeds: self.estimator.speeds(),
        }
    }

    fn drive_wheel(&mut self, wheel: Wheel, command: f32) {
        let output = MotorOutput::from_command(command, self.config.polarity[wheel.index()]);
        if let Err(e) = self.actuator.apply(wheel, output) {
            warn!("Failed to drive {:?}: {}", wheel, e);
        }
    }

    // Every wheel is attempted even if one fails
    fn release_all(&mut self) {
        for wheel in Wheel::ALL {
            if let Err(e) = self.actuator.apply(wheel, MotorOutput::released()) {
                warn!("Failed to release {:?}: {}", wheel, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::actuator::{ActuatorError, Direction, RecordingActuator};

    fn drive(now: Instant) -> DriveController<RecordingActuator> {
        DriveController::new(RecordingActuator::new(), DriveConfig::default(), now)
    }

    #[test]
    fn test_starts_manual_and_released() {
        let t0 = Instant::now();
        let drive = drive(t0);
        assert_eq!(drive.mode(), ControlMode::Manual);
        assert!(drive.actuator().all_released());
    }

    #[test]
    fn test_manual_command_actuates_immediately() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_command(BodyVelocity::new(0.5, 0.0, 0.0));

        for wheel in Wheel::ALL {
            let out = drive.actuator().output(wheel);
            assert_eq!(out.magnitude, 100);
            assert_eq!(out.direction, Direction::Forward);
        }
        // No persistent loop in manual
        assert!(!drive.service_pid(t0 + Duration::from_secs(1)));
        assert_eq!(drive.targets(), WheelCommands::zero());
    }

    #[test]
    fn test_manual_command_is_clamped() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_command(BodyVelocity::new(0.0, 0.5, 0.5));
        assert_eq!(drive.command(), BodyVelocity::new(0.0, 0.5, 0.0));
        // Pure strafe after the clamp
        assert_eq!(drive.actuator().output(Wheel::FrontLeft).signed(), -100);
        assert_eq!(drive.actuator().output(Wheel::FrontRight).signed(), 100);
    }

    #[test]
    fn test_closed_loop_command_sets_targets_only() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        let writes = drive.actuator().writes();

        drive.set_command(BodyVelocity::new(0.4, 0.0, 0.0));
        assert_eq!(drive.targets().as_array(), [200.0; 4]);
        assert_eq!(drive.actuator().writes(), writes, "Closed-loop must not actuate on intake");
    }

    #[test]
    fn test_switch_to_manual_zeroes_targets_and_stops() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(1.0, 0.0, 0.0));
        assert!(drive.service_pid(t0 + PID_PERIOD));
        assert!(!drive.actuator().all_released());

        drive.set_mode(ControlMode::Manual, t0 + PID_PERIOD);
        assert_eq!(drive.targets(), WheelCommands::zero());
        assert_eq!(drive.command(), BodyVelocity::zero());
        assert!(drive.actuator().all_released());

        // Later manual command is one-shot open loop
        drive.set_command(BodyVelocity::new(0.25, 0.0, 0.0));
        assert_eq!(drive.actuator().output(Wheel::RearLeft).signed(), 50);
        assert!(!drive.service_pid(t0 + Duration::from_secs(5)));
        assert_eq!(drive.actuator().output(Wheel::RearLeft).signed(), 50);
    }

    #[test]
    fn test_pid_service_is_rate_limited() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(0.1, 0.0, 0.0));

        assert!(!drive.service_pid(t0 + Duration::from_millis(5)));
        assert!(drive.service_pid(t0 + PID_PERIOD));
        assert!(!drive.service_pid(t0 + PID_PERIOD + Duration::from_millis(10)));
        assert!(drive.service_pid(t0 + PID_PERIOD * 2));
    }

    #[test]
    fn test_pid_drives_toward_target() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        // Target 50 ticks/s, measured 0: kp 0.005 gives 0.25
        drive.set_command(BodyVelocity::new(0.1, 0.0, 0.0));
        drive.service_pid(t0 + PID_PERIOD);
        for wheel in Wheel::ALL {
            assert_eq!(drive.actuator().output(wheel).signed(), 50);
        }
    }

    #[test]
    fn test_pid_output_respects_polarity() {
        let t0 = Instant::now();
        let config = DriveConfig {
            polarity: [1, -1, 1, -1],
            ..DriveConfig::default()
        };
        let mut drive = DriveController::new(RecordingActuator::new(), config, t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(0.1, 0.0, 0.0));
        drive.service_pid(t0 + PID_PERIOD);

        assert_eq!(drive.actuator().output(Wheel::FrontLeft).direction, Direction::Forward);
        assert_eq!(drive.actuator().output(Wheel::FrontRight).direction, Direction::Backward);
        assert_eq!(drive.actuator().output(Wheel::RearLeft).direction, Direction::Backward);
    }

    #[test]
    fn test_pid_uses_measured_speed() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(0.1, 0.0, 0.0));

        // Front-left already at target speed (5 ticks in 100ms = 50 ticks/s)
        let encoders = drive.encoders();
        for _ in 0..5 {
            encoders.capture(Wheel::FrontLeft, true);
        }
        assert!(drive.estimate_velocities(t0 + ESTIMATION_PERIOD));
        drive.service_pid(t0 + ESTIMATION_PERIOD);

        assert_eq!(drive.actuator().output(Wheel::FrontLeft), MotorOutput::released());
        assert_eq!(drive.actuator().output(Wheel::FrontRight).signed(), 50);
    }

    #[test]
    fn test_estimation_runs_in_manual_mode() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        let encoders = drive.encoders();
        for _ in 0..10 {
            encoders.capture(Wheel::RearRight, false);
        }
        assert!(drive.estimate_velocities(t0 + ESTIMATION_PERIOD));

        let telemetry = drive.telemetry();
        assert_eq!(telemetry.ticks, [0, 0, -10, 0]);
        assert!((telemetry.speeds[2] + 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_emergency_stop_is_idempotent() {
        let t0 = Instant::now();
        let mut drive = drive(t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(0.8, 0.1, 0.0));
        drive.service_pid(t0 + PID_PERIOD);

        drive.emergency_stop();
        drive.emergency_stop();
        assert!(drive.actuator().all_released());
        assert_eq!(drive.targets(), WheelCommands::zero());
        assert_eq!(drive.command(), BodyVelocity::zero());
        // Mode is left alone
        assert_eq!(drive.mode(), ControlMode::ClosedLoop);

        // With zero targets the PID keeps the wheels stopped
        drive.service_pid(t0 + PID_PERIOD * 2);
        assert!(drive.actuator().all_released());
    }

    #[test]
    fn test_integral_survives_manual_round_trip() {
        let t0 = Instant::now();
        let gains = PidGains {
            ki: 0.001,
            ..PidGains::DEFAULT
        };
        let config = DriveConfig {
            pid_gains: [gains; 4],
            ..DriveConfig::default()
        };
        let mut drive = DriveController::new(RecordingActuator::new(), config, t0);
        drive.set_mode(ControlMode::ClosedLoop, t0);
        drive.set_command(BodyVelocity::new(0.1, 0.0, 0.0));
        assert!(drive.service_pid(t0 + PID_PERIOD));

        // Error 50 ticks/s over 20 ms
        let integral = drive.pids[0].integral();
        assert!((integral - 1.0).abs() < 1e-4, "Got {}", integral);

        drive.set_mode(ControlMode::Manual, t0 + PID_PERIOD * 2);
        assert_eq!(drive.pids[0].integral(), integral);

        let reentry = t0 + Duration::from_secs(10);
        drive.set_mode(ControlMode::ClosedLoop, reentry);
        for pid in &drive.pids {
            assert_eq!(pid.integral(), integral);
        }

        // The manual period is not fed to the PID as dt
        assert!(!drive.service_pid(reentry + Duration::from_millis(5)));
        assert!(drive.service_pid(reentry + PID_PERIOD));
    }

    struct FailingFrontLeft(RecordingActuator);

    impl MotorActuator for FailingFrontLeft {
        fn apply(&mut self, wheel: Wheel, output: MotorOutput) -> crate::motor::actuator::Result<()> {
            if wheel == Wheel::FrontLeft {
                return Err(ActuatorError::Rejected {
                    wheel,
                    reason: "bus fault".to_string(),
                });
            }
            self.0.apply(wheel, output)
        }
    }

    #[test]
    fn test_stop_reaches_other_wheels_when_one_fails() {
        let t0 = Instant::now();
        let mut drive =
            DriveController::new(FailingFrontLeft(RecordingActuator::new()), DriveConfig::default(), t0);
        drive.set_command(BodyVelocity::new(1.0, 0.0, 0.0));
        assert_eq!(drive.actuator().0.output(Wheel::RearLeft).signed(), 200);

        drive.emergency_stop();
        assert!(drive.actuator().0.all_released());
    }
}
