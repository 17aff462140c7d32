// Communication watchdog
// Forces an emergency stop when the upstream controller goes quiet. Every
// overdue check stops again; there is no latch and no retry counter.

use std::time::{Duration, Instant};

use crate::messages::RuntimeHealth;
use crate::motor::{DriveController, MotorActuator};

pub struct Watchdog {
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_overdue(&self, last_accepted: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_accepted) > self.timeout
    }

    /// Stop the drive if the last accepted command is older than the timeout
    pub fn check<A: MotorActuator>(
        &self,
        last_accepted: Instant,
        now: Instant,
        drive: &mut DriveController<A>,
    ) -> RuntimeHealth {
        if self.is_overdue(last_accepted, now) {
            drive.emergency_stop();
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::BodyVelocity;
    use crate::motor::{DriveConfig, RecordingActuator};

    #[test]
    fn test_fresh_command_is_healthy() {
        let t0 = Instant::now();
        let watchdog = Watchdog::new(Duration::from_millis(500));
        let mut drive = DriveController::new(RecordingActuator::new(), DriveConfig::default(), t0);
        drive.set_command(BodyVelocity::new(0.5, 0.0, 0.0));

        let health = watchdog.check(t0, t0 + Duration::from_millis(500), &mut drive);
        assert_eq!(health, RuntimeHealth::Ok);
        assert!(!drive.actuator().all_released());
    }

    #[test]
    fn test_overdue_stops_every_check() {
        let t0 = Instant::now();
        let watchdog = Watchdog::new(Duration::from_millis(500));
        let mut drive = DriveController::new(RecordingActuator::new(), DriveConfig::default(), t0);
        drive.set_command(BodyVelocity::new(0.5, 0.0, 0.0));

        let writes = drive.actuator().writes();
        let health = watchdog.check(t0, t0 + Duration::from_millis(501), &mut drive);
        assert_eq!(health, RuntimeHealth::CmdStale);
        assert!(drive.actuator().all_released());
        // One stop = one release per wheel
        assert_eq!(drive.actuator().writes(), writes + 4);

        watchdog.check(t0, t0 + Duration::from_millis(502), &mut drive);
        assert_eq!(drive.actuator().writes(), writes + 8);
    }

    #[test]
    fn test_clock_before_last_command_is_not_overdue() {
        let t0 = Instant::now();
        let watchdog = Watchdog::new(Duration::from_millis(500));
        assert!(!watchdog.is_overdue(t0 + Duration::from_secs(1), t0));
    }
}
