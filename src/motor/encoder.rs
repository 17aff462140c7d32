// Quadrature encoder capture and wheel velocity estimation
//
// Capture runs on whatever context delivers edge events (GPIO interrupt
// thread, simulator thread). Estimation runs on the control loop. The two
// only share the atomic counters in `WheelEncoder`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::kinematics::Wheel;

/// Tick counters for one wheel
#[derive(Debug, Default)]
pub struct WheelEncoder {
    // Net ticks since start, never cleared
    position: AtomicI64,
    // Ticks since the last velocity sample
    pending_delta: AtomicI64,
}

impl WheelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rising edge on the primary channel
    ///
    /// The secondary channel level gives the direction: high counts +1,
    /// low counts -1. Wheel polarity is corrected downstream, not here.
    pub fn on_edge(&self, secondary_high: bool) {
        let step = if secondary_high { 1 } else { -1 };
        self.position.fetch_add(step, Ordering::SeqCst);
        self.pending_delta.fetch_add(step, Ordering::SeqCst);
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Read and clear the pending delta in one indivisible exchange
    ///
    /// An edge racing with this call lands either in the returned value or
    /// in the next one, never both and never neither.
    pub fn take_delta(&self) -> i64 {
        self.pending_delta.swap(0, Ordering::SeqCst)
    }
}

/// The four wheel encoders, shared between capture and control
#[derive(Debug, Default)]
pub struct EncoderBank {
    wheels: [WheelEncoder; 4],
}

impl EncoderBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture entry point for an edge on `wheel`
    pub fn capture(&self, wheel: Wheel, secondary_high: bool) {
        self.wheels[wheel.index()].on_edge(secondary_high);
    }

    pub fn wheel(&self, wheel: Wheel) -> &WheelEncoder {
        &self.wheels[wheel.index()]
    }

    /// Absolute tick counts [front_left, front_right, rear_right, rear_left]
    pub fn positions(&self) -> [i64; 4] {
        Wheel::ALL.map(|wheel| self.wheel(wheel).position())
    }

    pub fn take_deltas(&self) -> [i64; 4] {
        Wheel::ALL.map(|wheel| self.wheel(wheel).take_delta())
    }
}

/// Turns encoder deltas into ticks/s on a fixed cadence
pub struct VelocityEstimator {
    period: Duration,
    last_sample: Instant,
    speeds: [f32; 4],
}

impl VelocityEstimator {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            last_sample: now,
            speeds: [0.0; 4],
        }
    }

    /// Latest estimate in ticks/s, stale between samples
    pub fn speeds(&self) -> [f32; 4] {
        self.speeds
    }

    /// Sample the encoders if a full period has elapsed
    ///
    /// `dt` is measured from the previous sample so scheduling jitter does
    /// not bias the estimate. Returns true when a new sample was taken.
    pub fn sample(&mut self, encoders: &EncoderBank, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed < self.period {
            return false;
        }

        let dt = elapsed.as_secs_f32();
        if dt <= 0.0 {
            // Zero-length window: hold the previous speeds, keep ticks pending
            return false;
        }
        self.last_sample = now;

        let deltas = encoders.take_deltas();
        for (speed, delta) in self.speeds.iter_mut().zip(deltas) {
            *speed = delta as f32 / dt;
        }
        true
    }
}
