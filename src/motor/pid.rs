// Discrete PID with output saturation, conditional integration and a
// low-pass filtered derivative. One instance per wheel.

/// Fixed tuning for one controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub out_min: f32,
    pub out_max: f32,
    /// Derivative filter coefficient in (0, 1]: 1.0 = unfiltered
    pub alpha: f32,
}

impl PidGains {
    /// Conservative starting point: pure proportional, normalized output
    pub const DEFAULT: PidGains = PidGains {
        kp: 0.005,
        ki: 0.0,
        kd: 0.0,
        out_min: -1.0,
        out_max: 1.0,
        alpha: 0.2,
    };
}

impl Default for PidGains {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub struct PidController {
    gains: PidGains,
    // Internal state
    integral: f32,
    previous_error: f32,
    filtered_derivative: f32,
    last_output: f32,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            previous_error: 0.0,
            filtered_derivative: 0.0,
            last_output: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.filtered_derivative = 0.0;
        self.last_output = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Compute the saturated output for one step
    ///
    /// `dt` is in seconds. A non-positive `dt` or a non-finite input leaves
    /// the state untouched and returns the previous output.
    pub fn update(&mut self, target: f32, measured: f32, dt: f32) -> f32 {
        if dt <= 0.0 || !target.is_finite() || !measured.is_finite() {
            return self.last_output;
        }

        let PidGains {
            kp,
            ki,
            kd,
            out_min,
            out_max,
            alpha,
        } = self.gains;

        let error = target - measured;

        // Candidate integral, only committed if the output is not saturated
        let candidate_integral = self.integral + error * dt;

        let raw_derivative = (error - self.previous_error) / dt;
        self.filtered_derivative = alpha * raw_derivative + (1.0 - alpha) * self.filtered_derivative;

        let unbounded = kp * error + ki * candidate_integral + kd * self.filtered_derivative;

        let output = if unbounded > out_max {
            out_max
        } else if unbounded < out_min {
            out_min
        } else {
            self.integral = candidate_integral;
            unbounded
        };

        self.previous_error = error;
        self.last_output = output;
        output
    }
}
