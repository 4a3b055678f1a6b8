//! PID controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::input_modulus;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
///
/// Time steps are passed in explicitly so that the same controller can run
/// inside the main loop, the simulated actuator physics or a test.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// Rate of change of the error on the last update
    error_rate: f64,

    /// The integral accumulation
    integral: f64,

    /// Range over which the input wraps, if it is continuous
    continuous_range: Option<(f64, f64)>,

    /// Error below which the setpoint is considered reached
    position_tolerance: f64,

    /// Error rate below which the setpoint is considered reached
    velocity_tolerance: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {

    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p, k_i, k_d,
            integral: 0f64,
            prev_error: None,
            error_rate: 0f64,
            continuous_range: None,
            position_tolerance: 0.05,
            velocity_tolerance: std::f64::INFINITY,
        }
    }

    /// Replace the gains, keeping the accumulated state.
    pub fn set_gains(&mut self, k_p: f64, k_i: f64, k_d: f64) {
        self.k_p = k_p;
        self.k_i = k_i;
        self.k_d = k_d;
    }

    /// Treat the input as continuous between `min` and `max`, so errors are
    /// always taken the short way round.
    pub fn enable_continuous_input(&mut self, min: f64, max: f64) {
        self.continuous_range = Some((min, max));
    }

    /// Get the continuous input range, if enabled.
    pub fn continuous_range(&self) -> Option<(f64, f64)> {
        self.continuous_range
    }

    /// Set the tolerances used by [`PidController::at_setpoint`].
    pub fn set_tolerance(&mut self, position_tolerance: f64, velocity_tolerance: f64) {
        self.position_tolerance = position_tolerance;
        self.velocity_tolerance = velocity_tolerance;
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
        self.error_rate = 0f64;
    }

    /// Get the output of the controller for the given measurement and
    /// setpoint over a step of `dt_s` seconds.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, dt_s: f64) -> f64 {
        let mut error = setpoint - measurement;

        if let Some((min, max)) = self.continuous_range {
            let bound = (max - min) / 2.0;
            error = input_modulus(error, -bound, bound);
        }

        self.get(error, dt_s)
    }

    /// Get the value of the controller for the given error over a step of
    /// `dt_s` seconds.
    pub fn get(&mut self, error: f64, dt_s: f64) -> f64 {
        // A non-positive time step can't be integrated or differentiated, so
        // only the proportional term contributes.
        let dt = if dt_s > 0f64 { Some(dt_s) } else { None };

        // Accumulate the integral term.
        self.integral += match dt {
            Some(t) => error * t,
            None => 0f64
        };

        // Calculate the derivative. The first update has no history so no
        // derivative is applied rather than a large spike.
        self.error_rate = match (self.prev_error, dt) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64
        };

        // Calculate the output
        let out = 
            self.k_p * error 
            + self.k_i * self.integral 
            + self.k_d * self.error_rate;
        
        // Remember the previous error
        self.prev_error = Some(error);

        out
    }

    /// Returns true if the last error is within the tolerances.
    pub fn at_setpoint(&self) -> bool {
        match self.prev_error {
            Some(e) => e.abs() < self.position_tolerance
                && self.error_rate.abs() < self.velocity_tolerance,
            None => false
        }
    }
}
