//! PID controller which follows a trapezoidal profile towards its goal

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::{input_modulus, Constraints, PidController, ProfileState, TrapezoidProfile};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distance under which the setpoint is considered to have reached the goal.
const GOAL_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller whose setpoint moves towards the goal along a
/// [`TrapezoidProfile`] rather than stepping straight to it.
#[derive(Debug, Clone, Serialize)]
pub struct ProfiledPidController {
    pid: PidController,
    profile: TrapezoidProfile,
    goal: ProfileState,
    setpoint: ProfileState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ProfiledPidController {
    pub fn new(k_p: f64, k_i: f64, k_d: f64, constraints: Constraints) -> Self {
        Self {
            pid: PidController::new(k_p, k_i, k_d),
            profile: TrapezoidProfile::new(constraints),
            goal: ProfileState::default(),
            setpoint: ProfileState::default(),
        }
    }

    pub fn enable_continuous_input(&mut self, min: f64, max: f64) {
        self.pid.enable_continuous_input(min, max);
    }

    pub fn set_tolerance(&mut self, position_tolerance: f64, velocity_tolerance: f64) {
        self.pid.set_tolerance(position_tolerance, velocity_tolerance);
    }

    /// Restart the profile from the given measured position and velocity.
    pub fn reset(&mut self, measurement: f64, velocity: f64) {
        self.pid.reset();
        self.setpoint = ProfileState::new(measurement, velocity);
    }

    /// Set a stationary goal position.
    pub fn set_goal(&mut self, goal: f64) {
        self.goal = ProfileState::new(goal, 0.0);
    }

    pub fn goal(&self) -> ProfileState {
        self.goal
    }

    /// The current profile setpoint. Its velocity is a useful feedforward.
    pub fn setpoint(&self) -> ProfileState {
        self.setpoint
    }

    /// Advance the profile by `dt_s` seconds and return the PID output for
    /// the given measurement.
    pub fn calculate(&mut self, measurement: f64, dt_s: f64) -> f64 {
        // For continuous inputs move the goal and setpoint to the copies
        // nearest the measurement so the profile takes the short way round.
        if let Some((min, max)) = self.pid.continuous_range() {
            let bound = (max - min) / 2.0;
            let goal_dist = input_modulus(self.goal.position - measurement, -bound, bound);
            let setpoint_dist = input_modulus(self.setpoint.position - measurement, -bound, bound);

            self.goal.position = measurement + goal_dist;
            self.setpoint.position = measurement + setpoint_dist;
        }

        self.setpoint = self.profile.calculate(dt_s, self.setpoint, self.goal);

        self.pid.calculate(measurement, self.setpoint.position, dt_s)
    }

    /// Returns true once the profile has finished and the measurement is
    /// within tolerance of the goal.
    pub fn at_goal(&self) -> bool {
        self.pid.at_setpoint()
            && (self.goal.position - self.setpoint.position).abs() < GOAL_EPSILON
            && (self.goal.velocity - self.setpoint.velocity).abs() < GOAL_EPSILON
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_converges_on_ideal_plant() {
        let mut ctrl = ProfiledPidController::new(
            5.0, 0.0, 0.0,
            Constraints { max_velocity: 2.0, max_acceleration: 4.0 }
        );
        ctrl.set_tolerance(0.01, std::f64::INFINITY);
        ctrl.reset(0.0, 0.0);
        ctrl.set_goal(1.0);

        // Plant follows the commanded velocity exactly
        let dt = 0.02;
        let mut position = 0.0;
        for _ in 0..200 {
            let out = ctrl.calculate(position, dt) + ctrl.setpoint().velocity;
            position += out * dt;
        }

        ctrl.calculate(position, dt);
        assert!((position - 1.0).abs() < 0.01);
        assert!(ctrl.at_goal());
    }

    #[test]
    fn test_continuous_takes_short_way() {
        let mut ctrl = ProfiledPidController::new(
            1.0, 0.0, 0.0,
            Constraints { max_velocity: 10.0, max_acceleration: 10.0 }
        );
        ctrl.enable_continuous_input(-PI, PI);
        ctrl.reset(PI - 0.1, 0.0);
        ctrl.set_goal(-PI + 0.1);

        ctrl.calculate(PI - 0.1, 0.02);

        // Setpoint moves upwards through +pi rather than down through zero
        assert!(ctrl.setpoint().velocity > 0.0);
        assert!(ctrl.goal().position > PI);
    }
}
