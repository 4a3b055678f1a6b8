//! Trapezoidal motion profile
//!
//! Generates a motion setpoint which accelerates at a constant rate up to a
//! maximum velocity, cruises, then decelerates at the same rate into the goal.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity and acceleration limits of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Units: position units/second
    pub max_velocity: f64,

    /// Units: position units/second^2
    pub max_acceleration: f64,
}

/// A point on the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

/// A trapezoidal profile with fixed constraints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrapezoidProfile {
    constraints: Constraints,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ProfileState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }

    fn scaled(&self, direction: f64) -> Self {
        Self {
            position: self.position * direction,
            velocity: self.velocity * direction,
        }
    }
}

impl TrapezoidProfile {
    pub fn new(constraints: Constraints) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> Constraints {
        self.constraints
    }

    /// Calculate the state of the profile `t_s` seconds after `current`, on
    /// the way to `goal`.
    pub fn calculate(
        &self,
        t_s: f64,
        current: ProfileState,
        goal: ProfileState
    ) -> ProfileState {
        let max_v = self.constraints.max_velocity;
        let max_a = self.constraints.max_acceleration;

        // Work in a frame where the goal is always ahead
        let direction = if current.position > goal.position { -1f64 } else { 1f64 };
        let mut current = current.scaled(direction);
        let goal = goal.scaled(direction);

        if current.velocity > max_v {
            current.velocity = max_v;
        }

        // Portions of the full trapezoid already covered (or never reached)
        // because the current and goal velocities are non-zero.
        let cutoff_begin_s = current.velocity / max_a;
        let cutoff_dist_begin = cutoff_begin_s * cutoff_begin_s * max_a / 2.0;

        let cutoff_end_s = goal.velocity / max_a;
        let cutoff_dist_end = cutoff_end_s * cutoff_end_s * max_a / 2.0;

        let full_trapezoid_dist = cutoff_dist_begin
            + (goal.position - current.position)
            + cutoff_dist_end;
        let mut accel_time_s = max_v / max_a;

        let mut full_speed_dist = full_trapezoid_dist - accel_time_s * accel_time_s * max_a;

        // Triangular profile, max velocity is never reached
        if full_speed_dist < 0.0 {
            accel_time_s = (full_trapezoid_dist / max_a).sqrt();
            full_speed_dist = 0.0;
        }

        let end_accel_s = accel_time_s - cutoff_begin_s;
        let end_full_speed_s = end_accel_s + full_speed_dist / max_v;
        let end_decel_s = end_full_speed_s + accel_time_s - cutoff_end_s;

        let mut result = current;

        if t_s < end_accel_s {
            result.velocity += t_s * max_a;
            result.position += (current.velocity + t_s * max_a / 2.0) * t_s;
        }
        else if t_s < end_full_speed_s {
            result.velocity = max_v;
            result.position += (current.velocity + end_accel_s * max_a / 2.0) * end_accel_s
                + max_v * (t_s - end_accel_s);
        }
        else if t_s <= end_decel_s {
            let time_left_s = end_decel_s - t_s;
            result.velocity = goal.velocity + time_left_s * max_a;
            result.position = goal.position
                - (goal.velocity + time_left_s * max_a / 2.0) * time_left_s;
        }
        else {
            result = goal;
        }

        result.scaled(direction)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn profile() -> TrapezoidProfile {
        TrapezoidProfile::new(Constraints {
            max_velocity: 1.0,
            max_acceleration: 2.0
        })
    }

    #[test]
    fn test_reaches_goal() {
        let p = profile();
        let goal = ProfileState::new(3.0, 0.0);
        let mut state = ProfileState::default();

        for _ in 0..500 {
            state = p.calculate(0.02, state, goal);
        }

        assert_eq!(state, goal);
    }

    #[test]
    fn test_respects_constraints() {
        let p = profile();
        let goal = ProfileState::new(-3.0, 0.0);
        let mut state = ProfileState::default();

        for _ in 0..500 {
            let next = p.calculate(0.02, state, goal);
            assert!(next.velocity.abs() <= 1.0 + 1e-9);
            assert!((next.velocity - state.velocity).abs() <= 2.0 * 0.02 + 1e-9);
            state = next;
        }

        assert_eq!(state, goal);
    }

    #[test]
    fn test_first_step_accelerates() {
        let p = profile();
        let s = p.calculate(0.1, ProfileState::default(), ProfileState::new(10.0, 0.0));
        assert!((s.velocity - 0.2).abs() < 1e-12);
        assert!((s.position - 0.01).abs() < 1e-12);
    }
}
