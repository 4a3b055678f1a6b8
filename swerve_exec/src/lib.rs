//! # Swerve drive library.
//!
//! This library holds the whole swerve drive core so that the executable,
//! benches and other crates in the workspace can access it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Actuator abstraction - vendor independent motor controllers, with simulated and PWM backends
pub mod actuator;

/// Control - PID, trapezoid motion profiles and profiled PID
pub mod control;

/// Drivetrain - coordinates the four modules, kinematics and closed loop commands
pub mod drivetrain;

/// Feedforward - static, velocity, acceleration and gravity voltage terms
pub mod feedforward;

/// Localisation - the robot's pose in the field
pub mod loc;

/// Odometry - high rate sampling, sample fusion and pose integration
pub mod odometry;

/// Module state optimisation - minimal steering moves and coupling compensation
pub mod optimizer;

/// Swerve module - one drive and one steer actuator acting as a wheel
pub mod swerve_module;
