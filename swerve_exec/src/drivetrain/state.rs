//! Implementations for the drivetrain state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use nalgebra::{Rotation2, Vector2};
use serde::Serialize;
use std::f64::consts::PI;

// Internal
use super::{
    ChassisSpeeds, CmdStatus, ControllerParams, DriveCmd, DrivetrainError, DrivetrainParams,
    SwerveKinematics, LOCK_HEADINGS_DEG, NUM_MODULES,
};
use crate::control::ProfiledPidController;
use crate::loc::Pose;
use crate::odometry::{fuse, num_discarded, PoseEstimator};
use crate::swerve_module::{ModuleState, SwerveModule};
use util::{maths::clamp, module::State};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Module speed below which the module keeps its current heading rather
/// than steering to the (meaningless) heading of a zero velocity.
///
/// Units: meters/second
const STOPPED_SPEED_MS: f64 = 1e-6;

/// Distance to a target under which there is no meaningful direction to aim
/// in.
///
/// Units: meters
const MIN_AIM_DISTANCE_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drivetrain module state
pub struct Drivetrain {
    params: DrivetrainParams,
    kinematics: SwerveKinematics,

    modules: [SwerveModule; NUM_MODULES],
    estimator: Box<dyn PoseEstimator>,

    x_ctrl: ProfiledPidController,
    y_ctrl: ProfiledPidController,
    rot_ctrl: ProfiledPidController,

    /// Command executed every cycle until replaced or finished.
    active_cmd: Option<DriveCmd>,

    /// Progress of the running closed loop command, if any.
    closed_loop_cmd: Option<ClosedLoopCmd>,

    report: StatusReport,
}

/// Everything the drivetrain needs to start.
pub struct DrivetrainInit {
    pub params: DrivetrainParams,

    /// The modules, in module order.
    pub modules: [SwerveModule; NUM_MODULES],

    pub estimator: Box<dyn PoseEstimator>,
}

/// Input data to the drivetrain.
#[derive(Default)]
pub struct InputData {
    /// A new command, or `None` to continue with the active command.
    pub cmd: Option<DriveCmd>,
}

/// Output of a drivetrain cycle.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OutputData {
    /// Pose estimate after fusing this cycle's samples.
    pub pose: Pose,

    pub module_targets: [ModuleState; NUM_MODULES],

    pub module_states: [ModuleState; NUM_MODULES],
}

/// Status report for drivetrain processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Module speeds were scaled down to stay within the maximum speed.
    pub desaturated: bool,

    /// Number of drivetrain snapshots given to the pose estimator.
    pub samples_fused: usize,

    /// Number of module samples with no partner in the other modules.
    pub samples_discarded: usize,

    /// Progress of the active closed loop command, if there is one.
    pub cmd_status: Option<CmdStatus>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ClosedLoopCmd {
    kind: ClosedLoopKind,
    target: Pose,
    elapsed_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClosedLoopKind {
    ToPose,
    RotateToTarget,
    WithTarget,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for Drivetrain {
    type InitData = DrivetrainInit;
    type InitError = DrivetrainError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = DrivetrainError;

    /// Initialise the drivetrain.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        let params = init_data.params;

        let positive = [
            ("max_speed_ms", params.max_speed_ms),
            ("max_rotation_rads", params.max_rotation_rads),
            ("closed_loop_timeout_s", params.closed_loop_timeout_s),
            ("loop_period_s", params.loop_period_s),
        ];
        for (name, value) in positive.iter() {
            if !(*value > 0.0) {
                return Err(DrivetrainError::InvalidParams(format!("{} must be positive", name)));
            }
        }

        let kinematics = SwerveKinematics::new(params.module_pos_m_rb)?;

        let mut rot_ctrl = profiled(&params.rotation_ctrl);
        rot_ctrl.enable_continuous_input(-PI, PI);

        info!("Drivetrain initialised with {} modules", NUM_MODULES);

        Ok(Self {
            x_ctrl: profiled(&params.translation_ctrl),
            y_ctrl: profiled(&params.translation_ctrl),
            rot_ctrl,
            params,
            kinematics,
            modules: init_data.modules,
            estimator: init_data.estimator,
            active_cmd: None,
            closed_loop_cmd: None,
            report: StatusReport::default(),
        })
    }

    /// Perform cyclic processing of the drivetrain.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        // Acquire telemetry
        for m in self.modules.iter_mut() {
            m.periodic()?;
        }

        // Fuse the samples into the pose before acting on it
        self.update_odometry();

        // Check to see if there's a new command
        if let Some(cmd) = input_data.cmd {
            debug!("New drivetrain command: {:?}", cmd);

            match cmd {
                DriveCmd::ResetGyro => self.reset_gyro(),
                _ => {
                    self.active_cmd = Some(cmd);
                    self.closed_loop_cmd = None;
                }
            }
        }

        if let Some(cmd) = self.active_cmd {
            let status = self.execute(cmd)?;

            if cmd == DriveCmd::Stop || status.map_or(false, |s| s.is_terminal()) {
                self.active_cmd = None;
            }

            self.report.cmd_status = status;
        }

        let mut output = OutputData {
            pose: self.pose(),
            module_targets: [ModuleState::default(); NUM_MODULES],
            module_states: [ModuleState::default(); NUM_MODULES],
        };
        for (i, m) in self.modules.iter().enumerate() {
            output.module_targets[i] = m.target_state();
            output.module_states[i] = m.current_state();
        }

        trace!("Drivetrain output: {:?}", output);

        Ok((output, self.report))
    }
}

impl Drivetrain {

    // ---- DRIVE ENTRY POINTS ----

    /// Drive at the given velocity.
    ///
    /// If `field_relative` the translation is in the field frame, otherwise
    /// it is in the robot frame. The rotation rate is limited to the maximum
    /// and module speeds are desaturated.
    pub fn drive_orientation_based(
        &mut self,
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
        field_relative: bool,
        closed_loop: bool
    ) -> Result<(), DrivetrainError> {
        let max_rot = self.params.max_rotation_rads;
        let omega_rads = clamp(&omega_rads, &-max_rot, &max_rot);

        let speeds = if field_relative {
            ChassisSpeeds::from_field_relative(vx_ms, vy_ms, omega_rads, self.pose().heading_rad)
        }
        else {
            ChassisSpeeds::new(vx_ms, vy_ms, omega_rads)
        };

        self.drive(&speeds, closed_loop)
    }

    /// Drive at the given robot frame speeds using closed loop velocity
    /// control.
    pub fn drive_self_relative(&mut self, speeds: &ChassisSpeeds) -> Result<(), DrivetrainError> {
        self.drive(speeds, true)
    }

    /// Run one cycle of driving to a pose.
    ///
    /// The command starts when first called with a target and continues
    /// while called with the same target each cycle.
    pub fn drive_to_pose(&mut self, target: &Pose) -> Result<CmdStatus, DrivetrainError> {
        let target = Pose::new(target.position_m.x, target.position_m.y, target.heading_rad);
        self.ensure_closed_loop(ClosedLoopKind::ToPose, &target);

        if let Some(status) = self.tick_timeout()? {
            return Ok(status);
        }

        let pose = self.pose();
        let dt = self.params.loop_period_s;

        let vx = self.x_ctrl.calculate(pose.position_m.x, dt) + self.x_ctrl.setpoint().velocity;
        let vy = self.y_ctrl.calculate(pose.position_m.y, dt) + self.y_ctrl.setpoint().velocity;
        let omega = self.rot_ctrl.calculate(pose.heading_rad, dt)
            + self.rot_ctrl.setpoint().velocity;

        if self.x_ctrl.at_goal() && self.y_ctrl.at_goal() && self.rot_ctrl.at_goal() {
            info!("Reached pose {:?}", target);
            self.stop()?;
            return Ok(CmdStatus::Converged);
        }

        self.drive_orientation_based(vx, vy, omega, true, true)?;

        Ok(CmdStatus::Running)
    }

    /// Run one cycle of turning on the spot to face the position of
    /// `target`.
    pub fn rotate_to_target(&mut self, target: &Pose) -> Result<CmdStatus, DrivetrainError> {
        self.ensure_closed_loop(ClosedLoopKind::RotateToTarget, target);

        if let Some(status) = self.tick_timeout()? {
            return Ok(status);
        }

        let omega = self.aim_rate(target);

        if self.rot_ctrl.at_goal() {
            info!("Facing target {:?}", target.position_m);
            self.stop()?;
            return Ok(CmdStatus::Converged);
        }

        self.drive_orientation_based(0.0, 0.0, omega, false, true)?;

        Ok(CmdStatus::Running)
    }

    /// Run one cycle of driving while facing the position of `target`.
    ///
    /// This command never finishes on its own, it runs until replaced.
    pub fn drive_with_target(
        &mut self,
        vx_ms: f64,
        vy_ms: f64,
        target: &Pose,
        field_relative: bool
    ) -> Result<CmdStatus, DrivetrainError> {
        self.ensure_closed_loop(ClosedLoopKind::WithTarget, target);

        let omega = self.aim_rate(target);
        self.drive_orientation_based(vx_ms, vy_ms, omega, field_relative, true)?;

        Ok(CmdStatus::Running)
    }

    /// Point the modules inwards at zero speed.
    pub fn lock_swerve(&mut self) -> Result<(), DrivetrainError> {
        self.closed_loop_cmd = None;

        for (m, heading_deg) in self.modules.iter_mut().zip(LOCK_HEADINGS_DEG.iter()) {
            m.set_target_state(ModuleState {
                speed_ms: 0.0,
                heading_rad: heading_deg.to_radians()
            })?;
        }

        Ok(())
    }

    /// Make the current heading the zero heading, keeping the position.
    pub fn reset_gyro(&mut self) {
        let pose = self.estimator.current_pose();

        self.estimator.reset_pose(Pose {
            position_m: pose.position_m,
            heading_rad: 0.0
        });

        info!("Heading reset (was {:.3} rad)", pose.heading_rad);
    }

    /// Replace the pose estimate.
    pub fn reset_pose(&mut self, pose: Pose) {
        self.estimator.reset_pose(pose);
    }

    /// Bring every module to neutral and abandon any closed loop command.
    pub fn stop(&mut self) -> Result<(), DrivetrainError> {
        self.closed_loop_cmd = None;

        for m in self.modules.iter_mut() {
            m.stop()?;
        }

        Ok(())
    }

    // ---- ACCESSORS ----

    /// The current pose estimate.
    pub fn pose(&self) -> Pose {
        self.estimator.current_pose()
    }

    pub fn modules(&self) -> &[SwerveModule; NUM_MODULES] {
        &self.modules
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    /// Robot frame speeds estimated from the modules' current states.
    pub fn self_relative_speeds(&self) -> ChassisSpeeds {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (s, m) in states.iter_mut().zip(self.modules.iter()) {
            *s = m.current_state();
        }

        self.kinematics.to_chassis_speeds(&states)
    }

    pub fn active_cmd(&self) -> Option<DriveCmd> {
        self.active_cmd
    }

    // ---- PRIVATE ----

    fn execute(&mut self, cmd: DriveCmd) -> Result<Option<CmdStatus>, DrivetrainError> {
        let status = match cmd {
            DriveCmd::OrientationBased { vx_ms, vy_ms, omega_rads, field_relative, closed_loop } => {
                self.drive_orientation_based(vx_ms, vy_ms, omega_rads, field_relative, closed_loop)?;
                None
            },
            DriveCmd::ToPose(target) => Some(self.drive_to_pose(&target)?),
            DriveCmd::RotateToTarget(target) => Some(self.rotate_to_target(&target)?),
            DriveCmd::DriveWithTarget { vx_ms, vy_ms, target, field_relative } => {
                Some(self.drive_with_target(vx_ms, vy_ms, &target, field_relative)?)
            },
            DriveCmd::Lock => {
                self.lock_swerve()?;
                None
            },
            DriveCmd::Stop => {
                self.stop()?;
                None
            },
            DriveCmd::ResetGyro => {
                self.reset_gyro();
                None
            }
        };

        Ok(status)
    }

    /// Convert robot frame speeds into module states and dispatch them.
    fn drive(&mut self, speeds: &ChassisSpeeds, closed_loop: bool) -> Result<(), DrivetrainError> {
        let mut states = self.kinematics.to_module_states(speeds);

        if SwerveKinematics::desaturate(&mut states, self.params.max_speed_ms) {
            trace!("Module speeds desaturated");
            self.report.desaturated = true;
        }

        for (m, state) in self.modules.iter_mut().zip(states.iter()) {
            let mut state = *state;
            if state.speed_ms.abs() < STOPPED_SPEED_MS {
                state.heading_rad = m.current_state().heading_rad;
            }

            m.set_closed_loop(closed_loop);
            m.set_target_state(state)?;
        }

        Ok(())
    }

    /// Give this cycle's odometry snapshots to the pose estimator.
    fn update_odometry(&mut self) {
        let m = &self.modules;
        let samples = [
            m[0].odometry_samples(),
            m[1].odometry_samples(),
            m[2].odometry_samples(),
            m[3].odometry_samples(),
        ];

        let snapshots = fuse(&samples);
        self.report.samples_fused = snapshots.len();
        self.report.samples_discarded = num_discarded(&samples);

        if snapshots.is_empty() {
            // Without high rate samples use the positions from this cycle's
            // refresh
            let mut positions = [m[0].position(); NUM_MODULES];
            for (p, module) in positions.iter_mut().zip(m.iter()) {
                *p = module.position();
            }
            self.estimator.update(&positions);
        }
        else {
            for s in snapshots.iter() {
                self.estimator.update(s);
            }
        }
    }

    /// Start a closed loop command, unless the same one is already running.
    fn ensure_closed_loop(&mut self, kind: ClosedLoopKind, target: &Pose) {
        if let Some(c) = &self.closed_loop_cmd {
            if c.kind == kind && c.target == *target {
                return;
            }
        }

        let pose = self.pose();
        let speeds = self.self_relative_speeds();
        let v_field = Rotation2::new(pose.heading_rad) * Vector2::new(speeds.vx_ms, speeds.vy_ms);

        self.x_ctrl.reset(pose.position_m.x, v_field.x);
        self.y_ctrl.reset(pose.position_m.y, v_field.y);
        self.rot_ctrl.reset(pose.heading_rad, speeds.omega_rads);

        self.x_ctrl.set_goal(target.position_m.x);
        self.y_ctrl.set_goal(target.position_m.y);
        self.rot_ctrl.set_goal(target.heading_rad);

        debug!("Starting {:?} command towards {:?}", kind, target);

        self.closed_loop_cmd = Some(ClosedLoopCmd {
            kind,
            target: *target,
            elapsed_s: 0.0
        });
    }

    /// Advance the closed loop command's timer, stopping the drivetrain if
    /// it has run out.
    fn tick_timeout(&mut self) -> Result<Option<CmdStatus>, DrivetrainError> {
        let dt = self.params.loop_period_s;
        let timeout = self.params.closed_loop_timeout_s;

        let timed_out = match self.closed_loop_cmd.as_mut() {
            Some(c) => {
                c.elapsed_s += dt;
                c.elapsed_s > timeout
            },
            None => false
        };

        if timed_out {
            warn!("Closed loop command did not converge within {} s, abandoning", timeout);
            self.stop()?;
            return Ok(Some(CmdStatus::TimedOut));
        }

        Ok(None)
    }

    /// Rotation rate needed to turn towards the position of `target`.
    fn aim_rate(&mut self, target: &Pose) -> f64 {
        let pose = self.pose();
        let to_target = pose.translation_to(target);

        let aim_rad = if to_target.norm() < MIN_AIM_DISTANCE_M {
            pose.heading_rad
        }
        else {
            to_target.y.atan2(to_target.x)
        };
        self.rot_ctrl.set_goal(aim_rad);

        let dt = self.params.loop_period_s;
        self.rot_ctrl.calculate(pose.heading_rad, dt) + self.rot_ctrl.setpoint().velocity
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn profiled(params: &ControllerParams) -> ProfiledPidController {
    let mut ctrl = ProfiledPidController::new(
        params.k_p,
        params.k_i,
        params.k_d,
        params.constraints
    );
    ctrl.set_tolerance(params.tolerance, std::f64::INFINITY);

    ctrl
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actuator::{Actuator, SimBus};
    use crate::control::Constraints;
    use crate::odometry::{OdometrySampler, SwerveOdometry};
    use crate::optimizer::optimize;
    use crate::swerve_module::test_fixtures::{params as module_params, PLANT};
    use std::f64::consts::FRAC_PI_2;

    const NAMES: [&str; NUM_MODULES] = ["front_left", "front_right", "rear_left", "rear_right"];

    fn params() -> DrivetrainParams {
        DrivetrainParams {
            module_pos_m_rb: [
                [0.2825, 0.3075],
                [0.2825, -0.3075],
                [-0.2825, 0.3075],
                [-0.2825, -0.3075],
            ],
            max_speed_ms: 5.1,
            max_rotation_rads: 3.0 * PI,
            translation_ctrl: ControllerParams {
                k_p: 2.0,
                k_i: 0.0,
                k_d: 0.0,
                constraints: Constraints { max_velocity: 2.0, max_acceleration: 4.0 },
                tolerance: 0.05,
            },
            rotation_ctrl: ControllerParams {
                k_p: 4.0,
                k_i: 0.0,
                k_d: 0.0,
                constraints: Constraints { max_velocity: 2.0 * PI, max_acceleration: 4.0 * PI },
                tolerance: 0.5f64.to_radians(),
            },
            closed_loop_timeout_s: 0.1,
            loop_period_s: 0.02,
        }
    }

    fn module(bus: &SimBus, sampler: &OdometrySampler, i: usize) -> SwerveModule {
        let drive_id = 2 * i as u32 + 1;
        let steer_id = 2 * i as u32 + 2;
        bus.add_device(drive_id, PLANT);
        bus.add_device(steer_id, PLANT);

        SwerveModule::new(
            NAMES[i],
            &module_params(),
            Box::new(bus.actuator(drive_id, "drive").unwrap()),
            Box::new(bus.actuator(steer_id, "steer").unwrap()),
            sampler
        ).unwrap()
    }

    fn drivetrain(bus: &SimBus, sampler: &OdometrySampler) -> Drivetrain {
        let params = params();
        let kinematics = SwerveKinematics::new(params.module_pos_m_rb).unwrap();

        Drivetrain::init(DrivetrainInit {
            params,
            modules: [
                module(bus, sampler, 0),
                module(bus, sampler, 1),
                module(bus, sampler, 2),
                module(bus, sampler, 3),
            ],
            estimator: Box::new(SwerveOdometry::new(kinematics, Pose::default())),
        }).unwrap()
    }

    fn cmd(cmd: DriveCmd) -> InputData {
        InputData { cmd: Some(cmd) }
    }

    /// Run one drivetrain cycle's worth of physics, sampling every 4 ms.
    fn run_physics(bus: &SimBus, sampler: &OdometrySampler, t: &mut f64) {
        for step in 0..20 {
            bus.step(0.001);
            *t += 0.001;
            if step % 4 == 3 {
                sampler.sample_once(*t);
            }
        }
    }

    #[test]
    fn test_lock_headings() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        dt.proc(&cmd(DriveCmd::Lock)).unwrap();

        for (m, heading_deg) in dt.modules().iter().zip(LOCK_HEADINGS_DEG.iter()) {
            let target = m.target_state();
            assert_eq!(target.speed_ms, 0.0);
            assert!((target.heading_rad - heading_deg.to_radians()).abs() < 1e-12);
        }

        // The command stays active
        assert_eq!(dt.active_cmd(), Some(DriveCmd::Lock));
    }

    #[test]
    fn test_lock_from_reversed_heading() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        // Every wheel pointing backwards
        for i in 0..NUM_MODULES {
            let mut steer = bus.actuator(2 * i as u32 + 2, "steer").unwrap();
            steer.set_motor_position(0.5 * 12.8).unwrap();
        }

        dt.proc(&cmd(DriveCmd::Lock)).unwrap();

        // More than a quarter turn from each lock heading, so the wheels take
        // the opposite heading instead
        for (m, heading_deg) in dt.modules().iter().zip([-135.0f64, 135.0, 135.0, -135.0].iter()) {
            let target = m.target_state();
            assert_eq!(target.speed_ms, 0.0);
            assert!((target.heading_rad - heading_deg.to_radians()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_steering_alone_does_not_move() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        let mut input = cmd(DriveCmd::Lock);
        let mut t = 0.0;
        for _ in 0..100 {
            dt.proc(&input).unwrap();
            input.cmd = None;
            run_physics(&bus, &sampler, &mut t);
        }
        dt.proc(&input).unwrap();

        for (m, heading_deg) in dt.modules().iter().zip(LOCK_HEADINGS_DEG.iter()) {
            assert!((m.current_state().heading_rad - heading_deg.to_radians()).abs() < 0.05);
            assert!(m.position().distance_m.abs() < 1e-9);
        }

        let pose = dt.pose();
        assert!(pose.position_m.norm() < 1e-9);
        assert!(pose.heading_rad.abs() < 1e-9);
    }

    #[test]
    fn test_drive_self_relative_closed_loop() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);
        dt.proc(&InputData::default()).unwrap();

        let speeds = ChassisSpeeds::new(1.0, 0.0, 0.0);
        dt.drive_self_relative(&speeds).unwrap();

        let states = dt.kinematics().to_module_states(&speeds);
        for (m, state) in dt.modules().iter().zip(states.iter()) {
            assert!(m.is_closed_loop());
            assert!((m.target_state().speed_ms - state.speed_ms).abs() < 1e-9);
            assert!((m.target_state().heading_rad - state.heading_rad).abs() < 1e-9);
            assert!((m.target_state().speed_ms - 1.0).abs() < 1e-9);
        }

        // Spinning on the spot, the left wheels reverse rather than turn
        // more than a quarter turn
        let speeds = ChassisSpeeds::new(0.0, 0.0, 1.0);
        dt.drive_self_relative(&speeds).unwrap();

        let states = dt.kinematics().to_module_states(&speeds);
        for (m, state) in dt.modules().iter().zip(states.iter()) {
            let expected = optimize(*state, m.current_state().heading_rad);
            assert!(m.is_closed_loop());
            assert!((m.target_state().speed_ms - expected.speed_ms).abs() < 1e-9);
            assert!((m.target_state().heading_rad - expected.heading_rad).abs() < 1e-9);
        }
    }

    #[test]
    fn test_desaturation_flagged() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        let (out, report) = dt.proc(&cmd(DriveCmd::OrientationBased {
            vx_ms: 10.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: false,
            closed_loop: false
        })).unwrap();

        assert!(report.desaturated);
        for t in out.module_targets.iter() {
            assert!((t.speed_ms - 5.1).abs() < 1e-9);
        }

        let (_, report) = dt.proc(&cmd(DriveCmd::OrientationBased {
            vx_ms: 1.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: false,
            closed_loop: false
        })).unwrap();
        assert!(!report.desaturated);
    }

    #[test]
    fn test_rotate_times_out() {
        // The bus is never stepped so the robot can't move
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        let (_, report) = dt.proc(&cmd(DriveCmd::RotateToTarget(Pose::new(0.0, 1.0, 0.0)))).unwrap();
        assert_eq!(report.cmd_status, Some(CmdStatus::Running));

        let mut timed_out = false;
        for _ in 0..10 {
            let (out, report) = dt.proc(&InputData::default()).unwrap();
            if report.cmd_status == Some(CmdStatus::TimedOut) {
                for t in out.module_targets.iter() {
                    assert_eq!(t.speed_ms, 0.0);
                }
                timed_out = true;
                break;
            }
            assert_eq!(report.cmd_status, Some(CmdStatus::Running));
        }
        assert!(timed_out);

        // Abandoned commands are no longer executed
        let (_, report) = dt.proc(&InputData::default()).unwrap();
        assert_eq!(report.cmd_status, None);
        assert_eq!(dt.active_cmd(), None);
    }

    #[test]
    fn test_drive_to_current_pose_converges() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        let (_, report) = dt.proc(&cmd(DriveCmd::ToPose(Pose::default()))).unwrap();
        assert_eq!(report.cmd_status, Some(CmdStatus::Converged));
        assert_eq!(dt.active_cmd(), None);
    }

    #[test]
    fn test_reset_gyro() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        dt.proc(&cmd(DriveCmd::Lock)).unwrap();
        dt.reset_pose(Pose::new(1.0, 2.0, FRAC_PI_2));

        let (out, _) = dt.proc(&cmd(DriveCmd::ResetGyro)).unwrap();
        assert!((out.pose.position_m - Vector2::new(1.0, 2.0)).norm() < 1e-9);
        assert!(out.pose.heading_rad.abs() < 1e-9);

        // Resetting the heading doesn't replace the active command
        assert_eq!(dt.active_cmd(), Some(DriveCmd::Lock));
    }

    #[test]
    fn test_drives_forwards() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut dt = drivetrain(&bus, &sampler);

        let mut input = cmd(DriveCmd::OrientationBased {
            vx_ms: 1.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            field_relative: true,
            closed_loop: false
        });

        let mut t = 0.0;
        let mut last_report = StatusReport::default();
        for _ in 0..50 {
            let (_, report) = dt.proc(&input).unwrap();
            last_report = report;
            input.cmd = None;
            run_physics(&bus, &sampler, &mut t);
        }

        let pose = dt.pose();
        assert!(pose.position_m.x > 0.5);
        assert!(pose.position_m.y.abs() < 0.05);
        assert!(pose.heading_rad.abs() < 0.05);
        assert_eq!(last_report.samples_fused, 5);
        assert_eq!(last_report.samples_discarded, 0);
    }
}
