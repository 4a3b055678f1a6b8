//! Implementations for the swerve module state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;
use std::f64::consts::TAU;

// Internal
use super::{ModuleError, ModuleParams, ModulePosition, ModuleState};
use crate::actuator::{Actuator, ActuatorError, ControlMode, Signal};
use crate::odometry::{OdometrySample, OdometrySampler, SampleQueue, TimedSample};
use crate::optimizer::{optimize, reduce_skew, remove_coupling};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Signals refreshed from each actuator every cycle.
const REFRESHED_SIGNALS: [Signal; 3] = [Signal::Position, Signal::Velocity, Signal::Voltage];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single swerve module.
pub struct SwerveModule {
    name: String,
    params: ModuleParams,

    drive: Box<dyn Actuator>,
    steer: Box<dyn Actuator>,

    drive_queue: SampleQueue,
    steer_queue: SampleQueue,

    /// Samples drained from one queue with no partner from the other yet.
    drive_carry: Vec<TimedSample>,
    steer_carry: Vec<TimedSample>,

    closed_loop: bool,

    current: ModuleState,
    target: ModuleState,
    inputs: ModuleInputs,
    samples: Vec<OdometrySample>,
}

/// Telemetry of a module, refreshed once per cycle.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModuleInputs {
    /// Units: radians
    pub steer_heading_rad: f64,

    /// Units: module rotations/second
    pub steer_velocity_rots: f64,

    /// Units: volts
    pub steer_voltage_v: f64,

    /// Wheel speed with the steering coupling removed.
    ///
    /// Units: meters/second
    pub drive_velocity_ms: f64,

    /// Wheel distance with the steering coupling removed.
    ///
    /// Units: meters
    pub drive_distance_m: f64,

    /// Units: volts
    pub drive_voltage_v: f64,

    /// Number of odometry samples drained on this cycle.
    pub num_odometry_samples: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveModule {
    /// Create a new module, configuring both actuators and registering their
    /// positions with the odometry sampler.
    pub fn new(
        name: &str,
        params: &ModuleParams,
        mut drive: Box<dyn Actuator>,
        mut steer: Box<dyn Actuator>,
        sampler: &OdometrySampler
    ) -> Result<Self, ModuleError> {
        let invalid = |reason: &str| ModuleError::InvalidParams {
            module: name.into(),
            reason: reason.into()
        };

        if !(params.wheel_diameter_m > 0.0) {
            return Err(invalid("wheel diameter must be positive"));
        }
        if !(params.max_speed_ms > 0.0) {
            return Err(invalid("maximum speed must be positive"));
        }
        if !(params.voltage_comp_saturation_v > 0.0) {
            return Err(invalid("voltage compensation saturation must be positive"));
        }

        let wrap = |source: ActuatorError| ModuleError::Actuator {
            module: name.into(),
            source
        };

        // Steering always takes the short way round
        let mut steer_config = params.steer.clone();
        if !steer_config.closed_loop_continuous_wrap {
            debug!("Enabling continuous wrap on the {} steer actuator", name);
            steer_config.closed_loop_continuous_wrap = true;
        }

        drive.configure(&params.drive).map_err(wrap)?;
        steer.configure(&steer_config).map_err(wrap)?;

        let drive_queue = sampler.register(drive.raw_signal(Signal::Position).map_err(wrap)?);
        let steer_queue = sampler.register(steer.raw_signal(Signal::Position).map_err(wrap)?);

        let mut params = params.clone();
        params.steer = steer_config;

        Ok(Self {
            name: name.into(),
            params,
            drive,
            steer,
            drive_queue,
            steer_queue,
            drive_carry: Vec::new(),
            steer_carry: Vec::new(),
            closed_loop: false,
            current: ModuleState::default(),
            target: ModuleState::default(),
            inputs: ModuleInputs::default(),
            samples: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Choose between closed loop velocity control and open loop voltage
    /// control of the drive actuator.
    pub fn set_closed_loop(&mut self, closed_loop: bool) {
        self.closed_loop = closed_loop;
    }

    pub fn is_closed_loop(&self) -> bool {
        self.closed_loop
    }

    /// Command the module towards a new state.
    pub fn set_target_state(&mut self, desired: ModuleState) -> Result<(), ModuleError> {
        let current_heading_rad = self.current.heading_rad;
        let target = optimize(desired, current_heading_rad);
        self.target = target;

        // Steer, in motor rotations. The actuator wraps the error so the
        // absolute number of turns doesn't matter.
        let steer_pos = target.heading_rad / TAU * self.params.steer.gear_ratio;
        self.steer
            .set_output(ControlMode::Position, steer_pos)
            .map_err(|e| self.actuator_error(e))?;

        // Drive
        let speed_ms = reduce_skew(target.speed_ms, current_heading_rad, target.heading_rad);

        if self.closed_loop {
            let motor_rots = self.params.meters_to_rotations(speed_ms) * self.params.drive.gear_ratio;
            self.drive
                .set_output(ControlMode::ProfiledVelocity, motor_rots)
                .map_err(|e| self.actuator_error(e))?;
        }
        else {
            let volts = self.velocity_to_open_loop_voltage(
                speed_ms,
                self.inputs.steer_velocity_rots
            );
            self.drive
                .set_output(ControlMode::Voltage, volts)
                .map_err(|e| self.actuator_error(e))?;
        }

        trace!("{} target {:?}, skew reduced speed {:.3} m/s", self.name, target, speed_ms);

        Ok(())
    }

    /// Voltage needed to drive at a speed without closed loop control.
    ///
    /// The speed is corrected for the steering coupling, taken as a fraction
    /// of the maximum speed and scaled by the compensation saturation.
    pub fn velocity_to_open_loop_voltage(&self, speed_ms: f64, steer_velocity_rots: f64) -> f64 {
        let wheel_rots = self.params.meters_to_rotations(speed_ms);
        let corrected_rots = remove_coupling(
            wheel_rots,
            steer_velocity_rots,
            self.params.coupling_ratio
        );
        let power = corrected_rots / self.params.meters_to_rotations(self.params.max_speed_ms);

        power * self.params.voltage_comp_saturation_v
    }

    /// Refresh the module's telemetry and collect the odometry samples taken
    /// since the last call.
    pub fn periodic(&mut self) -> Result<(), ModuleError> {
        self.drive
            .refresh_signals(&REFRESHED_SIGNALS)
            .map_err(|e| self.actuator_error(e))?;
        self.steer
            .refresh_signals(&REFRESHED_SIGNALS)
            .map_err(|e| self.actuator_error(e))?;

        let steer_pos_rot = self.steer.system_position().map_err(|e| self.actuator_error(e))?;
        let steer_vel_rots = self.steer.system_velocity().map_err(|e| self.actuator_error(e))?;
        let drive_pos_rot = self.drive.system_position().map_err(|e| self.actuator_error(e))?;
        let drive_vel_rots = self.drive.system_velocity().map_err(|e| self.actuator_error(e))?;

        let coupling = self.params.coupling_ratio;

        self.inputs = ModuleInputs {
            steer_heading_rad: wrap_pi(steer_pos_rot * TAU),
            steer_velocity_rots: steer_vel_rots,
            steer_voltage_v: self.steer.voltage().map_err(|e| self.actuator_error(e))?,
            drive_velocity_ms: self.params.rotations_to_meters(
                remove_coupling(drive_vel_rots, steer_vel_rots, coupling)
            ),
            drive_distance_m: self.params.rotations_to_meters(
                remove_coupling(drive_pos_rot, steer_pos_rot, coupling)
            ),
            drive_voltage_v: self.drive.voltage().map_err(|e| self.actuator_error(e))?,
            num_odometry_samples: 0,
        };

        self.current = ModuleState {
            speed_ms: self.inputs.drive_velocity_ms,
            heading_rad: self.inputs.steer_heading_rad
        };

        self.drain_samples();
        self.inputs.num_odometry_samples = self.samples.len();

        Ok(())
    }

    /// Drain both queues and pair their samples up.
    ///
    /// The sampler can run between the two drains, leaving one queue a
    /// sample ahead. Unpaired samples are held back for the next cycle.
    fn drain_samples(&mut self) {
        self.drive_carry.extend(self.drive_queue.drain());
        self.steer_carry.extend(self.steer_queue.drain());

        let n = self.drive_carry.len().min(self.steer_carry.len());
        let coupling = self.params.coupling_ratio;
        let params = &self.params;

        self.samples = self.drive_carry
            .drain(..n)
            .zip(self.steer_carry.drain(..n))
            .map(|(d, s)| OdometrySample {
                drive_distance_m: params.rotations_to_meters(
                    remove_coupling(d.value, s.value, coupling)
                ),
                steer_heading_rad: wrap_pi(s.value * TAU),
                timestamp_s: d.timestamp_s
            })
            .collect();
    }

    /// Samples collected on the last call to [`SwerveModule::periodic`].
    pub fn odometry_samples(&self) -> &[OdometrySample] {
        &self.samples
    }

    /// Position of the module at one of the last cycle's samples.
    pub fn odometry_position(&self, index: usize) -> Result<ModulePosition, ModuleError> {
        match self.samples.get(index) {
            Some(s) => Ok(ModulePosition {
                distance_m: s.drive_distance_m,
                heading_rad: s.steer_heading_rad
            }),
            None => Err(ModuleError::NoSample {
                module: self.name.clone(),
                index,
                len: self.samples.len()
            })
        }
    }

    pub fn current_state(&self) -> ModuleState {
        self.current
    }

    pub fn target_state(&self) -> ModuleState {
        self.target
    }

    /// Position of the module as of the last cycle's refresh.
    pub fn position(&self) -> ModulePosition {
        ModulePosition {
            distance_m: self.inputs.drive_distance_m,
            heading_rad: self.inputs.steer_heading_rad
        }
    }

    pub fn inputs(&self) -> &ModuleInputs {
        &self.inputs
    }

    pub fn params(&self) -> &ModuleParams {
        &self.params
    }

    /// Bring both actuators to neutral.
    pub fn stop(&mut self) -> Result<(), ModuleError> {
        self.drive.stop().map_err(|e| self.actuator_error(e))?;
        self.steer.stop().map_err(|e| self.actuator_error(e))?;

        self.target = ModuleState {
            speed_ms: 0.0,
            heading_rad: self.current.heading_rad
        };

        Ok(())
    }

    fn actuator_error(&self, source: ActuatorError) -> ModuleError {
        ModuleError::Actuator {
            module: self.name.clone(),
            source
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::actuator::{
        ActuatorConfig, DutyCycleDriver, DutyCycleError, GainSlot, PlantModel, PwmActuator,
        PwmParams, SimBus,
    };
    use std::f64::consts::{FRAC_PI_2, PI};

    pub(crate) const PLANT: PlantModel = PlantModel {
        k_s: 0.1,
        k_v: 0.12,
        k_a: 0.01,
        resistance_ohm: 0.05,
        nominal_voltage_v: 12.0,
    };

    pub(crate) fn params() -> ModuleParams {
        let mut drive = ActuatorConfig {
            gear_ratio: 6.75,
            profile_max_acceleration: Some(400.0),
            ..Default::default()
        };
        drive.slots[0] = GainSlot {
            k_p: 0.5,
            k_s: PLANT.k_s,
            k_v: PLANT.k_v,
            k_a: PLANT.k_a,
            ..Default::default()
        };

        let mut steer = ActuatorConfig {
            gear_ratio: 12.8,
            ..Default::default()
        };
        steer.slots[0] = GainSlot { k_p: 2.0, k_d: 0.05, ..Default::default() };

        // Simulated modules have no gearing between the steer and drive axes
        ModuleParams {
            wheel_diameter_m: 0.1016,
            coupling_ratio: 0.0,
            max_speed_ms: 5.1,
            voltage_comp_saturation_v: 12.0,
            drive,
            steer,
        }
    }

    /// Parameters of a coaxial module whose steering turns the wheel.
    fn coupled_params() -> ModuleParams {
        ModuleParams {
            coupling_ratio: 3.5,
            ..params()
        }
    }

    fn module(bus: &SimBus, sampler: &OdometrySampler) -> SwerveModule {
        module_with(bus, sampler, &params())
    }

    fn module_with(bus: &SimBus, sampler: &OdometrySampler, params: &ModuleParams) -> SwerveModule {
        bus.add_device(1, PLANT);
        bus.add_device(2, PLANT);

        SwerveModule::new(
            "front_left",
            params,
            Box::new(bus.actuator(1, "fl_drive").unwrap()),
            Box::new(bus.actuator(2, "fl_steer").unwrap()),
            sampler
        ).unwrap()
    }

    #[test]
    fn test_samples_drained_each_cycle() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut m = module_with(&bus, &sampler, &coupled_params());

        // Two wheel rotations, steer a quarter turn
        let mut drive = bus.actuator(1, "drive").unwrap();
        let mut steer = bus.actuator(2, "steer").unwrap();
        drive.set_motor_position(2.0 * 6.75).unwrap();
        steer.set_motor_position(0.25 * 12.8).unwrap();

        for i in 0..5 {
            sampler.sample_once(i as f64 * 0.004);
        }
        m.periodic().unwrap();

        assert_eq!(m.odometry_samples().len(), 5);
        assert_eq!(m.inputs().num_odometry_samples, 5);

        let expected_m = (2.0 - 0.25 * 3.5) * PI * 0.1016;
        let pos = m.odometry_position(4).unwrap();
        assert!((pos.distance_m - expected_m).abs() < 1e-9);
        assert!((pos.heading_rad - FRAC_PI_2).abs() < 1e-9);
        assert!((m.position().distance_m - expected_m).abs() < 1e-9);

        // Nothing new sampled, nothing to fuse
        m.periodic().unwrap();
        assert!(m.odometry_samples().is_empty());
        assert!(matches!(m.odometry_position(0), Err(ModuleError::NoSample { .. })));
    }

    #[test]
    fn test_coupling_free_when_not_steering() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut m = module_with(&bus, &sampler, &coupled_params());

        let mut drive = bus.actuator(1, "drive").unwrap();
        drive.set_motor_position(6.75).unwrap();
        sampler.sample_once(0.0);
        m.periodic().unwrap();

        assert!((m.odometry_samples()[0].drive_distance_m - PI * 0.1016).abs() < 1e-9);
    }

    #[test]
    fn test_steers_to_target() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut m = module(&bus, &sampler);
        m.periodic().unwrap();

        m.set_target_state(ModuleState { speed_ms: 0.0, heading_rad: FRAC_PI_2 / 2.0 }).unwrap();
        for _ in 0..2000 {
            bus.step(0.001);
        }
        m.periodic().unwrap();

        assert!((m.current_state().heading_rad - FRAC_PI_2 / 2.0).abs() < 0.05);
    }

    #[test]
    fn test_target_is_optimised() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let mut m = module(&bus, &sampler);
        m.periodic().unwrap();

        m.set_target_state(ModuleState { speed_ms: 1.0, heading_rad: PI * 0.9 }).unwrap();

        let target = m.target_state();
        assert_eq!(target.speed_ms, -1.0);
        assert!((target.heading_rad + PI * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_open_loop_voltage() {
        let bus = SimBus::new();
        let sampler = OdometrySampler::new(64);
        let m = module_with(&bus, &sampler, &coupled_params());

        assert!((m.velocity_to_open_loop_voltage(5.1, 0.0) - 12.0).abs() < 1e-9);
        assert!((m.velocity_to_open_loop_voltage(-2.55, 0.0) + 6.0).abs() < 1e-9);

        // Steering motion is taken out of the drive demand
        let wheel_rots = 5.1 / (PI * 0.1016);
        let v = m.velocity_to_open_loop_voltage(5.1, wheel_rots / 3.5);
        assert!(v.abs() < 1e-9);
    }

    struct NullOutput;

    impl DutyCycleDriver for NullOutput {
        fn set_duty_cycle(&mut self, _duty_cycle: f64) -> Result<(), DutyCycleError> {
            Ok(())
        }
    }

    #[test]
    fn test_unsupported_telemetry_is_an_error() {
        let bus = SimBus::new();
        bus.add_device(2, PLANT);
        let sampler = OdometrySampler::new(64);

        let result = SwerveModule::new(
            "front_left",
            &params(),
            Box::new(PwmActuator::new("pwm_drive", 1, NullOutput, PwmParams::default())),
            Box::new(bus.actuator(2, "fl_steer").unwrap()),
            &sampler
        );

        assert!(matches!(
            result,
            Err(ModuleError::Actuator { source: ActuatorError::Unsupported { .. }, .. })
        ));
    }

    #[test]
    fn test_invalid_params() {
        let bus = SimBus::new();
        bus.add_device(1, PLANT);
        bus.add_device(2, PLANT);
        let sampler = OdometrySampler::new(64);

        let mut p = params();
        p.wheel_diameter_m = 0.0;

        let result = SwerveModule::new(
            "front_left",
            &p,
            Box::new(bus.actuator(1, "fl_drive").unwrap()),
            Box::new(bus.actuator(2, "fl_steer").unwrap()),
            &sampler
        );
        assert!(matches!(result, Err(ModuleError::InvalidParams { .. })));
    }
}
