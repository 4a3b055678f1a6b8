//! # Simulated actuators
//!
//! A [`SimBus`] stands in for the vendor bus and the motor controllers on it.
//! Each device has an integrated encoder and closed loop controller, and
//! drives a simple DC motor plant. [`SimActuator`] is the [`Actuator`] handle
//! the rest of the software uses to talk to one device.
//!
//! The bus physics are advanced either explicitly with [`SimBus::step`] or by
//! a background thread started with [`SimBus::spawn_physics`], which plays the
//! role of the real hardware running independently of the main loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use super::{
    Actuator, ActuatorConfig, ActuatorError, ControlMode, GainSlot, IdleMode, Signal,
    SignalSource, NUM_SLOTS,
};
use crate::control::{input_modulus, PidController};
use util::maths::{clamp, sign};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Electrical and mechanical constants of a simulated motor, in motor units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PlantModel {
    /// Volts to overcome static friction.
    pub k_s: f64,

    /// Volts per rotation/second of back EMF and viscous friction.
    pub k_v: f64,

    /// Volts per rotation/second^2.
    pub k_a: f64,

    /// Winding resistance.
    ///
    /// Units: ohms
    pub resistance_ohm: f64,

    /// Supply voltage, the output saturates at this value.
    ///
    /// Units: volts
    pub nominal_voltage_v: f64,
}

/// A simulated vendor bus holding a number of devices.
#[derive(Clone, Default)]
pub struct SimBus {
    devices: Arc<Mutex<HashMap<u32, SimDevice>>>,
    stop: Arc<AtomicBool>,
}

/// Handle to a device on a [`SimBus`].
pub struct SimActuator {
    name: String,
    id: u32,
    bus: SimBus,

    /// Gear ratio of the last successful configuration.
    gear_ratio: f64,

    /// Values from the last batched refresh.
    cache: SignalCache,
}

/// A signal read straight from the bus state.
struct SimSignal {
    bus: SimBus,
    id: u32,
    signal: Signal,
}

#[derive(Debug, Default, Clone, Copy)]
struct SignalCache {
    position_rot: f64,
    velocity_rots: f64,
    voltage_v: f64,
    current_a: f64,
}

/// State of one simulated device.
struct SimDevice {
    plant: PlantModel,
    config: Option<ActuatorConfig>,
    config_fault: bool,
    active_slot: usize,
    pid: PidController,
    demand: Demand,

    /// Setpoint of the profiled velocity mode.
    profile_velocity_rots: f64,

    // Plant state, in the device's own (possibly inverted) frame
    position_rot: f64,
    velocity_rots: f64,
    applied_v: f64,
    current_a: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Demand {
    Neutral,
    Setpoint {
        mode: ControlMode,
        value: f64,
        feedforward_v: f64,
    },
    Follower(u32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device to the bus. A device already present with the same ID is
    /// replaced.
    pub fn add_device(&self, id: u32, plant: PlantModel) {
        let mut devices = self.lock();
        if devices.insert(id, SimDevice::new(plant)).is_some() {
            warn!("Simulated device {} replaced", id);
        }
    }

    /// Get an actuator handle for a device on the bus.
    pub fn actuator(&self, id: u32, name: &str) -> Result<SimActuator, ActuatorError> {
        if !self.lock().contains_key(&id) {
            return Err(ActuatorError::DeviceNotFound(id));
        }

        Ok(SimActuator {
            name: name.into(),
            id,
            bus: self.clone(),
            gear_ratio: 1.0,
            cache: SignalCache::default(),
        })
    }

    /// Make configuration writes to a device fail (or succeed again).
    pub fn inject_config_fault(&self, id: u32, fault: bool) -> Result<(), ActuatorError> {
        match self.lock().get_mut(&id) {
            Some(d) => {
                d.config_fault = fault;
                Ok(())
            },
            None => Err(ActuatorError::DeviceNotFound(id))
        }
    }

    /// Advance every device by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        let mut devices = self.lock();

        // Leaders first so followers can mirror this step's output
        let mut ids: Vec<u32> = devices.keys().copied().collect();
        ids.sort_by_key(|id| matches!(devices[id].demand, Demand::Follower(_)));

        for id in ids {
            let leader_v = match devices[&id].demand {
                Demand::Follower(leader) => devices.get(&leader).map(|l| l.applied_v),
                _ => None
            };

            if let Some(d) = devices.get_mut(&id) {
                d.step(dt_s, leader_v);
            }
        }
    }

    /// Spawn a thread which steps the bus at the given frequency until
    /// [`SimBus::stop_physics`] is called.
    pub fn spawn_physics(&self, frequency_hz: f64) -> JoinHandle<()> {
        let bus = self.clone();
        let period = Duration::from_secs_f64(1.0 / frequency_hz);
        self.stop.store(false, Ordering::Relaxed);

        info!("Starting simulated bus physics at {} Hz", frequency_hz);

        thread::spawn(move || {
            let mut last = Instant::now();

            while !bus.stop.load(Ordering::Relaxed) {
                thread::sleep(period);

                let now = Instant::now();
                bus.step((now - last).as_secs_f64());
                last = now;
            }

            debug!("Simulated bus physics stopped");
        })
    }

    /// Signal the physics thread to exit.
    pub fn stop_physics(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<HashMap<u32, SimDevice>> {
        // A panic while stepping leaves the plant state usable
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SimDevice {
    fn new(plant: PlantModel) -> Self {
        Self {
            plant,
            config: None,
            config_fault: false,
            active_slot: 0,
            pid: PidController::new(0.0, 0.0, 0.0),
            demand: Demand::Neutral,
            profile_velocity_rots: 0.0,
            position_rot: 0.0,
            velocity_rots: 0.0,
            applied_v: 0.0,
            current_a: 0.0,
        }
    }

    fn slot(&self) -> GainSlot {
        match &self.config {
            Some(c) => c.slots[self.active_slot],
            None => GainSlot::default()
        }
    }

    fn apply_slot_gains(&mut self) {
        let slot = self.slot();
        self.pid.set_gains(slot.k_p, slot.k_i, slot.k_d);
    }

    /// Inversion sign of the device frame relative to the plant.
    fn direction(&self) -> f64 {
        match &self.config {
            Some(c) if c.inverted => -1.0,
            _ => 1.0
        }
    }

    /// Voltage requested by the current demand, before saturation and ramp
    /// limits.
    fn demanded_voltage(&mut self, dt_s: f64, leader_v: Option<f64>) -> f64 {
        let config = match &self.config {
            Some(c) => c.clone(),
            None => return 0.0
        };
        let ff = self.slot().feedforward();
        let system_pos_rot = self.position_rot / config.gear_ratio;

        match self.demand {
            Demand::Neutral => 0.0,
            Demand::Follower(_) => leader_v.unwrap_or(0.0),
            Demand::Setpoint { mode, value, feedforward_v } => match mode {
                ControlMode::Voltage => value,
                ControlMode::Percentage => value * self.plant.nominal_voltage_v,
                ControlMode::Current => value * self.plant.resistance_ohm
                    + self.plant.k_v * self.velocity_rots,
                ControlMode::Position => {
                    let mut error = value - self.position_rot;

                    // Wrap in mechanism rotations, then back to motor units
                    if config.closed_loop_continuous_wrap {
                        error = input_modulus(error / config.gear_ratio, -0.5, 0.5)
                            * config.gear_ratio;
                    }

                    self.pid.get(error, dt_s)
                        + ff.calculate(system_pos_rot, 0.0, 0.0)
                        + feedforward_v
                },
                ControlMode::Velocity => {
                    self.pid.get(value - self.velocity_rots, dt_s)
                        + ff.calculate(system_pos_rot, value, 0.0)
                        + feedforward_v
                },
                ControlMode::ProfiledVelocity => {
                    let prev = self.profile_velocity_rots;
                    let next = match config.profile_max_acceleration {
                        Some(a) => prev + clamp(&(value - prev), &(-a * dt_s), &(a * dt_s)),
                        None => value
                    };
                    let accel = if dt_s > 0.0 { (next - prev) / dt_s } else { 0.0 };
                    self.profile_velocity_rots = next;

                    self.pid.get(next - self.velocity_rots, dt_s)
                        + ff.calculate(system_pos_rot, next, accel)
                        + feedforward_v
                }
            }
        }
    }

    fn step(&mut self, dt_s: f64, leader_v: Option<f64>) {
        let nominal = self.plant.nominal_voltage_v;
        let mut volts = clamp(&self.demanded_voltage(dt_s, leader_v), &-nominal, &nominal);

        if let Some(config) = &self.config {
            // Ramp limit
            let ramp_s = match self.demand {
                Demand::Setpoint { mode, .. } if mode.is_closed_loop() => config.closed_loop_ramp_s,
                _ => config.open_loop_ramp_s
            };
            if ramp_s > 0.0 {
                let max_step = nominal / ramp_s * dt_s;
                volts = clamp(&volts, &(self.applied_v - max_step), &(self.applied_v + max_step));
            }

            // Current limit, by backing off the voltage across the windings
            if let Some(limit) = config.stator_current_limit_a {
                let back_emf = self.plant.k_v * self.velocity_rots;
                let current = (volts - back_emf) / self.plant.resistance_ohm;
                if current.abs() > limit {
                    volts = back_emf + sign(current) * limit * self.plant.resistance_ohm;
                }
            }
        }

        self.applied_v = volts;
        self.current_a = (volts - self.plant.k_v * self.velocity_rots) / self.plant.resistance_ohm;

        // Plant dynamics in the physical frame
        let dir = self.direction();
        let physical_v = volts * dir;
        let mut physical_vel = self.velocity_rots * dir;

        // Brake mode shorts the windings at neutral
        let braking = self.demand == Demand::Neutral
            && matches!(&self.config, Some(c) if c.idle_mode == IdleMode::Brake);

        if braking {
            physical_vel = 0.0;
        }
        else if physical_vel == 0.0 && physical_v.abs() <= self.plant.k_s {
            // Static friction holds
        }
        else {
            let accel = (physical_v
                - self.plant.k_s * sign(physical_vel)
                - self.plant.k_v * physical_vel)
                / self.plant.k_a;
            let next = physical_vel + accel * dt_s;

            // Friction can stop the motor but never reverse it
            physical_vel = if physical_v.abs() <= self.plant.k_s
                && sign(next) != sign(physical_vel)
            {
                0.0
            }
            else {
                next
            };
        }

        self.velocity_rots = physical_vel * dir;
        self.position_rot += self.velocity_rots * dt_s;
    }

    fn read(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Position => self.position_rot,
            Signal::Velocity => self.velocity_rots,
            Signal::Voltage => self.applied_v,
            Signal::Current => self.current_a,
        }
    }
}

impl SimActuator {
    /// Run a closure on this actuator's device, holding the bus lock.
    fn with_device<T, F>(&self, f: F) -> Result<T, ActuatorError>
    where
        F: FnOnce(&mut SimDevice) -> Result<T, ActuatorError>
    {
        match self.bus.lock().get_mut(&self.id) {
            Some(d) => f(d),
            None => Err(ActuatorError::DeviceNotFound(self.id))
        }
    }

    fn not_configured(&self) -> ActuatorError {
        ActuatorError::NotConfigured(self.name.clone())
    }
}

impl Actuator for SimActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_id(&self) -> u32 {
        self.id
    }

    fn configure(&mut self, config: &ActuatorConfig) -> Result<(), ActuatorError> {
        config.validate(&self.name)?;

        let name = self.name.clone();
        self.with_device(|d| {
            if d.config_fault {
                return Err(ActuatorError::ConfigRejected {
                    actuator: name,
                    reason: "bus write timed out".into()
                });
            }

            d.config = Some(config.clone());
            d.active_slot = config.slot_to_use;
            d.apply_slot_gains();
            d.pid.reset();

            Ok(())
        })?;

        self.gear_ratio = config.gear_ratio;

        debug!("{} configured", self.name);

        Ok(())
    }

    fn set_output(&mut self, mode: ControlMode, value: f64) -> Result<(), ActuatorError> {
        self.set_output_with_feedforward(mode, value, 0.0)
    }

    fn set_output_with_feedforward(
        &mut self,
        mode: ControlMode,
        value: f64,
        feedforward_v: f64
    ) -> Result<(), ActuatorError> {
        let err = self.not_configured();

        self.with_device(|d| {
            if d.config.is_none() {
                return Err(err);
            }

            // Restart the loop state on a change of mode
            let mode_changed = match d.demand {
                Demand::Setpoint { mode: m, .. } => m != mode,
                _ => true
            };
            if mode_changed {
                d.pid.reset();
                d.profile_velocity_rots = d.velocity_rots;
            }

            d.demand = Demand::Setpoint { mode, value, feedforward_v };

            Ok(())
        })
    }

    fn current_slot(&self) -> Result<GainSlot, ActuatorError> {
        let err = self.not_configured();

        self.with_device(|d| match d.config {
            Some(_) => Ok(d.slot()),
            None => Err(err)
        })
    }

    fn reset_slot(&mut self, slot: GainSlot, index: usize) -> Result<(), ActuatorError> {
        if index >= NUM_SLOTS {
            return Err(ActuatorError::InvalidSlot(index));
        }
        let err = self.not_configured();

        self.with_device(|d| {
            match d.config.as_mut() {
                Some(c) => c.slots[index] = slot,
                None => return Err(err)
            }

            if index == d.active_slot {
                d.apply_slot_gains();
            }

            Ok(())
        })
    }

    fn select_slot(&mut self, index: usize) -> Result<(), ActuatorError> {
        if index >= NUM_SLOTS {
            return Err(ActuatorError::InvalidSlot(index));
        }
        let err = self.not_configured();

        self.with_device(|d| {
            if d.config.is_none() {
                return Err(err);
            }

            d.active_slot = index;
            d.apply_slot_gains();
            d.pid.reset();

            Ok(())
        })
    }

    fn refresh_signals(&mut self, signals: &[Signal]) -> Result<(), ActuatorError> {
        let mut cache = self.cache;

        self.with_device(|d| {
            for s in signals {
                let v = d.read(*s);
                match s {
                    Signal::Position => cache.position_rot = v,
                    Signal::Velocity => cache.velocity_rots = v,
                    Signal::Voltage => cache.voltage_v = v,
                    Signal::Current => cache.current_a = v,
                }
            }
            Ok(())
        })?;

        self.cache = cache;

        Ok(())
    }

    fn motor_position(&self) -> Result<f64, ActuatorError> {
        Ok(self.cache.position_rot)
    }

    fn motor_velocity(&self) -> Result<f64, ActuatorError> {
        Ok(self.cache.velocity_rots)
    }

    fn system_position(&self) -> Result<f64, ActuatorError> {
        Ok(self.cache.position_rot / self.gear_ratio)
    }

    fn system_velocity(&self) -> Result<f64, ActuatorError> {
        Ok(self.cache.velocity_rots / self.gear_ratio)
    }

    fn voltage(&self) -> Result<f64, ActuatorError> {
        Ok(self.cache.voltage_v)
    }

    fn set_motor_position(&mut self, position_rot: f64) -> Result<(), ActuatorError> {
        self.with_device(|d| {
            d.position_rot = position_rot;
            Ok(())
        })?;
        self.cache.position_rot = position_rot;

        Ok(())
    }

    fn set_follower_of(&mut self, leader_id: u32) -> Result<(), ActuatorError> {
        if leader_id == self.id {
            return Err(ActuatorError::InvalidConfig {
                actuator: self.name.clone(),
                reason: "an actuator cannot follow itself".into()
            });
        }
        if !self.bus.lock().contains_key(&leader_id) {
            return Err(ActuatorError::DeviceNotFound(leader_id));
        }
        let err = self.not_configured();

        self.with_device(|d| {
            if d.config.is_none() {
                return Err(err);
            }
            d.demand = Demand::Follower(leader_id);
            Ok(())
        })
    }

    fn raw_signal(&self, signal: Signal) -> Result<Arc<dyn SignalSource>, ActuatorError> {
        // Check the device is present now rather than on every read
        self.with_device(|_| Ok(()))?;

        Ok(Arc::new(SimSignal {
            bus: self.bus.clone(),
            id: self.id,
            signal,
        }))
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.with_device(|d| {
            d.demand = Demand::Neutral;
            Ok(())
        })
    }
}

impl SignalSource for SimSignal {
    fn read(&self) -> Option<f64> {
        let devices = self.bus.lock();
        let d = devices.get(&self.id)?;
        let gear_ratio = d.config.as_ref()?.gear_ratio;

        Some(match self.signal {
            Signal::Position | Signal::Velocity => d.read(self.signal) / gear_ratio,
            _ => d.read(self.signal)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PLANT: PlantModel = PlantModel {
        k_s: 0.1,
        k_v: 0.12,
        k_a: 0.01,
        resistance_ohm: 0.05,
        nominal_voltage_v: 12.0,
    };

    fn configured(bus: &SimBus, id: u32, config: &ActuatorConfig) -> SimActuator {
        bus.add_device(id, PLANT);
        let mut act = bus.actuator(id, "test").unwrap();
        act.configure(config).unwrap();
        act
    }

    fn run(bus: &SimBus, seconds: f64) {
        let dt = 0.001;
        for _ in 0..((seconds / dt) as usize) {
            bus.step(dt);
        }
    }

    #[test]
    fn test_unconfigured_rejects_setpoints() {
        let bus = SimBus::new();
        bus.add_device(1, PLANT);
        let mut act = bus.actuator(1, "test").unwrap();

        assert!(matches!(
            act.set_output(ControlMode::Voltage, 1.0),
            Err(ActuatorError::NotConfigured(_))
        ));
        assert!(matches!(bus.actuator(2, "missing"), Err(ActuatorError::DeviceNotFound(2))));
    }

    #[test]
    fn test_config_fault_leaves_previous_config() {
        let bus = SimBus::new();
        let first = ActuatorConfig { gear_ratio: 2.0, ..Default::default() };
        let mut act = configured(&bus, 1, &first);

        bus.inject_config_fault(1, true).unwrap();
        let second = ActuatorConfig { gear_ratio: 5.0, ..Default::default() };
        assert!(matches!(act.configure(&second), Err(ActuatorError::ConfigRejected { .. })));

        // Still running on the first configuration
        act.set_motor_position(4.0).unwrap();
        assert_eq!(act.system_position().unwrap(), 2.0);

        bus.inject_config_fault(1, false).unwrap();
        act.configure(&second).unwrap();
        assert!((act.system_position().unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_voltage_reaches_steady_state() {
        let bus = SimBus::new();
        let mut act = configured(&bus, 1, &ActuatorConfig::default());

        act.set_output(ControlMode::Voltage, 6.0).unwrap();
        run(&bus, 2.0);
        act.refresh_signals(&[Signal::Velocity, Signal::Voltage]).unwrap();

        // v = (V - k_s) / k_v
        let expected = (6.0 - PLANT.k_s) / PLANT.k_v;
        assert!((act.motor_velocity().unwrap() - expected).abs() < 0.1);
        assert_eq!(act.voltage().unwrap(), 6.0);
    }

    #[test]
    fn test_reads_are_cached_until_refresh() {
        let bus = SimBus::new();
        let mut act = configured(&bus, 1, &ActuatorConfig::default());

        act.set_output(ControlMode::Voltage, 6.0).unwrap();
        run(&bus, 0.5);
        assert_eq!(act.motor_position().unwrap(), 0.0);

        act.refresh_signals(&[Signal::Position]).unwrap();
        assert!(act.motor_position().unwrap() > 0.0);
        // Velocity was not part of the refresh
        assert_eq!(act.motor_velocity().unwrap(), 0.0);
    }

    #[test]
    fn test_position_loop_with_wrap() {
        let bus = SimBus::new();
        let mut config = ActuatorConfig {
            gear_ratio: 10.0,
            closed_loop_continuous_wrap: true,
            ..Default::default()
        };
        config.slots[0] = GainSlot { k_p: 2.0, k_d: 0.05, ..Default::default() };
        let mut act = configured(&bus, 1, &config);

        // 0.9 mechanism rotations away is 0.1 the other way round
        act.set_output(ControlMode::Position, 9.0).unwrap();
        run(&bus, 2.0);
        act.refresh_signals(&[Signal::Position]).unwrap();

        assert!((act.system_position().unwrap() + 0.1).abs() < 0.01);
    }

    #[test]
    fn test_profiled_velocity_limits_acceleration() {
        let bus = SimBus::new();
        let mut config = ActuatorConfig {
            profile_max_acceleration: Some(50.0),
            ..Default::default()
        };
        config.slots[0] = GainSlot { k_p: 0.5, k_v: PLANT.k_v, k_s: PLANT.k_s, k_a: PLANT.k_a, ..Default::default() };
        let mut act = configured(&bus, 1, &config);

        act.set_output(ControlMode::ProfiledVelocity, 40.0).unwrap();
        run(&bus, 0.4);
        act.refresh_signals(&[Signal::Velocity]).unwrap();

        // Profile setpoint is at 20 rot/s after 0.4 s
        assert!((act.motor_velocity().unwrap() - 20.0).abs() < 1.0);

        run(&bus, 1.0);
        act.refresh_signals(&[Signal::Velocity]).unwrap();
        assert!((act.motor_velocity().unwrap() - 40.0).abs() < 1.0);
    }

    #[test]
    fn test_slots() {
        let bus = SimBus::new();
        let mut config = ActuatorConfig::default();
        config.slots[1].k_p = 3.0;
        let mut act = configured(&bus, 1, &config);

        assert_eq!(act.current_slot().unwrap().k_p, 0.0);

        act.select_slot(1).unwrap();
        assert_eq!(act.current_slot().unwrap().k_p, 3.0);

        act.reset_slot(GainSlot { k_p: 7.0, ..Default::default() }, 2).unwrap();
        assert_eq!(act.current_slot().unwrap().k_p, 3.0);
        act.select_slot(2).unwrap();
        assert_eq!(act.current_slot().unwrap().k_p, 7.0);

        assert!(matches!(act.select_slot(3), Err(ActuatorError::InvalidSlot(3))));
    }

    #[test]
    fn test_follower_mirrors_leader() {
        let bus = SimBus::new();
        let mut leader = configured(&bus, 1, &ActuatorConfig::default());
        let mut follower = configured(&bus, 2, &ActuatorConfig::default());

        follower.set_follower_of(1).unwrap();
        leader.set_output(ControlMode::Percentage, 0.5).unwrap();
        bus.step(0.001);

        follower.refresh_signals(&[Signal::Voltage]).unwrap();
        assert_eq!(follower.voltage().unwrap(), 6.0);

        assert!(matches!(follower.set_follower_of(9), Err(ActuatorError::DeviceNotFound(9))));
        assert!(follower.set_follower_of(2).is_err());
    }

    #[test]
    fn test_raw_signal_in_system_units() {
        let bus = SimBus::new();
        let config = ActuatorConfig { gear_ratio: 4.0, ..Default::default() };
        let mut act = configured(&bus, 1, &config);

        let signal = act.raw_signal(Signal::Position).unwrap();
        act.set_motor_position(8.0).unwrap();

        assert_eq!(signal.read(), Some(2.0));
    }
}
