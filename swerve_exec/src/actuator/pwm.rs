//! # PWM actuators
//!
//! Motor controllers with no integrated sensor, commanded by a servo style
//! pulse. Only open loop modes are available and no telemetry other than the
//! last commanded voltage can be read back.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::debug;
use pwm_pca9685::{Channel, Pca9685};
use serde::Deserialize;
use std::sync::Arc;

// Internal
use super::{
    Actuator, ActuatorConfig, ActuatorError, ControlMode, GainSlot, Signal, SignalSource,
    NUM_SLOTS,
};
use util::maths::{clamp, lin_map};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PCA9685_MAX_PWM: u16 = 4096;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// An output which can produce a duty cycle on a single channel.
pub trait DutyCycleDriver: Send {
    /// Set the duty cycle. Must be between 0.0 and 1.0, values outside this
    /// range are rejected.
    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<(), DutyCycleError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pulse timing of a PWM motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PwmParams {
    /// Units: seconds
    pub period_s: f64,

    /// Pulse width for zero output.
    ///
    /// Units: seconds
    pub neutral_pulse_s: f64,

    /// Change in pulse width from neutral to full output.
    ///
    /// Units: seconds
    pub pulse_range_s: f64,

    /// Supply voltage, used to convert voltage demands to a fraction of the
    /// output.
    ///
    /// Units: volts
    pub nominal_voltage_v: f64,
}

/// One channel of a PCA9685 PWM driver board.
pub struct Pca9685Channel<I2C> {
    driver: Pca9685<I2C>,
    channel: Channel,
}

/// An open loop actuator driven by a duty cycle output.
pub struct PwmActuator<D: DutyCycleDriver> {
    name: String,
    id: u32,
    driver: D,
    params: PwmParams,
    config: Option<ActuatorConfig>,
    output_v: f64,

    /// Value of the last refresh of [`Signal::Voltage`].
    voltage_v: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum DutyCycleError {
    #[error("The output driver could not be written to")]
    Output,

    #[error("Duty cycle must be between 0.0 and 1.0")]
    InvalidDutyCycle,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PwmParams {
    fn default() -> Self {
        Self {
            period_s: 0.02,
            neutral_pulse_s: 1.5e-3,
            pulse_range_s: 0.5e-3,
            nominal_voltage_v: 12.0,
        }
    }
}

impl<I2C> Pca9685Channel<I2C> {
    /// Wrap an already initialised driver board and the channel the
    /// controller is wired to.
    pub fn new(driver: Pca9685<I2C>, channel: Channel) -> Self {
        Self { driver, channel }
    }
}

impl<I2C, E> DutyCycleDriver for Pca9685Channel<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E> + Send
{
    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<(), DutyCycleError> {
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(DutyCycleError::InvalidDutyCycle)
        }

        // The board only counts up to MAX - 1
        let counts = ((duty_cycle * PCA9685_MAX_PWM as f64) as u16).min(PCA9685_MAX_PWM - 1);

        match self.driver.set_channel_on(self.channel, counts) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(DutyCycleError::Output),
            Err(pwm_pca9685::Error::InvalidInputData) => Err(DutyCycleError::InvalidDutyCycle)
        }
    }
}

impl<D: DutyCycleDriver> PwmActuator<D> {
    pub fn new(name: &str, id: u32, driver: D, params: PwmParams) -> Self {
        Self {
            name: name.into(),
            id,
            driver,
            params,
            config: None,
            output_v: 0.0,
            voltage_v: 0.0,
        }
    }

    /// Duty cycle which produces the given fraction of full output.
    fn duty_cycle(&self, fraction: f64) -> f64 {
        let p = &self.params;
        lin_map(
            (-1.0, 1.0),
            (p.neutral_pulse_s - p.pulse_range_s, p.neutral_pulse_s + p.pulse_range_s),
            fraction
        ) / p.period_s
    }

    /// Drive the output at a voltage, saturating at the nominal voltage.
    fn write_voltage(&mut self, volts: f64) -> Result<(), ActuatorError> {
        let inverted = match &self.config {
            Some(c) => c.inverted,
            None => return Err(ActuatorError::NotConfigured(self.name.clone()))
        };

        let nominal = self.params.nominal_voltage_v;
        let volts = clamp(&volts, &-nominal, &nominal);
        let mut fraction = volts / nominal;
        if inverted {
            fraction = -fraction;
        }

        let duty_cycle = self.duty_cycle(fraction);
        self.driver
            .set_duty_cycle(duty_cycle)
            .map_err(|e| ActuatorError::Driver {
                actuator: self.name.clone(),
                reason: e.to_string()
            })?;
        self.output_v = volts;

        Ok(())
    }

    fn unsupported(&self, operation: &str) -> ActuatorError {
        ActuatorError::unsupported(&self.name, operation)
    }
}

impl<D: DutyCycleDriver> Actuator for PwmActuator<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_id(&self) -> u32 {
        self.id
    }

    fn configure(&mut self, config: &ActuatorConfig) -> Result<(), ActuatorError> {
        config.validate(&self.name)?;

        // Writing neutral checks the output is alive before accepting the
        // configuration
        let neutral = self.duty_cycle(0.0);
        self.driver.set_duty_cycle(neutral).map_err(|e| ActuatorError::ConfigRejected {
            actuator: self.name.clone(),
            reason: e.to_string()
        })?;

        self.config = Some(config.clone());
        self.output_v = 0.0;

        debug!("{} configured", self.name);

        Ok(())
    }

    fn set_output(&mut self, mode: ControlMode, value: f64) -> Result<(), ActuatorError> {
        match mode {
            ControlMode::Voltage => self.write_voltage(value),
            ControlMode::Percentage => {
                let volts = value * self.params.nominal_voltage_v;
                self.write_voltage(volts)
            },
            m => Err(self.unsupported(&format!("{:?} control", m)))
        }
    }

    fn set_output_with_feedforward(
        &mut self,
        _mode: ControlMode,
        _value: f64,
        _feedforward_v: f64
    ) -> Result<(), ActuatorError> {
        Err(self.unsupported("arbitrary feedforward"))
    }

    fn current_slot(&self) -> Result<GainSlot, ActuatorError> {
        match &self.config {
            Some(c) => Ok(c.slots[c.slot_to_use]),
            None => Err(ActuatorError::NotConfigured(self.name.clone()))
        }
    }

    fn reset_slot(&mut self, slot: GainSlot, index: usize) -> Result<(), ActuatorError> {
        if index >= NUM_SLOTS {
            return Err(ActuatorError::InvalidSlot(index));
        }

        match self.config.as_mut() {
            Some(c) => {
                c.slots[index] = slot;
                Ok(())
            },
            None => Err(ActuatorError::NotConfigured(self.name.clone()))
        }
    }

    fn select_slot(&mut self, index: usize) -> Result<(), ActuatorError> {
        if index >= NUM_SLOTS {
            return Err(ActuatorError::InvalidSlot(index));
        }

        match self.config.as_mut() {
            Some(c) => {
                c.slot_to_use = index;
                Ok(())
            },
            None => Err(ActuatorError::NotConfigured(self.name.clone()))
        }
    }

    fn refresh_signals(&mut self, signals: &[Signal]) -> Result<(), ActuatorError> {
        for s in signals {
            match s {
                Signal::Voltage => self.voltage_v = self.output_v,
                s => return Err(self.unsupported(&format!("reading {:?}", s)))
            }
        }

        Ok(())
    }

    fn motor_position(&self) -> Result<f64, ActuatorError> {
        Err(self.unsupported("reading motor position"))
    }

    fn motor_velocity(&self) -> Result<f64, ActuatorError> {
        Err(self.unsupported("reading motor velocity"))
    }

    fn system_position(&self) -> Result<f64, ActuatorError> {
        Err(self.unsupported("reading system position"))
    }

    fn system_velocity(&self) -> Result<f64, ActuatorError> {
        Err(self.unsupported("reading system velocity"))
    }

    fn voltage(&self) -> Result<f64, ActuatorError> {
        Ok(self.voltage_v)
    }

    fn set_motor_position(&mut self, _position_rot: f64) -> Result<(), ActuatorError> {
        Err(self.unsupported("setting the encoder position"))
    }

    fn set_follower_of(&mut self, _leader_id: u32) -> Result<(), ActuatorError> {
        Err(self.unsupported("following"))
    }

    fn raw_signal(&self, signal: Signal) -> Result<Arc<dyn SignalSource>, ActuatorError> {
        Err(self.unsupported(&format!("sampling {:?}", signal)))
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.write_voltage(0.0)
    }
}
