//! Device operations on top of an [`InstrumentSession`].
//!
//! The power supply speaks DP800-style SCPI (`INST CHn`, `VOLT`, `CURR`,
//! `OUTP CHn,ON`, `MEAS:VOLT? CHn`); the multimeter speaks SDM-style
//! measurement queries (`:MEAS:VOLT:DC?`, `:MEAS:CURR:DC?`, `:MEAS:CONT?`).

use crate::session::{InstrumentSession, SessionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 3;

/// A power-supply output channel, always within `MIN_CHANNEL..=MAX_CHANNEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel(u8);

impl Channel {
    pub fn new(number: i64) -> Option<Self> {
        u8::try_from(number)
            .ok()
            .filter(|n| (MIN_CHANNEL..=MAX_CHANNEL).contains(n))
            .map(Channel)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("unexpected reading '{0}'")]
    InvalidReading(String),
    #[error("measured current is zero, cannot compute resistance")]
    ZeroCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuity {
    Closed,
    Open,
}

impl Continuity {
    /// The meter reports `1` for a closed circuit; anything else is open.
    pub fn from_reading(reading: &str) -> Self {
        if reading.trim() == "1" {
            Continuity::Closed
        } else {
            Continuity::Open
        }
    }
}

impl core::fmt::Display for Continuity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Continuity::Closed => write!(f, "Continuity: Closed (Continuity detected)"),
            Continuity::Open => write!(f, "Continuity: Open (No continuity)"),
        }
    }
}

/// Renders a float the way the bench reports them: integral values keep a
/// trailing `.0`, everything else uses the shortest round-trip form.
/// Magnitudes below `1e-4` or from `1e16` up switch to exponent form with a
/// signed two-digit exponent (`1e-05`, `1.5e+16`).
pub fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if !value.is_finite() {
        format!("{value}")
    } else if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        exponent_form(value)
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn exponent_form(value: f64) -> String {
    let shortest = format!("{value:e}");
    let Some((mantissa, exponent)) = shortest.split_once('e') else {
        return shortest;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return shortest;
    };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

fn parse_reading(reading: &str) -> Result<f64, DeviceError> {
    reading
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DeviceError::InvalidReading(reading.trim().to_string()))
}

/// `voltage / current`, refusing a zero denominator.
pub fn checked_resistance(voltage: f64, current: f64) -> Result<f64, DeviceError> {
    if current == 0.0 {
        return Err(DeviceError::ZeroCurrent);
    }
    Ok(voltage / current)
}

pub struct PowerSupply<S> {
    session: S,
}

impl<S: InstrumentSession> PowerSupply<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    fn program_channel(&mut self, channel: Channel, setpoint: &str) -> Result<(), DeviceError> {
        let commands = [
            format!("INST CH{channel}"),
            setpoint.to_string(),
            format!("OUTP CH{channel},ON"),
        ];
        for command in &commands {
            debug!("Sending command to power supply: {}", command);
            self.session.write(command)?;
        }
        Ok(())
    }

    pub fn set_voltage(&mut self, channel: Channel, voltage: f64) -> Result<String, DeviceError> {
        let voltage = format_value(voltage);
        self.program_channel(channel, &format!("VOLT {voltage}"))?;
        Ok(format!("Channel {channel} Voltage set to {voltage}"))
    }

    pub fn set_current(&mut self, channel: Channel, current: f64) -> Result<String, DeviceError> {
        let current = format_value(current);
        self.program_channel(channel, &format!("CURR {current}"))?;
        Ok(format!("Channel {channel} Current set to {current}"))
    }

    pub fn read_voltage(&mut self, channel: Channel) -> Result<String, DeviceError> {
        Ok(self.session.query(&format!("MEAS:VOLT? CH{channel}"))?)
    }

    pub fn read_current(&mut self, channel: Channel) -> Result<String, DeviceError> {
        Ok(self.session.query(&format!("MEAS:CURR? CH{channel}"))?)
    }
}

pub struct Multimeter<S> {
    session: S,
}

impl<S: InstrumentSession> Multimeter<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    fn measure(&mut self, command: &str) -> Result<String, DeviceError> {
        let reading = self.session.query(command)?;
        debug!("Multimeter {} -> {}", command, reading);
        Ok(reading.trim().to_string())
    }

    pub fn measure_voltage_dc(&mut self) -> Result<String, DeviceError> {
        let reading = self.measure(":MEAS:VOLT:DC?")?;
        Ok(format!("Measured Voltage: {reading} V"))
    }

    pub fn measure_current_dc(&mut self) -> Result<String, DeviceError> {
        let reading = self.measure(":MEAS:CURR:DC?")?;
        Ok(format!("Measured Current: {reading} A"))
    }

    pub fn measure_continuity(&mut self) -> Result<Continuity, DeviceError> {
        let reading = self.measure(":MEAS:CONT?")?;
        Ok(Continuity::from_reading(&reading))
    }

    /// Reads current, then voltage, and returns their ratio in ohms.
    pub fn measure_resistance(&mut self) -> Result<f64, DeviceError> {
        let current = parse_reading(&self.measure(":MEAS:CURR:DC?")?)?;
        let voltage = parse_reading(&self.measure(":MEAS:VOLT:DC?")?)?;
        checked_resistance(voltage, current)
    }
}
