//! In-memory bench: a three-channel power supply and a multimeter that
//! understand the SCPI strings issued by [`crate::devices`].

use crate::session::{Connector, InstrumentKind, InstrumentSession, SessionError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const CHANNEL_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub voltage_setpoint: f64,
    pub current_setpoint: f64,
    pub output_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterState {
    pub dc_voltage: f64,
    pub dc_current: f64,
    pub continuity: bool,
}

impl Default for MeterState {
    fn default() -> Self {
        Self {
            dc_voltage: 3.3,
            dc_current: 0.01,
            continuity: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchState {
    pub channels: [ChannelState; CHANNEL_COUNT],
    pub selected_channel: Option<u8>,
    pub meter: MeterState,
    pub power_supply_online: bool,
    pub multimeter_online: bool,
}

/// Simulated bench shared between every session it opens.
#[derive(Debug, Clone)]
pub struct SimulatedBench {
    state: Arc<Mutex<BenchState>>,
}

impl SimulatedBench {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BenchState {
                power_supply_online: true,
                multimeter_online: true,
                ..BenchState::default()
            })),
        }
    }

    pub fn state(&self) -> BenchState {
        self.lock().clone()
    }

    pub fn set_meter(&self, meter: MeterState) {
        self.lock().meter = meter;
    }

    pub fn set_online(&self, kind: InstrumentKind, online: bool) {
        let mut state = self.lock();
        match kind {
            InstrumentKind::PowerSupply => state.power_supply_online = online,
            InstrumentKind::Multimeter => state.multimeter_online = online,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BenchState> {
        // A panicked holder cannot leave the plain-data state half-written
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for SimulatedBench {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SimulatedBench {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        let online = {
            let state = self.lock();
            match kind {
                InstrumentKind::PowerSupply => state.power_supply_online,
                InstrumentKind::Multimeter => state.multimeter_online,
            }
        };
        if !online {
            return Err(SessionError::Unavailable { kind });
        }

        Ok(Box::new(SimulatedSession {
            kind,
            bench: self.clone(),
        }))
    }
}

struct SimulatedSession {
    kind: InstrumentKind,
    bench: SimulatedBench,
}

fn parse_channel(token: &str) -> Option<usize> {
    let index: usize = token.strip_prefix("CH")?.parse().ok()?;
    (1..=CHANNEL_COUNT).contains(&index).then_some(index - 1)
}

fn format_reading(value: f64) -> String {
    format!("{value:.3}")
}

impl SimulatedSession {
    fn supply_write(state: &mut BenchState, command: &str) -> Option<()> {
        let (header, argument) = command.split_once(' ')?;
        match header {
            "INST" => {
                let index = parse_channel(argument)?;
                state.selected_channel = Some(index as u8);
            }
            "VOLT" => {
                let index = usize::from(state.selected_channel?);
                state.channels[index].voltage_setpoint = argument.trim().parse().ok()?;
            }
            "CURR" => {
                let index = usize::from(state.selected_channel?);
                state.channels[index].current_setpoint = argument.trim().parse().ok()?;
            }
            "OUTP" => {
                let (channel, switch) = argument.split_once(',')?;
                let index = parse_channel(channel)?;
                state.channels[index].output_enabled = match switch {
                    "ON" => true,
                    "OFF" => false,
                    _ => return None,
                };
            }
            _ => return None,
        }
        Some(())
    }

    fn supply_query(state: &BenchState, command: &str) -> Option<String> {
        let (header, channel) = command.split_once(' ')?;
        let channel = state.channels[parse_channel(channel)?];
        if !channel.output_enabled {
            return Some(format_reading(0.0));
        }
        match header {
            "MEAS:VOLT?" => Some(format_reading(channel.voltage_setpoint)),
            "MEAS:CURR?" => Some(format_reading(channel.current_setpoint)),
            _ => None,
        }
    }

    fn meter_query(state: &BenchState, command: &str) -> Option<String> {
        match command {
            ":MEAS:VOLT:DC?" => Some(format_reading(state.meter.dc_voltage)),
            ":MEAS:CURR:DC?" => Some(format_reading(state.meter.dc_current)),
            ":MEAS:CONT?" => Some(if state.meter.continuity { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }
}

impl InstrumentSession for SimulatedSession {
    fn write(&mut self, command: &str) -> Result<(), SessionError> {
        debug!("[sim {}] <- {}", self.kind, command);
        let mut state = self.bench.lock();
        let handled = match self.kind {
            InstrumentKind::PowerSupply => Self::supply_write(&mut state, command),
            InstrumentKind::Multimeter => None,
        };
        handled.ok_or_else(|| SessionError::Rejected(command.to_string()))
    }

    fn query(&mut self, command: &str) -> Result<String, SessionError> {
        let state = self.bench.lock();
        let reply = match self.kind {
            InstrumentKind::PowerSupply => Self::supply_query(&state, command),
            InstrumentKind::Multimeter => Self::meter_query(&state, command),
        };
        let reply = reply.ok_or_else(|| SessionError::Rejected(command.to_string()))?;
        debug!("[sim {}] {} -> {}", self.kind, command, reply);
        Ok(reply)
    }
}
