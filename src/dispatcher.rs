//! Keyword → handler table.
//!
//! Handlers are plain functions of the parsed arguments and a [`Connector`].
//! Each one opens the session it needs after validation has passed, so a
//! command rejected by the parser never touches the bench.

use crate::command::{parse_line, CommandError, Keyword, ParsedCommand};
use crate::devices::{format_value, Multimeter, PowerSupply};
use crate::session::{Connector, InstrumentKind, InstrumentSession};
use tracing::{debug, warn};

pub type Handler = fn(&ParsedCommand, &dyn Connector) -> Result<String, CommandError>;

pub const PROBING_VOLTAGE: &str = "PROBING VOLTAGE";
pub const PROBING_CURRENT: &str = "PROBING CURRENT";

static HANDLERS: [(Keyword, Handler); 10] = [
    (Keyword::Setv, set_voltage),
    (Keyword::Setc, set_current),
    (Keyword::Getv, read_voltage),
    (Keyword::Getc, read_current),
    (Keyword::Tstv, measure_voltage),
    (Keyword::Tstc, measure_current),
    (Keyword::Tsco, measure_continuity),
    (Keyword::Tstr, measure_resistance),
    (Keyword::Prbv, probe_voltage),
    (Keyword::Prbc, probe_current),
];

pub fn handler_for(keyword: Keyword) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(candidate, _)| *candidate == keyword)
        .map(|(_, handler)| *handler)
}

fn open(
    connector: &dyn Connector,
    keyword: Keyword,
    kind: InstrumentKind,
) -> Result<Box<dyn InstrumentSession>, CommandError> {
    connector
        .open(kind)
        .map_err(|e| CommandError::device(keyword, e.into()))
}

fn power_supply(
    connector: &dyn Connector,
    keyword: Keyword,
) -> Result<PowerSupply<Box<dyn InstrumentSession>>, CommandError> {
    open(connector, keyword, InstrumentKind::PowerSupply).map(PowerSupply::new)
}

fn multimeter(
    connector: &dyn Connector,
    keyword: Keyword,
) -> Result<Multimeter<Box<dyn InstrumentSession>>, CommandError> {
    open(connector, keyword, InstrumentKind::Multimeter).map(Multimeter::new)
}

fn set_voltage(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    let keyword = command.keyword;
    let (channel, voltage) = (command.require_channel()?, command.require_value()?);
    power_supply(connector, keyword)?
        .set_voltage(channel, voltage)
        .map_err(|e| CommandError::device(keyword, e))
}

fn set_current(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    let keyword = command.keyword;
    let (channel, current) = (command.require_channel()?, command.require_value()?);
    power_supply(connector, keyword)?
        .set_current(channel, current)
        .map_err(|e| CommandError::device(keyword, e))
}

fn read_voltage(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    let keyword = command.keyword;
    let channel = command.require_channel()?;
    let reading = power_supply(connector, keyword)?
        .read_voltage(channel)
        .map_err(|e| CommandError::device(keyword, e))?;
    Ok(format!("Voltage at channel {channel}: {reading}"))
}

fn read_current(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    let keyword = command.keyword;
    let channel = command.require_channel()?;
    let reading = power_supply(connector, keyword)?
        .read_current(channel)
        .map_err(|e| CommandError::device(keyword, e))?;
    Ok(format!("Current at channel {channel}: {reading}"))
}

fn measure_voltage(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    multimeter(connector, command.keyword)?
        .measure_voltage_dc()
        .map_err(|e| CommandError::device(command.keyword, e))
}

fn measure_current(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    multimeter(connector, command.keyword)?
        .measure_current_dc()
        .map_err(|e| CommandError::device(command.keyword, e))
}

fn measure_continuity(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    multimeter(connector, command.keyword)?
        .measure_continuity()
        .map(|continuity| continuity.to_string())
        .map_err(|e| CommandError::device(command.keyword, e))
}

fn measure_resistance(command: &ParsedCommand, connector: &dyn Connector) -> Result<String, CommandError> {
    let resistance = multimeter(connector, command.keyword)?
        .measure_resistance()
        .map_err(|e| CommandError::device(command.keyword, e))?;
    Ok(format!("Resistance: {} Ohms", format_value(resistance)))
}

fn probe_voltage(_command: &ParsedCommand, _connector: &dyn Connector) -> Result<String, CommandError> {
    Ok(PROBING_VOLTAGE.to_string())
}

fn probe_current(_command: &ParsedCommand, _connector: &dyn Connector) -> Result<String, CommandError> {
    Ok(PROBING_CURRENT.to_string())
}

/// Parses and runs single command lines against the bench behind `C`.
#[derive(Debug, Clone)]
pub struct Dispatcher<C> {
    connector: C,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Runs one line, returning its success text or the reason it failed.
    pub fn dispatch(&self, line: &str) -> Result<String, CommandError> {
        let command = parse_line(line)?;
        let handler = handler_for(command.keyword).ok_or_else(|| CommandError::UnknownCommand {
            line: line.to_string(),
        })?;

        debug!("Dispatching {:?}", command);
        handler(&command, &self.connector)
    }

    /// Runs one line and renders the outcome; never fails.
    pub fn execute(&self, line: &str) -> String {
        render_outcome(line, self.dispatch(line))
    }
}

/// Result text for one line: the success message or the error diagnostic.
pub fn render_outcome(line: &str, outcome: Result<String, CommandError>) -> String {
    match outcome {
        Ok(message) => message,
        Err(e) => {
            warn!("Command '{}' failed ({:?}): {}", line, e.kind(), e);
            e.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ErrorKind;
    use crate::simulator::{MeterState, SimulatedBench};

    #[test]
    fn test_every_keyword_has_a_handler() {
        for keyword in Keyword::ALL {
            assert!(handler_for(keyword).is_some(), "{keyword} has no handler");
        }
    }

    #[test]
    fn test_set_then_get_on_simulated_bench() {
        let dispatcher = Dispatcher::new(SimulatedBench::new());

        assert_eq!(dispatcher.execute("SETV 2,5.0"), "Channel 2 Voltage set to 5.0");
        assert_eq!(dispatcher.execute("SETC 2,0.5"), "Channel 2 Current set to 0.5");
        assert_eq!(dispatcher.execute("GETV2"), "Voltage at channel 2: 5.000");
        assert_eq!(dispatcher.execute("GETC 2"), "Current at channel 2: 0.500");
    }

    #[test]
    fn test_tiny_setpoint_uses_exponent_form() {
        let dispatcher = Dispatcher::new(SimulatedBench::new());
        assert_eq!(dispatcher.execute("SETC 1,0.00001"), "Channel 1 Current set to 1e-05");
        assert_eq!(dispatcher.execute("GETC1"), "Current at channel 1: 0.000");
    }

    #[test]
    fn test_render_outcome_matches_dispatch() {
        let dispatcher = Dispatcher::new(SimulatedBench::new());
        for line in ["PRBV", "FOOB", "SETV 7,1.0", "GETV"] {
            assert_eq!(render_outcome(line, dispatcher.dispatch(line)), dispatcher.execute(line));
        }
        assert_eq!(
            render_outcome("GETV", dispatcher.dispatch("GETV")),
            "Error processing GETV command: Invalid channel."
        );
    }

    #[test]
    fn test_probe_stubs() {
        let dispatcher = Dispatcher::new(SimulatedBench::new());
        assert_eq!(dispatcher.execute("PRBV"), PROBING_VOLTAGE);
        assert_eq!(dispatcher.execute("PRBC"), PROBING_CURRENT);
    }

    #[test]
    fn test_multimeter_commands() {
        let bench = SimulatedBench::new();
        bench.set_meter(MeterState {
            dc_voltage: 5.0,
            dc_current: 0.5,
            continuity: true,
        });
        let dispatcher = Dispatcher::new(bench);

        assert_eq!(dispatcher.execute("TSTV"), "Measured Voltage: 5.000 V");
        assert_eq!(dispatcher.execute("TSTC"), "Measured Current: 0.500 A");
        assert_eq!(dispatcher.execute("TSCO"), "Continuity: Closed (Continuity detected)");
        assert_eq!(dispatcher.execute("TSTR"), "Resistance: 10.0 Ohms");
    }

    #[test]
    fn test_zero_current_resistance_is_contained() {
        let bench = SimulatedBench::new();
        bench.set_meter(MeterState {
            dc_voltage: 5.0,
            dc_current: 0.0,
            continuity: false,
        });
        let dispatcher = Dispatcher::new(bench);

        let error = dispatcher.dispatch("TSTR").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Arithmetic);
        assert_eq!(
            dispatcher.execute("TSTR"),
            "Error processing TSTR command: measured current is zero, cannot compute resistance"
        );
    }

    #[test]
    fn test_unreachable_instrument_is_device_error() {
        let bench = SimulatedBench::new();
        bench.set_online(InstrumentKind::Multimeter, false);
        let dispatcher = Dispatcher::new(bench);

        for line in ["TSTV", "TSTC", "TSCO", "TSTR"] {
            let error = dispatcher.dispatch(line).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Device, "{line}");
        }
        assert_eq!(
            dispatcher.execute("TSTV"),
            "Error processing TSTV command: multimeter not available"
        );
        // Power supply side unaffected
        assert!(dispatcher.dispatch("SETV 1,1.0").is_ok());
    }
}
