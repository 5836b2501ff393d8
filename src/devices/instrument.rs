//! Hardware session seam.

use std::collections::HashMap;

use async_trait::async_trait;

/// Errors reported by an instrument session.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("Unsupported command {0:?}")]
    Unsupported(String),

    #[error("Invalid value {value:?} in {command:?}")]
    InvalidValue { command: String, value: String },

    #[error("Unexpected reply {reply:?} to {command:?}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Instrument I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A message-based instrument session (SCPI over GPIB, USB or LAN).
#[async_trait]
pub trait Instrument: Send {
    /// Send `command` and return the trimmed reply.
    async fn query(&mut self, command: &str) -> Result<String, InstrumentError>;

    /// Send `command` without reading a reply.
    async fn write(&mut self, command: &str) -> Result<(), InstrumentError>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Supply {
    output: bool,
    voltage: f32,
    current: f32,
}

#[derive(Debug, Default, Clone, Copy)]
struct LaserSlot {
    on: bool,
    current: f32,
}

impl LaserSlot {
    /// Lasing threshold in amps.
    const THRESHOLD: f32 = 0.03;
    /// Slope efficiency in watts per amp.
    const SLOPE: f32 = 0.8;

    fn optical_power(self) -> f32 {
        if self.on {
            ((self.current - Self::THRESHOLD) * Self::SLOPE).max(0.0)
        } else {
            0.0
        }
    }
}

/// In-memory instrument understanding the power-supply and laser-mainframe
/// command subsets used by the built-in devices.
#[derive(Debug, Default)]
pub struct SimulatedInstrument {
    supply: Supply,
    slots: HashMap<u8, LaserSlot>,
}

impl SimulatedInstrument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Split an optional `:SLOT n;` prefix off `command`.
    fn split_slot(command: &str) -> Result<(Option<u8>, &str), InstrumentError> {
        let Some(rest) = command.strip_prefix(":SLOT ") else {
            return Ok((None, command));
        };
        let (slot, tail) = rest
            .split_once(';')
            .ok_or_else(|| InstrumentError::Unsupported(command.to_string()))?;
        let slot = slot.trim().parse().map_err(|_| InstrumentError::InvalidValue {
            command: command.to_string(),
            value: slot.to_string(),
        })?;
        Ok((Some(slot), tail))
    }

    fn apply(&mut self, command: &str) -> Result<Option<String>, InstrumentError> {
        let unsupported = || InstrumentError::Unsupported(command.to_string());
        let (slot, body) = Self::split_slot(command.trim())?;

        if let Some(slot) = slot {
            let laser = self.slots.entry(slot).or_default();
            return match body {
                ":LASER?" => {
                    let state = if laser.on { "ON" } else { "OFF" };
                    Ok(Some(format!(":LASER {state}")))
                }
                ":LASER ON" => {
                    laser.on = true;
                    Ok(None)
                }
                ":LASER OFF" => {
                    laser.on = false;
                    Ok(None)
                }
                ":ILD:SET?" => Ok(Some(format!(":ILD:SET {}", laser.current))),
                ":POPT:ACT?" => Ok(Some(format!(":POPT:ACT {}", laser.optical_power()))),
                _ => {
                    let value = body.strip_prefix(":ILD:SET ").ok_or_else(unsupported)?;
                    laser.current = parse_number(command, value)?;
                    Ok(None)
                }
            };
        }

        let supply = &mut self.supply;
        match body {
            "OUTP?" => Ok(Some(u8::from(supply.output).to_string())),
            "OUTP ON" => {
                supply.output = true;
                Ok(None)
            }
            "OUTP OFF" => {
                supply.output = false;
                Ok(None)
            }
            "VOLT?" => Ok(Some(supply.voltage.to_string())),
            "CURR?" => Ok(Some(supply.current.to_string())),
            "MEAS:VOLT?" => {
                let measured = if supply.output { supply.voltage } else { 0.0 };
                Ok(Some(measured.to_string()))
            }
            "MEAS:CURR?" => {
                let measured = if supply.output { supply.current } else { 0.0 };
                Ok(Some(measured.to_string()))
            }
            _ => {
                if let Some(value) = body.strip_prefix("VOLT ") {
                    supply.voltage = parse_number(command, value)?;
                } else if let Some(value) = body.strip_prefix("CURR ") {
                    supply.current = parse_number(command, value)?;
                } else {
                    return Err(unsupported());
                }
                Ok(None)
            }
        }
    }
}

fn parse_number(command: &str, value: &str) -> Result<f32, InstrumentError> {
    value.trim().parse().map_err(|_| InstrumentError::InvalidValue {
        command: command.to_string(),
        value: value.to_string(),
    })
}

#[async_trait]
impl Instrument for SimulatedInstrument {
    async fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.apply(command)?.ok_or_else(|| InstrumentError::UnexpectedReply {
            command: command.to_string(),
            reply: String::new(),
        })
    }

    async fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        match self.apply(command)? {
            None => Ok(()),
            Some(_) => Err(InstrumentError::Unsupported(command.to_string())),
        }
    }
}
