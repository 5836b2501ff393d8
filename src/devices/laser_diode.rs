//! Laser diode driver card in a slot of a laser mainframe.

use std::str::FromStr;

use async_trait::async_trait;

use crate::adapter::{Device, DeviceError};
use crate::client::{AdapterSession, ClientError, SupervisorClient};
use crate::rpc::{value, RemoteError};
use crate::supervisor::ModulePath;

use super::{args_text, Instrument, InstrumentError};

/// Module path the proxy asks the supervisor to ensure.
pub const MODULE: &str = "devs laser_diode.py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserAction {
    GetOutput,
    SetOutput,
    GetCurrentSetpoint,
    SetCurrentSetpoint,
    GetOpticalPower,
}

impl FromStr for LaserAction {
    type Err = DeviceError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "output_getattr" => Ok(Self::GetOutput),
            "output_setattr" => Ok(Self::SetOutput),
            "current_setpoint_getattr" => Ok(Self::GetCurrentSetpoint),
            "current_setpoint_setattr" => Ok(Self::SetCurrentSetpoint),
            "optical_power_getattr" => Ok(Self::GetOpticalPower),
            _ => Err(DeviceError::UnknownAction(action.to_string())),
        }
    }
}

/// One driver card. Every command is prefixed with `:SLOT n;`.
#[derive(Debug)]
pub struct LaserDiode<I> {
    inst: I,
    slot: u8,
}

impl<I: Instrument> LaserDiode<I> {
    pub fn new(inst: I, slot: u8) -> Self {
        Self { inst, slot }
    }

    #[must_use]
    pub fn slot(&self) -> u8 {
        self.slot
    }

    fn command(&self, body: &str) -> String {
        format!(":SLOT {};{body}", self.slot)
    }

    /// Query `body` and parse the number following the echoed `prefix`.
    async fn query_value(&mut self, body: &str, prefix: &str) -> Result<f32, InstrumentError> {
        let command = self.command(body);
        let reply = self.inst.query(&command).await?;
        let parsed = reply
            .strip_prefix(prefix)
            .and_then(|v| v.trim().parse().ok());
        parsed.ok_or(InstrumentError::UnexpectedReply { command, reply })
    }

    pub async fn output(&mut self) -> Result<bool, InstrumentError> {
        let command = self.command(":LASER?");
        let reply = self.inst.query(&command).await?;
        match reply.as_str() {
            ":LASER ON" => Ok(true),
            ":LASER OFF" => Ok(false),
            _ => Err(InstrumentError::UnexpectedReply { command, reply }),
        }
    }

    pub async fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        let command = self.command(if on { ":LASER ON" } else { ":LASER OFF" });
        self.inst.write(&command).await
    }

    pub async fn current_setpoint(&mut self) -> Result<f32, InstrumentError> {
        self.query_value(":ILD:SET?", ":ILD:SET ").await
    }

    pub async fn set_current_setpoint(&mut self, amps: f32) -> Result<(), InstrumentError> {
        let command = self.command(&format!(":ILD:SET {amps}"));
        self.inst.write(&command).await
    }

    pub async fn optical_power(&mut self) -> Result<f32, InstrumentError> {
        self.query_value(":POPT:ACT?", ":POPT:ACT ").await
    }
}

#[async_trait]
impl<I: Instrument> Device for LaserDiode<I> {
    fn name(&self) -> &str {
        "laser_diode"
    }

    async fn handle(&mut self, action: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        match action.parse::<LaserAction>()? {
            LaserAction::GetOutput => Ok(value::encode_bool(self.output().await?)),
            LaserAction::SetOutput => {
                let text = args_text(action, args)?;
                let on = value::parse_bool(text).map_err(|e| DeviceError::invalid(action, e))?;
                self.set_output(on).await?;
                Ok(Vec::new())
            }
            LaserAction::GetCurrentSetpoint => Ok(value::encode_float(self.current_setpoint().await?)),
            LaserAction::SetCurrentSetpoint => {
                let text = args_text(action, args)?;
                let amps = value::parse_float(text).map_err(|e| DeviceError::invalid(action, e))?;
                self.set_current_setpoint(amps).await?;
                Ok(Vec::new())
            }
            LaserAction::GetOpticalPower => Ok(value::encode_float(self.optical_power().await?)),
        }
    }
}

/// Typed client for the laser diode adapter.
#[derive(Debug)]
pub struct LaserDiodeProxy {
    session: AdapterSession,
}

impl LaserDiodeProxy {
    /// Ensure the adapter is running and attach to it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotStarted`] if the supervisor cannot start it.
    pub async fn connect(supervisor: SupervisorClient) -> Result<Self, ClientError> {
        let module = ModulePath::parse(MODULE)
            .map_err(|e| ClientError::NotStarted(RemoteError::protocol(e.to_string())))?;
        let session = AdapterSession::ensure(supervisor, &module).await?;
        Ok(Self { session })
    }

    pub async fn output(&self) -> Result<bool, ClientError> {
        self.session.client().get_bool("output").await
    }

    pub async fn set_output(&self, on: bool) -> Result<(), ClientError> {
        self.session.client().set_bool("output", on).await
    }

    pub async fn current_setpoint(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("current_setpoint").await
    }

    pub async fn set_current_setpoint(&self, amps: f32) -> Result<(), ClientError> {
        self.session.client().set("current_setpoint", amps).await
    }

    pub async fn optical_power(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("optical_power").await
    }

    /// Stop the adapter.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's error if STOP fails.
    pub async fn release(self) -> Result<(), ClientError> {
        self.session.stop().await
    }
}
