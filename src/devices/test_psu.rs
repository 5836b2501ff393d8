//! Bench power supply adapter.

use std::str::FromStr;

use async_trait::async_trait;

use crate::adapter::{Device, DeviceError};
use crate::client::{AdapterSession, ClientError, SupervisorClient};
use crate::rpc::{value, RemoteError};
use crate::supervisor::ModulePath;

use super::{args_text, Instrument, InstrumentError};

/// Module path the proxy asks the supervisor to ensure.
pub const MODULE: &str = "devs test_psu.py";

/// Actions understood by the power supply adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsuAction {
    GetOutput,
    SetOutput,
    GetVoltageSetpoint,
    SetVoltageSetpoint,
    GetMeasuredVoltage,
    GetCurrentSetpoint,
    SetCurrentSetpoint,
    GetMeasuredCurrent,
}

impl FromStr for PsuAction {
    type Err = DeviceError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "output_getattr" => Ok(Self::GetOutput),
            "output_setattr" => Ok(Self::SetOutput),
            "voltage_setpoint_getattr" => Ok(Self::GetVoltageSetpoint),
            "voltage_setpoint_setattr" => Ok(Self::SetVoltageSetpoint),
            "measured_voltage_getattr" => Ok(Self::GetMeasuredVoltage),
            "current_setpoint_getattr" => Ok(Self::GetCurrentSetpoint),
            "current_setpoint_setattr" => Ok(Self::SetCurrentSetpoint),
            "measured_current_getattr" => Ok(Self::GetMeasuredCurrent),
            _ => Err(DeviceError::UnknownAction(action.to_string())),
        }
    }
}

/// Power supply driven over a SCPI session.
#[derive(Debug)]
pub struct TestPsu<I> {
    inst: I,
}

impl<I: Instrument> TestPsu<I> {
    pub fn new(inst: I) -> Self {
        Self { inst }
    }

    async fn query_float(&mut self, command: &str) -> Result<f32, InstrumentError> {
        let reply = self.inst.query(command).await?;
        let parsed = reply.parse::<f32>().ok();
        parsed.ok_or_else(|| InstrumentError::UnexpectedReply {
            command: command.to_string(),
            reply,
        })
    }

    pub async fn output(&mut self) -> Result<bool, InstrumentError> {
        let reply = self.inst.query("OUTP?").await?;
        match reply.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(InstrumentError::UnexpectedReply {
                command: "OUTP?".to_string(),
                reply,
            }),
        }
    }

    pub async fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.inst.write(if on { "OUTP ON" } else { "OUTP OFF" }).await
    }

    pub async fn voltage_setpoint(&mut self) -> Result<f32, InstrumentError> {
        self.query_float("VOLT?").await
    }

    pub async fn set_voltage_setpoint(&mut self, volts: f32) -> Result<(), InstrumentError> {
        self.inst.write(&format!("VOLT {volts}")).await
    }

    pub async fn measured_voltage(&mut self) -> Result<f32, InstrumentError> {
        self.query_float("MEAS:VOLT?").await
    }

    pub async fn current_setpoint(&mut self) -> Result<f32, InstrumentError> {
        self.query_float("CURR?").await
    }

    pub async fn set_current_setpoint(&mut self, amps: f32) -> Result<(), InstrumentError> {
        self.inst.write(&format!("CURR {amps}")).await
    }

    pub async fn measured_current(&mut self) -> Result<f32, InstrumentError> {
        self.query_float("MEAS:CURR?").await
    }
}

#[async_trait]
impl<I: Instrument> Device for TestPsu<I> {
    fn name(&self) -> &str {
        "test_psu"
    }

    async fn handle(&mut self, action: &str, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let float_arg = |args: &[u8]| {
            args_text(action, args)
                .and_then(|text| value::parse_float(text).map_err(|e| DeviceError::invalid(action, e)))
        };

        let body = match action.parse::<PsuAction>()? {
            PsuAction::GetOutput => value::encode_bool(self.output().await?),
            PsuAction::SetOutput => {
                let on = args_text(action, args)
                    .and_then(|text| value::parse_bool(text).map_err(|e| DeviceError::invalid(action, e)))?;
                self.set_output(on).await?;
                Vec::new()
            }
            PsuAction::GetVoltageSetpoint => value::encode_float(self.voltage_setpoint().await?),
            PsuAction::SetVoltageSetpoint => {
                self.set_voltage_setpoint(float_arg(args)?).await?;
                Vec::new()
            }
            PsuAction::GetMeasuredVoltage => value::encode_float(self.measured_voltage().await?),
            PsuAction::GetCurrentSetpoint => value::encode_float(self.current_setpoint().await?),
            PsuAction::SetCurrentSetpoint => {
                self.set_current_setpoint(float_arg(args)?).await?;
                Vec::new()
            }
            PsuAction::GetMeasuredCurrent => value::encode_float(self.measured_current().await?),
        };
        Ok(body)
    }
}

/// Typed client for the power supply adapter.
#[derive(Debug)]
pub struct TestPsuProxy {
    session: AdapterSession,
}

impl TestPsuProxy {
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

    #[must_use]
    pub fn session(&self) -> &AdapterSession {
        &self.session
    }

    pub async fn echo(&self, message: &str) -> Result<String, ClientError> {
        let body = self.session.client().echo(message.as_bytes()).await?;
        String::from_utf8(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn output(&self) -> Result<bool, ClientError> {
        self.session.client().get_bool("output").await
    }

    pub async fn set_output(&self, on: bool) -> Result<(), ClientError> {
        self.session.client().set_bool("output", on).await
    }

    pub async fn voltage_setpoint(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("voltage_setpoint").await
    }

    pub async fn set_voltage_setpoint(&self, volts: f32) -> Result<(), ClientError> {
        self.session.client().set("voltage_setpoint", volts).await
    }

    pub async fn measured_voltage(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("measured_voltage").await
    }

    pub async fn current_setpoint(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("current_setpoint").await
    }

    pub async fn set_current_setpoint(&self, amps: f32) -> Result<(), ClientError> {
        self.session.client().set("current_setpoint", amps).await
    }

    pub async fn measured_current(&self) -> Result<f32, ClientError> {
        self.session.client().get_float("measured_current").await
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
