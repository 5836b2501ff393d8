//! Built-in device adapters.
//!
//! Each adapter pairs a [`Device`] implementation, served inside the adapter
//! process, with a typed proxy used by callers. Hardware access goes through
//! the [`Instrument`] seam; the bundled [`SimulatedInstrument`] lets every
//! adapter run without a bench.

mod instrument;
pub mod laser_diode;
pub mod test_psu;

pub use instrument::{Instrument, InstrumentError, SimulatedInstrument};
pub use laser_diode::{LaserDiode, LaserDiodeProxy};
pub use test_psu::{TestPsu, TestPsuProxy};

use std::fmt;
use std::path::Path;

use crate::adapter::{Device, DeviceError};
use crate::config::AdapterConfig;

/// Device selected by an adapter module's file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    TestPsu,
    LaserDiode,
}

impl DeviceKind {
    /// Pick a device from a file stem such as `test_psu`.
    #[must_use]
    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "test_psu" => Some(Self::TestPsu),
            "laser_diode" | "blue_mot_3d2" => Some(Self::LaserDiode),
            _ => None,
        }
    }

    /// Pick a device from a module path such as `devs/test_psu.py`.
    #[must_use]
    pub fn from_module(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(Self::from_stem)
    }

    /// Open a hardware session and wrap it in the matching device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if the session cannot be opened.
    pub fn open(self, config: &AdapterConfig) -> Result<Box<dyn Device>, DeviceError> {
        let inst = SimulatedInstrument::new();
        let device: Box<dyn Device> = match self {
            Self::TestPsu => Box::new(TestPsu::new(inst)),
            Self::LaserDiode => Box::new(LaserDiode::new(inst, config.laser_slot)),
        };
        tracing::info!(device = %self, "Hardware session opened");
        Ok(device)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TestPsu => write!(f, "test_psu"),
            Self::LaserDiode => write!(f, "laser_diode"),
        }
    }
}

/// Argument blob as trimmed UTF-8 text.
fn args_text<'a>(action: &str, args: &'a [u8]) -> Result<&'a str, DeviceError> {
    std::str::from_utf8(args)
        .map(str::trim)
        .map_err(|e| DeviceError::invalid(action, e))
}
