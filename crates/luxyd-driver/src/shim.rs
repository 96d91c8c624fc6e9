//! Status/register shim
//!
//! Thin typed layer over the three BAR0 registers the driver uses.

use crate::bus::BusAttachment;
use crate::error::Result;
use luxyd_chip::regs::{self, command, MatrixInfo};
use std::sync::Arc;

/// Typed access to STATUS, COMMAND and INFO
#[derive(Debug, Clone)]
pub struct RegisterShim {
    bus: Arc<dyn BusAttachment>,
}

impl RegisterShim {
    /// Wrap an attached bus
    pub fn new(bus: Arc<dyn BusAttachment>) -> Self {
        Self { bus }
    }

    /// Read the status word
    ///
    /// # Errors
    ///
    /// Returns error if the register block is not accessible.
    pub fn read_status(&self) -> Result<u32> {
        self.bus.read_register(regs::STATUS)
    }

    /// Set the trigger bit in the command register
    ///
    /// # Errors
    ///
    /// Returns error if the register block is not accessible.
    pub fn trigger_compute(&self) -> Result<()> {
        self.bus.write_register(regs::COMMAND, command::TRIGGER)
    }

    /// Hardware-reported matrix dimensions (not used by the compute path)
    ///
    /// # Errors
    ///
    /// Returns error if the register block is not accessible.
    pub fn read_info(&self) -> Result<MatrixInfo> {
        self.bus
            .read_register(regs::INFO)
            .map(MatrixInfo::from_register)
    }

    /// The underlying bus
    pub fn bus(&self) -> &Arc<dyn BusAttachment> {
        &self.bus
    }
}
