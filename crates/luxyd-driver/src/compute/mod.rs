//! Compute engines
//!
//! `MATRIX_MULTIPLY` is served by exactly one engine per attached device:
//!
//! - **SoftwareEngine**: exact integer multiply on the CPU, straight out of
//!   the window
//! - **HardwareEngine**: trigger/ready handshake with the board
//!
//! Selection happens once at attach time, like backend selection for a
//! driver with optional hardware.

pub mod hardware;
pub mod software;

pub use hardware::HardwareEngine;
pub use software::SoftwareEngine;

use crate::bus::BusAttachment;
use crate::config::{ComputeSelection, DriverConfig, WindowKind};
use crate::error::{LuxydError, Result};
use crate::layout::{BufferLayout, MatrixDims};
use crate::shim::RegisterShim;
use crate::window::MemoryWindow;
use std::fmt::Debug;
use std::sync::Arc;

/// Performs (or delegates) the multiply over the window
pub trait ComputeEngine: Debug + Send + Sync {
    /// Compute P = A·B for `dims`, using the regions of `layout`
    ///
    /// # Errors
    ///
    /// Returns error if the window is not accessible or the hardware fails
    /// or times out.
    fn multiply(
        &self,
        window: &dyn MemoryWindow,
        dims: MatrixDims,
        layout: &BufferLayout,
    ) -> Result<()>;

    /// Device status word
    ///
    /// # Errors
    ///
    /// Returns error if the status register cannot be read.
    fn status(&self) -> Result<u32>;

    /// Engine type for logs and diagnostics
    fn engine_type(&self) -> EngineType;
}

/// Engine type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// CPU multiply
    Software,
    /// Register handshake with the board
    Hardware,
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software => write!(f, "Software"),
            Self::Hardware => write!(f, "Hardware"),
        }
    }
}

/// Pick the engine for `config`
///
/// The board only reads operands from its own BAR2 memory, so `Auto` picks
/// hardware only for a device-resident window on an attached bus.
///
/// # Errors
///
/// - `InvalidArgument` if hardware compute is requested over the owned
///   window
/// - `Attach` if hardware compute is requested without a bus
pub fn select_engine(
    config: &DriverConfig,
    bus: Option<&Arc<dyn BusAttachment>>,
) -> Result<Box<dyn ComputeEngine>> {
    match (config.compute, config.window, bus) {
        (ComputeSelection::Software, _, _)
        | (ComputeSelection::Auto, WindowKind::Owned, _)
        | (ComputeSelection::Auto, _, None) => {
            tracing::info!("Using software compute engine");
            Ok(Box::new(SoftwareEngine::new()))
        }
        (
            ComputeSelection::Hardware | ComputeSelection::Auto,
            WindowKind::DeviceResident,
            Some(bus),
        ) => {
            tracing::info!("Using hardware compute engine on {}", bus.describe());
            Ok(Box::new(HardwareEngine::new(
                RegisterShim::new(Arc::clone(bus)),
                config.ready_timeout,
                config.poll_interval,
            )))
        }
        (ComputeSelection::Hardware, WindowKind::Owned, _) => Err(LuxydError::invalid_argument(
            "hardware compute needs the device-resident window",
        )),
        (ComputeSelection::Hardware, WindowKind::DeviceResident, None) => Err(
            LuxydError::attach("hardware compute requested but no bus is attached"),
        ),
    }
}
