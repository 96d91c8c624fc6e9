//! User-space driver for the LUXYD AI matrix-multiply accelerator.
//!
//! A caller describes a product `P = A·B` (A is m×n, B is n×p, u16
//! operands, u32 result), writes the operands straight into a shared memory
//! window, asks the device to multiply, and reads P back from the same
//! window. Control goes through five fixed commands; data never does.
//!
//! # Components
//!
//! ```text
//! Session ──ioctl──► Dispatcher ──(ControlLock)──► BufferManager
//!    │                    │                         ComputeEngine ─► RegisterShim ─► BusAttachment
//!    └──mmap──► WindowMapping ◄── MemoryWindow (owned | device-resident)
//! ```
//!
//! # Window variants
//!
//! ```text
//! Owned:           16 MiB of driver-allocated, zeroed, page-aligned host memory
//! Device-resident: BAR2 memory on the board, never allocated or freed here
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use luxyd_driver::{LuxydDevice, MatrixDims};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = LuxydDevice::attach_software()?;
//! let session = device.open();
//!
//! session.matrix_load(MatrixDims::square(2))?;
//! let (_, layout) = session.layout()?;
//! let window = session.mmap(0, session.window_capacity())?;
//! window.write_u16s(layout.a_offset, &[3, 4, 5, 6])?;
//! window.write_u16s(layout.b_offset, &[5, 6, 7, 8])?;
//!
//! session.matrix_multiply()?;
//! assert_eq!(window.read_u32s(layout.p_offset, 4)?, vec![43, 50, 67, 78]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod buffer;
pub mod bus;
pub mod compute;
mod config;
mod device;
mod dispatch;
mod error;
mod layout;
mod lock;
mod mapping;
pub mod region;
mod shim;
pub mod window;

/// Silicon constants (re-exported from luxyd-chip).
pub mod chip {
    pub use luxyd_chip::bar::{DEVICE_WINDOW_MIN, OWNED_WINDOW_CAPACITY};
    pub use luxyd_chip::ioctl;
    pub use luxyd_chip::pcie::{identify, Identity};
    pub use luxyd_chip::regs::{self, MatrixInfo};
}

pub use buffer::BufferManager;
pub use bus::{BusAttachment, Completion, PciBus, SimulatedBus};
pub use compute::{select_engine, ComputeEngine, EngineType, HardwareEngine, SoftwareEngine};
pub use config::{ComputeSelection, DriverConfig, WindowKind};
pub use device::{LuxydDevice, Session};
pub use dispatch::{Command, Dispatcher};
pub use error::{LuxydError, Result};
pub use layout::{BufferLayout, MatrixDims};
pub use lock::{CancelToken, ControlLock};
pub use mapping::{map, WindowMapping};
pub use shim::RegisterShim;
pub use window::{DeviceWindow, MemoryWindow, OwnedWindow, PageNumber, Translation};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        CancelToken, DriverConfig, LuxydDevice, LuxydError, MatrixDims, Result, Session,
        WindowKind, WindowMapping,
    };
}
