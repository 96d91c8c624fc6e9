//! Bus attachment: the driver's view of an attached LUXYD device
//!
//! Enumeration and binding happen outside the driver. What the core needs
//! from an attached device is captured by [`BusAttachment`]:
//!
//! - 32-bit access to the BAR0 control registers
//! - the physical base and length of the BAR2 window
//! - a CPU view of the BAR2 window
//!
//! Two implementations:
//! - **PciBus**: sysfs `resourceN` mappings of a real board
//! - **SimulatedBus**: in-process device model for CI and bring-up

pub mod pci;
pub mod simulated;

pub use pci::PciBus;
pub use simulated::{Completion, SimulatedBus};

use crate::error::Result;
use crate::region::Region;
use std::fmt::Debug;
use std::sync::Arc;

/// Register and window access for an attached device
pub trait BusAttachment: Debug + Send + Sync {
    /// Read a BAR0 register
    ///
    /// # Errors
    ///
    /// Returns error if the register block is not mapped or the offset is
    /// invalid.
    fn read_register(&self, offset: usize) -> Result<u32>;

    /// Write a BAR0 register
    ///
    /// # Errors
    ///
    /// Returns error if the register block is not mapped or the offset is
    /// invalid.
    fn write_register(&self, offset: usize, value: u32) -> Result<()>;

    /// Physical base address of the BAR2 window, `None` once detached
    fn resource_base_address(&self) -> Option<u64>;

    /// Length of the BAR2 window in bytes
    fn resource_length(&self) -> usize;

    /// CPU view of the BAR2 window, `None` once detached
    fn window_region(&self) -> Option<Arc<Region>>;

    /// Drop the mappings; later translations fail
    fn detach(&self);

    /// Short human-readable identity for logs
    fn describe(&self) -> String;
}
