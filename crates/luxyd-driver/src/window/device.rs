//! Device-resident window
//!
//! BAR2 memory on the board. The driver neither allocates nor frees it; its
//! physical base and length are fixed for as long as the bus stays attached.

use super::{check_range, MemoryWindow, Translation};
use crate::bus::BusAttachment;
use crate::config::WindowKind;
use crate::error::{LuxydError, Result};
use crate::region::Region;
use luxyd_chip::bar::DEVICE_WINDOW_MIN;
use std::sync::Arc;

/// Window backed by device memory behind BAR2
#[derive(Debug)]
pub struct DeviceWindow {
    bus: Arc<dyn BusAttachment>,
    capacity: usize,
}

impl DeviceWindow {
    /// Use the BAR2 window of `bus`
    ///
    /// # Errors
    ///
    /// Returns `Attach` if the BAR is smaller than three 32×32 result-sized
    /// regions or is not currently attached.
    pub fn new(bus: Arc<dyn BusAttachment>) -> Result<Self> {
        let capacity = bus.resource_length();
        if capacity < DEVICE_WINDOW_MIN {
            return Err(LuxydError::attach(format!(
                "{}: BAR2 is {capacity} bytes, need at least {DEVICE_WINDOW_MIN}",
                bus.describe()
            )));
        }
        if bus.resource_base_address().is_none() {
            return Err(LuxydError::attach(format!(
                "{}: BAR2 is not attached",
                bus.describe()
            )));
        }

        tracing::info!(
            "Using device-resident window: {} ({capacity} bytes)",
            bus.describe()
        );
        Ok(Self { bus, capacity })
    }
}

impl MemoryWindow for DeviceWindow {
    fn kind(&self) -> WindowKind {
        WindowKind::DeviceResident
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn translate(&self, offset: usize, len: usize) -> Result<Translation> {
        check_range(offset, len, self.capacity)?;
        let base = self.bus.resource_base_address().ok_or_else(|| {
            LuxydError::map_failed(format!(
                "{}: BAR2 physical base unknown (bus detached)",
                self.bus.describe()
            ))
        })?;

        Ok(Translation::Bus {
            address: base + offset as u64,
            len,
        })
    }

    fn region(&self) -> Result<Arc<Region>> {
        self.bus.window_region().ok_or_else(|| {
            LuxydError::map_failed(format!("{}: BAR2 is not mapped", self.bus.describe()))
        })
    }
}
