//! Driver-owned window
//!
//! Allocated once at attach time: page-aligned, zero-filled, locked in RAM
//! when the memlock limit allows. Translation yields the virtual page
//! numbers the range occupies in this process; physical frames are not
//! resolved.

use super::{check_range, MemoryWindow, PageNumber, Translation};
use crate::config::WindowKind;
use crate::error::{LuxydError, Result};
use crate::region::{page_size, Region};
use parking_lot::RwLock;
use std::sync::Arc;

/// Host-memory window allocated by the driver
#[derive(Debug)]
pub struct OwnedWindow {
    capacity: usize,
    region: RwLock<Option<Arc<Region>>>,
}

impl OwnedWindow {
    /// Allocate a window of `capacity` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the allocation fails.
    pub fn new(capacity: usize) -> Result<Self> {
        let window = Self::unallocated(capacity);
        window.allocate()?;
        Ok(window)
    }

    /// A window whose backing has not been allocated yet
    pub fn unallocated(capacity: usize) -> Self {
        Self {
            capacity,
            region: RwLock::new(None),
        }
    }

    /// Whether the backing is currently allocated
    pub fn is_allocated(&self) -> bool {
        self.region.read().is_some()
    }
}

impl MemoryWindow for OwnedWindow {
    fn kind(&self) -> WindowKind {
        WindowKind::Owned
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn translate(&self, offset: usize, len: usize) -> Result<Translation> {
        check_range(offset, len, self.capacity)?;
        let region = self.region()?;

        let page = page_size();
        let start = region.base_address() + offset;
        let first = start / page;
        let last = (start + len.max(1) - 1) / page;
        let pages = (first..=last).map(PageNumber).collect();

        Ok(Translation::Pages {
            pages,
            first_offset: start % page,
            len,
        })
    }

    fn region(&self) -> Result<Arc<Region>> {
        self.region
            .read()
            .clone()
            .ok_or_else(|| LuxydError::map_failed("owned window is not allocated"))
    }

    fn allocate(&self) -> Result<()> {
        let mut slot = self.region.write();
        if slot.is_none() {
            let region = Region::zeroed(self.capacity)?;
            tracing::info!(
                "Allocated owned window: {} KiB (locked={})",
                self.capacity / 1024,
                region.is_locked()
            );
            *slot = Some(Arc::new(region));
        }
        Ok(())
    }

    fn free(&self) {
        // Existing mappings keep their Arc; the pages go away with the last one.
        if self.region.write().take().is_some() {
            tracing::info!("Released owned window");
        }
    }
}
