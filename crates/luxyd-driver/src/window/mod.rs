//! Memory window abstraction
//!
//! The three operand regions live in one contiguous window. Where that window
//! lives is a property of the attached device, not of the commands, so the
//! dispatcher, compute engines and mapping path only ever see
//! [`MemoryWindow`]:
//!
//! - **OwnedWindow**: driver-allocated host pages, translated to page pages
//! - **DeviceWindow**: BAR2 memory on the board, translated to bus addresses

pub mod device;
pub mod owned;

pub use device::DeviceWindow;
pub use owned::OwnedWindow;

use crate::config::WindowKind;
use crate::error::{LuxydError, Result};
use crate::region::Region;
use std::fmt::Debug;
use std::sync::Arc;

/// Virtual page number: a user-space address divided by the page size
///
/// These are not physical frame numbers; the owned window lives in this
/// process's address space and is never pinned for device DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageNumber(pub usize);

/// What backs a translated window range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Virtual pages of the owned allocation
    Pages {
        /// Pages covering the range, in order
        pages: Vec<PageNumber>,
        /// Offset of the range start inside the first page
        first_offset: usize,
        /// Length of the range
        len: usize,
    },
    /// Absolute bus address range of device-resident memory
    Bus {
        /// Bus address of the range start
        address: u64,
        /// Length of the range
        len: usize,
    },
}

impl Translation {
    /// Length of the translated range
    pub const fn len(&self) -> usize {
        match self {
            Self::Pages { len, .. } | Self::Bus { len, .. } => *len,
        }
    }

    /// Whether the translated range is empty
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Backing store for the operand window
pub trait MemoryWindow: Debug + Send + Sync {
    /// Which variant this is
    fn kind(&self) -> WindowKind;

    /// Fixed capacity in bytes
    fn capacity(&self) -> usize;

    /// Translate `[offset, offset + len)` into what physically backs it
    ///
    /// # Errors
    ///
    /// - `OutOfBounds` if the range leaves the window
    /// - `MapFailed` if the backing is not present
    fn translate(&self, offset: usize, len: usize) -> Result<Translation>;

    /// CPU view of the whole window
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if the backing is not present.
    fn region(&self) -> Result<Arc<Region>>;

    /// Allocate the backing, if the driver owns it
    ///
    /// # Errors
    ///
    /// Returns error if allocation fails.
    fn allocate(&self) -> Result<()> {
        Ok(())
    }

    /// Release the backing, if the driver owns it
    fn free(&self) {}
}

/// Bounds check shared by every window and the mapping path
pub(crate) fn check_range(offset: usize, len: usize, capacity: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(LuxydError::OutOfBounds {
            offset,
            length: len,
            capacity,
        }),
    }
}
