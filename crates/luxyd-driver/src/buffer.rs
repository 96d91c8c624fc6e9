//! Buffer layout state
//!
//! One layout per device, replaced wholesale by each successful
//! `MATRIX_LOAD`. A failed load leaves the previous layout in place. Mutated
//! only with the control lock held.

use crate::config::WindowKind;
use crate::error::{LuxydError, Result};
use crate::layout::{BufferLayout, MatrixDims};
use tracing::debug;

/// Current matrix dimensions and the A/B/P layout derived from them
#[derive(Debug)]
pub struct BufferManager {
    capacity: usize,
    backing: WindowKind,
    current: Option<(MatrixDims, BufferLayout)>,
}

impl BufferManager {
    /// No layout yet; loads are checked against `capacity`
    pub const fn new(capacity: usize, backing: WindowKind) -> Self {
        Self {
            capacity,
            backing,
            current: None,
        }
    }

    /// Which window variant the regions live in
    pub const fn backing(&self) -> WindowKind {
        self.backing
    }

    /// Window capacity the layout is checked against
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Validate `dims` and make their layout current
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if a dimension is not positive
    /// - `OutOfCapacity` if A, B and P do not fit
    pub fn load(&mut self, dims: MatrixDims) -> Result<BufferLayout> {
        let layout = BufferLayout::compute(dims, self.capacity)?;
        debug!(
            "Layout {dims}: A@{:#x} B@{:#x} P@{:#x} ({} bytes)",
            layout.a_offset, layout.b_offset, layout.p_offset, layout.total_size
        );
        self.current = Some((dims, layout));
        Ok(layout)
    }

    /// Current dimensions and layout
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` if no load has succeeded yet.
    pub fn current(&self) -> Result<(MatrixDims, BufferLayout)> {
        self.current.ok_or(LuxydError::NotLoaded)
    }

    /// Current dimensions, if any
    pub fn current_dims(&self) -> Option<MatrixDims> {
        self.current.map(|(dims, _)| dims)
    }
}
