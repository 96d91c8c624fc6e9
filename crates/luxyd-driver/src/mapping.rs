//! Caller mappings of the memory window
//!
//! A mapping exposes `[offset, offset + len)` of the window. It records the
//! translation of that range (virtual pages or bus address) and holds a
//! reference on the backing region, so the memory stays valid for as long
//! as the mapping does. Mappings are fixed-size.
//!
//! All element access is little-endian and bounds-checked against the
//! mapping, with offsets relative to the mapping start.

use crate::error::{LuxydError, Result};
use crate::region::{page_align, Region};
use crate::window::{MemoryWindow, Translation};
use std::sync::Arc;
use tracing::debug;

/// Map `len` bytes of `window` starting at `offset`
///
/// # Errors
///
/// - `InvalidArgument` if `len` is zero
/// - `OutOfBounds` if the range does not fit the window
/// - `MapFailed` if the backing cannot be translated
pub fn map(window: &dyn MemoryWindow, offset: usize, len: usize) -> Result<WindowMapping> {
    if len == 0 {
        return Err(LuxydError::invalid_argument("zero-length mapping"));
    }

    let translation = window.translate(offset, len)?;
    let region = window.region()?;

    debug!(
        "Mapped {} window [{offset:#x}, +{len:#x}) -> {translation:?}",
        window.kind()
    );

    Ok(WindowMapping {
        region,
        offset,
        len,
        translation,
    })
}

/// A mapped sub-range of the window
#[derive(Debug)]
pub struct WindowMapping {
    region: Arc<Region>,
    offset: usize,
    len: usize,
    translation: Translation,
}

impl WindowMapping {
    /// Mapped length in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length mappings are rejected
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length rounded up to the page size, for display
    pub fn page_len(&self) -> usize {
        page_align(self.len)
    }

    /// Window offset the mapping starts at
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Physical backing of the mapped range
    pub const fn translation(&self) -> &Translation {
        &self.translation
    }

    /// Window offset for `rel`, checking `[rel, rel + bytes)` is mapped
    fn window_offset(&self, rel: usize, bytes: usize) -> Result<usize> {
        match rel.checked_add(bytes) {
            Some(end) if end <= self.len => Ok(self.offset + rel),
            _ => Err(LuxydError::OutOfBounds {
                offset: rel,
                length: bytes,
                capacity: self.len,
            }),
        }
    }

    fn element_bytes(count: usize, width: usize) -> Result<usize> {
        count
            .checked_mul(width)
            .ok_or_else(|| LuxydError::invalid_argument("element count overflows"))
    }

    /// Copy bytes out of the mapping
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range is outside the mapping.
    pub fn read_bytes(&self, rel: usize, buffer: &mut [u8]) -> Result<()> {
        let at = self.window_offset(rel, buffer.len())?;
        self.region.read_bytes(at, buffer)
    }

    /// Copy bytes into the mapping
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range is outside the mapping.
    pub fn write_bytes(&self, rel: usize, data: &[u8]) -> Result<()> {
        let at = self.window_offset(rel, data.len())?;
        self.region.write_bytes(at, data)
    }

    /// Set every mapped byte to `value`
    ///
    /// # Errors
    ///
    /// Returns error if the backing region rejects the write.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.region.fill(self.offset, self.len, value)
    }

    /// # Errors
    ///
    /// Returns `OutOfBounds` if the elements are outside the mapping.
    pub fn read_u16s(&self, rel: usize, count: usize) -> Result<Vec<u16>> {
        let at = self.window_offset(rel, Self::element_bytes(count, 2)?)?;
        self.region.read_u16s(at, count)
    }

    /// # Errors
    ///
    /// Returns `OutOfBounds` if the elements are outside the mapping.
    pub fn write_u16s(&self, rel: usize, values: &[u16]) -> Result<()> {
        let at = self.window_offset(rel, Self::element_bytes(values.len(), 2)?)?;
        self.region.write_u16s(at, values)
    }

    /// # Errors
    ///
    /// Returns `OutOfBounds` if the elements are outside the mapping.
    pub fn read_u32s(&self, rel: usize, count: usize) -> Result<Vec<u32>> {
        let at = self.window_offset(rel, Self::element_bytes(count, 4)?)?;
        self.region.read_u32s(at, count)
    }

    /// # Errors
    ///
    /// Returns `OutOfBounds` if the elements are outside the mapping.
    pub fn write_u32s(&self, rel: usize, values: &[u32]) -> Result<()> {
        let at = self.window_offset(rel, Self::element_bytes(values.len(), 4)?)?;
        self.region.write_u32s(at, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::OwnedWindow;

    #[test]
    fn zero_length_rejected() {
        let window = OwnedWindow::new(4096).unwrap();
        assert!(matches!(
            map(&window, 0, 0),
            Err(LuxydError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn out_of_window_rejected() {
        let window = OwnedWindow::new(4096).unwrap();
        assert!(matches!(
            map(&window, 4000, 200),
            Err(LuxydError::OutOfBounds { .. })
        ));
        assert!(matches!(
            map(&window, usize::MAX, 2),
            Err(LuxydError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn relative_access_is_bounded() {
        let window = OwnedWindow::new(8192).unwrap();
        let mapping = map(&window, 4096, 16).unwrap();

        mapping.write_u16s(0, &[1, 2, 3, 4]).unwrap();
        mapping.write_u32s(8, &[0xdead_beef, 7]).unwrap();
        assert!(matches!(
            mapping.write_u32s(12, &[1, 2]),
            Err(LuxydError::OutOfBounds { .. })
        ));

        let full = map(&window, 0, 8192).unwrap();
        assert_eq!(full.read_u16s(4096, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(full.read_u32s(4104, 2).unwrap(), vec![0xdead_beef, 7]);
    }

    #[test]
    fn mapping_outlives_free() {
        let window = OwnedWindow::new(4096).unwrap();
        let mapping = map(&window, 0, 4096).unwrap();
        window.free();

        mapping.fill(0xab).unwrap();
        let mut byte = [0u8; 1];
        mapping.read_bytes(4095, &mut byte).unwrap();
        assert_eq!(byte, [0xab]);

        assert!(matches!(map(&window, 0, 16), Err(LuxydError::MapFailed { .. })));
    }
}
