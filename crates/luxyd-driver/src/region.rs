//! Raw memory behind a window
//!
//! A [`Region`] is either a page-aligned, zero-filled host allocation locked
//! against swapping, or a shared mapping of a PCIe BAR resource file. All
//! accesses are bounds-checked and go through byte copies, so callers never
//! form references into memory the device (or another caller) may be
//! writing concurrently.
//!
//! # Evolution
//!
//! The host allocation follows the DMA buffer scheme (aligned `alloc_zeroed`
//! plus `mlock`); the BAR mapping follows the sysfs `resourceN` scheme.
//! Both use rustix rather than raw libc.

use crate::error::{LuxydError, Result};
use rustix::mm::{mlock, mmap, munlock, munmap, MapFlags, ProtFlags};
use std::alloc::Layout;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::Path;
use std::ptr::NonNull;

/// Platform page size in bytes
pub fn page_size() -> usize {
    rustix::param::page_size()
}

/// Round `len` up to a whole number of pages
pub fn page_align(len: usize) -> usize {
    let page = page_size();
    len.div_ceil(page) * page
}

#[derive(Debug)]
enum Source {
    Heap { layout: Layout, locked: bool },
    Mapped { _file: File, path: String },
}

/// Contiguous memory backing a window
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
    source: Source,
}

impl Region {
    /// Allocate `len` bytes of page-aligned, zero-filled host memory
    ///
    /// The pages are locked with `mlock` when the memlock limit allows it;
    /// otherwise the region stays usable and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero length and `Attach` if the
    /// allocation fails.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(LuxydError::invalid_argument("zero-sized region"));
        }

        let layout = Layout::from_size_align(page_align(len), page_size())
            .map_err(|e| LuxydError::attach(format!("bad region layout: {e}")))?;

        // SAFETY: layout has non-zero size (len > 0, rounded up to a page).
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| LuxydError::attach(format!("cannot allocate {len} bytes")))?;

        // SAFETY: [ptr, ptr + layout.size()) is the allocation made above.
        let locked = match unsafe { mlock(ptr.as_ptr().cast(), layout.size()) } {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "mlock of {} KiB failed ({e}); window pages may be swapped",
                    layout.size() / 1024
                );
                false
            }
        };

        tracing::debug!(
            "Allocated host region: {len:#x} bytes at {:p} (locked={locked})",
            ptr.as_ptr()
        );

        Ok(Self {
            ptr,
            len,
            source: Source::Heap { layout, locked },
        })
    }

    /// Map a sysfs BAR resource file (`/sys/bus/pci/devices/<addr>/resourceN`)
    ///
    /// # Errors
    ///
    /// Returns `Attach` if the file cannot be opened, is empty, or cannot be
    /// mapped.
    pub fn map_file(path: &Path) -> Result<Self> {
        tracing::debug!("Mapping BAR resource: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                LuxydError::attach(format!(
                    "cannot open {}: {e}. Is the device enabled?",
                    path.display()
                ))
            })?;

        // BAR sizes fit in usize on every supported (64-bit) target
        #[allow(clippy::cast_possible_truncation)]
        let len = file
            .metadata()
            .map_err(|e| LuxydError::attach(format!("cannot stat BAR: {e}")))?
            .len() as usize;

        if len == 0 {
            return Err(LuxydError::attach(format!(
                "{} has size 0 (device not enabled?)",
                path.display()
            )));
        }

        // SAFETY: the fd is open for read/write, len is the non-zero resource
        // size, offset 0 is page-aligned. The file is stored in the region so
        // the fd outlives the mapping; Drop unmaps exactly [ptr, ptr + len).
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
        }
        .map_err(|e| LuxydError::attach(format!("mmap of {} failed: {e}", path.display())))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| LuxydError::attach("mmap returned a null mapping"))?;

        tracing::info!(
            "Mapped {} ({} KiB at {:p})",
            path.display(),
            len / 1024,
            ptr.as_ptr()
        );

        Ok(Self {
            ptr,
            len,
            source: Source::Mapped {
                _file: file,
                path: path.display().to_string(),
            },
        })
    }

    /// Usable length in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty (never true for a constructed region)
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// CPU address of the first byte
    pub fn base_address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Whether the pages are locked in RAM
    pub const fn is_locked(&self) -> bool {
        match self.source {
            Source::Heap { locked, .. } => locked,
            Source::Mapped { .. } => true,
        }
    }

    fn check(&self, offset: usize, length: usize) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(LuxydError::OutOfBounds {
                offset,
                length,
                capacity: self.len,
            }),
        }
    }

    /// Copy `buffer.len()` bytes starting at `offset` out of the region
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn read_bytes(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        self.check(offset, buffer.len())?;
        // SAFETY: range checked above; src lies in the region, dst is a
        // distinct caller-owned slice; u8 has alignment 1.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                buffer.as_mut_ptr(),
                buffer.len(),
            );
        }
        Ok(())
    }

    /// Copy `data` into the region at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        // SAFETY: range checked above; dst lies in the region, src is a
        // distinct caller-owned slice; u8 has alignment 1.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Set `length` bytes at `offset` to `value`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn fill(&self, offset: usize, length: usize, value: u8) -> Result<()> {
        self.check(offset, length)?;
        // SAFETY: range checked above.
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr().add(offset), value, length);
        }
        Ok(())
    }

    /// Volatile 32-bit register read
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the register leaves the region and
    /// `InvalidArgument` if `offset` is not 4-byte aligned.
    pub fn read_register(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4)?;
        if offset % 4 != 0 {
            return Err(LuxydError::invalid_argument(format!(
                "unaligned register offset {offset:#x}"
            )));
        }
        // SAFETY: bounds and alignment checked above; the base is page-aligned.
        // Volatile because device registers change underneath us.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };
        tracing::trace!("Read reg @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Volatile 32-bit register write
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the register leaves the region and
    /// `InvalidArgument` if `offset` is not 4-byte aligned.
    pub fn write_register(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset, 4)?;
        if offset % 4 != 0 {
            return Err(LuxydError::invalid_argument(format!(
                "unaligned register offset {offset:#x}"
            )));
        }
        tracing::trace!("Write reg @ {offset:#x} = {value:#x}");
        // SAFETY: bounds and alignment checked above. Volatile because the
        // write has side effects on the device.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }
        Ok(())
    }

    /// Read `count` little-endian `u16` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn read_u16s(&self, offset: usize, count: usize) -> Result<Vec<u16>> {
        let mut bytes = vec![0u8; count.saturating_mul(2)];
        self.read_bytes(offset, &mut bytes)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    /// Write `values` as little-endian `u16` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn write_u16s(&self, offset: usize, values: &[u16]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_bytes(offset, &bytes)
    }

    /// Read `count` little-endian `u32` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn read_u32s(&self, offset: usize, count: usize) -> Result<Vec<u32>> {
        let mut bytes = vec![0u8; count.saturating_mul(4)];
        self.read_bytes(offset, &mut bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Write `values` as little-endian `u32` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if the range leaves the region.
    pub fn write_u32s(&self, offset: usize, values: &[u32]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_bytes(offset, &bytes)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match &self.source {
            Source::Heap { layout, locked } => {
                // SAFETY: ptr/layout come from alloc_zeroed in zeroed(); the
                // region is being dropped so no view of it remains.
                unsafe {
                    if *locked {
                        let _ = munlock(self.ptr.as_ptr().cast(), layout.size());
                    }
                    std::alloc::dealloc(self.ptr.as_ptr(), *layout);
                }
                tracing::debug!("Freed host region ({} KiB)", layout.size() / 1024);
            }
            Source::Mapped { path, .. } => {
                // SAFETY: ptr/len are exactly the mapping created in map_file().
                if let Err(e) = unsafe { munmap(self.ptr.as_ptr().cast(), self.len) } {
                    tracing::error!("munmap of {path} failed during drop: {e}");
                } else {
                    tracing::debug!("Unmapped {path}");
                }
            }
        }
    }
}

// SAFETY: Region exclusively owns its allocation or mapping; moving it to
// another thread does not invalidate either.
unsafe impl Send for Region {}

// SAFETY: every access is a bounds-checked byte copy through a raw pointer.
// The window is shared, unsynchronized memory by contract (callers and the
// device write it directly); no Rust references into it are ever handed out.
unsafe impl Sync for Region {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_region_is_zero_and_aligned() {
        let region = Region::zeroed(3 * 4096 + 1).unwrap();
        assert_eq!(region.base_address() % page_size(), 0);
        let mut buf = vec![0xAAu8; region.len()];
        region.read_bytes(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn elements_are_little_endian() {
        let region = Region::zeroed(64).unwrap();
        region.write_u16s(2, &[0x0102, 0x0304]).unwrap();
        let mut raw = [0u8; 4];
        region.read_bytes(2, &mut raw).unwrap();
        assert_eq!(raw, [0x02, 0x01, 0x04, 0x03]);

        // Unaligned u32 access is fine
        region.write_u32s(6, &[0xDEAD_BEEF]).unwrap();
        assert_eq!(region.read_u32s(6, 1).unwrap(), vec![0xDEAD_BEEF]);
    }

    #[test]
    fn out_of_range_access_rejected() {
        let region = Region::zeroed(16).unwrap();
        assert!(matches!(
            region.write_u32s(14, &[1]),
            Err(LuxydError::OutOfBounds { .. })
        ));
        assert!(matches!(
            region.read_bytes(usize::MAX, &mut [0u8; 2]),
            Err(LuxydError::OutOfBounds { .. })
        ));
    }
}
