//! PCIe BAR layout and memory-window capacities.
//!
//! ```text
//! BAR  Purpose
//! ──── ─────────────────────────────────────────────────────
//!  0   Control registers (status / command / info)
//!  2   Device-resident operand window (A, B, P)
//! ```
//!
//! When the device-resident window is not used, the driver allocates its own
//! window of [`OWNED_WINDOW_CAPACITY`] bytes in host memory.

/// BAR0: control register space.
pub mod bar0 {
    /// BAR index of the register block.
    pub const INDEX: usize = 0;
    /// Minimum size the register block must expose.
    pub const MIN_SIZE: usize = 0x1000;
}

/// BAR2: device-resident operand window.
pub mod bar2 {
    /// BAR index of the operand window.
    pub const INDEX: usize = 2;
}

/// Capacity of the driver-owned window (16 MiB).
pub const OWNED_WINDOW_CAPACITY: usize = 16 * 1024 * 1024;

/// Largest square operand the fixed-size window is designed around.
pub const DEVICE_WINDOW_MAX_DIM: usize = 32;

/// Minimum size of the device-resident window: three 32×32 regions at
/// result element width (`3 × 32 × 32 × 4` bytes).
pub const DEVICE_WINDOW_MIN: usize =
    3 * DEVICE_WINDOW_MAX_DIM * DEVICE_WINDOW_MAX_DIM * RESULT_ELEMENT_BYTES;

/// Width of one operand element (A and B are `u16`).
pub const OPERAND_ELEMENT_BYTES: usize = 2;

/// Width of one result element (P is `u32`).
pub const RESULT_ELEMENT_BYTES: usize = 4;

/// BAR index enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Bar {
    /// BAR0: control registers.
    Control = 0,
    /// BAR2: device-resident window.
    Window = 2,
}

impl Bar {
    /// sysfs `resourceN` index of this BAR.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_window_holds_a_32_cube() {
        // A and B at u16 plus P at u32 for m = n = p = 32.
        let needed = 32 * 32 * 2 + 32 * 32 * 2 + 32 * 32 * 4;
        assert!(needed <= DEVICE_WINDOW_MIN);
        assert_eq!(DEVICE_WINDOW_MIN, 12_288);
    }

    #[test]
    fn bar_indices_match_sysfs_resources() {
        assert_eq!(Bar::Control.index(), bar0::INDEX);
        assert_eq!(Bar::Window.index(), bar2::INDEX);
    }
}
