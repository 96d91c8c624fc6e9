//! BAR0 register map.
//!
//! ```text
//! 0x00  STATUS   bit0 READY, bit1 BUSY, bit2 ERROR
//! 0x04  COMMAND  bit0 TRIGGER (write 1 to start a multiply)
//! 0x08  INFO     [7:0] A rows, [15:8] A cols, [23:16] B rows, [31:24] B cols
//! ```

/// Status register.
pub const STATUS: usize = 0x00;

/// Command register.
pub const COMMAND: usize = 0x04;

/// Info register (hardware-reported matrix dimensions).
pub const INFO: usize = 0x08;

/// Status register bits.
pub mod status {
    /// Device ready; a finished multiply also raises this bit.
    pub const READY: u32 = 1 << 0;
    /// Multiply in progress.
    pub const BUSY: u32 = 1 << 1;
    /// Last operation failed.
    pub const ERROR: u32 = 1 << 2;
}

/// Command register bits.
pub mod command {
    /// Start a matrix multiply.
    pub const TRIGGER: u32 = 1 << 0;
}

/// Dimensions unpacked from the INFO register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatrixInfo {
    /// Rows of matrix A.
    pub mat_a_rows: u8,
    /// Columns of matrix A.
    pub mat_a_cols: u8,
    /// Rows of matrix B.
    pub mat_b_rows: u8,
    /// Columns of matrix B.
    pub mat_b_cols: u8,
}

impl MatrixInfo {
    /// Unpack the four byte-wide fields of an INFO word.
    #[must_use]
    pub const fn from_register(word: u32) -> Self {
        let [a_rows, a_cols, b_rows, b_cols] = word.to_le_bytes();
        Self {
            mat_a_rows: a_rows,
            mat_a_cols: a_cols,
            mat_b_rows: b_rows,
            mat_b_cols: b_cols,
        }
    }

    /// Pack back into an INFO word.
    #[must_use]
    pub const fn to_register(self) -> u32 {
        u32::from_le_bytes([
            self.mat_a_rows,
            self.mat_a_cols,
            self.mat_b_rows,
            self.mat_b_cols,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_offsets_non_overlapping() {
        assert_ne!(STATUS, COMMAND);
        assert_ne!(COMMAND, INFO);
        assert_eq!(INFO % 4, 0);
    }

    #[test]
    fn info_fields_are_byte_lanes() {
        let info = MatrixInfo::from_register(0x2010_0820);
        assert_eq!(info.mat_a_rows, 0x20);
        assert_eq!(info.mat_a_cols, 0x08);
        assert_eq!(info.mat_b_rows, 0x10);
        assert_eq!(info.mat_b_cols, 0x20);
        assert_eq!(info.to_register(), 0x2010_0820);
    }
}
