//! Matrix dimensions and the operand layout they induce
//!
//! ```text
//! window: ┌──────────────┬──────────────┬──────────────────┬─────────┐
//!         │ A  m×n  u16  │ B  n×p  u16  │ P  m×p  u32      │ unused  │
//!         └──────────────┴──────────────┴──────────────────┴─────────┘
//!         0          a_size       a_size+b_size        total_size  capacity
//! ```

use crate::error::{LuxydError, Result};
use bytemuck::{Pod, Zeroable};
use luxyd_chip::bar::{OPERAND_ELEMENT_BYTES, RESULT_ELEMENT_BYTES};
use luxyd_chip::ioctl::MATRIX_SIZE_BYTES;

/// Operand shape: A is m×n, B is n×p, P is m×p
///
/// Matches the `matrix_size` payload of `MATRIX_LOAD` byte for byte
/// (three `i32` in host byte order).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct MatrixDims {
    /// Rows of A and P
    pub m: i32,
    /// Columns of A, rows of B
    pub n: i32,
    /// Columns of B and P
    pub p: i32,
}

const _: () = assert!(std::mem::size_of::<MatrixDims>() == MATRIX_SIZE_BYTES);

impl MatrixDims {
    /// Create a dimension triple
    pub const fn new(m: i32, n: i32, p: i32) -> Self {
        Self { m, n, p }
    }

    /// Square matrices of side `k`
    pub const fn square(k: i32) -> Self {
        Self::new(k, k, k)
    }

    /// Decode a `matrix_size` payload
    ///
    /// # Errors
    ///
    /// Returns `BadAddress` if the payload is not exactly 12 bytes.
    pub fn from_payload(bytes: &[u8]) -> Result<Self> {
        bytemuck::try_pod_read_unaligned(bytes).map_err(|e| {
            LuxydError::bad_address(format!(
                "matrix_size payload of {} bytes: {e:?}",
                bytes.len()
            ))
        })
    }

    /// Encode as a `matrix_size` payload
    pub fn to_payload(self) -> [u8; MATRIX_SIZE_BYTES] {
        bytemuck::cast(self)
    }

    /// Dimensions as `usize`, or `InvalidArgument` if any is not positive
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if m, n or p is zero or negative.
    pub fn extents(&self) -> Result<(usize, usize, usize)> {
        match (
            usize::try_from(self.m),
            usize::try_from(self.n),
            usize::try_from(self.p),
        ) {
            (Ok(m), Ok(n), Ok(p)) if m > 0 && n > 0 && p > 0 => Ok((m, n, p)),
            _ => Err(LuxydError::invalid_argument(format!(
                "matrix dimensions must be positive: m={} n={} p={}",
                self.m, self.n, self.p
            ))),
        }
    }
}

impl std::fmt::Display for MatrixDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}x{})·({}x{})", self.m, self.n, self.n, self.p)
    }
}

/// Byte offsets and sizes of A, B and P inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    /// Offset of A (always 0)
    pub a_offset: usize,
    /// Offset of B
    pub b_offset: usize,
    /// Offset of P
    pub p_offset: usize,
    /// Bytes in A
    pub a_size: usize,
    /// Bytes in B
    pub b_size: usize,
    /// Bytes in P
    pub p_size: usize,
    /// Bytes in A + B + P
    pub total_size: usize,
}

impl BufferLayout {
    /// Derive the layout for `dims` and check it fits in `capacity`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if any dimension is not positive
    /// - `OutOfCapacity` if the three regions need more than `capacity` bytes
    ///   (including when the size computation itself overflows)
    pub fn compute(dims: MatrixDims, capacity: usize) -> Result<Self> {
        let (m, n, p) = dims.extents()?;

        let sizes = (|| {
            let a_size = m.checked_mul(n)?.checked_mul(OPERAND_ELEMENT_BYTES)?;
            let b_size = n.checked_mul(p)?.checked_mul(OPERAND_ELEMENT_BYTES)?;
            let p_size = m.checked_mul(p)?.checked_mul(RESULT_ELEMENT_BYTES)?;
            let total = a_size.checked_add(b_size)?.checked_add(p_size)?;
            Some((a_size, b_size, p_size, total))
        })();

        let Some((a_size, b_size, p_size, total_size)) = sizes else {
            return Err(LuxydError::OutOfCapacity {
                required: usize::MAX,
                capacity,
            });
        };

        if total_size > capacity {
            return Err(LuxydError::OutOfCapacity {
                required: total_size,
                capacity,
            });
        }

        Ok(Self {
            a_offset: 0,
            b_offset: a_size,
            p_offset: a_size + b_size,
            a_size,
            b_size,
            p_size,
            total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_by_two_layout() {
        let layout = BufferLayout::compute(MatrixDims::square(2), 4096).unwrap();
        assert_eq!(layout.a_size, 8);
        assert_eq!(layout.b_size, 8);
        assert_eq!(layout.p_size, 16);
        assert_eq!(layout.b_offset, 8);
        assert_eq!(layout.p_offset, 16);
        assert_eq!(layout.total_size, 32);
    }

    #[test]
    fn exact_fit_is_accepted() {
        // 32³ needs 8 KiB
        assert!(BufferLayout::compute(MatrixDims::square(32), 8192).is_ok());
        assert!(matches!(
            BufferLayout::compute(MatrixDims::square(32), 8191),
            Err(LuxydError::OutOfCapacity { required: 8192, .. })
        ));
    }

    #[test]
    fn overflow_is_out_of_capacity() {
        let dims = MatrixDims::new(i32::MAX, i32::MAX, i32::MAX);
        assert!(matches!(
            BufferLayout::compute(dims, usize::MAX),
            Err(LuxydError::OutOfCapacity { .. })
        ));
    }

    #[test]
    fn payload_roundtrip_and_short_payload() {
        let dims = MatrixDims::new(3, 5, 7);
        assert_eq!(MatrixDims::from_payload(&dims.to_payload()).unwrap(), dims);
        assert!(matches!(
            MatrixDims::from_payload(&[0u8; 8]),
            Err(LuxydError::BadAddress { .. })
        ));
    }

    proptest! {
        #[test]
        fn offsets_are_contiguous(m in 1i32..512, n in 1i32..512, p in 1i32..512) {
            let layout = BufferLayout::compute(MatrixDims::new(m, n, p), usize::MAX).unwrap();
            prop_assert_eq!(layout.a_offset, 0);
            prop_assert_eq!(layout.b_offset, layout.a_size);
            prop_assert_eq!(layout.p_offset, layout.b_offset + layout.b_size);
            prop_assert_eq!(layout.total_size, layout.p_offset + layout.p_size);
        }

        #[test]
        fn non_positive_dims_rejected(bad in -64i32..=0, good in 1i32..64, which in 0usize..3) {
            let mut dims = [good; 3];
            dims[which] = bad;
            let result = BufferLayout::compute(MatrixDims::new(dims[0], dims[1], dims[2]), usize::MAX);
            let rejected = matches!(result, Err(LuxydError::InvalidArgument { .. }));
            prop_assert!(rejected, "{:?}", result);
        }
    }
}
