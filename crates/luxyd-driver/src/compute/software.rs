// SPDX-License-Identifier: GPL-2.0-only

//! Software compute engine
//!
//! Stands in for the FPGA when no compute hardware is attached. Reads A and
//! B straight out of the window, multiplies with exact integer arithmetic,
//! and writes P back row-major:
//!
//! ```text
//! P[i][j] = Σ_k A[i][k] · B[k][j]      i < m, j < p, k < n
//! ```
//!
//! Accumulation is 64-bit, so no intermediate sum can overflow (a u16×u16
//! product is below 2^32 and n is far below 2^32). P elements are 32-bit on
//! the wire; a sum that does not fit is stored modulo 2^32 and reported.

use super::{ComputeEngine, EngineType};
use crate::error::Result;
use crate::layout::{BufferLayout, MatrixDims};
use crate::window::MemoryWindow;
use luxyd_chip::regs::status;
use tracing::{debug, warn};

/// CPU matrix multiply over the window
#[derive(Debug, Default)]
pub struct SoftwareEngine;

impl SoftwareEngine {
    /// Create the engine
    pub const fn new() -> Self {
        Self
    }
}

/// Row-major `a (m×n) · b (n×p)` with 64-bit accumulation
pub fn matmul_u16(a: &[u16], b: &[u16], m: usize, n: usize, p: usize) -> Vec<u64> {
    let mut out = vec![0u64; m * p];
    for i in 0..m {
        let row = &mut out[i * p..(i + 1) * p];
        for k in 0..n {
            let a_ik = u64::from(a[i * n + k]);
            if a_ik == 0 {
                continue;
            }
            for (acc, &b_kj) in row.iter_mut().zip(&b[k * p..(k + 1) * p]) {
                *acc += a_ik * u64::from(b_kj);
            }
        }
    }
    out
}

impl ComputeEngine for SoftwareEngine {
    fn multiply(
        &self,
        window: &dyn MemoryWindow,
        dims: MatrixDims,
        layout: &BufferLayout,
    ) -> Result<()> {
        let (m, n, p) = dims.extents()?;
        let region = window.region()?;

        let a = region.read_u16s(layout.a_offset, m * n)?;
        let b = region.read_u16s(layout.b_offset, n * p)?;

        let sums = matmul_u16(&a, &b, m, n, p);

        let overflowed = sums.iter().filter(|&&s| s > u64::from(u32::MAX)).count();
        if overflowed > 0 {
            warn!("{overflowed} result elements exceed 32 bits and were truncated");
        }

        // Truncation to the 32-bit result width is the documented wire format
        #[allow(clippy::cast_possible_truncation)]
        let result: Vec<u32> = sums.iter().map(|&s| s as u32).collect();
        region.write_u32s(layout.p_offset, &result)?;

        debug!("Software multiply {dims} done ({} result bytes)", layout.p_size);
        Ok(())
    }

    fn status(&self) -> Result<u32> {
        Ok(status::READY)
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Software
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::OwnedWindow;

    #[test]
    fn two_by_two_product() {
        let p = matmul_u16(&[3, 4, 5, 6], &[5, 6, 7, 8], 2, 2, 2);
        assert_eq!(p, vec![43, 50, 67, 78]);
    }

    #[test]
    fn rectangular_product() {
        // (2×3)·(3×1)
        let p = matmul_u16(&[1, 2, 3, 4, 5, 6], &[1, 1, 1], 2, 3, 1);
        assert_eq!(p, vec![6, 15]);
    }

    #[test]
    fn max_operands_do_not_overflow_accumulator() {
        let n = 64;
        let a = vec![u16::MAX; n];
        let b = vec![u16::MAX; n];
        let p = matmul_u16(&a, &b, 1, n, 1);
        assert_eq!(p[0], u64::from(u16::MAX) * u64::from(u16::MAX) * n as u64);
    }

    #[test]
    fn multiplies_in_window() {
        let window = OwnedWindow::new(4096).unwrap();
        let dims = MatrixDims::square(2);
        let layout = BufferLayout::compute(dims, 4096).unwrap();
        let region = window.region().unwrap();
        region.write_u16s(layout.a_offset, &[3, 4, 5, 6]).unwrap();
        region.write_u16s(layout.b_offset, &[5, 6, 7, 8]).unwrap();

        SoftwareEngine::new().multiply(&window, dims, &layout).unwrap();
        assert_eq!(
            region.read_u32s(layout.p_offset, 4).unwrap(),
            vec![43, 50, 67, 78]
        );
    }

    #[test]
    fn software_status_is_ready() {
        assert_eq!(SoftwareEngine::new().status().unwrap(), status::READY);
    }
}
