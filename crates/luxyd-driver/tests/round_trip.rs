//! End-to-end multiply tests
//!
//! Load dimensions, write operands through a mapping, multiply, read P back,
//! on every window/engine combination that computes in software.

use luxyd_driver::{
    BusAttachment, ComputeSelection, DriverConfig, LuxydDevice, MatrixDims, SimulatedBus, WindowKind,
};
use proptest::prelude::*;
use std::sync::Arc;

fn owned_device() -> LuxydDevice {
    LuxydDevice::attach(DriverConfig::software().with_owned_capacity(1 << 16), None)
        .expect("software attach")
}

fn device_resident_device() -> LuxydDevice {
    let bus: Arc<dyn BusAttachment> = Arc::new(SimulatedBus::new().expect("simulated bus"));
    let config = DriverConfig::default()
        .with_window(WindowKind::DeviceResident)
        .with_compute(ComputeSelection::Software);
    LuxydDevice::attach(config, Some(bus)).expect("device-resident attach")
}

/// Row-major fill used by the bring-up test client
fn pattern(rows: usize, cols: usize, scale: u16) -> Vec<u16> {
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push((i as u16 + 1) * scale + (j as u16 + 1));
        }
    }
    out
}

fn reference(a: &[u16], b: &[u16], m: usize, n: usize, p: usize) -> Vec<u32> {
    let mut out = vec![0u32; m * p];
    for i in 0..m {
        for j in 0..p {
            out[i * p + j] = (0..n)
                .map(|k| u32::from(a[i * n + k]) * u32::from(b[k * p + j]))
                .sum();
        }
    }
    out
}

fn multiply(device: &LuxydDevice, m: usize, n: usize, p: usize, a: &[u16], b: &[u16]) -> Vec<u32> {
    let session = device.open();
    session
        .matrix_load(MatrixDims::new(m as i32, n as i32, p as i32))
        .expect("MATRIX_LOAD");
    let (_, layout) = session.layout().expect("layout");

    let window = session.mmap(0, session.window_capacity()).expect("mmap");
    window.fill(0).expect("zero window");
    window.write_u16s(layout.a_offset, a).expect("write A");
    window.write_u16s(layout.b_offset, b).expect("write B");

    session.matrix_multiply().expect("MATRIX_MULTIPLY");
    window.read_u32s(layout.p_offset, m * p).expect("read P")
}

#[test]
fn two_by_two() {
    for device in [owned_device(), device_resident_device()] {
        let p = multiply(&device, 2, 2, 2, &[3, 4, 5, 6], &[5, 6, 7, 8]);
        assert_eq!(p, vec![43, 50, 67, 78], "{} window", device.window_kind());
    }
}

#[test]
fn thirty_two_square() {
    let a = pattern(32, 32, 2);
    let b = pattern(32, 32, 4);
    let expected = reference(&a, &b, 32, 32, 32);

    for device in [owned_device(), device_resident_device()] {
        let p = multiply(&device, 32, 32, 32, &a, &b);
        assert_eq!(p, expected, "{} window", device.window_kind());

        // Spot-check one exact dot product: row 0 of A with column 0 of B
        let dot: u32 = (0..32u32).map(|k| (2 + k + 1) * ((k + 1) * 4 + 1)).sum();
        assert_eq!(p[0], dot);
    }
}

#[test]
fn rectangular() {
    let device = owned_device();
    let a = pattern(3, 5, 2);
    let b = pattern(5, 7, 4);
    assert_eq!(multiply(&device, 3, 5, 7, &a, &b), reference(&a, &b, 3, 5, 7));
}

#[test]
fn second_load_replaces_layout() {
    let device = owned_device();
    multiply(&device, 2, 2, 2, &[3, 4, 5, 6], &[5, 6, 7, 8]);

    let a = pattern(4, 3, 2);
    let b = pattern(3, 2, 4);
    assert_eq!(multiply(&device, 4, 3, 2, &a, &b), reference(&a, &b, 4, 3, 2));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn matches_host_reference(
        (m, n, p, a, b) in (1usize..12, 1usize..12, 1usize..12).prop_flat_map(|(m, n, p)| (
            Just(m),
            Just(n),
            Just(p),
            prop::collection::vec(any::<u16>(), m * n),
            prop::collection::vec(any::<u16>(), n * p),
        ))
    ) {
        let device = owned_device();
        let got = multiply(&device, m, n, p, &a, &b);

        // Expected sums can exceed 32 bits; P keeps the low 32
        for i in 0..m {
            for j in 0..p {
                let sum: u64 = (0..n)
                    .map(|k| u64::from(a[i * n + k]) * u64::from(b[k * p + j]))
                    .sum();
                prop_assert_eq!(got[i * p + j], sum as u32);
            }
        }
    }
}
