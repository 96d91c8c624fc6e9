//! Control lock behavior across sessions
//!
//! Commands from concurrent sessions are serialized, a blocked wait can be
//! interrupted, and a wedged hardware wait releases the lock when it times
//! out.

use luxyd_driver::{
    BusAttachment, Completion, ComputeSelection, DriverConfig, LuxydDevice, LuxydError,
    MatrixDims, SimulatedBus, WindowKind,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Device whose hardware multiply never completes
fn wedged(timeout: Duration) -> (Arc<SimulatedBus>, LuxydDevice) {
    let sim = Arc::new(SimulatedBus::new().unwrap().with_completion(Completion::Never));
    let bus: Arc<dyn BusAttachment> = sim.clone();
    let config = DriverConfig::default()
        .with_window(WindowKind::DeviceResident)
        .with_compute(ComputeSelection::Hardware)
        .with_ready_timeout(timeout);
    (sim, LuxydDevice::attach(config, Some(bus)).unwrap())
}

fn wait_for_trigger(sim: &SimulatedBus) {
    let start = Instant::now();
    while sim.trigger_count() == 0 {
        assert!(start.elapsed() < Duration::from_secs(5), "multiply never started");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn concurrent_sessions_are_serialized() {
    let device = LuxydDevice::attach(DriverConfig::software().with_owned_capacity(1 << 16), None)
        .unwrap();

    {
        let session = device.open();
        session.matrix_load(MatrixDims::square(8)).unwrap();
        let (_, layout) = session.layout().unwrap();
        let window = session.mmap(0, layout.total_size).unwrap();
        window.write_u16s(layout.a_offset, &[1; 64]).unwrap();
        window.write_u16s(layout.b_offset, &[2; 64]).unwrap();
    }

    thread::scope(|scope| {
        for t in 0..8u32 {
            let session = device.open();
            scope.spawn(move || {
                for i in 0..50u32 {
                    let value = t * 1000 + i;
                    assert_eq!(session.inference_start(value).unwrap(), value);
                    // Same dims from every writer keep the shared layout stable
                    session.matrix_load(MatrixDims::square(8)).unwrap();
                    session.matrix_multiply().unwrap();
                }
            });
        }
    });

    let session = device.open();
    let (_, layout) = session.layout().unwrap();
    let window = session.mmap(0, layout.total_size).unwrap();
    assert!(window
        .read_u32s(layout.p_offset, 64)
        .unwrap()
        .iter()
        .all(|&v| v == 16));
    assert_eq!(device.open_sessions(), 1);
}

#[test]
fn blocked_wait_is_interrupted() {
    let (sim, device) = wedged(Duration::from_millis(500));
    let busy = device.open();
    let waiter = device.open();
    busy.matrix_load(MatrixDims::square(2)).unwrap();

    thread::scope(|scope| {
        let multiply = scope.spawn(|| busy.matrix_multiply());
        wait_for_trigger(&sim);

        let cancel = waiter.cancel_token();
        let blocked = scope.spawn(|| waiter.status_get());
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        let err = blocked.join().unwrap().unwrap_err();
        assert!(matches!(err, LuxydError::Interrupted));
        assert_eq!(err.code(), -libc::EINTR);
        assert!(!cancel.is_cancelled(), "interruption consumes the token");

        assert!(matches!(
            multiply.join().unwrap(),
            Err(LuxydError::DeviceTimeout { .. })
        ));
    });

    // Nothing was mutated by the interrupted wait
    assert_eq!(waiter.layout().unwrap().0, MatrixDims::square(2));
}

#[test]
fn timeout_releases_lock() {
    let (sim, device) = wedged(Duration::from_millis(50));
    let session = device.open();
    session.matrix_load(MatrixDims::square(2)).unwrap();

    let start = Instant::now();
    let err = session.matrix_multiply().unwrap_err();
    assert!(matches!(err, LuxydError::DeviceTimeout { duration_ms: 50 }));
    assert_eq!(err.code(), -libc::ETIMEDOUT);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(sim.trigger_count(), 1);

    // Another session gets the lock right away
    let other = device.open();
    let status = other.status_get().unwrap();
    assert_ne!(status & luxyd_driver::chip::regs::status::BUSY, 0);
    other.matrix_load(MatrixDims::square(3)).unwrap();
}

#[test]
fn hardware_handshake_completes() {
    let sim = Arc::new(
        SimulatedBus::new()
            .unwrap()
            .with_completion(Completion::AfterPolls(3)),
    );
    let bus: Arc<dyn BusAttachment> = sim.clone();
    let config = DriverConfig::default().with_window(WindowKind::DeviceResident);
    let device = LuxydDevice::attach(config, Some(bus)).unwrap();
    let session = device.open();

    session.matrix_load(MatrixDims::square(32)).unwrap();
    session.matrix_multiply().unwrap();
    session.matrix_multiply().unwrap();
    assert_eq!(sim.trigger_count(), 2);
    assert_ne!(
        session.status_get().unwrap() & luxyd_driver::chip::regs::status::READY,
        0
    );
}

#[test]
fn device_fault_is_reported() {
    let sim = Arc::new(SimulatedBus::new().unwrap().with_completion(Completion::Fault));
    let config = DriverConfig::default().with_window(WindowKind::DeviceResident);
    let device = LuxydDevice::attach(config, Some(sim as Arc<dyn BusAttachment>)).unwrap();
    let session = device.open();

    session.matrix_load(MatrixDims::square(2)).unwrap();
    let err = session.matrix_multiply().unwrap_err();
    assert!(matches!(err, LuxydError::DeviceError { .. }));
    assert_eq!(err.code(), -libc::EIO);
}
