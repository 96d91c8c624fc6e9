//! Hardware compute engine
//!
//! The board computes P itself. The driver's part is the handshake:
//! set TRIGGER in COMMAND, then poll STATUS until READY (success) or ERROR
//! (failure). The wait is bounded so a wedged board cannot hold the control
//! lock forever.
//!
//! READY is left set by the previous multiply and the board may take a
//! moment to latch BUSY after the trigger. A READY only counts once a read
//! since the trigger has shown the board not ready (READY clear or BUSY
//! set).

use super::{ComputeEngine, EngineType};
use crate::error::{LuxydError, Result};
use crate::layout::{BufferLayout, MatrixDims};
use crate::shim::RegisterShim;
use crate::window::MemoryWindow;
use luxyd_chip::regs::status;
use std::time::{Duration, Instant};

/// Trigger/ready handshake with the board
#[derive(Debug)]
pub struct HardwareEngine {
    shim: RegisterShim,
    timeout: Duration,
    poll_interval: Duration,
}

impl HardwareEngine {
    /// Drive `shim` with the given ready timeout and poll interval
    pub fn new(shim: RegisterShim, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            shim,
            timeout,
            poll_interval,
        }
    }

    /// Poll STATUS until a fresh READY, ERROR, or timeout
    fn wait_ready(&self) -> Result<()> {
        let start = Instant::now();
        let mut acknowledged = false;

        loop {
            let status = self.shim.read_status()?;

            if status & status::ERROR != 0 {
                return Err(LuxydError::DeviceError { status });
            }

            let ready = status & status::READY != 0 && status & status::BUSY == 0;
            if !ready {
                acknowledged = true;
            } else if acknowledged {
                tracing::debug!("Ready after {:?}", start.elapsed());
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(LuxydError::DeviceTimeout {
                    duration_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

impl ComputeEngine for HardwareEngine {
    fn multiply(
        &self,
        _window: &dyn MemoryWindow,
        dims: MatrixDims,
        _layout: &BufferLayout,
    ) -> Result<()> {
        tracing::debug!("Triggering hardware multiply {dims}");
        self.shim.trigger_compute()?;
        self.wait_ready()
    }

    fn status(&self) -> Result<u32> {
        self.shim.read_status()
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Hardware
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Completion, SimulatedBus};
    use crate::window::OwnedWindow;
    use std::sync::Arc;

    fn engine(completion: Completion) -> (Arc<SimulatedBus>, HardwareEngine) {
        let bus = Arc::new(SimulatedBus::new().unwrap().with_completion(completion));
        let engine = HardwareEngine::new(
            RegisterShim::new(bus.clone()),
            Duration::from_millis(50),
            Duration::from_micros(50),
        );
        (bus, engine)
    }

    fn run(engine: &HardwareEngine) -> Result<()> {
        let window = OwnedWindow::new(4096).unwrap();
        let dims = MatrixDims::square(2);
        let layout = BufferLayout::compute(dims, 4096).unwrap();
        engine.multiply(&window, dims, &layout)
    }

    #[test]
    fn waits_for_ready() {
        let (bus, engine) = engine(Completion::AfterPolls(5));
        run(&engine).unwrap();
        assert_eq!(bus.trigger_count(), 1);
        assert_ne!(engine.status().unwrap() & status::READY, 0);
    }

    #[test]
    fn stale_ready_is_not_completion() {
        let (bus, engine) = engine(Completion::LateBusy(3));
        run(&engine).unwrap();
        // stale READY, BUSY twice, then the real READY
        assert_eq!(bus.status_reads(), 4);
    }

    #[test]
    fn ready_without_busy_times_out() {
        let (_bus, engine) = engine(Completion::AfterPolls(0));
        assert!(matches!(
            run(&engine),
            Err(LuxydError::DeviceTimeout { .. })
        ));
    }

    #[test]
    fn wedged_device_times_out() {
        let (_bus, engine) = engine(Completion::Never);
        let start = Instant::now();
        assert!(matches!(
            run(&engine),
            Err(LuxydError::DeviceTimeout { duration_ms: 50 })
        ));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn error_bit_is_reported() {
        let (_bus, engine) = engine(Completion::Fault);
        assert!(matches!(run(&engine), Err(LuxydError::DeviceError { .. })));
    }
}
