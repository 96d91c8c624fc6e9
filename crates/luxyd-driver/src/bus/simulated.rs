// SPDX-License-Identifier: GPL-2.0-only

//! Simulated LUXYD device
//!
//! An in-process stand-in for the FPGA so the hardware path of the driver
//! (register handshake, device-resident window, bus-address translation) can
//! run in CI:
//!
//! - BAR0 is an atomic register file (STATUS, COMMAND, INFO)
//! - BAR2 is host memory with a fake physical base
//! - writing TRIGGER clears READY and sets BUSY; READY comes back after a
//!   configurable number of status reads, never (wedged), or ERROR is raised
//! - a late-latching board keeps showing the previous READY for one read
//!   before BUSY appears
//!
//! The model does not compute anything; it only exercises the protocol.

use super::BusAttachment;
use crate::error::{LuxydError, Result};
use crate::region::Region;
use luxyd_chip::bar::DEVICE_WINDOW_MIN;
use luxyd_chip::regs::{self, command, status, MatrixInfo};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Fake physical base of the simulated BAR2
pub const SIM_WINDOW_BASE: u64 = 0xfe00_0000;

const REGISTER_COUNT: usize = regs::INFO / 4 + 1;

/// How the simulated device answers a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// READY after this many status reads (0 = immediately)
    ///
    /// With 0 or 1 the first read after the trigger already shows READY,
    /// which the hardware engine cannot tell apart from a stale READY.
    AfterPolls(u32),
    /// The first read still shows the stale status from before the trigger,
    /// then BUSY, then READY as for `AfterPolls`
    LateBusy(u32),
    /// Never raises READY again
    Never,
    /// Raises ERROR instead of READY
    Fault,
}

/// In-process device model
#[derive(Debug)]
pub struct SimulatedBus {
    registers: [AtomicU32; REGISTER_COUNT],
    polls_left: AtomicU32,
    late: AtomicBool,
    triggers: AtomicU32,
    reads: AtomicU32,
    completion: Completion,
    window_base: u64,
    window_len: usize,
    window: RwLock<Option<Arc<Region>>>,
}

impl SimulatedBus {
    /// Device with the minimum window size that completes after two polls
    ///
    /// # Errors
    ///
    /// Returns error if the window memory cannot be allocated.
    pub fn new() -> Result<Self> {
        Self::with_window_len(DEVICE_WINDOW_MIN)
    }

    /// Device with a BAR2 window of `len` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the window memory cannot be allocated.
    pub fn with_window_len(len: usize) -> Result<Self> {
        let window = Region::zeroed(len)?;
        tracing::debug!("Simulated device: BAR2 {len:#x} bytes @ {SIM_WINDOW_BASE:#x}");

        Ok(Self {
            registers: std::array::from_fn(|_| AtomicU32::new(0)),
            polls_left: AtomicU32::new(0),
            late: AtomicBool::new(false),
            triggers: AtomicU32::new(0),
            reads: AtomicU32::new(0),
            completion: Completion::AfterPolls(2),
            window_base: SIM_WINDOW_BASE,
            window_len: len,
            window: RwLock::new(Some(Arc::new(window))),
        }
        .with_status(status::READY))
    }

    /// Set how triggers complete
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    fn with_status(self, value: u32) -> Self {
        self.registers[regs::STATUS / 4].store(value, Ordering::SeqCst);
        self
    }

    /// Preload the INFO register
    pub fn set_info(&self, info: MatrixInfo) {
        self.registers[regs::INFO / 4].store(info.to_register(), Ordering::SeqCst);
    }

    /// Number of triggers seen so far
    pub fn trigger_count(&self) -> u32 {
        self.triggers.load(Ordering::SeqCst)
    }

    /// Number of STATUS reads so far
    pub fn status_reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    fn slot(&self, offset: usize) -> Result<&AtomicU32> {
        if offset % 4 != 0 {
            return Err(LuxydError::invalid_argument(format!(
                "unaligned register offset {offset:#x}"
            )));
        }
        self.registers
            .get(offset / 4)
            .ok_or(LuxydError::OutOfBounds {
                offset,
                length: 4,
                capacity: REGISTER_COUNT * 4,
            })
    }

    fn on_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        let status_reg = &self.registers[regs::STATUS / 4];
        match self.completion {
            Completion::AfterPolls(0) => status_reg.store(status::READY, Ordering::SeqCst),
            Completion::AfterPolls(n) => {
                self.polls_left.store(n, Ordering::SeqCst);
                status_reg.store(status::BUSY, Ordering::SeqCst);
            }
            Completion::LateBusy(n) => {
                self.polls_left.store(n, Ordering::SeqCst);
                self.late.store(true, Ordering::SeqCst);
            }
            Completion::Never => status_reg.store(status::BUSY, Ordering::SeqCst),
            Completion::Fault => status_reg.store(status::ERROR, Ordering::SeqCst),
        }
    }

    fn on_status_read(&self) -> u32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let status_reg = &self.registers[regs::STATUS / 4];
        if self.late.swap(false, Ordering::SeqCst) {
            return status_reg.swap(status::BUSY, Ordering::SeqCst);
        }

        let busy = status_reg.load(Ordering::SeqCst) & status::BUSY != 0;
        if busy && matches!(self.completion, Completion::AfterPolls(_) | Completion::LateBusy(_)) {
            let left = self
                .polls_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .unwrap_or(0);
            if left <= 1 {
                status_reg.store(status::READY, Ordering::SeqCst);
            }
        }
        status_reg.load(Ordering::SeqCst)
    }
}

impl BusAttachment for SimulatedBus {
    fn read_register(&self, offset: usize) -> Result<u32> {
        let slot = self.slot(offset)?;
        let value = if offset == regs::STATUS {
            self.on_status_read()
        } else {
            slot.load(Ordering::SeqCst)
        };
        tracing::trace!("sim read @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write_register(&self, offset: usize, value: u32) -> Result<()> {
        let slot = self.slot(offset)?;
        tracing::trace!("sim write @ {offset:#x} = {value:#x}");
        match offset {
            regs::COMMAND => {
                slot.store(value, Ordering::SeqCst);
                if value & command::TRIGGER != 0 {
                    self.on_trigger();
                }
            }
            // STATUS is read-only to the host
            regs::STATUS => {}
            _ => slot.store(value, Ordering::SeqCst),
        }
        Ok(())
    }

    fn resource_base_address(&self) -> Option<u64> {
        self.window.read().as_ref().map(|_| self.window_base)
    }

    fn resource_length(&self) -> usize {
        self.window_len
    }

    fn window_region(&self) -> Option<Arc<Region>> {
        self.window.read().clone()
    }

    fn detach(&self) {
        if self.window.write().take().is_some() {
            tracing::info!("Simulated device detached");
        }
    }

    fn describe(&self) -> String {
        format!("sim:{:#x}+{:#x}", self.window_base, self.window_len)
    }
}
