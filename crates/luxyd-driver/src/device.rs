//! Attached device and per-open sessions
//!
//! [`LuxydDevice`] owns everything that lives for the attachment: the bus,
//! the memory window, the compute engine and the command dispatcher.
//! [`Session`]s are cheap per-open handles onto that shared state; they
//! carry only a cancellation token. The window is released and the bus
//! detached when the device and its last session are gone.

use crate::bus::BusAttachment;
use crate::compute::{select_engine, EngineType};
use crate::config::{DriverConfig, WindowKind};
use crate::dispatch::{Command, Dispatcher};
use crate::error::{LuxydError, Result};
use crate::layout::{BufferLayout, MatrixDims};
use crate::lock::CancelToken;
use crate::mapping::{self, WindowMapping};
use crate::shim::RegisterShim;
use crate::window::{DeviceWindow, MemoryWindow, OwnedWindow};
use luxyd_chip::regs::MatrixInfo;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct DeviceShared {
    config: DriverConfig,
    bus: Option<Arc<dyn BusAttachment>>,
    dispatcher: Dispatcher,
    next_session: AtomicU64,
    open_sessions: AtomicUsize,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        self.dispatcher.window().free();
        if let Some(bus) = &self.bus {
            bus.detach();
        }
        tracing::info!("Detached device ({} window)", self.config.window);
    }
}

/// An attached LUXYD device
#[derive(Debug)]
pub struct LuxydDevice {
    shared: Arc<DeviceShared>,
}

impl LuxydDevice {
    /// Attach with `config`, optionally on top of bus-attached hardware
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the configuration is invalid
    /// - `Attach` if the configuration needs a bus that is missing or
    ///   unusable
    /// - error if the owned window cannot be allocated
    pub fn attach(config: DriverConfig, bus: Option<Arc<dyn BusAttachment>>) -> Result<Self> {
        config.validate()?;

        let window: Arc<dyn MemoryWindow> = match config.window {
            WindowKind::Owned => Arc::new(OwnedWindow::new(config.owned_capacity)?),
            WindowKind::DeviceResident => {
                let bus = bus.as_ref().ok_or_else(|| {
                    LuxydError::attach("device-resident window requested but no bus is attached")
                })?;
                Arc::new(DeviceWindow::new(Arc::clone(bus))?)
            }
        };

        let engine = select_engine(&config, bus.as_ref())?;
        tracing::info!(
            "Attached device: {} window ({} bytes), {} compute{}",
            window.kind(),
            window.capacity(),
            engine.engine_type(),
            bus.as_ref()
                .map(|b| format!(" on {}", b.describe()))
                .unwrap_or_default()
        );

        let dispatcher = Dispatcher::new(window, engine, config.lock_poll);
        Ok(Self {
            shared: Arc::new(DeviceShared {
                config,
                bus,
                dispatcher,
                next_session: AtomicU64::new(1),
                open_sessions: AtomicUsize::new(0),
            }),
        })
    }

    /// Owned window and software compute, no hardware
    ///
    /// # Errors
    ///
    /// Returns error if the owned window cannot be allocated.
    pub fn attach_software() -> Result<Self> {
        Self::attach(DriverConfig::software(), None)
    }

    /// Open a new session
    pub fn open(&self) -> Session {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        let open = self.shared.open_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Opened session {id} ({open} open)");
        Session {
            id,
            shared: Arc::clone(&self.shared),
            cancel: CancelToken::new(),
        }
    }

    /// Drop this handle
    ///
    /// Detaching is deferred: open sessions keep the device usable, and the
    /// window is released and the bus detached when the last one closes.
    pub fn detach(self) {
        drop(self);
    }

    /// Configuration the device was attached with
    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Active window variant
    pub fn window_kind(&self) -> WindowKind {
        self.shared.dispatcher.window().kind()
    }

    /// Window capacity in bytes
    pub fn capacity(&self) -> usize {
        self.shared.dispatcher.window().capacity()
    }

    /// Active compute engine
    pub fn engine_type(&self) -> EngineType {
        self.shared.dispatcher.engine().engine_type()
    }

    /// Bus attachment, if any
    pub fn bus(&self) -> Option<&Arc<dyn BusAttachment>> {
        self.shared.bus.as_ref()
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::Relaxed)
    }

    /// Dimensions advertised in the info register, if there is hardware
    ///
    /// # Errors
    ///
    /// Returns error if the register cannot be read.
    pub fn read_info(&self) -> Result<Option<MatrixInfo>> {
        self.shared
            .bus
            .as_ref()
            .map(|bus| RegisterShim::new(Arc::clone(bus)).read_info())
            .transpose()
    }
}

/// One open handle on a device
#[derive(Debug)]
pub struct Session {
    id: u64,
    shared: Arc<DeviceShared>,
    cancel: CancelToken,
}

impl Session {
    /// Session identifier, unique per device
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Token that interrupts this session's lock waits
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Issue a raw command with its payload buffer
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub fn ioctl(&self, code: u32, arg: Option<&mut [u8]>) -> Result<()> {
        self.shared.dispatcher.dispatch(code, arg, &self.cancel)
    }

    /// `STATUS_GET`
    ///
    /// # Errors
    ///
    /// Returns error if the lock wait is interrupted or the status register
    /// cannot be read.
    pub fn status_get(&self) -> Result<u32> {
        let mut out = [0u8; 4];
        self.ioctl(Command::StatusGet.code(), Some(&mut out))?;
        Ok(u32::from_ne_bytes(out))
    }

    /// `MODEL_LOAD`
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the lock wait is interrupted.
    pub fn model_load(&self, model: u32) -> Result<()> {
        let mut arg = model.to_ne_bytes();
        self.ioctl(Command::ModelLoad.code(), Some(&mut arg))
    }

    /// `INFERENCE_START`; returns the echoed value
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the lock wait is interrupted.
    pub fn inference_start(&self, value: u32) -> Result<u32> {
        let mut arg = value.to_ne_bytes();
        self.ioctl(Command::InferenceStart.code(), Some(&mut arg))?;
        Ok(u32::from_ne_bytes(arg))
    }

    /// `MATRIX_LOAD`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` or `OutOfCapacity` for unusable dims; the
    /// previous layout stays current.
    pub fn matrix_load(&self, dims: MatrixDims) -> Result<()> {
        let mut arg = dims.to_payload();
        self.ioctl(Command::MatrixLoad.code(), Some(&mut arg))
    }

    /// `MATRIX_MULTIPLY`
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` without a layout, or the engine's error.
    pub fn matrix_multiply(&self) -> Result<()> {
        self.ioctl(Command::MatrixMultiply.code(), None)
    }

    /// Current dimensions and layout
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` without a layout.
    pub fn layout(&self) -> Result<(MatrixDims, BufferLayout)> {
        self.shared.dispatcher.current(&self.cancel)
    }

    /// Map `len` bytes of the window starting at `offset`
    ///
    /// # Errors
    ///
    /// See [`mapping::map`].
    pub fn mmap(&self, offset: usize, len: usize) -> Result<WindowMapping> {
        mapping::map(self.shared.dispatcher.window().as_ref(), offset, len)
    }

    /// Window capacity in bytes
    pub fn window_capacity(&self) -> usize {
        self.shared.dispatcher.window().capacity()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let open = self.shared.open_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
        tracing::info!("Closed session {} ({open} open)", self.id);
    }
}
