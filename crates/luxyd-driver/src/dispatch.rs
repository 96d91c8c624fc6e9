//! Command dispatcher
//!
//! Every control-plane request enters here. The dispatcher takes the
//! control lock, decodes the command, marshals its fixed-size payload and
//! runs exactly one command body before releasing the lock.
//!
//! | Command | Payload | Effect |
//! |---|---|---|
//! | `STATUS_GET` | out: u32 | engine status word |
//! | `MODEL_LOAD` | in: u32 | none |
//! | `INFERENCE_START` | in/out: u32 | echoes the value |
//! | `MATRIX_LOAD` | in: `{m, n, p}` | replace the buffer layout |
//! | `MATRIX_MULTIPLY` | none | P = A·B over the current layout |

use crate::buffer::BufferManager;
use crate::compute::ComputeEngine;
use crate::error::{LuxydError, Result};
use crate::layout::{BufferLayout, MatrixDims};
use crate::lock::{CancelToken, ControlLock};
use crate::window::MemoryWindow;
use luxyd_chip::ioctl;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Decoded command code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read the status word
    StatusGet,
    /// Accept a model identifier (placeholder)
    ModelLoad,
    /// Echo a value back (placeholder)
    InferenceStart,
    /// Record matrix dimensions and derive the layout
    MatrixLoad,
    /// Multiply over the current layout
    MatrixMultiply,
}

impl Command {
    /// All commands, in code order
    pub const ALL: [Self; 5] = [
        Self::StatusGet,
        Self::ModelLoad,
        Self::InferenceStart,
        Self::MatrixLoad,
        Self::MatrixMultiply,
    ];

    /// Decode a full command code; `None` if it is not one of ours
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            ioctl::STATUS_GET => Some(Self::StatusGet),
            ioctl::MODEL_LOAD => Some(Self::ModelLoad),
            ioctl::INFERENCE_START => Some(Self::InferenceStart),
            ioctl::MATRIX_LOAD => Some(Self::MatrixLoad),
            ioctl::MATRIX_MULTIPLY => Some(Self::MatrixMultiply),
            _ => None,
        }
    }

    /// Encoded command code
    pub const fn code(self) -> u32 {
        match self {
            Self::StatusGet => ioctl::STATUS_GET,
            Self::ModelLoad => ioctl::MODEL_LOAD,
            Self::InferenceStart => ioctl::INFERENCE_START,
            Self::MatrixLoad => ioctl::MATRIX_LOAD,
            Self::MatrixMultiply => ioctl::MATRIX_MULTIPLY,
        }
    }

    /// Payload size encoded in the command code
    pub const fn payload_size(self) -> usize {
        ioctl::size(self.code())
    }

    /// Name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::StatusGet => "STATUS_GET",
            Self::ModelLoad => "MODEL_LOAD",
            Self::InferenceStart => "INFERENCE_START",
            Self::MatrixLoad => "MATRIX_LOAD",
            Self::MatrixMultiply => "MATRIX_MULTIPLY",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrow the caller's payload, checking it against the encoded size
fn payload<'a>(command: Command, arg: Option<&'a mut [u8]>) -> Result<&'a mut [u8]> {
    let expected = command.payload_size();
    let Some(arg) = arg else {
        return Err(LuxydError::bad_address(format!(
            "{command} needs a {expected}-byte payload"
        )));
    };
    if arg.len() != expected {
        return Err(LuxydError::bad_address(format!(
            "{command} payload is {} bytes, expected {expected}",
            arg.len()
        )));
    }
    Ok(arg)
}

fn read_u32(bytes: &[u8]) -> Result<u32> {
    bytemuck::try_pod_read_unaligned(bytes)
        .map_err(|e| LuxydError::bad_address(format!("u32 payload: {e:?}")))
}

fn write_u32(bytes: &mut [u8], value: u32) {
    bytes.copy_from_slice(bytemuck::bytes_of(&value));
}

/// Shared command state of one attached device
#[derive(Debug)]
pub struct Dispatcher {
    window: Arc<dyn MemoryWindow>,
    engine: Box<dyn ComputeEngine>,
    control: ControlLock<BufferManager>,
}

impl Dispatcher {
    /// Serve commands over `window` with `engine`
    pub fn new(
        window: Arc<dyn MemoryWindow>,
        engine: Box<dyn ComputeEngine>,
        lock_poll: Duration,
    ) -> Self {
        let buffers = BufferManager::new(window.capacity(), window.kind());
        Self {
            window,
            engine,
            control: ControlLock::new(buffers, lock_poll),
        }
    }

    /// The window the operand regions live in
    pub fn window(&self) -> &Arc<dyn MemoryWindow> {
        &self.window
    }

    /// The compute engine
    pub fn engine(&self) -> &dyn ComputeEngine {
        self.engine.as_ref()
    }

    /// Run one command
    ///
    /// `arg` is the caller's payload buffer: read for input payloads,
    /// overwritten for output payloads. The lock wait can be abandoned
    /// through `cancel`.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if `cancel` fires while waiting for the lock
    /// - `UnsupportedCommand` for an unknown code
    /// - `BadAddress` if the payload is missing or the wrong size
    /// - whatever the command body returns
    pub fn dispatch(&self, code: u32, arg: Option<&mut [u8]>, cancel: &CancelToken) -> Result<()> {
        let mut buffers = self.control.lock_interruptible(cancel)?;

        let Some(command) = Command::from_code(code) else {
            debug!("Rejecting unknown command {code:#010x}");
            return Err(LuxydError::UnsupportedCommand { code });
        };
        debug!("Dispatching {command}");

        match command {
            Command::StatusGet => {
                let out = payload(command, arg)?;
                let status = self.engine.status()?;
                write_u32(out, status);
            }
            Command::ModelLoad => {
                let model = read_u32(payload(command, arg)?)?;
                debug!("MODEL_LOAD {model} accepted");
            }
            Command::InferenceStart => {
                let inout = payload(command, arg)?;
                let value = read_u32(inout)?;
                write_u32(inout, value);
            }
            Command::MatrixLoad => {
                let dims = MatrixDims::from_payload(payload(command, arg)?)?;
                buffers.load(dims)?;
            }
            Command::MatrixMultiply => {
                let (dims, layout) = buffers.current()?;
                self.engine.multiply(self.window.as_ref(), dims, &layout)?;
            }
        }

        Ok(())
    }

    /// Current layout, read under the control lock
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` or `NotLoaded`.
    pub fn current(&self, cancel: &CancelToken) -> Result<(MatrixDims, BufferLayout)> {
        self.control.lock_interruptible(cancel)?.current()
    }
}
