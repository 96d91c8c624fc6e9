//! Control-plane command codes.
//!
//! Codes use the Linux `_IOC` layout so they cannot collide with unrelated
//! commands sent to the same handle:
//!
//! ```text
//!  31..30   29..16   15..8   7..0
//!  dir      size     type    nr
//! ```
//!
//! `dir` is from the caller's point of view: `READ` means the driver fills
//! the payload, `WRITE` means the driver consumes it.

/// No payload.
pub const DIR_NONE: u32 = 0;
/// Caller → driver payload.
pub const DIR_WRITE: u32 = 1;
/// Driver → caller payload.
pub const DIR_READ: u32 = 2;

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = 8;
const SIZE_SHIFT: u32 = 16;
const DIR_SHIFT: u32 = 30;
const SIZE_MASK: u32 = (1 << 14) - 1;

/// Magic type byte for every LUXYD command.
pub const MAGIC: u8 = b'L';

/// Size of the `matrix_size` payload: three `i32` (m, n, p).
pub const MATRIX_SIZE_BYTES: usize = 12;

/// Build a command code (`_IOC`).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << DIR_SHIFT)
        | (((size as u32) & SIZE_MASK) << SIZE_SHIFT)
        | ((ty as u32) << TYPE_SHIFT)
        | ((nr as u32) << NR_SHIFT)
}

/// `_IO`
#[must_use]
pub const fn io(ty: u8, nr: u8) -> u32 {
    ioc(DIR_NONE, ty, nr, 0)
}

/// `_IOR`
#[must_use]
pub const fn ior(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(DIR_READ, ty, nr, size)
}

/// `_IOW`
#[must_use]
pub const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(DIR_WRITE, ty, nr, size)
}

/// `_IOWR`
#[must_use]
pub const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(DIR_READ | DIR_WRITE, ty, nr, size)
}

/// Direction bits of a code.
#[must_use]
pub const fn dir(code: u32) -> u32 {
    code >> DIR_SHIFT
}

/// Payload size encoded in a code.
#[must_use]
pub const fn size(code: u32) -> usize {
    ((code >> SIZE_SHIFT) & SIZE_MASK) as usize
}

/// Read the device status word.
pub const STATUS_GET: u32 = ior(MAGIC, 1, 4);
/// Load a model (placeholder).
pub const MODEL_LOAD: u32 = iow(MAGIC, 2, 4);
/// Start an inference (placeholder).
pub const INFERENCE_START: u32 = iowr(MAGIC, 3, 4);
/// Send matrix dimensions.
pub const MATRIX_LOAD: u32 = iow(MAGIC, 4, MATRIX_SIZE_BYTES);
/// Trigger the multiply.
pub const MATRIX_MULTIPLY: u32 = io(MAGIC, 5);
