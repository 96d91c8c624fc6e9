//! PCI identities accepted by the LUXYD AI driver.
//!
//! The production board is a Xilinx Kintex-7 (`10ee:7021`). Two Intel host
//! bridge IDs stay in the table so the bring-up flow can be exercised on a
//! development machine without the FPGA.

/// Xilinx vendor ID.
pub const XILINX_VENDOR_ID: u16 = 0x10ee;

/// Intel vendor ID (bring-up hosts).
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// Known device IDs.
pub mod device_id {
    /// Xilinx Kintex-7 carrying the LUXYD AI bitstream.
    pub const KINTEX7: u16 = 0x7021;
    /// Intel 440FX host bridge (QEMU), used for bring-up.
    pub const TEST_I440FX: u16 = 0x1237;
    /// Intel PCH SPI controller, used for bring-up.
    pub const TEST_PCH: u16 = 0xa121;
}

/// Role of a matched PCI identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// The accelerator itself.
    Accelerator,
    /// A stand-in device used while bringing up the driver.
    BringUp,
}

/// `(vendor, device, identity)` table, in match order.
pub const ID_TABLE: &[(u16, u16, Identity)] = &[
    (INTEL_VENDOR_ID, device_id::TEST_I440FX, Identity::BringUp),
    (INTEL_VENDOR_ID, device_id::TEST_PCH, Identity::BringUp),
    (XILINX_VENDOR_ID, device_id::KINTEX7, Identity::Accelerator),
];

/// Look up a vendor/device pair in [`ID_TABLE`].
#[must_use]
pub fn identify(vendor: u16, device: u16) -> Option<Identity> {
    ID_TABLE
        .iter()
        .find(|(v, d, _)| *v == vendor && *d == device)
        .map(|(_, _, identity)| *identity)
}
