//! Silicon model for the LUXYD AI matrix-multiply accelerator.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure description of the device as the driver sees it: PCI identities,
//! BAR layout, the control register map, and the command-code encoding of
//! the control plane.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pcie`] | Vendor/device IDs of the Kintex-7 board and test hosts |
//! | [`bar`] | BAR layout (BAR0 registers, BAR2 device-resident window) and window capacities |
//! | [`regs`] | BAR0 register map: status, command, info |
//! | [`ioctl`] | `_IOC` command-code encoding and the five LUXYD commands |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bar;
pub mod ioctl;
pub mod pcie;
pub mod regs;
