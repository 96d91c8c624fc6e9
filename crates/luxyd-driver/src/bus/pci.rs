//! sysfs-backed PCI attachment
//!
//! Maps BAR0 and BAR2 through `/sys/bus/pci/devices/<addr>/resourceN` and
//! reads the BAR2 physical base from the `resource` table. No kernel module
//! is involved; the device only has to be enabled.

use super::BusAttachment;
use crate::error::{LuxydError, Result};
use crate::region::Region;
use luxyd_chip::bar::{bar0, Bar};
use luxyd_chip::pcie::{identify, Identity};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SYSFS_ROOT: &str = "/sys";

/// Mapped BARs of one board
#[derive(Debug)]
struct Mappings {
    registers: Arc<Region>,
    window: Arc<Region>,
}

/// PCI attachment through sysfs
#[derive(Debug)]
pub struct PciBus {
    pcie_address: String,
    identity: Identity,
    window_base: u64,
    window_len: usize,
    mappings: RwLock<Option<Mappings>>,
}

impl PciBus {
    /// Attach to the device at `pcie_address` (e.g. `0000:01:00.0`)
    ///
    /// # Errors
    ///
    /// Returns `Attach` if the device is unknown, cannot be enabled, or its
    /// BARs cannot be mapped.
    pub fn attach(pcie_address: &str) -> Result<Self> {
        Self::attach_at(Path::new(SYSFS_ROOT), pcie_address)
    }

    /// Attach using an alternative sysfs root
    ///
    /// # Errors
    ///
    /// See [`PciBus::attach`].
    pub fn attach_at(sysfs_root: &Path, pcie_address: &str) -> Result<Self> {
        let dev_dir = sysfs_root.join("bus/pci/devices").join(pcie_address);
        tracing::info!("Attaching PCI bus for {pcie_address}");

        let vendor = read_hex_id(&dev_dir.join("vendor"))?;
        let device = read_hex_id(&dev_dir.join("device"))?;
        let identity = identify(vendor, device).ok_or_else(|| {
            LuxydError::attach(format!(
                "{pcie_address} is {vendor:04x}:{device:04x}, not a LUXYD device"
            ))
        })?;
        if identity == Identity::BringUp {
            tracing::warn!("{pcie_address} ({vendor:04x}:{device:04x}) is a bring-up stand-in");
        }

        set_memory_decoding(&dev_dir)?;

        let (window_base, window_len) = bar_range(&dev_dir.join("resource"), Bar::Window.index())?;

        let registers = Region::map_file(&resource_path(&dev_dir, Bar::Control))?;
        if registers.len() < bar0::MIN_SIZE {
            return Err(LuxydError::attach(format!(
                "BAR0 is {} bytes, need at least {}",
                registers.len(),
                bar0::MIN_SIZE
            )));
        }

        let window = Region::map_file(&resource_path(&dev_dir, Bar::Window))?;
        if window.len() < window_len {
            return Err(LuxydError::attach(format!(
                "BAR2 mapping is {} bytes but the resource table says {window_len}",
                window.len()
            )));
        }

        tracing::info!(
            "Attached {pcie_address}: BAR2 @ {window_base:#x} ({} KiB)",
            window_len / 1024
        );

        Ok(Self {
            pcie_address: pcie_address.to_string(),
            identity,
            window_base,
            window_len,
            mappings: RwLock::new(Some(Mappings {
                registers: Arc::new(registers),
                window: Arc::new(window),
            })),
        })
    }

    /// PCIe address this bus is attached to
    pub fn pcie_address(&self) -> &str {
        &self.pcie_address
    }

    /// Matched identity of the board
    pub const fn identity(&self) -> Identity {
        self.identity
    }

    fn registers(&self) -> Result<Arc<Region>> {
        self.mappings
            .read()
            .as_ref()
            .map(|m| Arc::clone(&m.registers))
            .ok_or_else(|| LuxydError::attach(format!("{} is detached", self.pcie_address)))
    }
}

impl BusAttachment for PciBus {
    fn read_register(&self, offset: usize) -> Result<u32> {
        self.registers()?.read_register(offset)
    }

    fn write_register(&self, offset: usize, value: u32) -> Result<()> {
        self.registers()?.write_register(offset, value)
    }

    fn resource_base_address(&self) -> Option<u64> {
        self.mappings.read().as_ref().map(|_| self.window_base)
    }

    fn resource_length(&self) -> usize {
        self.window_len
    }

    fn window_region(&self) -> Option<Arc<Region>> {
        self.mappings.read().as_ref().map(|m| Arc::clone(&m.window))
    }

    fn detach(&self) {
        if self.mappings.write().take().is_some() {
            tracing::info!("Detached {}", self.pcie_address);
        }
    }

    fn describe(&self) -> String {
        format!("pci:{}", self.pcie_address)
    }
}

fn resource_path(dev_dir: &Path, bar: Bar) -> PathBuf {
    dev_dir.join(format!("resource{}", bar.index()))
}

fn read_hex_id(path: &Path) -> Result<u16> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LuxydError::attach(format!("cannot read {}: {e}", path.display())))?;
    let text = text.trim();
    u16::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| LuxydError::attach(format!("bad id '{text}' in {}: {e}", path.display())))
}

/// Start and length of BAR `index` from a sysfs `resource` table
///
/// Each line is `start end flags` in hex; an unassigned BAR reads as zeros.
fn bar_range(resource_table: &Path, index: usize) -> Result<(u64, usize)> {
    let table = std::fs::read_to_string(resource_table).map_err(|e| {
        LuxydError::attach(format!("cannot read {}: {e}", resource_table.display()))
    })?;

    let line = table
        .lines()
        .nth(index)
        .ok_or_else(|| LuxydError::attach(format!("no BAR{index} line in resource table")))?;

    let mut fields = line.split_whitespace().map(|f| {
        u64::from_str_radix(f.trim_start_matches("0x"), 16)
            .map_err(|e| LuxydError::attach(format!("bad resource field '{f}': {e}")))
    });
    let start = fields.next().transpose()?.unwrap_or(0);
    let end = fields.next().transpose()?.unwrap_or(0);

    if start == 0 || end < start {
        return Err(LuxydError::attach(format!("BAR{index} is not assigned")));
    }

    let len = usize::try_from(end - start + 1)
        .map_err(|_| LuxydError::attach(format!("BAR{index} does not fit the address space")))?;
    Ok((start, len))
}

/// Turn on memory decoding through the sysfs `enable` attribute
///
/// Writing needs root; an unwritable attribute is an attach failure.
fn set_memory_decoding(dev_dir: &Path) -> Result<()> {
    let attr = dev_dir.join("enable");
    let state = std::fs::read_to_string(&attr)
        .map_err(|e| LuxydError::attach(format!("cannot read {}: {e}", attr.display())))?;
    if state.trim() == "1" {
        return Ok(());
    }

    std::fs::write(&attr, "1")
        .map_err(|e| LuxydError::attach(format!("cannot write {}: {e}", attr.display())))?;
    tracing::debug!("Memory decoding on for {}", dev_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use luxyd_chip::regs;
    use std::fs;
    use tempfile::TempDir;

    const ADDR: &str = "0000:01:00.0";
    const BAR2_BASE: u64 = 0xfe00_0000;
    const BAR2_LEN: usize = 0x4000;

    fn fake_sysfs(vendor: &str, enabled: &str) -> TempDir {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bus/pci/devices").join(ADDR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("vendor"), format!("{vendor}\n")).unwrap();
        fs::write(dir.join("device"), "0x7021\n").unwrap();
        fs::write(dir.join("enable"), enabled).unwrap();
        let bar2_end = BAR2_BASE + BAR2_LEN as u64 - 1;
        fs::write(
            dir.join("resource"),
            format!(
                "0x00000000fd000000 0x00000000fd000fff 0x0000000000040200\n\
                 0x0000000000000000 0x0000000000000000 0x0000000000000000\n\
                 {BAR2_BASE:#018x} {bar2_end:#018x} 0x0000000000040200\n"
            ),
        )
        .unwrap();
        fs::File::create(dir.join("resource0"))
            .unwrap()
            .set_len(0x1000)
            .unwrap();
        fs::File::create(dir.join("resource2"))
            .unwrap()
            .set_len(BAR2_LEN as u64)
            .unwrap();
        root
    }

    #[test]
    fn attaches_to_fake_sysfs() {
        let root = fake_sysfs("0x10ee", "1\n");
        let bus = PciBus::attach_at(root.path(), ADDR).unwrap();
        assert_eq!(bus.identity(), Identity::Accelerator);
        assert_eq!(bus.resource_base_address(), Some(BAR2_BASE));
        assert_eq!(bus.resource_length(), BAR2_LEN);

        bus.write_register(regs::INFO, 0x0102_0304).unwrap();
        assert_eq!(bus.read_register(regs::INFO).unwrap(), 0x0102_0304);

        bus.detach();
        assert_eq!(bus.resource_base_address(), None);
        assert!(bus.window_region().is_none());
        assert!(bus.read_register(regs::STATUS).is_err());
    }

    #[test]
    fn enables_disabled_device() {
        let root = fake_sysfs("0x10ee", "0\n");
        PciBus::attach_at(root.path(), ADDR).unwrap();
        let enable = root.path().join("bus/pci/devices").join(ADDR).join("enable");
        assert_eq!(fs::read_to_string(enable).unwrap().trim(), "1");
    }

    #[test]
    fn missing_enable_attribute_fails_attach() {
        let root = fake_sysfs("0x10ee", "1\n");
        let dir = root.path().join("bus/pci/devices").join(ADDR);
        fs::remove_file(dir.join("enable")).unwrap();
        assert!(matches!(
            PciBus::attach_at(root.path(), ADDR),
            Err(LuxydError::Attach { .. })
        ));
    }

    #[test]
    fn rejects_foreign_vendor() {
        let root = fake_sysfs("0x1234", "1\n");
        assert!(matches!(
            PciBus::attach_at(root.path(), ADDR),
            Err(LuxydError::Attach { .. })
        ));
    }

    #[test]
    fn unassigned_bar_is_an_error() {
        let root = fake_sysfs("0x10ee", "1\n");
        let table = root.path().join("bus/pci/devices").join(ADDR).join("resource");
        assert!(bar_range(&table, 1).is_err());
        assert_eq!(bar_range(&table, 2).unwrap(), (BAR2_BASE, BAR2_LEN));
    }

    #[test]
    #[ignore] // Requires a LUXYD board at 0000:01:00.0
    fn attaches_to_hardware() {
        let bus = PciBus::attach(ADDR).expect("attach");
        println!("Attached {} ({:?})", bus.describe(), bus.identity());
    }
}
