//! Driver configuration
//!
//! Selects which memory window backs the operand regions and which compute
//! engine services `MATRIX_MULTIPLY`. Both choices are fixed for the lifetime
//! of an attached device.

use crate::error::{LuxydError, Result};
use luxyd_chip::bar::OWNED_WINDOW_CAPACITY;
use std::time::Duration;

/// Backing store for the operand window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Driver-allocated host memory
    Owned,
    /// Device memory behind BAR2
    DeviceResident,
}

/// Compute engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeSelection {
    /// Hardware when a bus is attached and the window is device-resident,
    /// software otherwise
    Auto,
    /// CPU multiply, no hardware required
    Software,
    /// Command/status handshake with the device
    Hardware,
}

/// Configuration for [`LuxydDevice::attach`](crate::LuxydDevice::attach)
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Window backing store
    pub window: WindowKind,

    /// Compute engine
    pub compute: ComputeSelection,

    /// Capacity of the owned window in bytes
    pub owned_capacity: usize,

    /// Upper bound on the hardware ready wait
    pub ready_timeout: Duration,

    /// Sleep between status polls
    pub poll_interval: Duration,

    /// How often a blocked lock waiter checks for cancellation
    pub lock_poll: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            window: WindowKind::Owned,
            compute: ComputeSelection::Auto,
            owned_capacity: OWNED_WINDOW_CAPACITY,
            ready_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_micros(100),
            lock_poll: Duration::from_millis(5),
        }
    }
}

impl DriverConfig {
    /// Software-only configuration: owned window, CPU multiply
    pub fn software() -> Self {
        Self::default().with_compute(ComputeSelection::Software)
    }

    /// Defaults overridden by `LUXYD_WINDOW` (`owned`|`device`),
    /// `LUXYD_COMPUTE` (`auto`|`software`|`hardware`) and
    /// `LUXYD_READY_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a variable is set to an unknown value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(window) = std::env::var("LUXYD_WINDOW") {
            config.window = window.parse()?;
        }
        if let Ok(compute) = std::env::var("LUXYD_COMPUTE") {
            config.compute = compute.parse()?;
        }
        if let Ok(ms) = std::env::var("LUXYD_READY_TIMEOUT_MS") {
            let ms = ms.trim().parse::<u64>().map_err(|e| {
                LuxydError::invalid_argument(format!("LUXYD_READY_TIMEOUT_MS={ms}: {e}"))
            })?;
            config.ready_timeout = Duration::from_millis(ms);
        }

        tracing::debug!("Config from environment: {config:?}");
        Ok(config)
    }

    /// Set the window backing store
    #[must_use]
    pub fn with_window(mut self, window: WindowKind) -> Self {
        self.window = window;
        self
    }

    /// Set the compute engine
    #[must_use]
    pub fn with_compute(mut self, compute: ComputeSelection) -> Self {
        self.compute = compute;
        self
    }

    /// Set the owned window capacity
    #[must_use]
    pub fn with_owned_capacity(mut self, bytes: usize) -> Self {
        self.owned_capacity = bytes;
        self
    }

    /// Set the hardware ready timeout
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the status poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero owned capacity, hardware compute
    /// over the owned window (the board cannot see host pages), a zero ready
    /// timeout, or a zero lock poll slice.
    pub fn validate(&self) -> Result<()> {
        if self.window == WindowKind::Owned && self.owned_capacity == 0 {
            return Err(LuxydError::invalid_argument("owned window capacity is 0"));
        }
        if self.window == WindowKind::Owned && self.compute == ComputeSelection::Hardware {
            return Err(LuxydError::invalid_argument(
                "hardware compute needs the device-resident window",
            ));
        }
        if self.ready_timeout.is_zero() {
            return Err(LuxydError::invalid_argument("ready timeout is 0"));
        }
        if self.lock_poll.is_zero() {
            return Err(LuxydError::invalid_argument("lock poll slice is 0"));
        }
        Ok(())
    }
}

impl std::str::FromStr for WindowKind {
    type Err = LuxydError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owned" | "host" => Ok(Self::Owned),
            "device" | "device-resident" | "bar" => Ok(Self::DeviceResident),
            other => Err(LuxydError::invalid_argument(format!(
                "unknown window '{other}' (expected owned|device)"
            ))),
        }
    }
}

impl std::str::FromStr for ComputeSelection {
    type Err = LuxydError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "software" | "sw" => Ok(Self::Software),
            "hardware" | "hw" => Ok(Self::Hardware),
            other => Err(LuxydError::invalid_argument(format!(
                "unknown compute '{other}' (expected auto|software|hardware)"
            ))),
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned => write!(f, "owned"),
            Self::DeviceResident => write!(f, "device-resident"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_owned_16mib() {
        let config = DriverConfig::default();
        assert_eq!(config.window, WindowKind::Owned);
        assert_eq!(config.owned_capacity, 16 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn selections_parse() {
        assert_eq!("device".parse::<WindowKind>().unwrap(), WindowKind::DeviceResident);
        assert_eq!("HW".parse::<ComputeSelection>().unwrap(), ComputeSelection::Hardware);
        assert!("gpu".parse::<ComputeSelection>().is_err());
    }

    #[test]
    fn hardware_over_owned_window_rejected() {
        let config = DriverConfig::default().with_compute(ComputeSelection::Hardware);
        assert!(matches!(
            config.validate(),
            Err(LuxydError::InvalidArgument { .. })
        ));

        let config = config.with_window(WindowKind::DeviceResident);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = DriverConfig::software().with_owned_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(LuxydError::InvalidArgument { .. })
        ));
    }
}
