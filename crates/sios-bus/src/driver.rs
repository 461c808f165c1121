use alloc::sync::Arc;
use core::fmt;

use crate::device::Device;

/// Power-transition message handed to suspend hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmMessage {
    On,
    Freeze,
    Suspend,
    PreThaw,
}

/// Failure reported by a driver hook.
///
/// The bus never interprets the code; it is returned to the caller of the
/// operation that ran the hook exactly as the driver produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverError(i32);

impl DriverError {
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}", self.0)
    }
}

/// A driver that can be bound to devices on the bus.
///
/// A driver is bound to every device whose name starts with
/// [`name`](Driver::name). All hooks are optional: the defaults do nothing
/// and succeed, which the bus treats the same as a hook that is absent.
///
/// Hooks are called without any bus lock held, so they may call back into
/// the bus.
pub trait Driver: Send + Sync {
    /// Matching prefix.
    fn name(&self) -> &str;

    /// Contents of the driver's `version` attribute.
    fn version(&self) -> &str;

    /// Called once when the driver is bound to `dev`.
    fn probe(&self, _dev: &Device) -> Result<(), DriverError> {
        Ok(())
    }

    /// Called when `dev` is unbound, either because the device goes away or
    /// because the driver does.
    fn remove(&self, _dev: &Device) -> Result<(), DriverError> {
        Ok(())
    }

    fn shutdown(&self, _dev: &Device) {}

    fn suspend(&self, _dev: &Device, _msg: PmMessage) -> Result<(), DriverError> {
        Ok(())
    }

    fn suspend_late(
        &self,
        _dev: &Device,
        _msg: PmMessage,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    fn resume_early(&self, _dev: &Device) -> Result<(), DriverError> {
        Ok(())
    }

    fn resume(&self, _dev: &Device) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Shared handle to a registered driver.
pub type DriverRef = Arc<dyn Driver>;

/// The loose prefix match the bus binds with: the driver name compared
/// byte-wise against the start of the device's bus id.
pub(crate) fn matches(driver: &dyn Driver, bus_id: &str) -> bool {
    bus_id.as_bytes().starts_with(driver.name().as_bytes())
}
