use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::resource::{self, BusId, Resource};

/// Hook run when the last reference to a [`Device`] goes away.
pub type ReleaseHook = Box<dyn FnOnce(&Device) + Send + Sync>;

/// Shared handle to a device. The bus keeps one clone while the device is
/// registered; the release hook runs when the final clone is dropped.
pub type DeviceRef = Arc<Device>;

/// Where a device is in its life on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Not on the bus (never added, removed, or still being added).
    Unregistered,
    /// On the bus with all resources reserved, no driver bound.
    Added,
    /// Bound to a driver whose probe succeeded.
    Bound,
}

/// A named piece of hardware and the line ranges it needs.
pub struct Device {
    name: String,
    bus_id: BusId,
    resources: Vec<Resource>,
    release: Option<ReleaseHook>,
}

impl Device {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            bus_id: resource::bus_id(name),
            resources: Vec::new(),
            release: None,
        }
    }

    /// Append one resource to the device's table.
    pub fn with_resource(mut self, res: Resource) -> Self {
        self.resources.push(res);
        self
    }

    /// Append a whole resource table, keeping its order.
    pub fn with_resources(mut self, table: &[Resource]) -> Self {
        self.resources.extend_from_slice(table);
        self
    }

    pub fn with_release(
        mut self,
        release: impl FnOnce(&Device) + Send + Sync + 'static,
    ) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn into_ref(self) -> DeviceRef {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name the bus matches and names resources with.
    pub fn bus_id(&self) -> &BusId {
        &self.bus_id
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("release device {}", self.bus_id.as_str());
            release(self);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("resources", &self.resources)
            .field("release", &self.release.is_some())
            .finish()
    }
}
