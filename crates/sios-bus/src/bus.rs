use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write;
use core::{mem, ptr};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::attribute::{Attribute, AttributeOwner, AttributeSink, AttributeSource};
use crate::config::BusConfig;
use crate::device::{Device, DeviceRef, DeviceState};
use crate::driver::{self, Driver, DriverRef, PmMessage};
use crate::error::Error;
use crate::registry::{PinValidator, ReservationToken, ResourceRegistry};
use crate::resource::Resource;

/// Capacity of a uevent environment string.
pub const UEVENT_SIZE: usize = 32;

/// Life-cycle phase of a device entry.
enum Phase {
    /// Entry exists, resources are still being claimed.
    Adding,
    /// All resources held, no driver.
    Added,
    /// A driver hook is binding or unbinding the device.
    Busy,
    Bound(DriverRef),
    /// Resources are being given back.
    Removing,
}

impl Phase {
    /// Whether lookups should see the device.
    fn is_listed(&self) -> bool {
        !matches!(self, Phase::Adding | Phase::Removing)
    }
}

struct DeviceEntry {
    device: DeviceRef,
    phase: Phase,
    /// Held reservations with their published attributes, declaration order.
    resources: Vec<(ReservationToken, Attribute)>,
}

struct DriverEntry {
    driver: DriverRef,
    /// Cleared until the `version` attribute is out. Pending drivers hold
    /// their name but never match.
    live: bool,
}

struct BusState {
    /// Registration order.
    devices: Vec<DeviceEntry>,
    /// Registration order; matching takes the first hit.
    drivers: Vec<DriverEntry>,
}

impl BusState {
    fn position(&self, dev: &Device) -> Option<usize> {
        self.devices.iter().position(|e| ptr::eq(&*e.device, dev))
    }

    fn entry(&self, dev: &Device) -> Option<&DeviceEntry> {
        self.devices.iter().find(|e| ptr::eq(&*e.device, dev))
    }

    fn entry_mut(&mut self, dev: &Device) -> Option<&mut DeviceEntry> {
        self.devices.iter_mut().find(|e| ptr::eq(&*e.device, dev))
    }

    fn take_device(&mut self, dev: &Device) -> Option<DeviceEntry> {
        let pos = self.position(dev)?;
        Some(self.devices.remove(pos))
    }

    fn live_drivers(&self) -> impl Iterator<Item = &DriverRef> {
        self.drivers.iter().filter(|e| e.live).map(|e| &e.driver)
    }

    fn driver_position(&self, drv: &DriverRef) -> Option<usize> {
        self.drivers.iter().position(|e| Arc::ptr_eq(&e.driver, drv))
    }

    fn is_registered(&self, drv: &DriverRef) -> bool {
        self.live_drivers().any(|d| Arc::ptr_eq(d, drv))
    }

    /// Pick the driver for a freshly added device and mark it busy.
    fn begin_match(&mut self, dev: &Device) -> Option<DriverRef> {
        let drv = self
            .live_drivers()
            .find(|d| driver::matches(&***d, dev.bus_id()))
            .cloned()?;
        let entry = self.entry_mut(dev)?;
        if !matches!(entry.phase, Phase::Added) {
            return None;
        }
        entry.phase = Phase::Busy;
        Some(drv)
    }

    /// Mark an unbound device busy so `drv` can probe it.
    fn begin_probe(&mut self, dev: &Device) -> bool {
        match self.entry_mut(dev) {
            Some(entry) if matches!(entry.phase, Phase::Added) => {
                entry.phase = Phase::Busy;
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of a probe. Returns whether the device is now
    /// bound to `drv`.
    fn finish_probe(&mut self, dev: &Device, drv: &DriverRef, ok: bool) -> bool {
        let registered = self.is_registered(drv);
        let Some(entry) = self.entry_mut(dev) else {
            return false;
        };
        if !matches!(entry.phase, Phase::Busy) {
            return false;
        }
        if ok && registered {
            entry.phase = Phase::Bound(drv.clone());
            true
        } else {
            entry.phase = Phase::Added;
            false
        }
    }
}

/// Registry of devices and drivers with the resource arbitration that goes
/// with them.
///
/// * `M` is the lock guarding the device and driver sets (the resource
///   registry gets its own lock of the same type).
/// * `A` receives the resource and driver-version attributes.
/// * `V` tells which GPIO and expander lines exist.
///
/// No lock is held while driver hooks or the attribute sink run.
pub struct Bus<M: RawMutex, A: AttributeSink, V: PinValidator> {
    config: BusConfig,
    sink: A,
    registry: ResourceRegistry<M, V>,
    state: Mutex<M, RefCell<BusState>>,
}

impl<M: RawMutex, A: AttributeSink, V: PinValidator> Bus<M, A, V> {
    /// Create an empty bus. `validator` decides which lines resource
    /// requests may name.
    pub fn new(config: BusConfig, sink: A, validator: V) -> Self {
        Self {
            config,
            sink,
            registry: ResourceRegistry::new(validator),
            state: Mutex::new(RefCell::new(BusState {
                devices: Vec::new(),
                drivers: Vec::new(),
            })),
        }
    }

    /// Bus name from the configuration, used in log lines.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Reservations held by devices on this bus.
    pub fn registry(&self) -> &ResourceRegistry<M, V> {
        &self.registry
    }

    /// Where resource and driver attributes are published.
    pub fn sink(&self) -> &A {
        &self.sink
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BusState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    // -----------------------------------------------------------------------
    // Devices
    // -----------------------------------------------------------------------

    /// Put `dev` on the bus.
    ///
    /// Every resource is reserved and gets its attribute published, in
    /// declaration order. If any of them fails, what was claimed so far is
    /// given back in reverse order, the device leaves the bus and the error
    /// is returned.
    ///
    /// Once all resources are held the device is matched against the
    /// registered drivers. A failing probe is returned as
    /// [`Error::DriverCallback`] but leaves the device on the bus, unbound,
    /// with its resources still reserved.
    pub fn add_device(&self, dev: &DeviceRef) -> Result<(), Error> {
        if dev.name().is_empty() {
            return Err(Error::InvalidArgument);
        }

        self.with_state(|state| {
            if state.devices.iter().any(|e| e.device.bus_id() == dev.bus_id()) {
                return Err(Error::AlreadyExists);
            }
            state.devices.push(DeviceEntry {
                device: dev.clone(),
                phase: Phase::Adding,
                resources: Vec::new(),
            });
            Ok(())
        })?;

        let mut claimed = Vec::with_capacity(dev.resources().len());
        for res in dev.resources() {
            match self.claim(dev, res) {
                Ok(held) => claimed.push(held),
                Err(err) => {
                    self.unwind(&claimed);
                    let entry = self.with_state(|state| state.take_device(dev));
                    drop(entry);
                    return Err(err);
                }
            }
        }

        let drv = self.with_state(|state| {
            if let Some(entry) = state.entry_mut(dev) {
                entry.resources = claimed;
                entry.phase = Phase::Added;
            }
            state.begin_match(dev)
        });
        debug!(
            "bus {}: added {}, match={}",
            self.name(),
            dev.bus_id().as_str(),
            drv.as_ref().map(|d| d.name()).unwrap_or("-")
        );

        match drv {
            Some(drv) => self.probe(dev, drv),
            None => Ok(()),
        }
    }

    /// Take `dev` off the bus.
    ///
    /// Resource attributes are unpublished and reservations released in
    /// declaration order, then a bound driver gets its `remove` hook. The
    /// bus drops its reference last; if that was the final one the device's
    /// release hook runs.
    ///
    /// Devices that are not on the bus are ignored, and so are devices whose
    /// [`add_device`](Self::add_device) or removal is still in progress:
    /// those finish as the other call decides.
    pub fn remove_device(&self, dev: &Device) {
        let taken = self.with_state(|state| {
            let entry = state.entry_mut(dev)?;
            if !entry.phase.is_listed() {
                warn!(
                    "bus {}: {} is still being added or removed, not removing",
                    self.name(),
                    dev.bus_id().as_str()
                );
                return None;
            }
            let resources = mem::take(&mut entry.resources);
            let phase = mem::replace(&mut entry.phase, Phase::Removing);
            Some((resources, phase))
        });
        let Some((resources, phase)) = taken else {
            return;
        };

        for (token, attr) in &resources {
            self.sink.unpublish(attr);
            self.registry.release(*token);
        }
        if let Phase::Bound(drv) = phase {
            self.detach(dev, &*drv);
        }

        let entry = self.with_state(|state| state.take_device(dev));
        debug!("bus {}: removed {}", self.name(), dev.bus_id().as_str());
        drop(entry);
    }

    /// Reserve one resource for `dev` under its resolved attribute name.
    pub fn request_resource(
        &self,
        dev: &Device,
        res: &Resource,
    ) -> Result<ReservationToken, Error> {
        let name = res.resolved_name(dev.bus_id());
        self.registry.request(dev.bus_id(), &name, res)
    }

    /// Give a reservation back. Unknown tokens are ignored.
    pub fn release_resource(&self, token: ReservationToken) {
        self.registry.release(token)
    }

    /// Publish the read-only diagnostic attribute of a held reservation.
    pub fn publish_resource_attribute(
        &self,
        dev: &Device,
        token: ReservationToken,
    ) -> Result<Attribute, Error> {
        let name = self.registry.name_of(token).ok_or(Error::InvalidArgument)?;
        let attr = Attribute::resource(dev.bus_id(), name, token);
        self.sink.publish(&attr)?;
        Ok(attr)
    }

    /// Withdraw an attribute returned by
    /// [`publish_resource_attribute`](Self::publish_resource_attribute).
    pub fn unpublish_resource_attribute(&self, attr: &Attribute) {
        self.sink.unpublish(attr)
    }

    fn claim(
        &self,
        dev: &Device,
        res: &Resource,
    ) -> Result<(ReservationToken, Attribute), Error> {
        let token = self.request_resource(dev, res).inspect_err(|err| {
            warn!(
                "bus resource request failed: dev={}, res={}-{}: {:?}",
                dev.bus_id().as_str(),
                res.start(),
                res.end(),
                err
            );
        })?;
        match self.publish_resource_attribute(dev, token) {
            Ok(attr) => Ok((token, attr)),
            Err(err) => {
                warn!(
                    "bus resource create file failed: dev={}, res={}-{}",
                    dev.bus_id().as_str(),
                    res.start(),
                    res.end()
                );
                self.registry.release(token);
                Err(err)
            }
        }
    }

    fn unwind(&self, claimed: &[(ReservationToken, Attribute)]) {
        for (token, attr) in claimed.iter().rev() {
            self.sink.unpublish(attr);
            self.registry.release(*token);
        }
    }

    // -----------------------------------------------------------------------
    // Drivers
    // -----------------------------------------------------------------------

    /// Register `drv` and publish its `version` attribute.
    ///
    /// The driver's name is taken first, but the driver only starts matching
    /// devices once the attribute is out. If the attribute cannot be
    /// published the name is given up again and nothing was bound. On
    /// success every unbound device the driver matches is probed; probe
    /// failures there are logged and leave that device unbound.
    pub fn register_driver(&self, drv: DriverRef) -> Result<(), Error> {
        if drv.name().is_empty() {
            return Err(Error::InvalidArgument);
        }

        self.with_state(|state| {
            if state.drivers.iter().any(|e| e.driver.name() == drv.name()) {
                return Err(Error::AlreadyExists);
            }
            state.drivers.push(DriverEntry {
                driver: drv.clone(),
                live: false,
            });
            Ok(())
        })?;

        let attr = Attribute::driver_version(drv.name());
        let published = self.sink.publish(&attr);
        self.with_state(|state| {
            let Some(pos) = state.driver_position(&drv) else {
                return;
            };
            if published.is_ok() {
                state.drivers[pos].live = true;
            } else {
                state.drivers.remove(pos);
            }
        });
        if let Err(err) = published {
            error!("version attribute creation failed: {:?}", err);
            return Err(err.into());
        }

        self.attach(&drv);
        Ok(())
    }

    /// Take `drv` off the bus.
    ///
    /// Devices bound to it get its `remove` hook and fall back to
    /// [`DeviceState::Added`]; their reservations stay in place. A driver
    /// whose registration has not finished yet is left alone.
    pub fn unregister_driver(&self, drv: &DriverRef) {
        let bound = self.with_state(|state| {
            let pos = state.driver_position(drv)?;
            if !state.drivers[pos].live {
                return None;
            }
            state.drivers.remove(pos);
            let mut bound = Vec::new();
            for entry in state.devices.iter_mut() {
                if matches!(&entry.phase, Phase::Bound(d) if Arc::ptr_eq(d, drv)) {
                    entry.phase = Phase::Busy;
                    bound.push(entry.device.clone());
                }
            }
            Some(bound)
        });
        let Some(bound) = bound else {
            return;
        };

        for dev in &bound {
            self.detach(dev, &**drv);
            self.with_state(|state| {
                if let Some(entry) = state.entry_mut(dev) {
                    if matches!(entry.phase, Phase::Busy) {
                        entry.phase = Phase::Added;
                    }
                }
            });
        }
        self.sink.unpublish(&Attribute::driver_version(drv.name()));
        debug!("bus {}: driver {} gone", self.name(), drv.name());
    }

    fn attach(&self, drv: &DriverRef) {
        let candidates: Vec<DeviceRef> = self.with_state(|state| {
            state
                .devices
                .iter()
                .filter(|e| matches!(e.phase, Phase::Added))
                .filter(|e| driver::matches(&**drv, e.device.bus_id()))
                .map(|e| e.device.clone())
                .collect()
        });

        for dev in &candidates {
            if !self.with_state(|state| state.begin_probe(dev)) {
                continue;
            }
            // Already logged by probe(); the device simply stays unbound.
            let _ = self.probe(dev, drv.clone());
        }
    }

    fn probe(&self, dev: &Device, drv: DriverRef) -> Result<(), Error> {
        info!("bus probe drv: {}, dev: {}", drv.name(), dev.bus_id().as_str());
        let result = drv.probe(dev);
        let bound =
            self.with_state(|state| state.finish_probe(dev, &drv, result.is_ok()));
        match result {
            Ok(()) => {
                if !bound {
                    // Device or driver went away while probing.
                    self.detach(dev, &*drv);
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    "probe of {} by {} failed: {:?}",
                    dev.bus_id().as_str(),
                    drv.name(),
                    err
                );
                Err(Error::DriverCallback(err))
            }
        }
    }

    fn detach(&self, dev: &Device, drv: &dyn Driver) {
        info!("bus remove drv: {}, dev: {}", drv.name(), dev.bus_id().as_str());
        if let Err(err) = drv.remove(dev) {
            warn!("remove of {} failed: {:?}", dev.bus_id().as_str(), err);
        }
    }

    // -----------------------------------------------------------------------
    // Power management
    // -----------------------------------------------------------------------

    fn bound_to(&self, dev: &Device) -> Option<DriverRef> {
        self.with_state(|state| match &state.entry(dev)?.phase {
            Phase::Bound(drv) => Some(drv.clone()),
            _ => None,
        })
    }

    /// Forward a suspend to the bound driver. Without a driver this is a
    /// successful no-op.
    pub fn notify_suspend(&self, dev: &Device, msg: PmMessage) -> Result<(), Error> {
        match self.bound_to(dev) {
            Some(drv) => drv.suspend(dev, msg).map_err(Error::DriverCallback),
            None => Ok(()),
        }
    }

    /// Forward the late suspend phase to the bound driver.
    pub fn notify_suspend_late(
        &self,
        dev: &Device,
        msg: PmMessage,
    ) -> Result<(), Error> {
        match self.bound_to(dev) {
            Some(drv) => drv.suspend_late(dev, msg).map_err(Error::DriverCallback),
            None => Ok(()),
        }
    }

    /// Forward the early resume phase to the bound driver.
    pub fn notify_resume_early(&self, dev: &Device) -> Result<(), Error> {
        match self.bound_to(dev) {
            Some(drv) => drv.resume_early(dev).map_err(Error::DriverCallback),
            None => Ok(()),
        }
    }

    /// Forward a resume to the bound driver. Without a driver this is a
    /// successful no-op.
    pub fn notify_resume(&self, dev: &Device) -> Result<(), Error> {
        match self.bound_to(dev) {
            Some(drv) => drv.resume(dev).map_err(Error::DriverCallback),
            None => Ok(()),
        }
    }

    /// Run every bound driver's `shutdown` hook, newest device first.
    pub fn shutdown(&self) {
        let bound: Vec<(DeviceRef, DriverRef)> = self.with_state(|state| {
            state
                .devices
                .iter()
                .rev()
                .filter_map(|e| match &e.phase {
                    Phase::Bound(drv) => Some((e.device.clone(), drv.clone())),
                    _ => None,
                })
                .collect()
        });
        for (dev, drv) in &bound {
            debug!("bus shutdown dev: {}", dev.bus_id().as_str());
            drv.shutdown(dev);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Where `dev` is in its life cycle. Devices still being added or
    /// removed read as [`DeviceState::Unregistered`].
    pub fn device_state(&self, dev: &Device) -> DeviceState {
        self.with_state(|state| match state.entry(dev).map(|e| &e.phase) {
            None | Some(Phase::Adding) | Some(Phase::Removing) => {
                DeviceState::Unregistered
            }
            Some(Phase::Added) | Some(Phase::Busy) => DeviceState::Added,
            Some(Phase::Bound(_)) => DeviceState::Bound,
        })
    }

    /// Driver `dev` is bound to, if any.
    pub fn bound_driver(&self, dev: &Device) -> Option<DriverRef> {
        self.bound_to(dev)
    }

    /// Look a device up by bus id. Only devices that
    /// [`device_state`](Self::device_state) reports as added or bound are
    /// found.
    pub fn device(&self, bus_id: &str) -> Option<DeviceRef> {
        self.with_state(|state| {
            state
                .devices
                .iter()
                .filter(|e| e.phase.is_listed())
                .find(|e| e.device.bus_id().as_str() == bus_id)
                .map(|e| e.device.clone())
        })
    }

    /// Look a registered driver up by name.
    pub fn driver(&self, name: &str) -> Option<DriverRef> {
        self.with_state(|state| {
            state.live_drivers().find(|d| d.name() == name).cloned()
        })
    }

    /// Number of devices [`device`](Self::device) can find.
    pub fn device_count(&self) -> usize {
        self.with_state(|state| {
            state.devices.iter().filter(|e| e.phase.is_listed()).count()
        })
    }

    /// Number of registered drivers.
    pub fn driver_count(&self) -> usize {
        self.with_state(|state| state.live_drivers().count())
    }

    /// Environment announced for `dev`: `MODALIAS=<bus-id>`.
    pub fn uevent(&self, dev: &Device) -> heapless::String<UEVENT_SIZE> {
        let mut env = heapless::String::new();
        // A bus id always fits after the prefix.
        let _ = write!(env, "MODALIAS={}", dev.bus_id());
        env
    }

    /// Current text of an attribute the bus serves.
    ///
    /// Returns `None` for released resources, unregistered drivers and
    /// [`AttributeSource::External`] attributes.
    pub fn show_attribute(&self, attr: &Attribute) -> Option<String> {
        match (&attr.source, &attr.owner) {
            (AttributeSource::Resource(token), _) => self.registry.render(*token),
            (AttributeSource::DriverVersion, AttributeOwner::Driver(name)) => self
                .driver(name)
                .map(|drv| format!("{}\n", drv.version())),
            _ => None,
        }
    }
}
