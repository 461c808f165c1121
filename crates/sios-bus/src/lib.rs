#![no_std]
//! Device/driver bus and GPIO resource arbitration for the SIOS sensor board.
//!
//! Devices register on a [`Bus`] together with the GPIO-class line ranges
//! they need. Every range is reserved in the bus's [`ResourceRegistry`],
//! which refuses overlapping claims of the same line kind, and a diagnostic
//! attribute is published for it through an [`AttributeSink`]. Once all of
//! a device's resources are held, the bus binds it to the first registered
//! [`Driver`] whose name prefixes the device name and forwards power
//! transitions to that driver.
//!
//! The lock type is a type parameter, so a bus can sit behind a
//! `CriticalSectionRawMutex` on target and a `NoopRawMutex` on the host.
extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod attribute;
mod bus;
mod config;
mod device;
mod driver;
mod error;
mod registry;
mod resource;

pub use attribute::{
    Attribute, AttributeError, AttributeMode, AttributeOwner, AttributeSink,
    AttributeSource, NullSink,
};
pub use bus::{Bus, UEVENT_SIZE};
pub use config::BusConfig;
pub use device::{Device, DeviceRef, DeviceState, ReleaseHook};
pub use driver::{Driver, DriverError, DriverRef, PmMessage};
pub use error::{Conflict, Error};
pub use registry::{AcceptAll, PinValidator, ReservationToken, ResourceRegistry};
pub use resource::{BusId, Resource, ResourceType, BUS_ID_SIZE};
