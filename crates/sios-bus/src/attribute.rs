use alloc::string::String;
use core::fmt;

use bitflags::bitflags;

use crate::registry::ReservationToken;
use crate::resource::BusId;

bitflags! {
    /// Access permissions of a published attribute, in file-mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttributeMode: u16 {
        /// Readable by everyone.
        const READ = 0o444;
        /// Writable by the owner.
        const WRITE = 0o200;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AttributeMode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=u16:o}", self.bits())
    }
}

/// The object an attribute hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeOwner {
    Device(BusId),
    Driver(String),
}

/// Where the contents of an attribute come from when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeSource {
    /// Diagnostic line of a reserved resource, served by the bus.
    Resource(ReservationToken),
    /// Version string of a registered driver, served by the bus.
    DriverVersion,
    /// Served by whoever published it.
    External,
}

/// A named value exposed to the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attribute {
    pub owner: AttributeOwner,
    pub name: String,
    pub mode: AttributeMode,
    pub source: AttributeSource,
}

impl Attribute {
    pub(crate) fn resource(
        owner: &BusId,
        name: String,
        token: ReservationToken,
    ) -> Self {
        Self {
            owner: AttributeOwner::Device(owner.clone()),
            name,
            mode: AttributeMode::READ,
            source: AttributeSource::Resource(token),
        }
    }

    pub(crate) fn driver_version(driver: &str) -> Self {
        Self {
            owner: AttributeOwner::Driver(String::from(driver)),
            name: String::from("version"),
            mode: AttributeMode::READ,
            source: AttributeSource::DriverVersion,
        }
    }
}

/// Error reported by an [`AttributeSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeError {
    /// An attribute with that name already exists on the owner.
    Exists,
    /// The sink ran out of room for new attributes.
    NoSpace,
    /// Sink-specific failure code.
    Other(i32),
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeError::Exists => f.write_str("attribute exists"),
            AttributeError::NoSpace => f.write_str("no space for attribute"),
            AttributeError::Other(code) => write!(f, "error {}", code),
        }
    }
}

/// Publishes attributes to whatever exposes them (a shell, a USB endpoint,
/// a debug console).
///
/// Calls are made without any bus lock held and are expected to return
/// promptly. Reading a published attribute goes back through
/// [`Bus::show_attribute`](crate::Bus::show_attribute) for the sources the
/// bus serves.
pub trait AttributeSink {
    fn publish(&self, attr: &Attribute) -> Result<(), AttributeError>;

    fn unpublish(&self, attr: &Attribute);
}

impl<T: AttributeSink + ?Sized> AttributeSink for &T {
    fn publish(&self, attr: &Attribute) -> Result<(), AttributeError> {
        (**self).publish(attr)
    }

    fn unpublish(&self, attr: &Attribute) {
        (**self).unpublish(attr)
    }
}

/// Sink for boards that expose nothing. Every publish succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AttributeSink for NullSink {
    fn publish(&self, _attr: &Attribute) -> Result<(), AttributeError> {
        Ok(())
    }

    fn unpublish(&self, _attr: &Attribute) {}
}
