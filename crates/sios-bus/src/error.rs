use alloc::string::String;
use core::fmt;

use derive_more::From;

use crate::attribute::AttributeError;
use crate::driver::DriverError;
use crate::resource::{BusId, ResourceType};

/// Errors returned by bus and registry operations.
#[derive(Debug, Clone, PartialEq, Eq, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A device, driver or resource was malformed, or a line failed the
    /// pin-validity table.
    #[from(skip)]
    InvalidArgument,
    /// A device or driver with the same name is already registered.
    #[from(skip)]
    AlreadyExists,
    /// The requested range overlaps a reservation of the same kind.
    ResourceConflict(Conflict),
    /// The attribute sink refused to publish an attribute.
    AttributeExposure(AttributeError),
    /// A driver hook failed; the hook's error is carried unchanged.
    DriverCallback(DriverError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::AlreadyExists => f.write_str("name already registered"),
            Error::ResourceConflict(conflict) => {
                write!(f, "resource conflict with {}", conflict)
            }
            Error::AttributeExposure(err) => {
                write!(f, "attribute exposure failed: {}", err)
            }
            Error::DriverCallback(err) => {
                write!(f, "driver callback failed: {}", err)
            }
        }
    }
}

/// Snapshot of the reservation that blocked a request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Conflict {
    /// Attribute name of the reserved resource.
    pub name: String,
    /// Bus id of the device holding it.
    pub owner: BusId,
    pub ty: ResourceType,
    pub start: u32,
    pub end: u32,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}-{}) held by {}",
            self.name, self.start, self.end, self.owner
        )
    }
}
