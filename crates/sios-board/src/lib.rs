#![no_std]
//! Board support for the SIOS sensor board: pin map, power button and
//! power rails on top of [`sios_bus`].
extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod button;
mod pins;
mod power;

pub use button::*;
pub use pins::*;
pub use power::*;

use embassy_sync::blocking_mutex::raw::RawMutex;
use sios_bus::{AttributeSink, Bus, BusConfig};

/// Version string every board driver reports.
pub const DRIVER_VERSION: &str = "$Revision: 1.0 $";

/// A bus that validates lines against the SIOS pin map.
pub type SiosBus<M, A> = Bus<M, A, SiosPins>;

/// Empty bus with the default configuration and the SIOS pin map.
pub fn new_bus<M: RawMutex, A: AttributeSink>(sink: A) -> SiosBus<M, A> {
    Bus::new(BusConfig::default(), sink, SiosPins)
}
