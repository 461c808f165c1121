use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::StatefulOutputPin;
use sios_bus::{
    Attribute, AttributeMode, AttributeOwner, AttributeSink, AttributeSource, Bus,
    Device, DeviceRef, Driver, DriverRef, PinValidator, Resource,
};

use crate::pins::{
    GPIO_SIOS_HS, GPIO_SIOS_PWR, GPIO_SIOS_USBHP, GPIO_SIOS_VDD2,
};
use crate::DRIVER_VERSION;

pub const POWER_NAME: &str = "sios:power";

/// HS, PWR, VDD2 and USBHP as one unnamed range.
pub static POWER_RESOURCES: [Resource; 1] =
    [Resource::gpio(GPIO_SIOS_HS, GPIO_SIOS_USBHP)];

/// A switchable supply rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rail {
    HotSwap,
    Vdd2,
    UsbHighPower,
    Pwr,
}

impl Rail {
    /// Attribute publishing order.
    pub const ALL: [Rail; 4] = [
        Rail::HotSwap,
        Rail::Vdd2,
        Rail::UsbHighPower,
        Rail::Pwr,
    ];

    pub const fn gpio(self) -> u32 {
        match self {
            Rail::HotSwap => GPIO_SIOS_HS,
            Rail::Vdd2 => GPIO_SIOS_VDD2,
            Rail::UsbHighPower => GPIO_SIOS_USBHP,
            Rail::Pwr => GPIO_SIOS_PWR,
        }
    }

    pub const fn attribute_name(self) -> &'static str {
        match self {
            Rail::HotSwap => "HotSwap",
            Rail::Vdd2 => "VDD2",
            Rail::UsbHighPower => "USBHP",
            Rail::Pwr => "PWR",
        }
    }

    pub fn from_attribute_name(name: &str) -> Option<Rail> {
        Rail::ALL.into_iter().find(|rail| rail.attribute_name() == name)
    }
}

/// Parse a rail setting written by a user.
///
/// Empty input and anything starting with `f`, `n`, `0` or `of` (any case)
/// is off; everything else is on.
pub fn parse_bool(buf: &[u8]) -> bool {
    match buf {
        [] => false,
        [b'f' | b'F' | b'n' | b'N' | b'0', ..] => false,
        [b'o' | b'O', b'f' | b'F', ..] => false,
        _ => true,
    }
}

/// Text a rail attribute shows.
pub const fn show_state(on: bool) -> &'static str {
    if on {
        "on\n"
    } else {
        "off\n"
    }
}

/// Failure while bringing the power module up.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError<E> {
    Bus(sios_bus::Error),
    Pin(E),
}

impl<E> From<sios_bus::Error> for PowerError<E> {
    fn from(err: sios_bus::Error) -> Self {
        PowerError::Bus(err)
    }
}

impl<E: fmt::Debug> fmt::Display for PowerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerError::Bus(err) => write!(f, "bus: {}", err),
            PowerError::Pin(err) => write!(f, "pin: {:?}", err),
        }
    }
}

/// Output pins behind the power rails.
pub struct PowerController<P> {
    hs: P,
    pwr: P,
    vdd2: P,
    usbhp: P,
    rst: P,
}

impl<P: StatefulOutputPin> PowerController<P> {
    pub fn new(hs: P, pwr: P, vdd2: P, usbhp: P, rst: P) -> Self {
        Self { hs, pwr, vdd2, usbhp, rst }
    }

    fn pin(&mut self, rail: Rail) -> &mut P {
        match rail {
            Rail::HotSwap => &mut self.hs,
            Rail::Vdd2 => &mut self.vdd2,
            Rail::UsbHighPower => &mut self.usbhp,
            Rail::Pwr => &mut self.pwr,
        }
    }

    pub fn set(&mut self, rail: Rail, on: bool) -> Result<(), P::Error> {
        let pin = self.pin(rail);
        if on {
            pin.set_high()
        } else {
            pin.set_low()
        }
    }

    pub fn get(&mut self, rail: Rail) -> Result<bool, P::Error> {
        self.pin(rail).is_set_high()
    }

    /// Latch main power, drop the switchable rails and reset, then bring the
    /// peripheral supply up.
    pub fn power_up(&mut self) -> Result<(), P::Error> {
        self.pwr.set_high()?;
        self.hs.set_low()?;
        self.vdd2.set_low()?;
        self.usbhp.set_low()?;
        self.rst.set_low()?;
        self.vdd2.set_high()
    }

    /// Drop every rail, main power last.
    pub fn power_off(&mut self) -> Result<(), P::Error> {
        self.vdd2.set_low()?;
        self.hs.set_low()?;
        self.usbhp.set_low()?;
        self.pwr.set_low()
    }

    /// Read handler of a rail attribute.
    pub fn show(&mut self, rail: Rail) -> Result<&'static str, P::Error> {
        self.get(rail).map(show_state)
    }

    /// Write handler of a rail attribute. Consumes the whole buffer.
    pub fn store(&mut self, rail: Rail, buf: &[u8]) -> Result<usize, P::Error> {
        self.set(rail, parse_bool(buf))?;
        Ok(buf.len())
    }

    pub fn release(self) -> (P, P, P, P, P) {
        (self.hs, self.pwr, self.vdd2, self.usbhp, self.rst)
    }
}

/// Driver for the power rails. It has no hooks; bring-up is done by
/// [`PowerModule::install`].
#[derive(Debug, Default)]
pub struct PowerDriver;

impl Driver for PowerDriver {
    fn name(&self) -> &str {
        POWER_NAME
    }

    fn version(&self) -> &str {
        DRIVER_VERSION
    }
}

pub fn power_device() -> Device {
    Device::new(POWER_NAME).with_resources(&POWER_RESOURCES)
}

fn rail_attribute(dev: &Device, rail: Rail) -> Attribute {
    Attribute {
        owner: AttributeOwner::Device(dev.bus_id().clone()),
        name: String::from(rail.attribute_name()),
        mode: AttributeMode::READ | AttributeMode::WRITE,
        source: AttributeSource::External,
    }
}

/// The power rails as installed on a bus.
pub struct PowerModule<P> {
    device: DeviceRef,
    driver: DriverRef,
    attrs: Vec<Attribute>,
    controller: PowerController<P>,
}

impl<P: StatefulOutputPin> PowerModule<P> {
    /// Register the power driver and device, power the board up and publish
    /// one read-write attribute per rail.
    ///
    /// On failure everything done so far is undone in reverse.
    pub fn install<M: RawMutex, A: AttributeSink, V: PinValidator>(
        bus: &Bus<M, A, V>,
        mut controller: PowerController<P>,
    ) -> Result<Self, PowerError<P::Error>> {
        let driver: DriverRef = Arc::new(PowerDriver);
        bus.register_driver(driver.clone())?;

        let device = power_device().into_ref();
        if let Err(err) = bus.add_device(&device) {
            error!("power device registration failed: {:?}", err);
            bus.unregister_driver(&driver);
            return Err(err.into());
        }

        let teardown = |attrs: &[Attribute]| {
            for attr in attrs.iter().rev() {
                bus.sink().unpublish(attr);
            }
            bus.remove_device(&device);
            bus.unregister_driver(&driver);
        };

        if let Err(err) = controller.power_up() {
            teardown(&[]);
            return Err(PowerError::Pin(err));
        }

        let mut attrs = Vec::with_capacity(Rail::ALL.len());
        for rail in Rail::ALL {
            let attr = rail_attribute(&device, rail);
            if let Err(err) = bus.sink().publish(&attr) {
                warn!("power attribute {} failed: {:?}", rail.attribute_name(), err);
                teardown(&attrs);
                return Err(PowerError::Bus(err.into()));
            }
            attrs.push(attr);
        }

        info!("power up, dev={}", device.bus_id().as_str());
        Ok(Self { device, driver, attrs, controller })
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn controller(&mut self) -> &mut PowerController<P> {
        &mut self.controller
    }

    /// Read a rail attribute by name.
    pub fn show(&mut self, name: &str) -> Option<Result<&'static str, P::Error>> {
        let rail = Rail::from_attribute_name(name)?;
        Some(self.controller.show(rail))
    }

    /// Write a rail attribute by name.
    pub fn store(
        &mut self,
        name: &str,
        buf: &[u8],
    ) -> Option<Result<usize, P::Error>> {
        let rail = Rail::from_attribute_name(name)?;
        Some(self.controller.store(rail, buf))
    }

    /// Unpublish the rail attributes and take the device and driver off the
    /// bus. The rails are left as they are.
    pub fn uninstall<M: RawMutex, A: AttributeSink, V: PinValidator>(
        self,
        bus: &Bus<M, A, V>,
    ) -> PowerController<P> {
        for attr in &self.attrs {
            bus.sink().unpublish(attr);
        }
        bus.remove_device(&self.device);
        bus.unregister_driver(&self.driver);
        self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_off_words() {
        let inputs: [&[u8]; 9] =
            [b"", b"0", b"n", b"No", b"false", b"F", b"off", b"OFF", b"oF"];
        for input in inputs {
            assert!(!parse_bool(input), "{:?}", input);
        }
    }

    #[test]
    fn parse_bool_on_words() {
        let inputs: [&[u8]; 8] =
            [b"1", b"on", b"ON", b"o", b"yes", b"true", b"x", b"\n"];
        for input in inputs {
            assert!(parse_bool(input), "{:?}", input);
        }
    }

    #[test]
    fn rail_names_round_trip() {
        for rail in Rail::ALL {
            assert_eq!(Rail::from_attribute_name(rail.attribute_name()), Some(rail));
        }
        assert_eq!(Rail::from_attribute_name("RST"), None);
        assert_eq!(Rail::Pwr.gpio(), 70);
    }

    #[test]
    fn show_strings() {
        assert_eq!(show_state(true), "on\n");
        assert_eq!(show_state(false), "off\n");
    }
}
