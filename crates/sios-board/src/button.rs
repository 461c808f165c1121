use alloc::sync::Arc;

use embassy_sync::blocking_mutex::raw::RawMutex;
use serde::{Deserialize, Serialize};
use sios_bus::{
    AttributeSink, Bus, Device, DeviceRef, Driver, DriverRef, Error, PinValidator,
    Resource, ResourceType,
};

use crate::pins::GPIO_SIOS_PBST;
use crate::DRIVER_VERSION;

pub const BUTTON_NAME: &str = "sios:button";

const PWR_BUTTON: Resource = Resource::gpio(GPIO_SIOS_PBST, GPIO_SIOS_PBST)
    .with_flags(ResourceType::IRQ)
    .named("PwrButton");

pub static BUTTON_RESOURCES: [Resource; 1] = [PWR_BUTTON];

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonConfig {
    /// Hold time before a short press is reported.
    pub short_timeout_ms: u32,
    /// Hold time before a long press is reported.
    pub long_timeout_ms: u32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self { short_timeout_ms: 2000, long_timeout_ms: 4000 }
    }
}

impl ButtonConfig {
    pub fn with_short_timeout(mut self, ms: u32) -> Self {
        self.short_timeout_ms = ms;
        self
    }

    pub fn with_long_timeout(mut self, ms: u32) -> Self {
        self.long_timeout_ms = ms;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonPress {
    Short,
    Long,
}

impl ButtonPress {
    /// Environment of the change event announced for this press.
    pub fn uevent(&self) -> [&'static str; 2] {
        match self {
            ButtonPress::Short => ["BUTTON=power", "STATE=short"],
            ButtonPress::Long => ["BUTTON=power", "STATE=long"],
        }
    }
}

/// Turns press and release edges plus periodic polls into press events.
///
/// While the button is held, [`poll`](Self::poll) reports `Short` once the
/// short timeout has elapsed and, on a later poll, `Long` once the long
/// timeout has. Each is reported at most once per press. After `Long` there
/// is nothing left to report and [`is_active`](Self::is_active) turns false.
#[derive(Debug, Clone)]
pub struct PressTracker {
    config: ButtonConfig,
    pressed_at: Option<u64>,
    short_fired: bool,
    long_fired: bool,
    flushed: bool,
}

impl PressTracker {
    pub fn new(config: ButtonConfig) -> Self {
        Self {
            config,
            pressed_at: None,
            short_fired: false,
            long_fired: false,
            flushed: false,
        }
    }

    pub fn press(&mut self, now_ms: u64) {
        if self.pressed_at.is_none() {
            self.pressed_at = Some(now_ms);
        }
    }

    pub fn release(&mut self) {
        self.pressed_at = None;
        self.short_fired = false;
        self.long_fired = false;
    }

    /// Feed the raw level of the active-low button line.
    pub fn edge(&mut self, level_high: bool, now_ms: u64) {
        if level_high {
            self.release();
        } else {
            self.press(now_ms);
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> Option<ButtonPress> {
        if self.flushed {
            return None;
        }
        let held = now_ms.saturating_sub(self.pressed_at?);
        if held < u64::from(self.config.short_timeout_ms) {
            None
        } else if !self.short_fired {
            self.short_fired = true;
            Some(ButtonPress::Short)
        } else if held >= u64::from(self.config.long_timeout_ms) && !self.long_fired {
            self.long_fired = true;
            Some(ButtonPress::Long)
        } else {
            None
        }
    }

    /// Whether the caller should keep polling.
    pub fn is_active(&self) -> bool {
        !self.flushed && self.pressed_at.is_some() && !self.long_fired
    }

    /// Stop reporting presses for good.
    pub fn flush(&mut self) {
        self.flushed = true;
    }

    pub fn held_ms(&self, now_ms: u64) -> Option<u64> {
        self.pressed_at.map(|at| now_ms.saturating_sub(at))
    }
}

/// Driver for the power button. It claims the button device and nothing
/// more; press handling lives in [`PressTracker`].
#[derive(Debug, Default)]
pub struct ButtonDriver;

impl Driver for ButtonDriver {
    fn name(&self) -> &str {
        BUTTON_NAME
    }

    fn version(&self) -> &str {
        DRIVER_VERSION
    }
}

pub fn button_device() -> Device {
    Device::new(BUTTON_NAME).with_resources(&BUTTON_RESOURCES)
}

/// The power button as installed on a bus.
pub struct ButtonModule {
    device: DeviceRef,
    driver: DriverRef,
    tracker: PressTracker,
}

impl ButtonModule {
    /// Register the button driver and device.
    ///
    /// If the device cannot be added the driver is unregistered again.
    pub fn install<M: RawMutex, A: AttributeSink, V: PinValidator>(
        bus: &Bus<M, A, V>,
        config: ButtonConfig,
    ) -> Result<Self, Error> {
        let driver: DriverRef = Arc::new(ButtonDriver);
        bus.register_driver(driver.clone())?;

        let device = button_device().into_ref();
        if let Err(err) = bus.add_device(&device) {
            error!("button device registration failed: {:?}", err);
            bus.unregister_driver(&driver);
            return Err(err);
        }

        Ok(Self { device, driver, tracker: PressTracker::new(config) })
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Feed an edge seen on the button line.
    pub fn edge(&mut self, level_high: bool, now_ms: u64) {
        self.tracker.edge(level_high, now_ms)
    }

    pub fn poll(&mut self, now_ms: u64) -> Option<ButtonPress> {
        let press = self.tracker.poll(now_ms)?;
        info!("button press: {:?}", press);
        Some(press)
    }

    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Stop press reporting, then take the device and driver off the bus.
    pub fn uninstall<M: RawMutex, A: AttributeSink, V: PinValidator>(
        mut self,
        bus: &Bus<M, A, V>,
    ) {
        self.tracker.flush();
        bus.remove_device(&self.device);
        bus.unregister_driver(&self.driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PressTracker {
        PressTracker::new(ButtonConfig::default())
    }

    #[test]
    fn short_then_long() {
        let mut t = tracker();
        t.press(1000);
        assert_eq!(t.poll(2999), None);
        assert_eq!(t.poll(3000), Some(ButtonPress::Short));
        assert_eq!(t.poll(3500), None);
        assert_eq!(t.poll(5000), Some(ButtonPress::Long));
        assert_eq!(t.poll(9000), None);
        assert!(!t.is_active());
    }

    #[test]
    fn long_needs_a_later_poll() {
        let mut t = tracker();
        t.press(0);
        assert_eq!(t.poll(10_000), Some(ButtonPress::Short));
        assert_eq!(t.poll(10_001), Some(ButtonPress::Long));
    }

    #[test]
    fn release_resets() {
        let mut t = tracker();
        t.press(0);
        assert_eq!(t.poll(2500), Some(ButtonPress::Short));
        t.release();
        assert_eq!(t.poll(5000), None);
        assert!(!t.is_active());

        t.press(6000);
        assert_eq!(t.poll(8000), Some(ButtonPress::Short));
    }

    #[test]
    fn repeated_press_keeps_start() {
        let mut t = tracker();
        t.edge(false, 100);
        t.edge(false, 1500);
        assert_eq!(t.held_ms(2100), Some(2000));
        assert_eq!(t.poll(2100), Some(ButtonPress::Short));
        t.edge(true, 2200);
        assert_eq!(t.held_ms(2300), None);
    }

    #[test]
    fn flush_stops_reporting() {
        let mut t = tracker();
        t.press(0);
        t.flush();
        assert_eq!(t.poll(5000), None);
        assert!(!t.is_active());
    }

    #[test]
    fn config_overrides_are_independent() {
        let cfg = ButtonConfig::default().with_long_timeout(6000);
        assert_eq!(cfg.short_timeout_ms, 2000);
        assert_eq!(cfg.long_timeout_ms, 6000);

        let cfg = ButtonConfig::default().with_short_timeout(500);
        assert_eq!(cfg.short_timeout_ms, 500);
        assert_eq!(cfg.long_timeout_ms, 4000);
    }

    #[test]
    fn uevent_strings() {
        assert_eq!(ButtonPress::Short.uevent(), ["BUTTON=power", "STATE=short"]);
        assert_eq!(ButtonPress::Long.uevent(), ["BUTTON=power", "STATE=long"]);
    }
}
