use alloc::string::String;
use core::fmt::{self, Write};

use bitflags::bitflags;

/// Size of a bus id buffer, terminator included.
pub const BUS_ID_SIZE: usize = 20;

/// Name of a device as the bus sees it: the device name truncated to
/// `BUS_ID_SIZE - 1` bytes.
pub type BusId = heapless::String<{ BUS_ID_SIZE - 1 }>;

bitflags! {
    /// Line kind and capability bits of a [`Resource`].
    ///
    /// The low byte selects the kind of line, the high byte carries flags
    /// that do not take part in conflict detection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u16 {
        /// On-chip GPIO line.
        const GPIO = 0x0001;
        /// Line on the I2C GPIO expander.
        const XGPIO = 0x0002;
        /// Line is used as an interrupt source.
        const IRQ = 0x0100;
        /// Line is used as a fast interrupt source.
        const FIRQ = 0x0200;

        const TYPE_MASK = 0x00ff;
        const FLAG_MASK = 0xff00;
    }
}

impl ResourceType {
    /// The kind bits alone, flags masked out.
    pub const fn kind(self) -> ResourceType {
        ResourceType::from_bits_retain(self.bits() & Self::TYPE_MASK.bits())
    }

    /// Whether pins of this kind must pass the pin-validity table.
    pub const fn is_gpio_class(self) -> bool {
        self.bits() & (Self::GPIO.bits() | Self::XGPIO.bits()) != 0
    }

    fn kind_label(self) -> &'static str {
        if self.contains(Self::GPIO) {
            "GPIO"
        } else if self.contains(Self::XGPIO) {
            "XGPIO"
        } else {
            "unknown"
        }
    }

    fn flag_label(self) -> &'static str {
        if self.contains(Self::IRQ) {
            "|IRQ"
        } else if self.contains(Self::FIRQ) {
            "|FIRQ"
        } else {
            ""
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ResourceType {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}{}", self.kind_label(), self.flag_label())
    }
}

/// An inclusive range of lines a device wants exclusive use of.
///
/// Resources are plain values so board code can keep them in `static`
/// tables:
///
/// ```
/// use sios_bus::{Resource, ResourceType};
///
/// static BUTTON: [Resource; 1] =
///     [Resource::gpio(74, 74).with_flags(ResourceType::IRQ).named("PwrButton")];
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resource {
    name: Option<&'static str>,
    ty: ResourceType,
    start: u32,
    end: u32,
}

impl Resource {
    /// Unnamed range of lines `start..=end` of type `ty`.
    pub const fn new(ty: ResourceType, start: u32, end: u32) -> Self {
        Self { name: None, ty, start, end }
    }

    /// On-chip GPIO lines.
    pub const fn gpio(start: u32, end: u32) -> Self {
        Self::new(ResourceType::GPIO, start, end)
    }

    /// Expander lines.
    pub const fn xgpio(start: u32, end: u32) -> Self {
        Self::new(ResourceType::XGPIO, start, end)
    }

    /// Add capability flags such as [`ResourceType::IRQ`].
    pub const fn with_flags(self, flags: ResourceType) -> Self {
        Self {
            ty: ResourceType::from_bits_retain(self.ty.bits() | flags.bits()),
            ..self
        }
    }

    /// Give the resource an explicit attribute name.
    pub const fn named(self, name: &'static str) -> Self {
        Self { name: Some(name), ..self }
    }

    /// The explicit name, if one was given.
    pub const fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Kind plus flags.
    pub const fn ty(&self) -> ResourceType {
        self.ty
    }

    /// First line, inclusive.
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Last line, inclusive.
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Inclusive intersection test. Kinds are not compared here.
    pub const fn overlaps(&self, start: u32, end: u32) -> bool {
        self.end >= start && self.start <= end
    }

    /// The explicit name, or `"<bus-id>:<start>-<end>"` when none was given.
    ///
    /// Synthesised names are bounded like bus ids.
    pub fn resolved_name(&self, bus_id: &str) -> String {
        match self.name {
            Some(name) => String::from(name),
            None => {
                let mut name = BusId::new();
                let _ = write!(
                    Truncating(&mut name),
                    "{}:{:02}-{:02}",
                    bus_id,
                    self.start,
                    self.end
                );
                String::from(name.as_str())
            }
        }
    }
}

/// Build the bus id for a device name.
pub(crate) fn bus_id(name: &str) -> BusId {
    let mut id = BusId::new();
    let _ = Truncating(&mut id).write_str(name);
    id
}

/// Write one diagnostic line: `<name>\t<KIND>[|FLAG]\t<start>\t<end>\n`.
pub(crate) fn render_line(
    out: &mut impl Write,
    name: &str,
    ty: ResourceType,
    start: u32,
    end: u32,
) -> fmt::Result {
    writeln!(
        out,
        "{}\t{}{}\t{}\t{}",
        name,
        ty.kind_label(),
        ty.flag_label(),
        start,
        end
    )
}

/// Writer that keeps whatever fits and silently drops the rest.
struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, ty: ResourceType, start: u32, end: u32) -> String {
        let mut out = String::new();
        render_line(&mut out, name, ty, start, end).unwrap();
        out
    }

    #[test]
    fn render_kinds_and_flags() {
        assert_eq!(line("a", ResourceType::GPIO, 1, 2), "a\tGPIO\t1\t2\n");
        assert_eq!(
            line("PwrButton", ResourceType::GPIO | ResourceType::IRQ, 74, 74),
            "PwrButton\tGPIO|IRQ\t74\t74\n"
        );
        assert_eq!(
            line("x", ResourceType::XGPIO | ResourceType::FIRQ, 0, 7),
            "x\tXGPIO|FIRQ\t0\t7\n"
        );
        assert_eq!(
            line("u", ResourceType::empty(), 3, 4),
            "u\tunknown\t3\t4\n"
        );
    }

    #[test]
    fn render_prefers_gpio_and_irq() {
        let all = ResourceType::GPIO
            | ResourceType::XGPIO
            | ResourceType::IRQ
            | ResourceType::FIRQ;
        assert_eq!(line("b", all, 5, 5), "b\tGPIO|IRQ\t5\t5\n");
    }

    #[test]
    fn kind_masks_flags() {
        let ty = ResourceType::XGPIO | ResourceType::IRQ;
        assert_eq!(ty.kind(), ResourceType::XGPIO);
        assert!(ty.is_gpio_class());
        assert!(!ResourceType::IRQ.is_gpio_class());
    }

    #[test]
    fn synthesised_name() {
        let res = Resource::gpio(69, 72);
        assert_eq!(res.resolved_name("sios:power"), "sios:power:69-72");
        assert_eq!(Resource::gpio(3, 4).resolved_name("d"), "d:03-04");
        assert_eq!(
            Resource::gpio(3, 4).named("Given").resolved_name("d"),
            "Given"
        );
    }

    #[test]
    fn synthesised_name_is_bounded() {
        let name = Resource::gpio(66, 68).resolved_name("sios:spi-chipsel");
        assert_eq!(name, "sios:spi-chipsel:66");
        assert_eq!(name.len(), BUS_ID_SIZE - 1);
    }

    #[test]
    fn bus_id_truncates() {
        assert_eq!(bus_id("sios:button").as_str(), "sios:button");
        assert_eq!(
            bus_id("sios:a-very-long-device-name").as_str(),
            "sios:a-very-long-de"
        );
    }

    #[test]
    fn overlap_is_inclusive() {
        let res = Resource::gpio(10, 20);
        assert!(res.overlaps(20, 30));
        assert!(res.overlaps(0, 10));
        assert!(res.overlaps(12, 13));
        assert!(!res.overlaps(21, 30));
        assert!(!res.overlaps(0, 9));
    }
}
