use sios_bus::{PinValidator, ResourceType};

// On-chip GPIO lines.
pub const GPIO_SIOS_RS_STROBE: u32 = 28;
pub const GPIO_SIOS_SPI_CSA0: u32 = 66;
pub const GPIO_SIOS_SPI_CSA1: u32 = 67;
pub const GPIO_SIOS_SPI_CSA2: u32 = 68;
/// Hot-swap controller enable.
pub const GPIO_SIOS_HS: u32 = 69;
/// Main power latch.
pub const GPIO_SIOS_PWR: u32 = 70;
/// Peripheral supply.
pub const GPIO_SIOS_VDD2: u32 = 71;
/// USB high-power switch.
pub const GPIO_SIOS_USBHP: u32 = 72;
pub const GPIO_SIOS_RST: u32 = 73;
/// Power button, active low.
pub const GPIO_SIOS_PBST: u32 = 74;
pub const GPIO_SIOS_I2C_ALERT: u32 = 75;
pub const GPIO_SIOS_I2C_CNVT: u32 = 76;
pub const GPIO_SIOS_I2C_CNVG: u32 = 77;
pub const GPIO_SIOS_SPI_CLK: u32 = 81;
pub const GPIO_SIOS_SPI_CS: u32 = 82;
pub const GPIO_SIOS_SPI_MOSI: u32 = 83;
pub const GPIO_SIOS_SPI_MISO: u32 = 84;

/// Every on-chip line the board routes somewhere.
pub const GPIO_LINES: [u32; 17] = [
    GPIO_SIOS_RS_STROBE,
    GPIO_SIOS_SPI_CSA0,
    GPIO_SIOS_SPI_CSA1,
    GPIO_SIOS_SPI_CSA2,
    GPIO_SIOS_HS,
    GPIO_SIOS_PWR,
    GPIO_SIOS_VDD2,
    GPIO_SIOS_USBHP,
    GPIO_SIOS_RST,
    GPIO_SIOS_PBST,
    GPIO_SIOS_I2C_ALERT,
    GPIO_SIOS_I2C_CNVT,
    GPIO_SIOS_I2C_CNVG,
    GPIO_SIOS_SPI_CLK,
    GPIO_SIOS_SPI_CS,
    GPIO_SIOS_SPI_MOSI,
    GPIO_SIOS_SPI_MISO,
];

/// Number of lines on the PCA9557 expander.
pub const XGPIO_LINES: u32 = 8;

/// Pin table of the SIOS board.
#[derive(Debug, Default, Clone, Copy)]
pub struct SiosPins;

impl PinValidator for SiosPins {
    fn is_valid(&self, pin: u32, kind: ResourceType) -> bool {
        if kind == ResourceType::GPIO {
            GPIO_LINES.contains(&pin)
        } else if kind == ResourceType::XGPIO {
            pin < XGPIO_LINES
        } else {
            false
        }
    }
}
