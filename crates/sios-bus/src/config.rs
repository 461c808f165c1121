use serde::{Deserialize, Serialize};

pub const MAX_BUS_NAME_LEN: usize = 16;

/// Settings of a [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Name the bus reports itself under in logs.
    pub name: heapless::String<MAX_BUS_NAME_LEN>,
}

impl Default for BusConfig {
    fn default() -> Self {
        let mut name = heapless::String::new();
        // "sios" always fits.
        let _ = name.push_str("sios");
        Self { name }
    }
}
