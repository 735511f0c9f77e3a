/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags. All boards wire an
/// SX1276/78 on the VSPI bus.

#[cfg(feature = "board-devkit")]
mod hw {
    pub const BUTTON_PIN: u8 = 0; // BOOT button, active low
    pub const LED_PIN: u8 = 2;
    pub const LORA_SCK_PIN: u8 = 5;
    pub const LORA_MISO_PIN: u8 = 19;
    pub const LORA_MOSI_PIN: u8 = 27;
    pub const LORA_CS_PIN: u8 = 18;
    pub const LORA_RST_PIN: u8 = 14;
    pub const LORA_DIO0_PIN: u8 = 26;
    pub const HAS_BATTERY_SENSE: bool = true;
    pub const BATTERY_ADC_PIN: u8 = 34;
    /// Cell voltage / ADC pin voltage
    pub const BATTERY_DIVIDER: u32 = 2;
    pub const BOARD_NAME: &str = "esp32_devkit";
}

#[cfg(feature = "board-lora32")]
mod hw {
    pub const BUTTON_PIN: u8 = 0;
    pub const LED_PIN: u8 = 25;
    pub const LORA_SCK_PIN: u8 = 5;
    pub const LORA_MISO_PIN: u8 = 19;
    pub const LORA_MOSI_PIN: u8 = 27;
    pub const LORA_CS_PIN: u8 = 18;
    pub const LORA_RST_PIN: u8 = 23;
    pub const LORA_DIO0_PIN: u8 = 26;
    pub const HAS_BATTERY_SENSE: bool = true;
    pub const BATTERY_ADC_PIN: u8 = 35;
    pub const BATTERY_DIVIDER: u32 = 2;
    pub const BOARD_NAME: &str = "ttgo_lora32";
}

#[cfg(not(any(feature = "board-devkit", feature = "board-lora32")))]
mod hw {
    pub const HAS_BATTERY_SENSE: bool = false;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// ADC full-scale input voltage at 11 dB attenuation.
pub const ADC_REFERENCE_MV: u32 = 3_300;
