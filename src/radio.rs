/// Blocking SX1276/77/78 (RFM95 family) LoRa driver, transmit only.
///
/// Register-level driver over `embedded-hal` 1.0 `SpiDevice`, so the same
/// code runs on the ESP32 (esp-hal SPI wrapped in `ExclusiveDevice`) and
/// against a register-file fake in tests. Completion is detected by polling
/// `IRQ_FLAGS` for TxDone rather than waiting on DIO0, which keeps the
/// driver usable from the synchronous polling loop.
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use crate::config::{Bandwidth, CodingRate, RadioConfig};
use crate::hal::RadioLink;
use crate::packet::PACKET_LEN;

#[allow(dead_code)]
mod regs {
    pub const FIFO: u8 = 0x00;
    pub const OP_MODE: u8 = 0x01;
    pub const FR_MSB: u8 = 0x06;
    pub const FR_MID: u8 = 0x07;
    pub const FR_LSB: u8 = 0x08;
    pub const PA_CONFIG: u8 = 0x09;
    pub const LNA: u8 = 0x0C;
    pub const FIFO_ADDR_PTR: u8 = 0x0D;
    pub const FIFO_TX_BASE_ADDR: u8 = 0x0E;
    pub const FIFO_RX_BASE_ADDR: u8 = 0x0F;
    pub const IRQ_FLAGS: u8 = 0x12;
    pub const MODEM_CONFIG1: u8 = 0x1D;
    pub const MODEM_CONFIG2: u8 = 0x1E;
    pub const PREAMBLE_MSB: u8 = 0x20;
    pub const PREAMBLE_LSB: u8 = 0x21;
    pub const PAYLOAD_LENGTH: u8 = 0x22;
    pub const MODEM_CONFIG3: u8 = 0x26;
    pub const SYNC_WORD: u8 = 0x39;
    pub const DIO_MAPPING1: u8 = 0x40;
    pub const VERSION: u8 = 0x42;
    pub const PA_DAC: u8 = 0x4D;
}

const IRQ_TX_DONE: u8 = 0x08;

const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_LONG_RANGE: u8 = 0x80;

const PA_BOOST: u8 = 0x80;

/// VERSION register value of the SX1276/77/78
const CHIP_VERSION: u8 = 0x12;

const FXOSC: u64 = 32_000_000;

/// Upper bound on one frame's airtime plus margin. A 12-byte payload at
/// SF12/125 kHz is roughly 1 s on air.
pub const TX_TIMEOUT_MS: u32 = 2_000;

const TX_POLL_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SPI transaction failed
    Spi,
    /// VERSION register returned an unexpected value (check wiring)
    InvalidVersion(u8),
    /// TxDone not raised within [`TX_TIMEOUT_MS`]
    TxTimeout,
    /// `transmit` before a successful `initialize`
    NotInitialized,
}

/// Register value of `FRF` for a carrier frequency.
pub const fn frf_for(frequency_hz: u32) -> u32 {
    (((frequency_hz as u64) << 19) / FXOSC) as u32
}

const fn bandwidth_bits(bw: Bandwidth) -> u8 {
    match bw {
        Bandwidth::Khz62_5 => 6,
        Bandwidth::Khz125 => 7,
        Bandwidth::Khz250 => 8,
        Bandwidth::Khz500 => 9,
    }
}

const fn coding_rate_bits(cr: CodingRate) -> u8 {
    match cr {
        CodingRate::Cr4_5 => 1,
        CodingRate::Cr4_6 => 2,
        CodingRate::Cr4_7 => 3,
        CodingRate::Cr4_8 => 4,
    }
}

/// `(PA_CONFIG, PA_DAC)` for an output power on the PA_BOOST pin.
const fn pa_settings(tx_power_dbm: i8) -> (u8, u8) {
    if tx_power_dbm >= 20 {
        (PA_BOOST | 0x0F, 0x87)
    } else if tx_power_dbm >= 2 {
        let p = if tx_power_dbm > 17 { 17 } else { tx_power_dbm };
        (PA_BOOST | ((p - 2) as u8 & 0x0F), 0x84)
    } else {
        (PA_BOOST, 0x84)
    }
}

pub struct Sx127x<SPI, RST, D> {
    spi: SPI,
    reset: RST,
    delay: D,
    config: RadioConfig,
    initialized: bool,
}

impl<SPI, RST, D> Sx127x<SPI, RST, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    D: DelayNs,
{
    /// Wrap the bus. Nothing is sent until [`RadioLink::initialize`].
    pub fn new(spi: SPI, reset: RST, delay: D, config: RadioConfig) -> Self {
        Self {
            spi,
            reset,
            delay,
            config,
            initialized: false,
        }
    }

    /// Hardware reset, chip check, LoRa mode, modem configuration, standby.
    pub fn init(&mut self) -> Result<(), RadioError> {
        self.initialized = false;

        let _ = self.reset.set_low();
        self.delay.delay_ms(10);
        let _ = self.reset.set_high();
        self.delay.delay_ms(10);

        let version = self.read_reg(regs::VERSION)?;
        if version != CHIP_VERSION {
            return Err(RadioError::InvalidVersion(version));
        }

        // LoRa mode can only be selected from sleep
        self.write_reg(regs::OP_MODE, MODE_SLEEP)?;
        self.write_reg(regs::OP_MODE, MODE_SLEEP | MODE_LONG_RANGE)?;
        self.delay.delay_ms(10);

        self.write_reg(regs::FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_reg(regs::FIFO_RX_BASE_ADDR, 0x00)?;
        self.write_reg(regs::LNA, 0x23)?;

        self.apply_config()?;

        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_STDBY)?;
        self.initialized = true;
        Ok(())
    }

    /// Load `frame` into the FIFO, start TX and poll for TxDone.
    pub fn send(&mut self, frame: &[u8; PACKET_LEN]) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }

        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_STDBY)?;
        self.write_reg(regs::FIFO_ADDR_PTR, 0x00)?;
        self.write_fifo(frame)?;
        self.write_reg(regs::PAYLOAD_LENGTH, PACKET_LEN as u8)?;

        // DIO0 -> TxDone
        self.write_reg(regs::DIO_MAPPING1, 0x40)?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF)?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_TX)?;

        let mut waited_ms = 0;
        loop {
            let irq = self.read_reg(regs::IRQ_FLAGS)?;
            if irq & IRQ_TX_DONE != 0 {
                self.write_reg(regs::IRQ_FLAGS, IRQ_TX_DONE)?;
                return Ok(());
            }
            if waited_ms >= TX_TIMEOUT_MS {
                // Leave TX mode before the next attempt
                self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_STDBY)?;
                return Err(RadioError::TxTimeout);
            }
            self.delay.delay_ms(TX_POLL_MS);
            waited_ms += TX_POLL_MS;
        }
    }

    fn apply_config(&mut self) -> Result<(), RadioError> {
        let c = self.config;

        let frf = frf_for(c.frequency_hz);
        self.write_reg(regs::FR_MSB, (frf >> 16) as u8)?;
        self.write_reg(regs::FR_MID, (frf >> 8) as u8)?;
        self.write_reg(regs::FR_LSB, frf as u8)?;

        // Explicit header
        let bw = bandwidth_bits(c.bandwidth);
        let cr = coding_rate_bits(c.coding_rate);
        self.write_reg(regs::MODEM_CONFIG1, (bw << 4) | (cr << 1))?;

        // Payload CRC on
        let sf = c.spreading_factor.clamp(6, 12);
        self.write_reg(regs::MODEM_CONFIG2, (sf << 4) | 0x04)?;

        // AGC auto, low data rate optimisation for SF11/12
        let ldro = if sf >= 11 { 0x08 } else { 0x00 };
        self.write_reg(regs::MODEM_CONFIG3, ldro | 0x04)?;

        self.write_reg(regs::PREAMBLE_MSB, 0x00)?;
        self.write_reg(regs::PREAMBLE_LSB, 0x08)?;

        let (pa_config, pa_dac) = pa_settings(c.tx_power_dbm);
        self.write_reg(regs::PA_CONFIG, pa_config)?;
        self.write_reg(regs::PA_DAC, pa_dac)?;

        self.write_reg(regs::SYNC_WORD, c.sync_word)?;
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|_| RadioError::Spi)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        let mut buf = [reg & 0x7F, 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| RadioError::Spi)?;
        Ok(buf[1])
    }

    fn write_fifo(&mut self, data: &[u8; PACKET_LEN]) -> Result<(), RadioError> {
        let mut buf = [0u8; PACKET_LEN + 1];
        buf[0] = regs::FIFO | 0x80;
        buf[1..].copy_from_slice(data);
        self.spi.write(&buf).map_err(|_| RadioError::Spi)
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }
}

impl<SPI, RST, D> RadioLink for Sx127x<SPI, RST, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    D: DelayNs,
{
    fn initialize(&mut self) -> bool {
        match self.init() {
            Ok(()) => {
                log::info!(
                    "LoRa radio up: {} Hz, SF{}, {} Hz BW, {} dBm",
                    self.config.frequency_hz,
                    self.config.spreading_factor,
                    self.config.bandwidth.hz(),
                    self.config.tx_power_dbm
                );
                true
            }
            Err(e) => {
                log::error!("LoRa init failed: {:?}", e);
                false
            }
        }
    }

    fn is_ready(&mut self) -> bool {
        self.initialized
    }

    fn transmit(&mut self, frame: &[u8; PACKET_LEN]) -> bool {
        match self.send(frame) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("LoRa transmit failed: {:?}", e);
                false
            }
        }
    }
}
