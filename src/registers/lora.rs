//! LoRa modem registers
//!
//! This module contains the LoRa view of the banked register window including:
//! - FIFO pointers and received payload length
//! - IRQ flags
//! - Modem configuration (bandwidth, coding rate, spreading factor, header mode)
//! - Preamble, payload length and symbol timeout
//! - Packet SNR and RSSI
//! - Sync word and frequency hopping
//!
//! These registers are only valid while RegOpMode.LongRangeMode is set.

use core::convert::Infallible;

use bitflags::bitflags;
use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

use super::byte_register;

byte_register!(
    /// FIFO SPI pointer register (address: 0x0D)
    ///
    /// Address in the FIFO data buffer of the next SPI read or write.
    /// Incremented automatically on each FIFO access.
    FifoAddrPtr,
    0x0Du8
);

byte_register!(
    /// FIFO TX base address register (address: 0x0E)
    ///
    /// Start of the transmitted payload in the 256-byte FIFO. Default: 0x80
    FifoTxBaseAddr,
    0x0Eu8
);

byte_register!(
    /// FIFO RX base address register (address: 0x0F)
    ///
    /// Where the demodulator writes received payloads. Default: 0x00
    FifoRxBaseAddr,
    0x0Fu8
);

byte_register!(
    /// Start address of the last received packet (address: 0x10)
    FifoRxCurrentAddr,
    0x10u8
);

bitflags! {
    /// LoRa interrupt sources
    ///
    /// A flag is cleared by writing a 1 to its bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqFlags: u8 {
        /// No packet received within the symbol timeout (RxSingle)
        const RX_TIMEOUT = 1 << 7;
        /// Packet reception complete
        const RX_DONE = 1 << 6;
        /// Payload CRC error
        const PAYLOAD_CRC_ERROR = 1 << 5;
        /// Valid header received
        const VALID_HEADER = 1 << 4;
        /// Payload transmission complete
        const TX_DONE = 1 << 3;
        /// CAD complete
        const CAD_DONE = 1 << 2;
        /// FHSS change channel
        const FHSS_CHANGE_CHANNEL = 1 << 1;
        /// Valid LoRa signal detected during CAD
        const CAD_DETECTED = 1;
    }
}

/// IRQ flags register (address: 0x12)
///
/// Writing a set bit clears the corresponding interrupt.
#[register(0x12u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct RegIrqFlags {
    /// Pending interrupts
    pub flags: IrqFlags,
}

impl RegIrqFlags {
    /// Value that clears every pending interrupt when written
    pub fn clear_all() -> Self {
        Self {
            flags: IrqFlags::all(),
        }
    }
}

byte_register!(
    /// Number of payload bytes of the last packet received (address: 0x13)
    RxNbBytes,
    0x13u8
);

/// SNR of the last packet received (address: 0x19)
///
/// SNR[dB] = value / 4, two's complement.
#[register(0x19u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister)]
pub struct PktSnrValue {
    /// SNR in quarter dB
    pub quarter_db: i8,
}

byte_register!(
    /// RSSI of the last packet received (address: 0x1A)
    ///
    /// RSSI[dBm] = -157 + value (HF port) or -164 + value (LF port)
    PktRssiValue,
    0x1Au8
);

/// Signal bandwidth (RegModemConfig1 bits 7:4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    /// 7.8 kHz
    Khz7_8 = 0,
    /// 10.4 kHz
    Khz10_4 = 1,
    /// 15.6 kHz
    Khz15_6 = 2,
    /// 20.8 kHz
    Khz20_8 = 3,
    /// 31.25 kHz
    Khz31_25 = 4,
    /// 41.7 kHz
    Khz41_7 = 5,
    /// 62.5 kHz
    Khz62_5 = 6,
    /// 125 kHz
    #[default]
    Khz125 = 7,
    /// 250 kHz
    Khz250 = 8,
    /// 500 kHz
    Khz500 = 9,
}

impl Bandwidth {
    /// All bandwidth steps in ascending order
    pub const ALL: [Bandwidth; 10] = [
        Self::Khz7_8,
        Self::Khz10_4,
        Self::Khz15_6,
        Self::Khz20_8,
        Self::Khz31_25,
        Self::Khz41_7,
        Self::Khz62_5,
        Self::Khz125,
        Self::Khz250,
        Self::Khz500,
    ];

    /// Nominal bandwidth in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Khz7_8 => 7_800,
            Self::Khz10_4 => 10_400,
            Self::Khz15_6 => 15_600,
            Self::Khz20_8 => 20_800,
            Self::Khz31_25 => 31_250,
            Self::Khz41_7 => 41_700,
            Self::Khz62_5 => 62_500,
            Self::Khz125 => 125_000,
            Self::Khz250 => 250_000,
            Self::Khz500 => 500_000,
        }
    }

    fn from_bits(bits: u8) -> Self {
        Self::ALL
            .get(bits as usize)
            .copied()
            .unwrap_or(Self::Khz500)
    }
}

/// Error coding rate (RegModemConfig1 bits 3:1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodingRate {
    /// 4/5
    #[default]
    Cr4_5 = 1,
    /// 4/6
    Cr4_6 = 2,
    /// 4/7
    Cr4_7 = 3,
    /// 4/8
    Cr4_8 = 4,
}

impl CodingRate {
    /// Denominator of the coding rate (5..=8)
    pub fn denominator(self) -> u8 {
        self as u8 + 4
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            2 => Self::Cr4_6,
            3 => Self::Cr4_7,
            4 => Self::Cr4_8,
            _ => Self::Cr4_5,
        }
    }
}

/// Modem configuration register 1 (address: 0x1D)
#[register(0x1Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct ModemConfig1 {
    /// Signal bandwidth
    pub bandwidth: Bandwidth,
    /// Error coding rate
    pub coding_rate: CodingRate,
    /// true = implicit header, false = explicit header
    pub implicit_header: bool,
}

/// Modem configuration register 2 (address: 0x1E)
///
/// # Important Notes
/// - SF6 is only usable in implicit header mode
/// - The two MSBs of the RX symbol timeout live here, the LSBs in [`SymbTimeoutLsb`]
#[register(0x1Eu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct ModemConfig2 {
    /// Spreading factor (6..=12)
    pub spreading_factor: u8,
    /// Continuous TX mode
    pub tx_continuous: bool,
    /// Enable CRC generation and check on the payload
    pub rx_payload_crc_on: bool,
    /// RX symbol timeout bits 9:8
    pub symb_timeout_msb: u8,
}

impl Default for ModemConfig2 {
    fn default() -> Self {
        Self {
            spreading_factor: 7,
            tx_continuous: false,
            rx_payload_crc_on: false,
            symb_timeout_msb: 0,
        }
    }
}

byte_register!(
    /// RX symbol timeout LSB (address: 0x1F)
    ///
    /// Timeout of RxSingle in symbols: bits 9:8 in [`ModemConfig2`], bits 7:0 here.
    SymbTimeoutLsb,
    0x1Fu8
);

/// Preamble length register (address: 0x20-0x21)
///
/// Preamble length in symbols, not counting the fixed 4.25 symbols the modem adds.
#[register(0x20u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PreambleLength {
    /// Preamble length in symbols
    pub symbols: u16,
}

impl Default for PreambleLength {
    fn default() -> Self {
        Self { symbols: 8 }
    }
}

byte_register!(
    /// Payload length register (address: 0x22)
    ///
    /// Required in implicit header mode; written before every transmission.
    PayloadLength,
    0x22u8
);

byte_register!(
    /// Frequency hopping period in symbols (address: 0x24). 0 = hopping disabled
    HopPeriod,
    0x24u8
);

/// Modem configuration register 3 (address: 0x26)
#[register(0x26u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct ModemConfig3 {
    /// Mandated when the symbol length exceeds 16 ms
    pub low_data_rate_optimize: bool,
    /// LNA gain set by the internal AGC loop instead of [`Lna`](super::Lna)
    pub agc_auto_on: bool,
}

byte_register!(
    /// LoRa detection optimize register (address: 0x31)
    ///
    /// 0xC5 for SF6, 0xC3 for SF7-12
    DetectionOptimize,
    0x31u8
);

byte_register!(
    /// LoRa detection threshold register (address: 0x37)
    ///
    /// 0x0C for SF6, 0x0A for SF7-12
    DetectionThreshold,
    0x37u8
);

byte_register!(
    /// LoRa sync word register (address: 0x39)
    ///
    /// 0x34 is reserved for LoRaWAN networks. Default: 0x12
    SyncWord,
    0x39u8
);

/// Sync word for private networks
pub const SYNC_WORD_PRIVATE: u8 = 0x12;

/// Sync word for LoRaWAN public networks
pub const SYNC_WORD_LORAWAN: u8 = 0x34;

/// DIO0 mapping: RxDone
pub const DIO0_RX_DONE: u8 = 0b00;
/// DIO0 mapping: TxDone
pub const DIO0_TX_DONE: u8 = 0b01;
/// DIO0 mapping: CadDone
pub const DIO0_CAD_DONE: u8 = 0b10;
/// DIO1 mapping: RxTimeout
pub const DIO1_RX_TIMEOUT: u8 = 0b00;
/// DIO1 mapping: CadDetected
pub const DIO1_CAD_DETECTED: u8 = 0b10;

impl FromByteArray for RegIrqFlags {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: IrqFlags::from_bits_retain(bytes[0]),
        })
    }
}

impl ToByteArray for RegIrqFlags {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.flags.bits()])
    }
}

impl FromByteArray for PktSnrValue {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            quarter_db: bytes[0] as i8,
        })
    }
}

impl FromByteArray for ModemConfig1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            bandwidth: Bandwidth::from_bits(bytes[0] >> 4),
            coding_rate: CodingRate::from_bits((bytes[0] >> 1) & 0x07),
            implicit_header: bytes[0] & 0x01 != 0,
        })
    }
}

impl ToByteArray for ModemConfig1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.bandwidth as u8) << 4
            | (self.coding_rate as u8) << 1
            | self.implicit_header as u8])
    }
}

impl FromByteArray for ModemConfig2 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            spreading_factor: bytes[0] >> 4,
            tx_continuous: bytes[0] & 0x08 != 0,
            rx_payload_crc_on: bytes[0] & 0x04 != 0,
            symb_timeout_msb: bytes[0] & 0x03,
        })
    }
}

impl ToByteArray for ModemConfig2 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.spreading_factor & 0x0F) << 4
            | (self.tx_continuous as u8) << 3
            | (self.rx_payload_crc_on as u8) << 2
            | (self.symb_timeout_msb & 0x03)])
    }
}

impl FromByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            symbols: u16::from_be_bytes(bytes),
        })
    }
}

impl ToByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.symbols.to_be_bytes())
    }
}

impl FromByteArray for ModemConfig3 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            low_data_rate_optimize: bytes[0] & 0x08 != 0,
            agc_auto_on: bytes[0] & 0x04 != 0,
        })
    }
}

impl ToByteArray for ModemConfig3 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.low_data_rate_optimize as u8) << 3 | (self.agc_auto_on as u8) << 2])
    }
}
