//! FSK/OOK modem registers
//!
//! This module contains the FSK/OOK view of the banked register window including:
//! - Bit rate and frequency deviation
//! - Receiver configuration, bandwidth and RSSI
//! - Preamble detection and RX timeouts
//! - Sync word recognition
//! - Packet engine configuration
//! - IRQ flags
//!
//! These registers are only valid while RegOpMode.LongRangeMode is cleared.

use core::convert::Infallible;

use bitflags::bitflags;
use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

use super::byte_register;

/// Bit rate register (address: 0x02-0x03)
///
/// # Bit Rate Calculation
/// BitRate = FXOSC / value (fractional part in RegBitRateFrac ignored)
#[register(0x02u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct BitRate {
    /// FXOSC divider
    pub divider: u16,
}

impl Default for BitRate {
    fn default() -> Self {
        // 4.8 kbps
        Self { divider: 0x1A0B }
    }
}

/// Frequency deviation register (address: 0x04-0x05)
///
/// Fdev = Fstep * value, 14 bits
#[register(0x04u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct Fdev {
    /// Deviation in synthesizer steps
    pub steps: u16,
}

impl Default for Fdev {
    fn default() -> Self {
        // 5 kHz
        Self { steps: 0x0052 }
    }
}

bitflags! {
    /// Receiver configuration flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RxConfigFlags: u8 {
        /// Restart the receiver on collision
        const RESTART_RX_ON_COLLISION = 1 << 7;
        /// Restart the receiver without PLL relock
        const RESTART_RX_WITHOUT_PLL_LOCK = 1 << 6;
        /// Restart the receiver with PLL relock
        const RESTART_RX_WITH_PLL_LOCK = 1 << 5;
        /// AFC performed at each receiver start
        const AFC_AUTO_ON = 1 << 4;
        /// LNA gain controlled by the AGC
        const AGC_AUTO_ON = 1 << 3;
        /// Receiver triggered on RSSI interrupt
        const TRIGGER_RSSI = 0b001;
        /// Receiver triggered on preamble detection
        const TRIGGER_PREAMBLE_DETECT = 0b110;
    }
}

/// Receiver configuration register (address: 0x0D)
#[register(0x0Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct RxConfig {
    /// Receiver configuration
    pub flags: RxConfigFlags,
}

byte_register!(
    /// RSSI smoothing configuration (address: 0x0E)
    ///
    /// Bits 2:0 select 2^(1+value) samples for the RSSI average.
    RssiConfig,
    0x0Eu8
);

byte_register!(
    /// RSSI trigger level for the Rssi interrupt (address: 0x10)
    ///
    /// Threshold[dBm] = -value / 2
    RssiThresh,
    0x10u8
);

byte_register!(
    /// Current RSSI in -0.5 dBm steps (address: 0x11)
    RssiValue,
    0x11u8
);

/// Channel filter bandwidth register (address: 0x12)
///
/// # Bandwidth Calculation
/// RxBw = FXOSC / (mantissa * 2^(exponent + 2))
/// where mantissa is 16, 20 or 24
#[register(0x12u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct RxBw {
    /// Mantissa code: 0b00 = 16, 0b01 = 20, 0b10 = 24
    pub mantissa: u8,
    /// Exponent (3 bits)
    pub exponent: u8,
}

impl Default for RxBw {
    fn default() -> Self {
        // 10.4 kHz
        Self {
            mantissa: 0b10,
            exponent: 5,
        }
    }
}

/// AFC channel filter bandwidth register (address: 0x13)
///
/// Same layout as [`RxBw`].
#[register(0x13u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct AfcBw {
    /// Mantissa code
    pub mantissa: u8,
    /// Exponent
    pub exponent: u8,
}

impl From<RxBw> for AfcBw {
    fn from(bw: RxBw) -> Self {
        Self {
            mantissa: bw.mantissa,
            exponent: bw.exponent,
        }
    }
}

byte_register!(
    /// Preamble detector configuration (address: 0x1F)
    ///
    /// - bit 7: detector on
    /// - bits 6:5: detector size in bytes minus one
    /// - bits 4:0: tolerated chip errors
    PreambleDetect,
    0x1Fu8
);

byte_register!(
    /// Timeout from RX start to Rssi interrupt (address: 0x20). 0 = off
    RxTimeout1,
    0x20u8
);

byte_register!(
    /// Timeout from Rssi interrupt to PreambleDetect interrupt (address: 0x21). 0 = off
    RxTimeout2,
    0x21u8
);

byte_register!(
    /// Timeout from PreambleDetect interrupt to SyncAddress interrupt (address: 0x22). 0 = off
    RxTimeout3,
    0x22u8
);

/// Preamble length register (address: 0x25-0x26)
#[register(0x25u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PreambleLength {
    /// Preamble length in bytes
    pub bytes: u16,
}

impl Default for PreambleLength {
    fn default() -> Self {
        Self { bytes: 3 }
    }
}

/// Sync word recognition register (address: 0x27)
#[register(0x27u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct SyncConfig {
    /// Restart the receiver automatically after PayloadReady or CrcOk (2 bits)
    pub auto_restart_rx_mode: u8,
    /// true = 0x55 preamble, false = 0xAA preamble
    pub preamble_polarity_55: bool,
    /// Enable sync word generation and detection
    pub sync_on: bool,
    /// Sync word size in bytes minus one (3 bits)
    pub sync_size: u8,
}

impl SyncConfig {
    /// Mask of the sync-on bit and size field
    pub const SYNC_MASK: u8 = 0x17;
    /// Mask of the preamble polarity bit
    pub const POLARITY_MASK: u8 = 0x20;
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_restart_rx_mode: 0b10,
            preamble_polarity_55: false,
            sync_on: true,
            sync_size: 3,
        }
    }
}

/// Sync word bytes (address: 0x28-0x2F)
///
/// Only the first `SyncConfig.sync_size + 1` bytes are used.
#[register(0x28u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct SyncValue {
    /// Sync word, first transmitted byte first
    pub value: [u8; 8],
}

/// Packet configuration register 1 (address: 0x30)
#[register(0x30u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PacketConfig1 {
    /// true = variable length, false = fixed length
    pub variable_length: bool,
    /// DC-free encoding
    pub dc_free: Encoding,
    /// CRC calculation and check
    pub crc_on: bool,
    /// Clear the FIFO and restart RX when the CRC fails
    pub crc_auto_clear_off: bool,
    /// Address filtering (2 bits): 0 = off, 1 = node, 2 = node or broadcast
    pub address_filtering: u8,
    /// true = IBM CRC with alternate whitening, false = CCITT CRC
    pub crc_whitening_ibm: bool,
}

impl PacketConfig1 {
    /// Mask of the CRC-on bit
    pub const CRC_MASK: u8 = 0x10;
    /// Mask of the DC-free encoding field
    pub const DC_FREE_MASK: u8 = 0x60;
    /// Mask of the packet format bit
    pub const FORMAT_MASK: u8 = 0x80;
    /// Mask of the address filtering field
    pub const ADDRESS_FILTERING_MASK: u8 = 0x06;
}

impl Default for PacketConfig1 {
    fn default() -> Self {
        Self {
            variable_length: true,
            dc_free: Encoding::Nrz,
            crc_on: true,
            crc_auto_clear_off: false,
            address_filtering: 0,
            crc_whitening_ibm: false,
        }
    }
}

/// DC-free encoding (RegPacketConfig1 bits 6:5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Encoding {
    /// No encoding
    #[default]
    Nrz = 0b00,
    /// Manchester
    Manchester = 0b01,
    /// Whitening
    Whitening = 0b10,
}

byte_register!(
    /// Packet configuration register 2 (address: 0x31)
    ///
    /// - bit 6: packet mode (1) or continuous mode (0)
    /// - bit 5: io-home
    /// - bits 2:0: payload length MSBs
    PacketConfig2,
    0x31u8
);

byte_register!(
    /// Payload length register (address: 0x32)
    ///
    /// Fixed length mode: payload length. Variable length mode: maximum accepted length.
    PayloadLength,
    0x32u8
);

byte_register!(
    /// Node address used in address filtering (address: 0x33)
    NodeAddress,
    0x33u8
);

byte_register!(
    /// Broadcast address used in address filtering (address: 0x34)
    BroadcastAddress,
    0x34u8
);

byte_register!(
    /// FIFO threshold register (address: 0x35)
    ///
    /// - bit 7: TX start condition, 1 = FIFO not empty
    /// - bits 5:0: FifoLevel threshold
    FifoThresh,
    0x35u8
);

bitflags! {
    /// FSK/OOK mode interrupt sources
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqFlags1: u8 {
        /// Requested operating mode ready
        const MODE_READY = 1 << 7;
        /// RX mode ready
        const RX_READY = 1 << 6;
        /// TX mode ready
        const TX_READY = 1 << 5;
        /// PLL locked
        const PLL_LOCK = 1 << 4;
        /// RSSI above threshold
        const RSSI = 1 << 3;
        /// One of the RX timeouts elapsed
        const TIMEOUT = 1 << 2;
        /// Preamble detected
        const PREAMBLE_DETECT = 1 << 1;
        /// Sync word and address (if enabled) matched
        const SYNC_ADDRESS_MATCH = 1;
    }
}

bitflags! {
    /// FSK/OOK FIFO and packet interrupt sources
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqFlags2: u8 {
        /// FIFO full
        const FIFO_FULL = 1 << 7;
        /// FIFO empty
        const FIFO_EMPTY = 1 << 6;
        /// FIFO level above threshold
        const FIFO_LEVEL = 1 << 5;
        /// FIFO overrun, cleared by writing 1
        const FIFO_OVERRUN = 1 << 4;
        /// Packet sent
        const PACKET_SENT = 1 << 3;
        /// Payload ready in the FIFO
        const PAYLOAD_READY = 1 << 2;
        /// Payload CRC valid
        const CRC_OK = 1 << 1;
        /// Battery below threshold
        const LOW_BAT = 1;
    }
}

/// IRQ flags registers (address: 0x3E-0x3F)
///
/// Rssi, PreambleDetect, SyncAddressMatch and FifoOverrun are cleared by writing 1.
#[register(0x3Eu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct RegIrqFlags {
    /// Mode interrupts
    pub flags1: IrqFlags1,
    /// FIFO and packet interrupts
    pub flags2: IrqFlags2,
}

impl RegIrqFlags {
    /// Value that clears every clearable interrupt when written
    pub fn clear_all() -> Self {
        Self {
            flags1: IrqFlags1::all(),
            flags2: IrqFlags2::all(),
        }
    }
}

/// DIO0 mapping in packet mode: PayloadReady (RX) / PacketSent (TX)
pub const DIO0_PACKET: u8 = 0b00;

impl FromByteArray for BitRate {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            divider: u16::from_be_bytes(bytes),
        })
    }
}

impl ToByteArray for BitRate {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.divider.to_be_bytes())
    }
}

impl FromByteArray for Fdev {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            steps: u16::from_be_bytes(bytes) & 0x3FFF,
        })
    }
}

impl ToByteArray for Fdev {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok((self.steps & 0x3FFF).to_be_bytes())
    }
}

impl FromByteArray for RxConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: RxConfigFlags::from_bits_retain(bytes[0]),
        })
    }
}

impl ToByteArray for RxConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.flags.bits()])
    }
}

impl FromByteArray for RxBw {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            mantissa: (bytes[0] >> 3) & 0x03,
            exponent: bytes[0] & 0x07,
        })
    }
}

impl ToByteArray for RxBw {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.mantissa & 0x03) << 3 | (self.exponent & 0x07)])
    }
}

impl FromByteArray for AfcBw {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            mantissa: (bytes[0] >> 3) & 0x03,
            exponent: bytes[0] & 0x07,
        })
    }
}

impl ToByteArray for AfcBw {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.mantissa & 0x03) << 3 | (self.exponent & 0x07)])
    }
}

impl FromByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            bytes: u16::from_be_bytes(bytes),
        })
    }
}

impl ToByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.bytes.to_be_bytes())
    }
}

impl FromByteArray for SyncConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            auto_restart_rx_mode: (bytes[0] >> 6) & 0x03,
            preamble_polarity_55: bytes[0] & 0x20 != 0,
            sync_on: bytes[0] & 0x10 != 0,
            sync_size: bytes[0] & 0x07,
        })
    }
}

impl ToByteArray for SyncConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.auto_restart_rx_mode & 0x03) << 6
            | (self.preamble_polarity_55 as u8) << 5
            | (self.sync_on as u8) << 4
            | (self.sync_size & 0x07)])
    }
}

impl FromByteArray for SyncValue {
    type Error = Infallible;
    type Array = [u8; 8];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { value: bytes })
    }
}

impl ToByteArray for SyncValue {
    type Error = Infallible;
    type Array = [u8; 8];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.value)
    }
}

impl FromByteArray for PacketConfig1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            variable_length: bytes[0] & 0x80 != 0,
            dc_free: match (bytes[0] >> 5) & 0x03 {
                0b01 => Encoding::Manchester,
                0b10 => Encoding::Whitening,
                _ => Encoding::Nrz,
            },
            crc_on: bytes[0] & 0x10 != 0,
            crc_auto_clear_off: bytes[0] & 0x08 != 0,
            address_filtering: (bytes[0] >> 1) & 0x03,
            crc_whitening_ibm: bytes[0] & 0x01 != 0,
        })
    }
}

impl ToByteArray for PacketConfig1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.variable_length as u8) << 7
            | (self.dc_free as u8) << 5
            | (self.crc_on as u8) << 4
            | (self.crc_auto_clear_off as u8) << 3
            | (self.address_filtering & 0x03) << 1
            | self.crc_whitening_ibm as u8])
    }
}

impl FromByteArray for RegIrqFlags {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags1: IrqFlags1::from_bits_retain(bytes[0]),
            flags2: IrqFlags2::from_bits_retain(bytes[1]),
        })
    }
}

impl ToByteArray for RegIrqFlags {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.flags1.bits(), self.flags2.bits()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_config_1_default_matches_packet_engine_setup() {
        assert_eq!(PacketConfig1::default().to_bytes().unwrap(), [0x90]);
    }

    #[test]
    fn sync_config_layout() {
        let reg = SyncConfig {
            auto_restart_rx_mode: 0,
            preamble_polarity_55: true,
            sync_on: true,
            sync_size: 1,
        };
        assert_eq!(reg.to_bytes().unwrap(), [0x31]);
        assert_eq!(SyncConfig::from_bytes([0x31]).unwrap(), reg);
    }

    #[test]
    fn rx_bw_layout() {
        // 125 kHz: mantissa 16, exponent 2
        let reg = RxBw {
            mantissa: 0b00,
            exponent: 2,
        };
        assert_eq!(reg.to_bytes().unwrap(), [0x02]);
        assert_eq!(AfcBw::from(reg).to_bytes().unwrap(), [0x02]);
    }

    #[test]
    fn fdev_is_14_bits() {
        assert_eq!(Fdev { steps: 0xFFFF }.to_bytes().unwrap(), [0x3F, 0xFF]);
    }
}
