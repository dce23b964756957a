//! Registers shared by the LoRa and FSK/OOK modems
//!
//! This module contains registers that keep their meaning regardless of the active modem:
//! - Operating mode and modem selection
//! - RF carrier frequency
//! - Power amplifier and over-current protection
//! - LNA gain
//! - DIO mapping
//! - Silicon version

use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

use super::byte_register;

/// Crystal oscillator frequency in Hz
pub const FXOSC: u32 = 32_000_000;

/// Frequency synthesizer step exponent: Fstep = FXOSC / 2^19
pub const FSTEP_EXPONENT: u32 = 19;

/// Transceiver modes (RegOpMode bits 2:0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Lowest power, FIFO not accessible. Only mode in which the modem can be switched.
    #[default]
    Sleep = 0,
    /// Crystal oscillator running
    Standby = 1,
    /// Frequency synthesis for TX
    FsTx = 2,
    /// Transmit
    Tx = 3,
    /// Frequency synthesis for RX
    FsRx = 4,
    /// Continuous receive
    RxContinuous = 5,
    /// Single packet receive, returns to standby on RxDone or RxTimeout (LoRa only)
    RxSingle = 6,
    /// Channel activity detection (LoRa only)
    Cad = 7,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::Sleep,
            1 => Self::Standby,
            2 => Self::FsTx,
            3 => Self::Tx,
            4 => Self::FsRx,
            5 => Self::RxContinuous,
            6 => Self::RxSingle,
            _ => Self::Cad,
        }
    }
}

/// FSK/OOK modulation scheme (RegOpMode bits 6:5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModulationType {
    /// Frequency shift keying
    #[default]
    Fsk = 0b00,
    /// On-off keying
    Ook = 0b01,
}

/// Operating mode register (address: 0x01)
///
/// Selects the modem (LoRa or FSK/OOK) and the transceiver mode.
///
/// # Important Notes
/// - LongRangeMode can only be changed while in Sleep mode
/// - Changing the modem resets the banked registers 0x0D-0x3F to the modem's defaults
/// - ModulationType is ignored while LongRangeMode is set
#[register(0x01u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct OpMode {
    /// true = LoRa modem, false = FSK/OOK modem
    pub long_range_mode: bool,
    /// FSK/OOK modulation (FSK/OOK modem only)
    pub modulation: ModulationType,
    /// Access the low frequency (LF) test registers
    pub low_frequency_mode_on: bool,
    /// Transceiver mode
    pub mode: Mode,
}

impl OpMode {
    /// Mask of the mode field, for use with `set_register_bits`
    pub const MODE_MASK: u8 = 0x07;
    /// Mask of the LongRangeMode bit
    pub const LONG_RANGE_MASK: u8 = 0x80;
    /// Mask of the FSK/OOK modulation field
    pub const MODULATION_MASK: u8 = 0x60;
}

impl Default for OpMode {
    fn default() -> Self {
        Self {
            long_range_mode: false,
            modulation: ModulationType::Fsk,
            low_frequency_mode_on: true,
            mode: Mode::Standby,
        }
    }
}

/// RF carrier frequency register (address: 0x06-0x08)
///
/// 24-bit frequency synthesizer word: Frf = Fcarrier * 2^19 / FXOSC.
/// The resolution (Fstep) is 61.035 Hz.
///
/// # Important Notes
/// - The new frequency only takes effect once the LSB is written
/// - Should be written from Sleep or Standby
#[register(0x06u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct Frf {
    /// Frequency synthesizer word (24 bits)
    pub value: u32,
}

impl Frf {
    /// Computes the synthesizer word for a carrier frequency in MHz
    pub fn from_mhz(freq_mhz: f32) -> Self {
        let value = (freq_mhz as f64 * (1u32 << FSTEP_EXPONENT) as f64 * 1_000_000.0
            / FXOSC as f64) as u32;
        Self {
            value: value & 0x00FF_FFFF,
        }
    }

    /// Carrier frequency in MHz represented by this word
    pub fn to_mhz(self) -> f32 {
        (self.value as f64 * FXOSC as f64 / (1u32 << FSTEP_EXPONENT) as f64 / 1_000_000.0) as f32
    }
}

impl Default for Frf {
    fn default() -> Self {
        // 434 MHz
        Self { value: 0x6C_8000 }
    }
}

/// Power amplifier configuration register (address: 0x09)
///
/// # Output Power
/// - RFO pin: Pout = Pmax - (15 - output_power), Pmax = 10.8 + 0.6 * max_power dBm
/// - PA_BOOST pin: Pout = 2 + output_power dBm (17 + output_power with PaDac high power)
#[register(0x09u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PaConfig {
    /// true = PA_BOOST pin, false = RFO pin
    pub pa_boost: bool,
    /// Maximum power selection (3 bits)
    pub max_power: u8,
    /// Output power selection (4 bits)
    pub output_power: u8,
}

impl Default for PaConfig {
    fn default() -> Self {
        Self {
            pa_boost: false,
            max_power: 0x04,
            output_power: 0x0F,
        }
    }
}

byte_register!(
    /// PA ramp register (address: 0x0A)
    ///
    /// - bits 6:5: FSK Gaussian filter / OOK filter selection
    /// - bits 3:0: PA ramp time
    PaRamp,
    0x0Au8
);

impl PaRamp {
    /// Mask of the modulation shaping field
    pub const SHAPING_MASK: u8 = 0x60;
}

/// Over-current protection register (address: 0x0B)
///
/// # Current Limit Calculation
/// - trim <= 15: Imax = 45 + 5 * trim mA
/// - 15 < trim <= 27: Imax = -30 + 10 * trim mA
/// - trim > 27: Imax = 240 mA
#[register(0x0Bu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct Ocp {
    /// Enable over-current protection
    pub enabled: bool,
    /// Current limit trim (5 bits)
    pub trim: u8,
}

impl Default for Ocp {
    fn default() -> Self {
        // 100 mA
        Self {
            enabled: true,
            trim: 0x0B,
        }
    }
}

/// LNA register (address: 0x0C)
///
/// # Important Notes
/// - The gain field is only used while AGC is disabled
/// - Gain step 1 is the highest gain, 6 the lowest
#[register(0x0Cu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct Lna {
    /// LNA gain step (3 bits, 1 = max gain)
    pub gain: u8,
    /// Boost the LNA current in the high frequency band (150% LNA current)
    pub boost_hf: bool,
}

impl Default for Lna {
    fn default() -> Self {
        Self {
            gain: 1,
            boost_hf: false,
        }
    }
}

/// DIO mapping register 1 (address: 0x40)
///
/// Each DIO has a 2-bit mapping whose meaning depends on the modem and mode.
#[register(0x40u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct DioMapping1 {
    /// DIO0 mapping (bits 7:6)
    pub dio0: u8,
    /// DIO1 mapping (bits 5:4)
    pub dio1: u8,
    /// DIO2 mapping (bits 3:2)
    pub dio2: u8,
    /// DIO3 mapping (bits 1:0)
    pub dio3: u8,
}

byte_register!(
    /// Silicon version register (address: 0x42)
    ///
    /// Reads 0x12 on SX1276/77/78/79 and the RFM95/96/97/98 modules built on them.
    Version,
    0x42u8
);

/// High power PA_BOOST register (address: 0x4D)
///
/// Enables the +20 dBm option on PA_BOOST.
///
/// # Important Notes
/// - Duty cycle must stay below 1% with high power enabled
/// - Over-current protection must be raised accordingly
#[register(0x4Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ReadableRegister, WritableRegister)]
pub struct PaDac {
    /// true = +20 dBm on PA_BOOST, false = default
    pub high_power: bool,
}

impl FromByteArray for OpMode {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            long_range_mode: bytes[0] & 0x80 != 0,
            modulation: if bytes[0] & 0x60 == 0x20 {
                ModulationType::Ook
            } else {
                ModulationType::Fsk
            },
            low_frequency_mode_on: bytes[0] & 0x08 != 0,
            mode: Mode::from_bits(bytes[0]),
        })
    }
}

impl ToByteArray for OpMode {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        let mut byte = self.mode as u8;
        if self.long_range_mode {
            byte |= 0x80;
        } else {
            byte |= (self.modulation as u8) << 5;
        }
        if self.low_frequency_mode_on {
            byte |= 0x08;
        }
        Ok([byte])
    }
}

impl FromByteArray for Frf {
    type Error = Infallible;
    type Array = [u8; 3];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            value: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
        })
    }
}

impl ToByteArray for Frf {
    type Error = Infallible;
    type Array = [u8; 3];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        let [_, msb, mid, lsb] = self.value.to_be_bytes();
        Ok([msb, mid, lsb])
    }
}

impl FromByteArray for PaConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            pa_boost: bytes[0] & 0x80 != 0,
            max_power: (bytes[0] >> 4) & 0x07,
            output_power: bytes[0] & 0x0F,
        })
    }
}

impl ToByteArray for PaConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        let select = if self.pa_boost { 0x80 } else { 0x00 };
        Ok([select | (self.max_power & 0x07) << 4 | (self.output_power & 0x0F)])
    }
}

impl FromByteArray for Ocp {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            enabled: bytes[0] & 0x20 != 0,
            trim: bytes[0] & 0x1F,
        })
    }
}

impl ToByteArray for Ocp {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        let on = if self.enabled { 0x20 } else { 0x00 };
        Ok([on | (self.trim & 0x1F)])
    }
}

impl FromByteArray for Lna {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            gain: (bytes[0] >> 5) & 0x07,
            boost_hf: bytes[0] & 0x03 == 0x03,
        })
    }
}

impl ToByteArray for Lna {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        let boost = if self.boost_hf { 0x03 } else { 0x00 };
        Ok([(self.gain & 0x07) << 5 | boost])
    }
}

impl FromByteArray for DioMapping1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            dio0: (bytes[0] >> 6) & 0x03,
            dio1: (bytes[0] >> 4) & 0x03,
            dio2: (bytes[0] >> 2) & 0x03,
            dio3: bytes[0] & 0x03,
        })
    }
}

impl ToByteArray for DioMapping1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.dio0 & 0x03) << 6
            | (self.dio1 & 0x03) << 4
            | (self.dio2 & 0x03) << 2
            | (self.dio3 & 0x03)])
    }
}

impl FromByteArray for PaDac {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            high_power: bytes[0] & 0x07 == 0x07,
        })
    }
}

impl ToByteArray for PaDac {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        // Upper bits are reserved and must keep their 0x80 reset value
        Ok([if self.high_power { 0x87 } else { 0x84 }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frf_matches_datasheet_default() {
        assert_eq!(Frf::from_mhz(434.0), Frf::default());
        assert_eq!(Frf::from_mhz(434.0).to_bytes().unwrap(), [0x6C, 0x80, 0x00]);
        assert_eq!(Frf::from_mhz(915.0).to_bytes().unwrap(), [0xE4, 0xC0, 0x00]);
    }

    #[test]
    fn op_mode_keeps_modulation_out_of_lora() {
        let op = OpMode {
            long_range_mode: true,
            modulation: ModulationType::Ook,
            low_frequency_mode_on: false,
            mode: Mode::RxSingle,
        };
        assert_eq!(op.to_bytes().unwrap(), [0x86]);

        let fsk = OpMode::from_bytes([0x29]).unwrap();
        assert!(!fsk.long_range_mode);
        assert_eq!(fsk.modulation, ModulationType::Ook);
        assert_eq!(fsk.mode, Mode::Standby);
    }

    #[test]
    fn pa_config_packs_fields() {
        let pa = PaConfig {
            pa_boost: true,
            max_power: 7,
            output_power: 15,
        };
        assert_eq!(pa.to_bytes().unwrap(), [0xFF]);
        assert_eq!(PaConfig::from_bytes([0x4F]).unwrap(), PaConfig::default());
    }
}
