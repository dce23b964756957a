//! Bring-up configuration
//!
//! [`LoRaConfig`] and [`FskConfig`] carry every setting applied by
//! [`Sx127x::begin`](crate::Sx127x::begin) and [`Sx127x::begin_fsk`](crate::Sx127x::begin_fsk).
//! The defaults give a working link between two radios of the same band.

use crate::registers::lora::SYNC_WORD_PRIVATE;
use crate::variant::Variant;

/// What `begin` does when the final gain setting fails
///
/// Gain is the last step of the LoRa bring-up, after the link parameters are already in
/// place. A radio with a rejected gain still works with whatever the LNA was left at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GainPolicy {
    /// Return the gain error from `begin`; the handle stays uninitialized
    #[default]
    Propagate,
    /// Log the gain error, keep it for [`Sx127x::gain_fault`](crate::Sx127x::gain_fault)
    /// and finish the bring-up
    Tolerate,
}

/// LoRa modem settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoRaConfig {
    /// Carrier frequency in MHz
    pub frequency: f32,
    /// Signal bandwidth in kHz
    pub bandwidth: f32,
    /// Spreading factor
    pub spreading_factor: u8,
    /// Coding rate denominator (5 = 4/5 ... 8 = 4/8)
    pub coding_rate: u8,
    /// LoRa sync word
    pub sync_word: u8,
    /// Output power in dBm
    pub output_power: i8,
    /// Over-current protection limit in mA, 0 disables protection
    pub current_limit: u8,
    /// Preamble length in symbols
    pub preamble_length: u16,
    /// LNA gain step, 0 selects automatic gain control
    pub gain: u8,
    /// Handling of a failing gain step
    pub gain_policy: GainPolicy,
}

impl Default for LoRaConfig {
    fn default() -> Self {
        Self {
            frequency: 434.0,
            bandwidth: 125.0,
            spreading_factor: 9,
            coding_rate: 7,
            sync_word: SYNC_WORD_PRIVATE,
            output_power: 17,
            current_limit: 100,
            preamble_length: 8,
            gain: 0,
            gain_policy: GainPolicy::Propagate,
        }
    }
}

impl LoRaConfig {
    /// Default settings on the variant's default carrier
    pub fn for_variant<V: Variant>() -> Self {
        Self {
            frequency: V::DESCRIPTOR.default_frequency,
            ..Self::default()
        }
    }
}

/// FSK/OOK modem settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FskConfig<'a> {
    /// Carrier frequency in MHz
    pub frequency: f32,
    /// Bit rate in kbps
    pub bit_rate: f32,
    /// Frequency deviation in kHz
    pub frequency_deviation: f32,
    /// Receiver bandwidth in kHz
    pub rx_bandwidth: f32,
    /// Output power in dBm
    pub output_power: i8,
    /// Over-current protection limit in mA, 0 disables protection
    pub current_limit: u8,
    /// Preamble length in bytes
    pub preamble_length: u16,
    /// Gaussian filter BT product, 0.0 disables shaping
    pub data_shaping: f32,
    /// Sync word, 1 to 8 non-zero bytes
    pub sync_word: &'a [u8],
    /// Use on-off keying instead of frequency shift keying
    pub ook: bool,
}

impl Default for FskConfig<'static> {
    fn default() -> Self {
        Self {
            frequency: 434.0,
            bit_rate: 48.0,
            frequency_deviation: 50.0,
            rx_bandwidth: 125.0,
            output_power: 13,
            current_limit: 100,
            preamble_length: 16,
            data_shaping: 0.3,
            sync_word: &[0x2D, 0x01],
            ook: false,
        }
    }
}

impl FskConfig<'static> {
    /// Default settings on the variant's default carrier
    pub fn for_variant<V: Variant>() -> Self {
        Self {
            frequency: V::DESCRIPTOR.default_frequency,
            ..Self::default()
        }
    }
}
