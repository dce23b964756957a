//! Chip variants
//!
//! The SX1276/77/78/79 and the HopeRF RFM95/96/97 modules share one die and one register
//! map. They differ in the band they are specified (or matched) for and in the spreading
//! factors the silicon accepts. Each variant is a zero-sized marker type implementing
//! [`Variant`]; the handle is generic over it so the limits are resolved at compile time.
//!
//! A variant can override any of the `check_*` hooks when a descriptor range is not
//! enough to express its constraint.

use crate::error::Error;
use crate::registers::Frf;
use crate::validate::{self, PowerConfig};

/// Immutable per-variant constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Descriptor {
    /// Part name
    pub name: &'static str,
    /// Value RegVersion must report
    pub chip_version: u8,
    /// Lowest carrier frequency in MHz
    pub frequency_min: f32,
    /// Highest carrier frequency in MHz
    pub frequency_max: f32,
    /// Frequency used by [`LoRaConfig::for_variant`](crate::LoRaConfig::for_variant)
    pub default_frequency: f32,
    /// Lowest output power in dBm (RFO pin)
    pub power_min: i8,
    /// Highest continuous output power in dBm (PA_BOOST pin)
    pub power_max: i8,
    /// High-power PA_BOOST step in dBm
    pub power_high: i8,
    /// Lowest LoRa spreading factor
    pub spreading_factor_min: u8,
    /// Highest LoRa spreading factor
    pub spreading_factor_max: u8,
    /// Highest manual LNA gain step (0 selects AGC)
    pub max_gain: u8,
    /// Maximum LoRa payload in bytes
    pub lora_max_packet: usize,
    /// Maximum FSK/OOK payload in bytes (FIFO size minus the length byte)
    pub fsk_max_packet: usize,
}

impl Descriptor {
    /// SX127x family defaults, used as the base of every variant
    pub const FAMILY: Descriptor = Descriptor {
        name: "SX127x",
        chip_version: 0x12,
        frequency_min: 137.0,
        frequency_max: 1020.0,
        default_frequency: 434.0,
        power_min: -3,
        power_max: 17,
        power_high: 20,
        spreading_factor_min: 6,
        spreading_factor_max: 12,
        max_gain: 6,
        lora_max_packet: 255,
        fsk_max_packet: 63,
    };
}

/// A member of the SX127x family
pub trait Variant {
    /// Constants of this variant
    const DESCRIPTOR: Descriptor;

    /// Validates a carrier frequency in MHz
    fn check_frequency<E>(freq_mhz: f32) -> Result<Frf, Error<E>> {
        validate::frequency(&Self::DESCRIPTOR, freq_mhz)
    }

    /// Validates a LoRa spreading factor
    fn check_spreading_factor<E>(sf: u8) -> Result<u8, Error<E>> {
        validate::spreading_factor(&Self::DESCRIPTOR, sf)
    }

    /// Validates an output power in dBm and returns the PA configuration for it
    fn check_output_power<E>(power_dbm: i8) -> Result<PowerConfig, Error<E>> {
        validate::output_power(&Self::DESCRIPTOR, power_dbm)
    }

    /// Validates an LNA gain step
    fn check_gain<E>(gain: u8) -> Result<u8, Error<E>> {
        validate::gain(&Self::DESCRIPTOR, gain)
    }
}

/// Semtech SX1276, 137-1020 MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sx1276;

/// Semtech SX1277, 137-1020 MHz, SF6-9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sx1277;

/// Semtech SX1278, 137-525 MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sx1278;

/// Semtech SX1279, 137-960 MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sx1279;

/// HopeRF RFM95 (SX1276 die), matched for 868-915 MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rfm95;

/// HopeRF RFM96 (SX1278 die), matched for 433-470 MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rfm96;

/// HopeRF RFM97 (SX1277 die), matched for 868-915 MHz, SF6-9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rfm97;

impl Variant for Sx1276 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "SX1276",
        ..Descriptor::FAMILY
    };
}

impl Variant for Sx1277 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "SX1277",
        spreading_factor_max: 9,
        ..Descriptor::FAMILY
    };
}

impl Variant for Sx1278 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "SX1278",
        frequency_max: 525.0,
        ..Descriptor::FAMILY
    };
}

impl Variant for Sx1279 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "SX1279",
        frequency_max: 960.0,
        ..Descriptor::FAMILY
    };
}

impl Variant for Rfm95 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "RFM95",
        frequency_min: 868.0,
        frequency_max: 915.0,
        default_frequency: 915.0,
        ..Descriptor::FAMILY
    };
}

impl Variant for Rfm96 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "RFM96",
        frequency_min: 433.0,
        frequency_max: 470.0,
        ..Descriptor::FAMILY
    };
}

impl Variant for Rfm97 {
    const DESCRIPTOR: Descriptor = Descriptor {
        name: "RFM97",
        frequency_min: 868.0,
        frequency_max: 915.0,
        default_frequency: 915.0,
        spreading_factor_max: 9,
        ..Descriptor::FAMILY
    };
}
