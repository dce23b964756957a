//! Parameter validation
//!
//! Pure functions that check a requested setting against the legal domain and convert it
//! into the register representation. Nothing here touches the transport, so a setter can
//! run its check first and only then start writing.

use crate::error::Error;
use crate::registers::lora::{Bandwidth, CodingRate};
use crate::registers::{fsk, Frf, Ocp, PaConfig, PaDac, FXOSC};
use crate::variant::Descriptor;

/// Output power below this uses the RFO pin
const RFO_THRESHOLD_DBM: i8 = 2;

/// Smallest accepted LoRa preamble in symbols
pub const MIN_LORA_PREAMBLE: u16 = 6;

/// Longest FSK sync word in bytes
pub const MAX_SYNC_WORD_LEN: usize = 8;

/// Register values for one output power setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    /// PA pin and level
    pub pa_config: PaConfig,
    /// +20 dBm switch
    pub pa_dac: PaDac,
}

fn approx(a: f32, b: f32, tolerance: f32) -> bool {
    let diff = a - b;
    diff <= tolerance && diff >= -tolerance
}

/// Checks a carrier frequency in MHz against the variant's closed band
pub fn frequency<E>(descriptor: &Descriptor, freq_mhz: f32) -> Result<Frf, Error<E>> {
    // Written so that NaN is rejected as well
    if !(freq_mhz >= descriptor.frequency_min && freq_mhz <= descriptor.frequency_max) {
        return Err(Error::InvalidFrequency);
    }
    Ok(Frf::from_mhz(freq_mhz))
}

/// Maps a LoRa bandwidth in kHz onto one of the supported steps
pub fn bandwidth<E>(bw_khz: f32) -> Result<Bandwidth, Error<E>> {
    Bandwidth::ALL
        .into_iter()
        .find(|bw| approx(bw_khz * 1000.0, bw.hz() as f32, 50.0))
        .ok_or(Error::InvalidBandwidth)
}

/// Checks a spreading factor against the variant's range
pub fn spreading_factor<E>(descriptor: &Descriptor, sf: u8) -> Result<u8, Error<E>> {
    if (descriptor.spreading_factor_min..=descriptor.spreading_factor_max).contains(&sf) {
        Ok(sf)
    } else {
        Err(Error::InvalidSpreadingFactor)
    }
}

/// Maps a coding rate denominator (4/5 ... 4/8) onto the register value
pub fn coding_rate<E>(denominator: u8) -> Result<CodingRate, Error<E>> {
    match denominator {
        5 => Ok(CodingRate::Cr4_5),
        6 => Ok(CodingRate::Cr4_6),
        7 => Ok(CodingRate::Cr4_7),
        8 => Ok(CodingRate::Cr4_8),
        _ => Err(Error::InvalidCodingRate),
    }
}

/// Picks the PA pin and level for an output power in dBm
///
/// - `power_min..2`: RFO pin, low-power PA
/// - `2..=power_max`: PA_BOOST
/// - `power_high`: PA_BOOST with the high-power DAC
pub fn output_power<E>(descriptor: &Descriptor, power_dbm: i8) -> Result<PowerConfig, Error<E>> {
    let in_range = power_dbm >= descriptor.power_min && power_dbm <= descriptor.power_max;
    if !in_range && power_dbm != descriptor.power_high {
        return Err(Error::InvalidOutputPower);
    }

    let config = if power_dbm < RFO_THRESHOLD_DBM {
        PowerConfig {
            pa_config: PaConfig {
                pa_boost: false,
                max_power: 0x02,
                output_power: (power_dbm + 3) as u8,
            },
            pa_dac: PaDac { high_power: false },
        }
    } else if in_range {
        PowerConfig {
            pa_config: PaConfig {
                pa_boost: true,
                max_power: 0x07,
                output_power: (power_dbm - 2) as u8,
            },
            pa_dac: PaDac { high_power: false },
        }
    } else {
        PowerConfig {
            pa_config: PaConfig {
                pa_boost: true,
                max_power: 0x07,
                output_power: (power_dbm - 5) as u8,
            },
            pa_dac: PaDac { high_power: true },
        }
    };
    Ok(config)
}

/// Checks an LNA gain step; 0 means automatic gain control
pub fn gain<E>(descriptor: &Descriptor, gain: u8) -> Result<u8, Error<E>> {
    if gain <= descriptor.max_gain {
        Ok(gain)
    } else {
        Err(Error::InvalidGain)
    }
}

/// Converts an over-current limit in mA into the OCP register; 0 disables protection
pub fn current_limit<E>(limit_ma: u8) -> Result<Ocp, Error<E>> {
    let trim = match limit_ma {
        0 => {
            return Ok(Ocp {
                enabled: false,
                trim: 0,
            })
        }
        45..=120 => (limit_ma - 45) / 5,
        121..=240 => ((limit_ma as u16 + 30) / 10) as u8,
        _ => return Err(Error::InvalidCurrentLimit),
    };
    Ok(Ocp {
        enabled: true,
        trim,
    })
}

/// Checks a LoRa preamble length in symbols
pub fn lora_preamble<E>(symbols: u16) -> Result<u16, Error<E>> {
    if symbols >= MIN_LORA_PREAMBLE {
        Ok(symbols)
    } else {
        Err(Error::InvalidPreambleLength)
    }
}

/// Checks an FSK sync word and returns the register contents and length
pub fn sync_word<E>(word: &[u8]) -> Result<(fsk::SyncValue, u8), Error<E>> {
    if word.is_empty() || word.len() > MAX_SYNC_WORD_LEN || word.contains(&0) {
        return Err(Error::InvalidSyncWord);
    }
    let mut value = [0u8; MAX_SYNC_WORD_LEN];
    value[..word.len()].copy_from_slice(word);
    Ok((fsk::SyncValue { value }, word.len() as u8))
}

/// Converts a bit rate in kbps into the FXOSC divider
///
/// FSK accepts 1.2 to 300 kbps, OOK 1.2 to 32.768 kbps.
pub fn bit_rate<E>(br_kbps: f32, ook: bool) -> Result<fsk::BitRate, Error<E>> {
    let max = if ook { 32.768 } else { 300.0 };
    if !(br_kbps >= 1.2 && br_kbps <= max) {
        return Err(Error::InvalidBitRate);
    }
    let divider = (FXOSC as f32 / (br_kbps * 1000.0)) as u16;
    Ok(fsk::BitRate { divider })
}

/// Converts a frequency deviation in kHz into synthesizer steps
///
/// The deviation must not exceed 200 kHz and, together with half the bit rate, must fit
/// in 250 kHz.
pub fn frequency_deviation<E>(dev_khz: f32, br_kbps: f32) -> Result<fsk::Fdev, Error<E>> {
    if !(dev_khz >= 0.0 && dev_khz <= 200.0 && dev_khz + br_kbps / 2.0 <= 250.0) {
        return Err(Error::InvalidFrequencyDeviation);
    }
    let steps = (dev_khz as f64 * 1000.0 * (1u32 << crate::registers::FSTEP_EXPONENT) as f64
        / FXOSC as f64) as u16;
    Ok(fsk::Fdev { steps })
}

/// Finds the channel filter setting for a receiver bandwidth in kHz
///
/// RxBw = FXOSC / (mantissa * 2^(exponent + 2)), mantissa in {16, 20, 24}, exponent 1..=7.
pub fn rx_bandwidth<E>(bw_khz: f32) -> Result<fsk::RxBw, Error<E>> {
    if !(bw_khz >= 2.6 && bw_khz <= 250.0) {
        return Err(Error::InvalidRxBandwidth);
    }
    for exponent in (1..=7u8).rev() {
        for (mantissa, code) in [(16u32, 0b00u8), (20, 0b01), (24, 0b10)] {
            let point_khz = FXOSC as f32 / 1000.0 / (mantissa << (exponent + 2)) as f32;
            if approx(bw_khz, point_khz + 0.05, 0.5) {
                return Ok(fsk::RxBw {
                    mantissa: code,
                    exponent,
                });
            }
        }
    }
    Err(Error::InvalidRxBandwidth)
}

/// Maps a Gaussian filter BT product onto RegPaRamp bits 6:5
///
/// 0.0 disables shaping.
pub fn data_shaping<E>(bt: f32) -> Result<u8, Error<E>> {
    const TABLE: [(f32, u8); 4] = [(0.0, 0x00), (0.3, 0x60), (0.5, 0x40), (1.0, 0x20)];
    TABLE
        .into_iter()
        .find(|(point, _)| approx(bt, *point, 0.01))
        .map(|(_, bits)| bits)
        .ok_or(Error::InvalidDataShaping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{Rfm96, Variant};

    type E = Error<()>;

    #[test]
    fn frequency_band_is_closed() {
        let rfm96 = &Rfm96::DESCRIPTOR;
        assert!(frequency::<()>(rfm96, 434.0).is_ok());
        assert!(frequency::<()>(rfm96, 470.0).is_ok());
        assert_eq!(frequency::<()>(rfm96, 300.0), Err(E::InvalidFrequency));
        assert_eq!(frequency::<()>(rfm96, 470.1), Err(E::InvalidFrequency));
        assert_eq!(frequency::<()>(rfm96, f32::NAN), Err(E::InvalidFrequency));
    }

    #[test]
    fn bandwidth_steps() {
        assert_eq!(bandwidth::<()>(7.8), Ok(Bandwidth::Khz7_8));
        assert_eq!(bandwidth::<()>(41.7), Ok(Bandwidth::Khz41_7));
        assert_eq!(bandwidth::<()>(125.0), Ok(Bandwidth::Khz125));
        assert_eq!(bandwidth::<()>(500.0), Ok(Bandwidth::Khz500));
        assert_eq!(bandwidth::<()>(100.0), Err(E::InvalidBandwidth));
    }

    #[test]
    fn coding_rate_denominators() {
        assert_eq!(coding_rate::<()>(5), Ok(CodingRate::Cr4_5));
        assert_eq!(coding_rate::<()>(8), Ok(CodingRate::Cr4_8));
        assert_eq!(coding_rate::<()>(4), Err(E::InvalidCodingRate));
        assert_eq!(coding_rate::<()>(9), Err(E::InvalidCodingRate));
    }

    #[test]
    fn output_power_selects_pa() {
        let desc = &Rfm96::DESCRIPTOR;

        let rfo = output_power::<()>(desc, -3).unwrap();
        assert!(!rfo.pa_config.pa_boost);
        assert_eq!(rfo.pa_config.output_power, 0);

        let boost = output_power::<()>(desc, 17).unwrap();
        assert!(boost.pa_config.pa_boost);
        assert_eq!(boost.pa_config.output_power, 15);
        assert!(!boost.pa_dac.high_power);

        let high = output_power::<()>(desc, 20).unwrap();
        assert_eq!(high.pa_config.output_power, 15);
        assert!(high.pa_dac.high_power);

        assert_eq!(output_power::<()>(desc, 18), Err(E::InvalidOutputPower));
        assert_eq!(output_power::<()>(desc, -4), Err(E::InvalidOutputPower));
    }

    #[test]
    fn current_limit_trim() {
        assert_eq!(
            current_limit::<()>(100),
            Ok(Ocp {
                enabled: true,
                trim: 11
            })
        );
        assert_eq!(current_limit::<()>(240).map(|ocp| ocp.trim), Ok(27));
        assert_eq!(current_limit::<()>(0).map(|ocp| ocp.enabled), Ok(false));
        assert_eq!(current_limit::<()>(44), Err(E::InvalidCurrentLimit));
        assert_eq!(current_limit::<()>(241), Err(E::InvalidCurrentLimit));
    }

    #[test]
    fn sync_word_rules() {
        let (value, len) = sync_word::<()>(&[0x2D, 0x01]).unwrap();
        assert_eq!(len, 2);
        assert_eq!(&value.value[..2], &[0x2D, 0x01]);

        assert_eq!(sync_word::<()>(&[]), Err(E::InvalidSyncWord));
        assert_eq!(sync_word::<()>(&[0x2D, 0x00]), Err(E::InvalidSyncWord));
        assert_eq!(sync_word::<()>(&[0x55; 9]), Err(E::InvalidSyncWord));
    }

    #[test]
    fn fsk_rates() {
        assert_eq!(bit_rate::<()>(48.0, false).map(|br| br.divider), Ok(666));
        assert_eq!(bit_rate::<()>(100.0, true), Err(E::InvalidBitRate));
        assert_eq!(bit_rate::<()>(1.0, false), Err(E::InvalidBitRate));

        assert_eq!(
            frequency_deviation::<()>(50.0, 48.0).map(|fdev| fdev.steps),
            Ok(819)
        );
        assert_eq!(
            frequency_deviation::<()>(200.0, 120.0),
            Err(E::InvalidFrequencyDeviation)
        );
    }

    #[test]
    fn rx_bandwidth_table() {
        assert_eq!(
            rx_bandwidth::<()>(125.0),
            Ok(fsk::RxBw {
                mantissa: 0b00,
                exponent: 2
            })
        );
        assert_eq!(
            rx_bandwidth::<()>(250.0),
            Ok(fsk::RxBw {
                mantissa: 0b00,
                exponent: 1
            })
        );
        assert_eq!(
            rx_bandwidth::<()>(2.6),
            Ok(fsk::RxBw {
                mantissa: 0b10,
                exponent: 7
            })
        );
        assert_eq!(rx_bandwidth::<()>(300.0), Err(E::InvalidRxBandwidth));
        assert_eq!(rx_bandwidth::<()>(140.0), Err(E::InvalidRxBandwidth));
    }

    #[test]
    fn gaussian_shaping() {
        assert_eq!(data_shaping::<()>(0.3), Ok(0x60));
        assert_eq!(data_shaping::<()>(0.0), Ok(0x00));
        assert_eq!(data_shaping::<()>(0.7), Err(E::InvalidDataShaping));
    }
}
