//! SX127x Radio Handle
//!
//! [`Sx127x`] owns a [`RegisterTransport`] and a delay provider and is the only place that
//! knows what the chip is currently configured for. It is generic over a [`Variant`], which
//! supplies the version identifier and the legal parameter ranges.
//!
//! # Bring-up
//! [`begin`](Sx127x::begin) (LoRa) and [`begin_fsk`](Sx127x::begin_fsk) (FSK/OOK) run the
//! whole configuration sequence:
//! 1. Read RegVersion until it matches the variant (nothing is written before that)
//! 2. Sleep, select the modem, standby, clear pending interrupts
//! 3. Modem-level settings (sync word, current limit, preamble, ...)
//! 4. Settings not exposed as setters (hopping off, FIFO bases, timeouts, packet engine)
//! 5. Public setters in a fixed order, stopping at the first failure
//!
//! Any failure leaves the handle [`State::Uninitialized`].
//!
//! # Setters
//! Every setter checks, in order, that the handle is idle, that the active modem supports
//! the setting, and that the value is legal. Only then does it put the chip in standby and
//! write. A rejected value never reaches the transport.
//!
//! # Example
//! ```no_run
//! use sx127x::{LoRaConfig, Rfm96, SpiTransport, Sx127x};
//! # fn run<SPI: embedded_hal::spi::SpiDevice, D: embedded_hal::delay::DelayNs>(spi: SPI, delay: D)
//! #     -> Result<(), sx127x::Error<SPI::Error>> {
//! let mut radio: Sx127x<_, _, Rfm96> = Sx127x::new(SpiTransport::new(spi), delay);
//! radio.begin(&LoRaConfig::default())?;
//! radio.transmit(b"hello")?;
//! # Ok(())
//! # }
//! ```

mod exchange;

use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use regiface::{ByteArray, ReadableRegister, Register, WritableRegister};

use crate::config::{FskConfig, GainPolicy, LoRaConfig};
use crate::error::Error;
use crate::registers::lora::{Bandwidth, CodingRate};
use crate::registers::{self, fsk, lora, DioMapping1, Mode, ModulationType, OpMode, PaRamp};
use crate::transport::RegisterTransport;
use crate::validate;
use crate::variant::{Descriptor, Variant};

pub use exchange::Event;

/// RegVersion reads before giving up on the chip
const VERSION_ATTEMPTS: u8 = 10;

const VERSION_RETRY_DELAY_MS: u32 = 10;

/// LoRa RxSingle window in symbols
const SYMBOL_TIMEOUT: u16 = 100;

/// Symbols longer than this need LowDataRateOptimize
const LOW_DATA_RATE_SYMBOL_US: u64 = 16_000;

/// Active modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Modem {
    /// LoRa spread spectrum
    LoRa,
    /// FSK or OOK
    Fsk,
}

/// Handle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No successful bring-up yet, or the last one failed
    #[default]
    Uninitialized,
    /// Configured and in standby or sleep
    Idle,
    /// A transmission is in flight
    Transmitting,
    /// The receiver is armed
    Listening,
}

/// Configuration currently applied to the chip
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    frequency: f32,
    bandwidth: Bandwidth,
    spreading_factor: u8,
    coding_rate: CodingRate,
    implicit_header: bool,
    low_data_rate_optimize: bool,
    crc: bool,
    preamble_length: u16,
    bit_rate: f32,
    frequency_deviation: f32,
    sync_word_len: u8,
    ook: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frequency: 434.0,
            bandwidth: Bandwidth::Khz125,
            spreading_factor: 7,
            coding_rate: CodingRate::Cr4_5,
            implicit_header: false,
            low_data_rate_optimize: false,
            crc: false,
            preamble_length: 8,
            bit_rate: 4.8,
            frequency_deviation: 5.0,
            sync_word_len: 4,
            ook: false,
        }
    }
}

impl Settings {
    fn symbol_us(&self) -> u64 {
        (1u64 << self.spreading_factor) * 1_000_000 / self.bandwidth.hz() as u64
    }
}

/// SX127x radio driver
pub struct Sx127x<T: RegisterTransport, D, V> {
    transport: T,
    delay: D,
    state: State,
    modem: Modem,
    settings: Settings,
    gain_fault: Option<Error<T::Error>>,
    _variant: PhantomData<V>,
}

impl<T, D, V> Sx127x<T, D, V>
where
    T: RegisterTransport,
    D: DelayNs,
    V: Variant,
{
    /// Creates an uninitialized handle. Nothing is sent to the chip until `begin`.
    ///
    /// # Arguments
    /// * `transport` - Register access to the chip
    /// * `delay` - Delay provider used while polling
    pub fn new(transport: T, delay: D) -> Self {
        Self {
            transport,
            delay,
            state: State::Uninitialized,
            modem: Modem::LoRa,
            settings: Settings::default(),
            gain_fault: None,
            _variant: PhantomData,
        }
    }

    /// Releases the transport and the delay provider
    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Constants of the variant this handle drives
    pub fn descriptor(&self) -> Descriptor {
        V::DESCRIPTOR
    }

    /// Current handle state
    pub fn state(&self) -> State {
        self.state
    }

    /// Active modem, `None` before a successful bring-up
    pub fn modem(&self) -> Option<Modem> {
        match self.state {
            State::Uninitialized => None,
            _ => Some(self.modem),
        }
    }

    /// Gain error swallowed by the last `begin` under [`GainPolicy::Tolerate`]
    pub fn gain_fault(&self) -> Option<&Error<T::Error>> {
        self.gain_fault.as_ref()
    }

    /// Brings the chip up in LoRa mode
    ///
    /// # Errors
    /// * `Busy` - a non-blocking exchange is in flight
    /// * `ChipVersionMismatch` - RegVersion never matched the variant
    /// * Any setter error for the values in `config`
    pub fn begin(&mut self, config: &LoRaConfig) -> Result<(), Error<T::Error>> {
        self.start_bring_up()?;
        let result = self.bring_up_lora(config);
        self.finish_bring_up(result)
    }

    /// Brings the chip up in FSK/OOK mode
    ///
    /// # Errors
    /// Same as [`begin`](Self::begin).
    pub fn begin_fsk(&mut self, config: &FskConfig<'_>) -> Result<(), Error<T::Error>> {
        self.start_bring_up()?;
        let result = self.bring_up_fsk(config);
        self.finish_bring_up(result)
    }

    fn start_bring_up(&mut self) -> Result<(), Error<T::Error>> {
        if matches!(self.state, State::Transmitting | State::Listening) {
            return Err(Error::Busy);
        }
        self.state = State::Uninitialized;
        self.gain_fault = None;
        self.settings = Settings::default();
        Ok(())
    }

    fn finish_bring_up(
        &mut self,
        result: Result<(), Error<T::Error>>,
    ) -> Result<(), Error<T::Error>> {
        match result {
            Ok(()) => debug!("{} ready ({:?})", V::DESCRIPTOR.name, self.modem),
            Err(_) => {
                warn!("{} bring-up failed", V::DESCRIPTOR.name);
                self.state = State::Uninitialized;
            }
        }
        result
    }

    fn bring_up_lora(&mut self, config: &LoRaConfig) -> Result<(), Error<T::Error>> {
        self.find_chip()?;
        self.state = State::Idle;
        self.set_active_modem(Modem::LoRa)?;
        self.clear_irq()?;
        self.set_sync_word(config.sync_word)?;
        self.set_current_limit(config.current_limit)?;
        self.set_preamble_length(config.preamble_length)?;

        self.configure_lora()?;

        self.set_frequency(config.frequency)?;
        self.set_bandwidth(config.bandwidth)?;
        self.set_spreading_factor(config.spreading_factor)?;
        self.set_coding_rate(config.coding_rate)?;
        self.set_output_power(config.output_power)?;

        match (self.set_gain(config.gain), config.gain_policy) {
            (Ok(()), _) => Ok(()),
            (Err(Error::Transport(e)), _) => Err(Error::Transport(e)),
            (Err(e), GainPolicy::Tolerate) => {
                warn!("gain {} rejected, keeping current LNA setting", config.gain);
                self.gain_fault = Some(e);
                Ok(())
            }
            (Err(e), GainPolicy::Propagate) => Err(e),
        }
    }

    fn bring_up_fsk(&mut self, config: &FskConfig<'_>) -> Result<(), Error<T::Error>> {
        self.find_chip()?;
        self.state = State::Idle;
        self.set_active_modem(Modem::Fsk)?;
        self.clear_irq()?;
        self.set_ook(config.ook)?;
        self.set_bit_rate(config.bit_rate)?;
        self.set_frequency_deviation(config.frequency_deviation)?;
        self.set_rx_bandwidth(config.rx_bandwidth)?;
        self.set_current_limit(config.current_limit)?;
        self.set_preamble_length(config.preamble_length)?;
        self.set_fsk_sync_word(config.sync_word)?;

        self.configure_fsk()?;

        self.set_frequency(config.frequency)?;
        self.set_output_power(config.output_power)?;
        self.set_data_shaping(config.data_shaping)
    }

    fn find_chip(&mut self) -> Result<(), Error<T::Error>> {
        let expected = V::DESCRIPTOR.chip_version;
        let mut found = 0;
        for attempt in 1..=VERSION_ATTEMPTS {
            found = self.read::<registers::Version>()?.value;
            if found == expected {
                debug!("found {} (version {:#04x})", V::DESCRIPTOR.name, found);
                return Ok(());
            }
            trace!("RegVersion {:#04x}, attempt {}", found, attempt);
            if attempt < VERSION_ATTEMPTS {
                self.delay.delay_ms(VERSION_RETRY_DELAY_MS);
            }
        }
        warn!(
            "no {} found: expected version {:#04x}, read {:#04x}",
            V::DESCRIPTOR.name,
            expected,
            found
        );
        Err(Error::ChipVersionMismatch { expected, found })
    }

    fn set_active_modem(&mut self, modem: Modem) -> Result<(), Error<T::Error>> {
        self.set_mode(Mode::Sleep)?;
        let long_range = match modem {
            Modem::LoRa => OpMode::LONG_RANGE_MASK,
            Modem::Fsk => 0,
        };
        self.set_bits::<OpMode>(long_range, OpMode::LONG_RANGE_MASK)?;
        self.modem = modem;
        debug!("modem {:?}", modem);
        self.set_mode(Mode::Standby)
    }

    /// Hopping off, both FIFO bases at 0, RxSingle window, payload CRC on
    fn configure_lora(&mut self) -> Result<(), Error<T::Error>> {
        self.write(lora::HopPeriod { value: 0 })?;
        self.write(lora::FifoTxBaseAddr { value: 0 })?;
        self.write(lora::FifoRxBaseAddr { value: 0 })?;
        self.write(lora::SymbTimeoutLsb {
            value: (SYMBOL_TIMEOUT & 0xFF) as u8,
        })?;

        let mut config: lora::ModemConfig2 = self.read()?;
        config.symb_timeout_msb = (SYMBOL_TIMEOUT >> 8) as u8;
        config.rx_payload_crc_on = true;
        self.write(config)?;
        self.settings.crc = true;
        Ok(())
    }

    /// Packet engine and receiver front end for FSK/OOK
    fn configure_fsk(&mut self) -> Result<(), Error<T::Error>> {
        self.write(fsk::RssiThresh { value: 0xFF })?;
        self.set_bits::<fsk::RssiConfig>(0x02, 0x07)?;
        self.write(fsk::RegIrqFlags {
            flags1: fsk::IrqFlags1::empty(),
            flags2: fsk::IrqFlags2::FIFO_OVERRUN,
        })?;

        // Variable length, NRZ, CRC on, no address filtering
        self.write(fsk::PacketConfig1::default())?;
        self.write(fsk::NodeAddress { value: 0 })?;
        self.write(fsk::BroadcastAddress { value: 0 })?;
        self.write(fsk::PayloadLength {
            value: V::DESCRIPTOR.fsk_max_packet as u8,
        })?;
        self.write(fsk::PacketConfig2 { value: 0x40 })?;
        self.settings.crc = true;

        self.set_bits::<fsk::SyncConfig>(0, fsk::SyncConfig::POLARITY_MASK)?;
        self.write(fsk::FifoThresh { value: 0x80 | 0x0F })?;
        self.write(fsk::RxTimeout1 { value: 0 })?;
        self.write(fsk::RxTimeout2 { value: 0 })?;
        self.write(fsk::RxTimeout3 { value: 0 })?;
        self.write(fsk::PreambleDetect { value: 0xAA })?;
        self.write(fsk::RxConfig {
            flags: fsk::RxConfigFlags::AGC_AUTO_ON | fsk::RxConfigFlags::TRIGGER_PREAMBLE_DETECT,
        })
    }

    /// Sets the carrier frequency in MHz
    ///
    /// # Errors
    /// * `InvalidFrequency` - outside the variant's band
    pub fn set_frequency(&mut self, freq_mhz: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        let frf = V::check_frequency::<T::Error>(freq_mhz)?;

        self.set_mode(Mode::Standby)?;
        self.write(frf)?;
        self.settings.frequency = freq_mhz;
        debug!("frequency {} MHz", freq_mhz);
        Ok(())
    }

    /// Sets the LoRa bandwidth in kHz
    ///
    /// Accepted: 7.8, 10.4, 15.6, 20.8, 31.25, 41.7, 62.5, 125, 250 and 500.
    pub fn set_bandwidth(&mut self, bw_khz: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::LoRa)?;
        let bandwidth = validate::bandwidth::<T::Error>(bw_khz)?;

        self.set_mode(Mode::Standby)?;
        let mut config: lora::ModemConfig1 = self.read()?;
        config.bandwidth = bandwidth;
        self.write(config)?;
        self.settings.bandwidth = bandwidth;
        self.update_low_data_rate_optimize()
    }

    /// Sets the LoRa spreading factor
    ///
    /// SF6 switches to implicit header mode and the SF6 detection settings.
    pub fn set_spreading_factor(&mut self, sf: u8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::LoRa)?;
        let sf = V::check_spreading_factor::<T::Error>(sf)?;

        self.set_mode(Mode::Standby)?;
        let implicit_header = sf == 6;

        let mut config1: lora::ModemConfig1 = self.read()?;
        config1.implicit_header = implicit_header;
        self.write(config1)?;

        let mut config2: lora::ModemConfig2 = self.read()?;
        config2.spreading_factor = sf;
        self.write(config2)?;

        let (optimize, threshold) = if implicit_header {
            (0xC5, 0x0C)
        } else {
            (0xC3, 0x0A)
        };
        self.write(lora::DetectionOptimize { value: optimize })?;
        self.write(lora::DetectionThreshold { value: threshold })?;

        self.settings.spreading_factor = sf;
        self.settings.implicit_header = implicit_header;
        self.update_low_data_rate_optimize()
    }

    /// Sets the LoRa coding rate denominator (5 = 4/5 ... 8 = 4/8)
    pub fn set_coding_rate(&mut self, denominator: u8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::LoRa)?;
        let coding_rate = validate::coding_rate::<T::Error>(denominator)?;

        self.set_mode(Mode::Standby)?;
        let mut config: lora::ModemConfig1 = self.read()?;
        config.coding_rate = coding_rate;
        self.write(config)?;
        self.settings.coding_rate = coding_rate;
        Ok(())
    }

    /// Sets the output power in dBm
    ///
    /// Below 2 dBm the RFO pin is used, 2 to 17 dBm PA_BOOST, 20 dBm PA_BOOST with the
    /// high-power DAC.
    pub fn set_output_power(&mut self, power_dbm: i8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        let power = V::check_output_power::<T::Error>(power_dbm)?;

        self.set_mode(Mode::Standby)?;
        self.write(power.pa_config)?;
        self.write(power.pa_dac)
    }

    /// Sets the LNA gain step: 0 enables AGC, 1 (highest) to 6 (lowest) fix the gain
    ///
    /// The LNA register is shared; the AGC switch lives in ModemConfig3 (LoRa) or
    /// RxConfig (FSK/OOK).
    pub fn set_gain(&mut self, gain: u8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        let gain = V::check_gain::<T::Error>(gain)?;

        self.set_mode(Mode::Standby)?;
        match self.modem {
            Modem::LoRa => {
                let mut config: lora::ModemConfig3 = self.read()?;
                config.agc_auto_on = gain == 0;
                self.write(config)?;
            }
            Modem::Fsk => {
                let agc = fsk::RxConfigFlags::AGC_AUTO_ON.bits();
                let bits = if gain == 0 { agc } else { 0 };
                self.set_bits::<fsk::RxConfig>(bits, agc)?;
            }
        }
        if gain != 0 {
            self.write(registers::Lna {
                gain,
                boost_hf: true,
            })?;
        }
        Ok(())
    }

    /// Sets the LoRa sync word
    pub fn set_sync_word(&mut self, sync_word: u8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::LoRa)?;

        self.set_mode(Mode::Standby)?;
        self.write(lora::SyncWord { value: sync_word })
    }

    /// Sets the FSK/OOK sync word, 1 to 8 non-zero bytes
    pub fn set_fsk_sync_word(&mut self, sync_word: &[u8]) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;
        let (value, len) = validate::sync_word::<T::Error>(sync_word)?;

        self.set_mode(Mode::Standby)?;
        self.write(value)?;
        self.set_bits::<fsk::SyncConfig>(0x10 | (len - 1), fsk::SyncConfig::SYNC_MASK)?;
        self.settings.sync_word_len = len;
        Ok(())
    }

    /// Sets the over-current protection limit in mA, 0 disables protection
    pub fn set_current_limit(&mut self, limit_ma: u8) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        let ocp = validate::current_limit::<T::Error>(limit_ma)?;

        self.set_mode(Mode::Standby)?;
        self.write(ocp)
    }

    /// Sets the preamble length: symbols (at least 6) in LoRa, bytes in FSK/OOK
    pub fn set_preamble_length(&mut self, length: u16) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        match self.modem {
            Modem::LoRa => {
                let symbols = validate::lora_preamble::<T::Error>(length)?;
                self.set_mode(Mode::Standby)?;
                self.write(lora::PreambleLength { symbols })?;
            }
            Modem::Fsk => {
                self.set_mode(Mode::Standby)?;
                self.write(fsk::PreambleLength { bytes: length })?;
            }
        }
        self.settings.preamble_length = length;
        Ok(())
    }

    /// Enables or disables the payload CRC
    pub fn set_crc(&mut self, enabled: bool) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.set_mode(Mode::Standby)?;
        match self.modem {
            Modem::LoRa => {
                let mut config: lora::ModemConfig2 = self.read()?;
                config.rx_payload_crc_on = enabled;
                self.write(config)?;
            }
            Modem::Fsk => {
                let bits = if enabled { fsk::PacketConfig1::CRC_MASK } else { 0 };
                self.set_bits::<fsk::PacketConfig1>(bits, fsk::PacketConfig1::CRC_MASK)?;
            }
        }
        self.settings.crc = enabled;
        Ok(())
    }

    /// Sets the FSK/OOK bit rate in kbps
    ///
    /// In FSK the current deviation plus half the bit rate must stay within 250 kHz.
    pub fn set_bit_rate(&mut self, br_kbps: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;
        let bit_rate = validate::bit_rate::<T::Error>(br_kbps, self.settings.ook)?;
        if !self.settings.ook {
            validate::frequency_deviation::<T::Error>(self.settings.frequency_deviation, br_kbps)
                .map_err(|_| Error::InvalidBitRate)?;
        }

        self.set_mode(Mode::Standby)?;
        self.write(bit_rate)?;
        self.settings.bit_rate = br_kbps;
        Ok(())
    }

    /// Sets the FSK frequency deviation in kHz
    pub fn set_frequency_deviation(&mut self, dev_khz: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;
        let fdev = validate::frequency_deviation::<T::Error>(dev_khz, self.settings.bit_rate)?;

        self.set_mode(Mode::Standby)?;
        self.write(fdev)?;
        self.settings.frequency_deviation = dev_khz;
        Ok(())
    }

    /// Sets the FSK/OOK receiver bandwidth in kHz (2.6 to 250), also used for AFC
    pub fn set_rx_bandwidth(&mut self, bw_khz: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;
        let rx_bw = validate::rx_bandwidth::<T::Error>(bw_khz)?;

        self.set_mode(Mode::Standby)?;
        self.write(rx_bw)?;
        self.write(fsk::AfcBw::from(rx_bw))
    }

    /// Sets the Gaussian filter BT product: 0.0 (off), 0.3, 0.5 or 1.0
    pub fn set_data_shaping(&mut self, bt: f32) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;
        let bits = validate::data_shaping::<T::Error>(bt)?;

        self.set_mode(Mode::Standby)?;
        self.set_bits::<PaRamp>(bits, PaRamp::SHAPING_MASK)
    }

    /// Switches between OOK and FSK modulation
    pub fn set_ook(&mut self, enabled: bool) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::Fsk)?;

        self.set_mode(Mode::Standby)?;
        let modulation = if enabled {
            ModulationType::Ook
        } else {
            ModulationType::Fsk
        };
        self.set_bits::<OpMode>((modulation as u8) << 5, OpMode::MODULATION_MASK)?;
        self.settings.ook = enabled;
        Ok(())
    }

    /// Puts the chip to sleep, aborting any exchange in flight. Configuration is retained.
    pub fn sleep(&mut self) -> Result<(), Error<T::Error>> {
        self.ensure_initialized()?;
        self.set_mode(Mode::Sleep)?;
        self.state = State::Idle;
        Ok(())
    }

    /// Puts the chip in standby, aborting any exchange in flight
    pub fn standby(&mut self) -> Result<(), Error<T::Error>> {
        self.ensure_initialized()?;
        self.set_mode(Mode::Standby)?;
        self.state = State::Idle;
        Ok(())
    }

    fn update_low_data_rate_optimize(&mut self) -> Result<(), Error<T::Error>> {
        let enabled = self.settings.symbol_us() >= LOW_DATA_RATE_SYMBOL_US;
        let mut config: lora::ModemConfig3 = self.read()?;
        config.low_data_rate_optimize = enabled;
        self.write(config)?;
        self.settings.low_data_rate_optimize = enabled;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), Error<T::Error>> {
        match self.state {
            State::Uninitialized => Err(Error::NotInitialized),
            _ => Ok(()),
        }
    }

    fn ensure_idle(&self) -> Result<(), Error<T::Error>> {
        match self.state {
            State::Uninitialized => Err(Error::NotInitialized),
            State::Idle => Ok(()),
            State::Transmitting | State::Listening => Err(Error::Busy),
        }
    }

    fn ensure_modem(&self, modem: Modem) -> Result<(), Error<T::Error>> {
        if self.modem == modem {
            Ok(())
        } else {
            Err(Error::WrongModem)
        }
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), Error<T::Error>> {
        trace!("mode {:?}", mode);
        self.set_bits::<OpMode>(mode as u8, OpMode::MODE_MASK)
    }

    fn clear_irq(&mut self) -> Result<(), Error<T::Error>> {
        match self.modem {
            Modem::LoRa => self.write(lora::RegIrqFlags::clear_all()),
            Modem::Fsk => self.write(fsk::RegIrqFlags::clear_all()),
        }
    }

    fn map_dio(&mut self, dio0: u8, dio1: Option<u8>) -> Result<(), Error<T::Error>> {
        let mut mapping: DioMapping1 = self.read()?;
        mapping.dio0 = dio0;
        if let Some(dio1) = dio1 {
            mapping.dio1 = dio1;
        }
        self.write(mapping)
    }

    fn read<R>(&mut self) -> Result<R, Error<T::Error>>
    where
        R: ReadableRegister<IdType = u8, Error = Infallible>,
    {
        let mut raw_value = R::Array::new();
        self.transport
            .read_burst(R::id(), raw_value.as_mut())
            .map_err(Error::Transport)?;

        match R::from_bytes(raw_value) {
            Ok(register) => Ok(register),
            Err(never) => match never {},
        }
    }

    fn write<R>(&mut self, register: R) -> Result<(), Error<T::Error>>
    where
        R: WritableRegister<IdType = u8, Error = Infallible>,
    {
        let raw_value = match register.to_bytes() {
            Ok(raw_value) => raw_value,
            Err(never) => match never {},
        };
        self.transport
            .write_burst(R::id(), raw_value.as_ref())
            .map_err(Error::Transport)
    }

    fn set_bits<R>(&mut self, value: u8, mask: u8) -> Result<(), Error<T::Error>>
    where
        R: Register<IdType = u8>,
    {
        self.transport
            .set_register_bits(R::id(), value, mask)
            .map_err(Error::Transport)
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::variant::{Rfm96, Sx1277};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    pub(crate) type Radio<V = Rfm96> = Sx127x<MockTransport, NoopDelay, V>;

    pub(crate) fn radio<V: Variant>(version: u8) -> Sx127x<MockTransport, NoopDelay, V> {
        Sx127x::new(MockTransport::new(version), NoopDelay::new())
    }

    pub(crate) fn lora_radio() -> Radio {
        let mut radio: Radio = radio(0x12);
        radio.begin(&LoRaConfig::default()).unwrap();
        radio.transport_mut().writes.clear();
        radio
    }

    pub(crate) fn fsk_radio() -> Radio {
        let mut radio: Radio = radio(0x12);
        radio.begin_fsk(&FskConfig::default()).unwrap();
        radio.transport_mut().writes.clear();
        radio
    }

    #[test]
    fn begin_applies_lora_defaults() {
        let mut radio = lora_radio();
        assert_eq!(radio.state(), State::Idle);
        assert_eq!(radio.modem(), Some(Modem::LoRa));

        let chip = radio.transport_mut();
        // LoRa, standby
        assert_eq!(chip.reg(0x01) & 0x87, 0x81);
        assert_eq!([chip.reg(0x06), chip.reg(0x07), chip.reg(0x08)], [0x6C, 0x80, 0x00]);
        // 125 kHz, 4/7, explicit header
        assert_eq!(chip.reg(0x1D), 0x76);
        // SF9, CRC on
        assert_eq!(chip.reg(0x1E) & 0xF4, 0x94);
        assert_eq!(chip.reg(0x1F), 100);
        assert_eq!(chip.reg(0x39), 0x12);
        assert_eq!(chip.reg(0x09), 0xFF);
        assert_eq!(chip.reg(0x4D), 0x84);
        assert_eq!(chip.reg(0x0B), 0x2B);
        assert_eq!([chip.reg(0x20), chip.reg(0x21)], [0x00, 0x08]);
        // AGC on, no low data rate optimization at SF9/125 kHz
        assert_eq!(chip.reg(0x26), 0x04);
        assert_eq!(chip.reg(0x24), 0x00);
        assert_eq!([chip.reg(0x31), chip.reg(0x37)], [0xC3, 0x0A]);
    }

    #[test]
    fn version_mismatch_writes_nothing() {
        let mut radio: Radio = radio(0x22);
        assert_eq!(
            radio.begin(&LoRaConfig::default()),
            Err(Error::ChipVersionMismatch {
                expected: 0x12,
                found: 0x22
            })
        );
        assert_eq!(radio.state(), State::Uninitialized);
        assert_eq!(radio.modem(), None);
        assert!(radio.transport_mut().writes.is_empty());

        assert_eq!(radio.set_frequency(434.0), Err(Error::NotInitialized));
        assert_eq!(radio.transmit(&[1, 2, 3]), Err(Error::NotInitialized));
        assert!(radio.transport_mut().writes.is_empty());
    }

    #[test]
    fn out_of_band_frequency_writes_nothing() {
        let mut radio = lora_radio();
        assert_eq!(radio.set_frequency(300.0), Err(Error::InvalidFrequency));
        assert_eq!(radio.set_frequency(470.1), Err(Error::InvalidFrequency));
        assert!(radio.transport_mut().writes.is_empty());
    }

    #[test]
    fn in_band_frequency_writes_frf() {
        let mut radio = lora_radio();
        radio.set_frequency(470.0).unwrap();

        let frf: std::vec::Vec<_> = radio
            .transport_mut()
            .writes
            .iter()
            .copied()
            .filter(|(addr, _)| (0x06..=0x08).contains(addr))
            .collect();
        assert_eq!(frf, [(0x06, 0x75), (0x07, 0x80), (0x08, 0x00)]);
    }

    #[test]
    fn bring_up_stops_at_first_invalid_setting() {
        let mut radio: Radio = radio(0x12);
        let config = LoRaConfig {
            frequency: 868.0,
            ..LoRaConfig::default()
        };
        assert_eq!(radio.begin(&config), Err(Error::InvalidFrequency));
        assert_eq!(radio.state(), State::Uninitialized);
        // Bandwidth comes after frequency and was never written
        assert!(radio.transport_mut().writes_to(0x1D).is_empty());
    }

    #[test]
    fn fsk_setters_need_fsk_modem() {
        let mut radio = lora_radio();
        assert_eq!(radio.set_bit_rate(48.0), Err(Error::WrongModem));
        assert_eq!(radio.set_fsk_sync_word(&[0x2D]), Err(Error::WrongModem));
        assert_eq!(radio.set_data_shaping(0.5), Err(Error::WrongModem));
        assert!(radio.transport_mut().writes.is_empty());
    }

    #[test]
    fn lora_setters_need_lora_modem() {
        let mut radio = fsk_radio();
        assert_eq!(radio.set_bandwidth(125.0), Err(Error::WrongModem));
        assert_eq!(radio.set_spreading_factor(7), Err(Error::WrongModem));
        assert!(radio.transport_mut().writes.is_empty());
    }

    #[test]
    fn invalid_values_write_nothing() {
        let mut radio = lora_radio();
        assert_eq!(radio.set_bandwidth(100.0), Err(Error::InvalidBandwidth));
        assert_eq!(radio.set_coding_rate(9), Err(Error::InvalidCodingRate));
        assert_eq!(radio.set_output_power(19), Err(Error::InvalidOutputPower));
        assert_eq!(radio.set_current_limit(30), Err(Error::InvalidCurrentLimit));
        assert_eq!(radio.set_preamble_length(5), Err(Error::InvalidPreambleLength));
        assert_eq!(radio.set_gain(7), Err(Error::InvalidGain));
        assert!(radio.transport_mut().writes.is_empty());
    }

    #[test]
    fn spreading_factor_6_uses_implicit_header() {
        let mut radio = lora_radio();
        radio.set_spreading_factor(6).unwrap();

        let chip = radio.transport_mut();
        assert_eq!(chip.reg(0x1D) & 0x01, 0x01);
        assert_eq!(chip.reg(0x1E) >> 4, 6);
        assert_eq!([chip.reg(0x31), chip.reg(0x37)], [0xC5, 0x0C]);
    }

    #[test]
    fn long_symbols_enable_low_data_rate_optimize() {
        let mut radio = lora_radio();
        radio.set_spreading_factor(12).unwrap();
        assert_eq!(radio.transport_mut().reg(0x26) & 0x08, 0x08);

        radio.set_bandwidth(500.0).unwrap();
        assert_eq!(radio.transport_mut().reg(0x26) & 0x08, 0x00);
    }

    #[test]
    fn reduced_variant_rejects_high_spreading_factor() {
        let mut radio: Radio<Sx1277> = radio(0x12);
        let config = LoRaConfig {
            spreading_factor: 10,
            ..LoRaConfig::default()
        };
        assert_eq!(radio.begin(&config), Err(Error::InvalidSpreadingFactor));
    }

    #[test]
    fn manual_gain_disables_agc() {
        let mut radio = lora_radio();
        radio.set_gain(1).unwrap();

        let chip = radio.transport_mut();
        assert_eq!(chip.reg(0x26) & 0x04, 0x00);
        assert_eq!(chip.reg(0x0C), 0x23);
    }

    #[test]
    fn fsk_gain_uses_rx_config_agc() {
        let mut radio = fsk_radio();
        radio.set_gain(3).unwrap();

        let chip = radio.transport_mut();
        assert_eq!(chip.reg(0x0D), 0x06);
        assert_eq!(chip.reg(0x0C), 0x63);
        // Shared with the LoRa view: ModemConfig3 untouched
        assert!(chip.writes_to(0x26).is_empty());

        radio.set_gain(0).unwrap();
        assert_eq!(radio.transport_mut().reg(0x0D), 0x0E);
        assert_eq!(radio.set_gain(7), Err(Error::InvalidGain));
    }

    #[test]
    fn gain_failure_propagates_by_default() {
        let mut radio: Radio = radio(0x12);
        let config = LoRaConfig {
            gain: 7,
            ..LoRaConfig::default()
        };
        assert_eq!(radio.begin(&config), Err(Error::InvalidGain));
        assert_eq!(radio.state(), State::Uninitialized);
    }

    #[test]
    fn gain_failure_can_be_tolerated() {
        let mut radio: Radio = radio(0x12);
        let config = LoRaConfig {
            gain: 7,
            gain_policy: GainPolicy::Tolerate,
            ..LoRaConfig::default()
        };
        radio.begin(&config).unwrap();
        assert_eq!(radio.state(), State::Idle);
        assert_eq!(radio.gain_fault(), Some(&Error::InvalidGain));

        radio.begin(&LoRaConfig::default()).unwrap();
        assert_eq!(radio.gain_fault(), None);
    }

    #[test]
    fn begin_fsk_applies_defaults() {
        let mut radio = fsk_radio();
        assert_eq!(radio.modem(), Some(Modem::Fsk));

        let chip = radio.transport_mut();
        // FSK modulation, standby
        assert_eq!(chip.reg(0x01) & 0xE7, 0x01);
        // 48 kbps
        assert_eq!([chip.reg(0x02), chip.reg(0x03)], [0x02, 0x9A]);
        // 50 kHz deviation
        assert_eq!([chip.reg(0x04), chip.reg(0x05)], [0x03, 0x33]);
        // 125 kHz receiver and AFC bandwidth
        assert_eq!([chip.reg(0x12), chip.reg(0x13)], [0x02, 0x02]);
        assert_eq!([chip.reg(0x25), chip.reg(0x26)], [0x00, 0x10]);
        assert_eq!(chip.reg(0x27), 0x11);
        assert_eq!([chip.reg(0x28), chip.reg(0x29)], [0x2D, 0x01]);
        assert_eq!(chip.reg(0x30), 0x90);
        assert_eq!(chip.reg(0x32), 63);
        assert_eq!(chip.reg(0x0A) & 0x60, 0x60);
        // 13 dBm on PA_BOOST
        assert_eq!(chip.reg(0x09), 0xFB);
        assert_eq!(chip.reg(0x0D), 0x0E);
    }

    #[test]
    fn ook_limits_bit_rate() {
        let mut radio = fsk_radio();
        radio.set_ook(true).unwrap();
        assert_eq!(radio.transport_mut().reg(0x01) & 0x60, 0x20);
        assert_eq!(radio.set_bit_rate(48.0), Err(Error::InvalidBitRate));
        radio.set_bit_rate(32.768).unwrap();
    }

    #[test]
    fn bit_rate_respects_current_deviation() {
        let mut radio = fsk_radio();
        radio.set_frequency_deviation(200.0).unwrap();
        radio.transport_mut().writes.clear();

        assert_eq!(radio.set_bit_rate(300.0), Err(Error::InvalidBitRate));
        assert!(radio.transport_mut().writes.is_empty());

        // 200 + 100 / 2 sits on the limit
        radio.set_bit_rate(100.0).unwrap();
        radio.set_frequency_deviation(50.0).unwrap();
        radio.set_bit_rate(300.0).unwrap();
    }

    #[test]
    fn fsk_crc_toggles_packet_config() {
        let mut radio = fsk_radio();
        radio.set_crc(false).unwrap();
        assert_eq!(radio.transport_mut().reg(0x30), 0x80);
        radio.set_crc(true).unwrap();
        assert_eq!(radio.transport_mut().reg(0x30), 0x90);
    }

    #[test]
    fn transport_errors_pass_through() {
        let mut radio = lora_radio();
        radio.transport_mut().fail_after_writes = Some(0);
        assert_eq!(
            radio.set_frequency(434.0),
            Err(Error::Transport(crate::mock::BusFault))
        );
    }

    #[test]
    fn sleep_and_standby_need_bring_up() {
        let mut radio: Radio = radio(0x12);
        assert_eq!(radio.standby(), Err(Error::NotInitialized));

        let mut radio = lora_radio();
        radio.sleep().unwrap();
        assert_eq!(radio.transport_mut().reg(0x01) & 0x07, 0x00);
        radio.standby().unwrap();
        assert_eq!(radio.transport_mut().reg(0x01) & 0x07, 0x01);
    }
}
