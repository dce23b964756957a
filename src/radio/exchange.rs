//! Packet exchange
//!
//! Blocking transmit and receive with a bounded wait, plus the non-blocking building blocks
//! they are made of. The blocking calls poll the IRQ flags with the handle's delay provider,
//! so a slow bus only lengthens each poll, never the timeout accounting.
//!
//! State transitions:
//! - `transmit`: Idle -> Transmitting -> Idle
//! - `receive`: Idle -> Listening -> Idle
//! - `start_transmit` / `start_receive` leave the handle Transmitting / Listening until
//!   [`check_irq`](Sx127x::check_irq), [`read_data`](Sx127x::read_data) or
//!   [`standby`](Sx127x::standby) bring it back to Idle.
//!
//! Every failed or timed-out exchange clears the IRQ flags and parks the chip in standby,
//! so the next call starts from the same place as the first one. A bus error while an
//! exchange is in flight still returns the handle to Idle.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use super::{Modem, State, Sx127x, SYMBOL_TIMEOUT};
use crate::error::Error;
use crate::registers::{fsk, lora, Mode};
use crate::retry::{self, RetryPolicy};
use crate::transport::RegisterTransport;
use crate::variant::Variant;

/// Interval between two IRQ polls
const POLL_INTERVAL_US: u32 = 100;

/// Fixed part of the FSK timeouts
const FSK_TIMEOUT_MARGIN_US: u64 = 5_000;

/// CAD guard window in symbols
const CAD_TIMEOUT_SYMBOLS: u64 = 16;

/// Completion reported by [`Sx127x::check_irq`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The packet started with `start_transmit` has been sent
    TxDone,
    /// A packet is waiting to be fetched with `read_data`
    RxDone,
    /// The receiver window closed without a packet
    RxTimeout,
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl<T, D, V> Sx127x<T, D, V>
where
    T: RegisterTransport,
    D: DelayNs,
    V: Variant,
{
    /// Airtime of a packet of `len` payload bytes with the current settings
    ///
    /// LoRa includes the preamble, the explicit header if enabled and the payload CRC.
    /// FSK/OOK includes preamble, sync word, length byte and CRC.
    pub fn time_on_air(&self, len: usize) -> Duration {
        Duration::from_micros(self.time_on_air_us(len))
    }

    fn time_on_air_us(&self, len: usize) -> u64 {
        let s = &self.settings;
        match self.modem {
            Modem::LoRa => {
                let sf = s.spreading_factor as i64;
                let crc = s.crc as i64;
                let ih = s.implicit_header as i64;
                let de = s.low_data_rate_optimize as i64;
                let cr = s.coding_rate.denominator() as i64;

                let bits = 8 * len as i64 - 4 * sf + 28 + 16 * crc - 20 * ih;
                let per_block = 4 * (sf - 2 * de);
                let payload_symbols = if bits > 0 {
                    8 + (bits + per_block - 1) / per_block * cr
                } else {
                    8
                };

                // Preamble carries 4.25 extra symbols; count in quarter symbols
                let quarter_symbols = 4 * (s.preamble_length as u64 + payload_symbols as u64) + 17;
                (1u64 << s.spreading_factor) * 1_000_000 * quarter_symbols
                    / (4 * s.bandwidth.hz() as u64)
            }
            Modem::Fsk => {
                let crc_bytes = if s.crc { 2 } else { 0 };
                let bytes = s.preamble_length as u64
                    + s.sync_word_len as u64
                    + 1
                    + len as u64
                    + crc_bytes;
                let bit_rate_bps = (s.bit_rate * 1000.0) as u64;
                bytes * 8 * 1_000_000 / bit_rate_bps.max(1)
            }
        }
    }

    fn max_packet_len(&self) -> usize {
        match self.modem {
            Modem::LoRa => V::DESCRIPTOR.lora_max_packet,
            Modem::Fsk => V::DESCRIPTOR.fsk_max_packet,
        }
    }

    /// LoRa: 150 % of the airtime. FSK: 5 ms plus 500 % of the airtime.
    fn tx_timeout_us(&self, len: usize) -> u64 {
        let airtime = self.time_on_air_us(len);
        match self.modem {
            Modem::LoRa => airtime * 3 / 2,
            Modem::Fsk => FSK_TIMEOUT_MARGIN_US + airtime * 5,
        }
    }

    /// Long enough for a maximum-length packet to start arriving and complete
    fn default_rx_timeout_us(&self) -> u64 {
        let max_len = self.max_packet_len();
        match self.modem {
            Modem::LoRa => {
                self.settings.symbol_us() * SYMBOL_TIMEOUT as u64 + self.tx_timeout_us(max_len)
            }
            Modem::Fsk => self.tx_timeout_us(max_len),
        }
    }

    fn check_length(&self, len: usize) -> Result<(), Error<T::Error>> {
        if len > self.max_packet_len() {
            return Err(Error::PacketTooLong);
        }
        Ok(())
    }

    /// Transmits a packet and waits for it to leave the antenna
    ///
    /// # Errors
    /// * `PacketTooLong` - more than 255 (LoRa) or 63 (FSK/OOK) bytes; nothing is written
    /// * `TxTimeout` - TxDone/PacketSent did not rise in time
    pub fn transmit(&mut self, data: &[u8]) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.check_length(data.len())?;

        let timeout_us = self.tx_timeout_us(data.len());
        self.start_transmit(data)?;
        let waited = self.wait_for(timeout_us, |radio| radio.tx_done());
        let sent = self.abandon_on_error(waited)?;

        self.finish_exchange()?;
        if sent {
            trace!("sent {} bytes", data.len());
            Ok(())
        } else {
            warn!("transmit timed out after {} us", timeout_us);
            Err(Error::TxTimeout)
        }
    }

    /// Loads a packet and starts transmitting it without waiting
    ///
    /// Completion is reported by [`check_irq`](Self::check_irq) as [`Event::TxDone`].
    pub fn start_transmit(&mut self, data: &[u8]) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.check_length(data.len())?;

        self.set_mode(Mode::Standby)?;
        match self.modem {
            Modem::LoRa => {
                self.map_dio(lora::DIO0_TX_DONE, None)?;
                self.clear_irq()?;
                self.write(lora::PayloadLength {
                    value: data.len() as u8,
                })?;
                self.write(lora::FifoTxBaseAddr { value: 0 })?;
                self.write(lora::FifoAddrPtr { value: 0 })?;
            }
            Modem::Fsk => {
                self.map_dio(fsk::DIO0_PACKET, None)?;
                self.clear_irq()?;
                self.transport
                    .write_fifo(&[data.len() as u8])
                    .map_err(Error::Transport)?;
            }
        }
        self.transport.write_fifo(data).map_err(Error::Transport)?;

        self.set_mode(Mode::Tx)?;
        self.state = State::Transmitting;
        Ok(())
    }

    /// Waits for one packet and copies it into `buf`
    ///
    /// Returns the number of bytes copied; a packet longer than `buf` is truncated.
    /// With `timeout` set to `None` the wait covers one maximum-length packet.
    ///
    /// # Errors
    /// * `RxTimeout` - nothing arrived in time; the receiver is disarmed and the next call
    ///   starts over
    /// * `CrcMismatch` - a packet arrived with a bad payload CRC
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, Error<T::Error>> {
        self.ensure_idle()?;
        let timeout_us = match timeout {
            Some(timeout) => duration_us(timeout),
            None => self.default_rx_timeout_us(),
        };

        self.arm_receiver(true)?;
        let waited = self.wait_for(timeout_us, |radio| radio.rx_done());
        if self.abandon_on_error(waited)? {
            return self.read_data(buf);
        }

        self.finish_exchange()?;
        trace!("no packet within {} us", timeout_us);
        Err(Error::RxTimeout)
    }

    /// [`receive`](Self::receive) retried on timeout according to `policy`
    ///
    /// The pause between attempts uses the handle's own delay provider.
    pub fn receive_retrying(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
        policy: &RetryPolicy,
    ) -> Result<usize, Error<T::Error>> {
        retry::retry_with(
            policy,
            self,
            |radio, us| radio.delay.delay_us(us),
            |radio| radio.receive(buf, timeout),
        )
    }

    /// Arms the receiver in continuous mode without waiting
    ///
    /// Arrival is reported by [`check_irq`](Self::check_irq) as [`Event::RxDone`]; the packet
    /// is then fetched with [`read_data`](Self::read_data).
    pub fn start_receive(&mut self) -> Result<(), Error<T::Error>> {
        self.ensure_idle()?;
        self.arm_receiver(false)
    }

    /// Polls for completion of a non-blocking transmit or receive
    ///
    /// Returns `None` while nothing has happened (or nothing is in flight).
    pub fn check_irq(&mut self) -> Result<Option<Event>, Error<T::Error>> {
        let polled = self.poll_irq();
        self.abandon_on_error(polled)
    }

    fn poll_irq(&mut self) -> Result<Option<Event>, Error<T::Error>> {
        match self.state {
            State::Uninitialized => Err(Error::NotInitialized),
            State::Idle => Ok(None),
            State::Transmitting => {
                if self.tx_done()? {
                    self.finish_exchange()?;
                    Ok(Some(Event::TxDone))
                } else {
                    Ok(None)
                }
            }
            State::Listening => match self.modem {
                Modem::LoRa => {
                    let irq = self.read::<lora::RegIrqFlags>()?.flags;
                    if irq.contains(lora::IrqFlags::RX_DONE) {
                        Ok(Some(Event::RxDone))
                    } else if irq.contains(lora::IrqFlags::RX_TIMEOUT) {
                        self.finish_exchange()?;
                        Ok(Some(Event::RxTimeout))
                    } else {
                        Ok(None)
                    }
                }
                Modem::Fsk => {
                    if self.rx_done()? {
                        Ok(Some(Event::RxDone))
                    } else {
                        Ok(None)
                    }
                }
            },
        }
    }

    /// Copies the last received packet into `buf` and returns the chip to standby
    ///
    /// Returns the number of bytes copied; a packet longer than `buf` is truncated.
    ///
    /// # Errors
    /// * `CrcMismatch` - the LoRa payload CRC check failed
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, Error<T::Error>> {
        match self.state {
            State::Uninitialized => return Err(Error::NotInitialized),
            State::Transmitting => return Err(Error::Busy),
            State::Idle | State::Listening => {}
        }

        let result = match self.modem {
            Modem::LoRa => self.read_lora_packet(buf),
            Modem::Fsk => self.read_fsk_packet(buf),
        };
        self.finish_exchange()?;
        if let Ok(len) = result {
            trace!("received {} bytes", len);
        }
        result
    }

    fn read_lora_packet(&mut self, buf: &mut [u8]) -> Result<usize, Error<T::Error>> {
        let irq = self.read::<lora::RegIrqFlags>()?.flags;
        if irq.contains(lora::IrqFlags::PAYLOAD_CRC_ERROR) {
            warn!("dropping packet with bad CRC");
            return Err(Error::CrcMismatch);
        }

        let len = if self.settings.implicit_header {
            self.read::<lora::PayloadLength>()?.value
        } else {
            self.read::<lora::RxNbBytes>()?.value
        } as usize;
        let start = self.read::<lora::FifoRxCurrentAddr>()?.value;
        self.write(lora::FifoAddrPtr { value: start })?;

        let copied = len.min(buf.len());
        self.transport
            .read_fifo(&mut buf[..copied])
            .map_err(Error::Transport)?;
        Ok(copied)
    }

    fn read_fsk_packet(&mut self, buf: &mut [u8]) -> Result<usize, Error<T::Error>> {
        let mut len = [0u8];
        self.transport
            .read_fifo(&mut len)
            .map_err(Error::Transport)?;
        let len = len[0] as usize;

        let copied = len.min(buf.len());
        self.transport
            .read_fifo(&mut buf[..copied])
            .map_err(Error::Transport)?;

        // Drain what did not fit so the FIFO starts empty next time
        let mut scratch = [0u8];
        for _ in copied..len {
            self.transport
                .read_fifo(&mut scratch)
                .map_err(Error::Transport)?;
        }
        Ok(copied)
    }

    /// Runs one channel activity detection and reports whether a LoRa preamble was heard
    ///
    /// # Errors
    /// * `WrongModem` - the FSK/OOK modem is active
    /// * `RxTimeout` - CadDone never rose
    pub fn scan_channel(&mut self) -> Result<bool, Error<T::Error>> {
        self.ensure_idle()?;
        self.ensure_modem(Modem::LoRa)?;

        self.set_mode(Mode::Standby)?;
        self.map_dio(lora::DIO0_CAD_DONE, Some(lora::DIO1_CAD_DETECTED))?;
        self.clear_irq()?;
        self.set_mode(Mode::Cad)?;
        self.state = State::Listening;

        let scanned = self.wait_for_cad();
        let detected = self.abandon_on_error(scanned)?;

        self.finish_exchange()?;
        match detected {
            Some(detected) => {
                debug!("channel activity: {}", detected);
                Ok(detected)
            }
            None => Err(Error::RxTimeout),
        }
    }

    /// `None` if CadDone never rose, otherwise whether activity was detected
    fn wait_for_cad(&mut self) -> Result<Option<bool>, Error<T::Error>> {
        let timeout_us = self.settings.symbol_us() * CAD_TIMEOUT_SYMBOLS;
        let done = self.wait_for(timeout_us, |radio| {
            let irq = radio.read::<lora::RegIrqFlags>()?.flags;
            Ok(irq.contains(lora::IrqFlags::CAD_DONE))
        })?;
        if !done {
            return Ok(None);
        }
        let irq = self.read::<lora::RegIrqFlags>()?.flags;
        Ok(Some(irq.contains(lora::IrqFlags::CAD_DETECTED)))
    }

    /// RSSI in dBm: of the last packet in LoRa mode, the current channel RSSI in FSK/OOK
    pub fn rssi(&mut self) -> Result<f32, Error<T::Error>> {
        self.ensure_initialized()?;
        match self.modem {
            Modem::LoRa => {
                // Separate offsets for the LF (below 779 MHz) and HF ports
                let offset = if self.settings.frequency < 779.0 {
                    -164.0
                } else {
                    -157.0
                };
                let raw = self.read::<lora::PktRssiValue>()?.value as f32;
                let snr = self.snr()?;
                let rssi = offset + raw;
                Ok(if snr < 0.0 { rssi + snr } else { rssi })
            }
            Modem::Fsk => {
                let raw = self.read::<fsk::RssiValue>()?.value as f32;
                Ok(-raw / 2.0)
            }
        }
    }

    /// SNR of the last LoRa packet in dB
    pub fn snr(&mut self) -> Result<f32, Error<T::Error>> {
        self.ensure_initialized()?;
        self.ensure_modem(Modem::LoRa)?;
        let raw = self.read::<lora::PktSnrValue>()?.quarter_db;
        Ok(raw as f32 / 4.0)
    }

    fn arm_receiver(&mut self, single: bool) -> Result<(), Error<T::Error>> {
        self.set_mode(Mode::Standby)?;
        let mode = match self.modem {
            Modem::LoRa => {
                self.map_dio(lora::DIO0_RX_DONE, Some(lora::DIO1_RX_TIMEOUT))?;
                self.clear_irq()?;
                self.write(lora::FifoRxBaseAddr { value: 0 })?;
                self.write(lora::FifoAddrPtr { value: 0 })?;
                if single {
                    Mode::RxSingle
                } else {
                    Mode::RxContinuous
                }
            }
            Modem::Fsk => {
                self.map_dio(fsk::DIO0_PACKET, None)?;
                self.clear_irq()?;
                Mode::RxContinuous
            }
        };
        self.set_mode(mode)?;
        self.state = State::Listening;
        Ok(())
    }

    fn tx_done(&mut self) -> Result<bool, Error<T::Error>> {
        Ok(match self.modem {
            Modem::LoRa => self
                .read::<lora::RegIrqFlags>()?
                .flags
                .contains(lora::IrqFlags::TX_DONE),
            Modem::Fsk => self
                .read::<fsk::RegIrqFlags>()?
                .flags2
                .contains(fsk::IrqFlags2::PACKET_SENT),
        })
    }

    /// Packet ready to be read. A LoRa RxSingle window that closes early is reopened.
    fn rx_done(&mut self) -> Result<bool, Error<T::Error>> {
        match self.modem {
            Modem::LoRa => {
                let irq = self.read::<lora::RegIrqFlags>()?.flags;
                if irq.contains(lora::IrqFlags::RX_DONE) {
                    return Ok(true);
                }
                if irq.contains(lora::IrqFlags::RX_TIMEOUT) {
                    self.clear_irq()?;
                    self.set_mode(Mode::RxSingle)?;
                }
                Ok(false)
            }
            Modem::Fsk => Ok(self
                .read::<fsk::RegIrqFlags>()?
                .flags2
                .contains(fsk::IrqFlags2::PAYLOAD_READY)),
        }
    }

    /// Returns to Idle, clears IRQ flags and parks the chip in standby
    fn finish_exchange(&mut self) -> Result<(), Error<T::Error>> {
        self.state = State::Idle;
        self.clear_irq()?;
        self.set_mode(Mode::Standby)
    }

    /// Drops an in-flight exchange when `result` is an error, passing the error through
    ///
    /// The chip gets one standby request; if the bus refuses that too, only the handle
    /// state changes.
    fn abandon_on_error<R>(
        &mut self,
        result: Result<R, Error<T::Error>>,
    ) -> Result<R, Error<T::Error>> {
        if result.is_err() && matches!(self.state, State::Transmitting | State::Listening) {
            warn!("abandoning {:?} exchange", self.state);
            if self.set_mode(Mode::Standby).is_err() {
                debug!("standby request failed too");
            }
            self.state = State::Idle;
        }
        result
    }

    /// Polls `done` until it returns true or `timeout_us` has elapsed
    fn wait_for<F>(&mut self, timeout_us: u64, mut done: F) -> Result<bool, Error<T::Error>>
    where
        F: FnMut(&mut Self) -> Result<bool, Error<T::Error>>,
    {
        let mut elapsed_us = 0u64;
        loop {
            if done(self)? {
                return Ok(true);
            }
            if elapsed_us >= timeout_us {
                return Ok(false);
            }
            self.delay.delay_us(POLL_INTERVAL_US);
            elapsed_us += POLL_INTERVAL_US as u64;
        }
    }
}
