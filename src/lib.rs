#![cfg_attr(not(test), no_std)]
//! SX127x Radio Driver
//!
//! This crate provides a type-safe interface for the Semtech SX1276/77/78/79 sub-GHz radio
//! transceivers and the HopeRF RFM95/96/97 modules built on them. All members of the family
//! share one die and one register map; they differ in the band they are specified for and
//! in the spreading factors they accept.
//!
//! # Features
//! - Frequency range: 137-1020 MHz (variant dependent)
//! - Modulation support:
//!   - LoRa: SF6-12, BW 7.8-500kHz, CR 4/5-4/8
//!   - FSK/OOK: BR 1.2-300kbps (OOK up to 32.768kbps)
//! - Output power: -3 to +17 dBm, +20 dBm on PA_BOOST
//! - Blocking and polled transmit/receive, channel activity detection
//!
//! # Architecture
//! The driver is organized into several modules:
//!
//! - [`radio`]: The [`Sx127x`] handle
//!   - Bring-up sequences for both modems
//!   - Validated setters for every radio parameter
//!   - Packet exchange with timeouts
//!
//! - [`registers`]: Register definitions for direct hardware access
//!   - Shared registers (operating mode, frequency, PA, LNA, DIO mapping)
//!   - [`registers::lora`]: LoRa view of the banked registers
//!   - [`registers::fsk`]: FSK/OOK view of the banked registers
//!
//! - [`transport`]: Register access abstraction and its SPI implementation
//! - [`variant`]: Per-chip constants and parameter checks
//! - [`validate`]: Parameter validation shared by all variants
//! - [`config`]: Bring-up settings
//! - [`retry`]: Caller-side retry on timeout
//!
//! # Usage
//! The handle is generic over the transport, a delay provider and the chip variant.
//! Configuration follows a specific sequence:
//!
//! 1. Wrap your SPI device in a [`SpiTransport`] (or implement [`RegisterTransport`])
//! 2. Create an [`Sx127x`] for your variant
//! 3. Call [`begin`](Sx127x::begin) or [`begin_fsk`](Sx127x::begin_fsk)
//! 4. Adjust individual parameters with the setters as needed
//! 5. [`transmit`](Sx127x::transmit) and [`receive`](Sx127x::receive)
//!
//! # Important Notes
//! - Every setter validates before it writes; a rejected value leaves the chip untouched
//! - The modem can only be switched by a new bring-up
//! - Timeouts are ordinary results; retrying is up to the caller
//! - The transport must not be shared with another handle
//!
//! # Example
//! ```no_run
//! use core::time::Duration;
//! use embedded_hal::{delay::DelayNs, spi::SpiDevice};
//! use sx127x::{Error, LoRaConfig, Rfm96, SpiTransport, Sx127x};
//!
//! fn ping<SPI: SpiDevice, D: DelayNs>(spi: SPI, delay: D) -> Result<(), Error<SPI::Error>> {
//!     let mut radio: Sx127x<_, _, Rfm96> = Sx127x::new(SpiTransport::new(spi), delay);
//!     radio.begin(&LoRaConfig::default())?;
//!
//!     radio.transmit(b"ping")?;
//!
//!     let mut buf = [0u8; 255];
//!     match radio.receive(&mut buf, Some(Duration::from_secs(1))) {
//!         Ok(len) => { /* handle &buf[..len] */ }
//!         Err(Error::RxTimeout) => { /* nobody answered */ }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod radio;
pub mod registers;
pub mod retry;
pub mod transport;
pub mod validate;
pub mod variant;

#[cfg(test)]
mod mock;

pub use config::{FskConfig, GainPolicy, LoRaConfig};
pub use error::Error;
pub use radio::{Event, Modem, State, Sx127x};
pub use retry::RetryPolicy;
pub use transport::{RegisterTransport, SpiTransport};
pub use variant::{Descriptor, Rfm95, Rfm96, Rfm97, Sx1276, Sx1277, Sx1278, Sx1279, Variant};
