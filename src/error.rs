//! Driver error type
//!
//! Every public operation on [`Sx127x`](crate::Sx127x) returns `Result<_, Error<E>>`
//! where `E` is the error type of the underlying [`RegisterTransport`](crate::RegisterTransport).
//!
//! Errors fall into four groups:
//! - Parameter errors (`Invalid*`, `PacketTooLong`, `WrongModem`): detected before any
//!   register is touched. The chip is left exactly as it was.
//! - Exchange outcomes (`TxTimeout`, `RxTimeout`, `CrcMismatch`): normal, recoverable
//!   results of a single transmit or receive attempt.
//! - State errors (`ChipVersionMismatch`, `NotInitialized`, `Busy`)
//! - Bus errors (`Transport`): passed through unchanged from the transport, never retried.

use core::fmt;

/// Errors returned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Carrier frequency outside the variant's band
    InvalidFrequency,
    /// LoRa bandwidth not one of the supported steps
    InvalidBandwidth,
    /// Spreading factor outside the variant's range
    InvalidSpreadingFactor,
    /// Coding rate denominator outside 5..=8
    InvalidCodingRate,
    /// FSK sync word empty, longer than 8 bytes or containing a zero byte
    InvalidSyncWord,
    /// Output power not available on this variant
    InvalidOutputPower,
    /// LNA gain step outside 0..=6
    InvalidGain,
    /// Over-current limit outside 45..=240 mA (and not 0)
    InvalidCurrentLimit,
    /// LoRa preamble shorter than 6 symbols
    InvalidPreambleLength,
    /// FSK/OOK bit rate out of range
    InvalidBitRate,
    /// FSK frequency deviation out of range for the configured bit rate
    InvalidFrequencyDeviation,
    /// FSK receiver bandwidth not representable by the mantissa/exponent table
    InvalidRxBandwidth,
    /// Gaussian filter BT not one of 0.0, 0.3, 0.5 or 1.0
    InvalidDataShaping,
    /// Operation not available with the active modem
    WrongModem,
    /// Payload longer than the active modem accepts
    PacketTooLong,
    /// Transmission did not complete in time
    TxTimeout,
    /// No packet arrived in time
    RxTimeout,
    /// A packet arrived but failed its CRC check
    CrcMismatch,
    /// Chip reported an unexpected version identifier during bring-up
    ChipVersionMismatch {
        /// Identifier the variant expects
        expected: u8,
        /// Identifier the chip reported
        found: u8,
    },
    /// Operation attempted before a successful `begin`
    NotInitialized,
    /// A non-blocking transmit or receive is still in flight
    Busy,
    /// Bus-level failure reported by the transport
    Transport(E),
}

impl<E> Error<E> {
    /// Returns true for the recoverable timeout outcomes of a single exchange attempt
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TxTimeout | Error::RxTimeout)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidFrequency => f.write_str("frequency outside of the supported band"),
            Error::InvalidBandwidth => f.write_str("unsupported LoRa bandwidth"),
            Error::InvalidSpreadingFactor => f.write_str("unsupported spreading factor"),
            Error::InvalidCodingRate => f.write_str("unsupported coding rate"),
            Error::InvalidSyncWord => f.write_str("invalid sync word"),
            Error::InvalidOutputPower => f.write_str("unsupported output power"),
            Error::InvalidGain => f.write_str("unsupported LNA gain"),
            Error::InvalidCurrentLimit => f.write_str("unsupported current limit"),
            Error::InvalidPreambleLength => f.write_str("preamble too short"),
            Error::InvalidBitRate => f.write_str("unsupported bit rate"),
            Error::InvalidFrequencyDeviation => f.write_str("unsupported frequency deviation"),
            Error::InvalidRxBandwidth => f.write_str("unsupported receiver bandwidth"),
            Error::InvalidDataShaping => f.write_str("unsupported data shaping"),
            Error::WrongModem => f.write_str("operation not available with the active modem"),
            Error::PacketTooLong => f.write_str("packet too long"),
            Error::TxTimeout => f.write_str("timed out while transmitting"),
            Error::RxTimeout => f.write_str("timed out while waiting for a packet"),
            Error::CrcMismatch => f.write_str("received packet failed CRC check"),
            Error::ChipVersionMismatch { expected, found } => write!(
                f,
                "chip version mismatch (expected {expected:#04x}, found {found:#04x})"
            ),
            Error::NotInitialized => f.write_str("radio not initialized"),
            Error::Busy => f.write_str("radio busy"),
            Error::Transport(e) => write!(f, "transport error: {e:?}"),
        }
    }
}
