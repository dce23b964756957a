//! SX127x Register Transport
//!
//! The driver never talks to the bus directly. Every register access goes through a
//! [`RegisterTransport`], which only has to provide three primitives:
//! - [`read_register`](RegisterTransport::read_register)
//! - [`write_register`](RegisterTransport::write_register)
//! - [`set_register_bits`](RegisterTransport::set_register_bits)
//!
//! Burst and FIFO access are provided on top of these and can be overridden when the
//! bus supports multi-byte transactions.
//!
//! [`SpiTransport`] implements the trait for any `embedded_hal::spi::SpiDevice`, using the
//! SX127x framing: the first byte is the register address with bit 7 set for writes and
//! cleared for reads, followed by one or more data bytes. Consecutive data bytes address
//! consecutive registers, except for the FIFO which keeps its address.
//!
//! # Example
//! ```no_run
//! use sx127x::{RegisterTransport, SpiTransport};
//!
//! fn version<SPI: embedded_hal::spi::SpiDevice>(spi: SPI) -> Result<u8, SPI::Error> {
//!     let mut transport = SpiTransport::new(spi);
//!     transport.read_register(0x42)
//! }
//! ```

use embedded_hal::spi::{Operation, SpiDevice};

/// Address of the FIFO data register
pub const FIFO_ADDRESS: u8 = 0x00;

const WRITE_FLAG: u8 = 0x80;

/// Synchronous access to the chip's register map.
///
/// Implementations are exclusively owned by a single radio handle. Multi-register
/// configuration sequences are not atomic, so a transport must not be shared between
/// handles without external locking.
pub trait RegisterTransport {
    /// Bus-level error
    type Error;

    /// Reads a single register
    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error>;

    /// Writes a single register
    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error>;

    /// Replaces the bits selected by `mask` with the corresponding bits of `value`,
    /// leaving the rest of the register untouched.
    fn set_register_bits(&mut self, address: u8, value: u8, mask: u8) -> Result<(), Self::Error> {
        let current = self.read_register(address)?;
        self.write_register(address, (current & !mask) | (value & mask))
    }

    /// Reads consecutive registers starting at `address`
    fn read_burst(&mut self, address: u8, bytes: &mut [u8]) -> Result<(), Self::Error> {
        for (offset, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_register(address.wrapping_add(offset as u8))?;
        }
        Ok(())
    }

    /// Writes consecutive registers starting at `address`
    fn write_burst(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        for (offset, byte) in bytes.iter().enumerate() {
            self.write_register(address.wrapping_add(offset as u8), *byte)?;
        }
        Ok(())
    }

    /// Reads `bytes.len()` bytes out of the FIFO
    fn read_fifo(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        for byte in bytes.iter_mut() {
            *byte = self.read_register(FIFO_ADDRESS)?;
        }
        Ok(())
    }

    /// Pushes `bytes` into the FIFO
    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for byte in bytes {
            self.write_register(FIFO_ADDRESS, *byte)?;
        }
        Ok(())
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &mut T {
    type Error = T::Error;

    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error> {
        T::read_register(self, address)
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        T::write_register(self, address, value)
    }

    fn set_register_bits(&mut self, address: u8, value: u8, mask: u8) -> Result<(), Self::Error> {
        T::set_register_bits(self, address, value, mask)
    }

    fn read_burst(&mut self, address: u8, bytes: &mut [u8]) -> Result<(), Self::Error> {
        T::read_burst(self, address, bytes)
    }

    fn write_burst(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_burst(self, address, bytes)
    }

    fn read_fifo(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        T::read_fifo(self, bytes)
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_fifo(self, bytes)
    }
}

/// Register transport over an SPI device.
///
/// Chip select is handled by the `SpiDevice` implementation. Burst and FIFO access
/// are issued as single SPI transactions.
pub struct SpiTransport<SPI> {
    spi: SPI,
}

impl<SPI> SpiTransport<SPI> {
    /// Creates a new transport wrapping the provided SPI device.
    ///
    /// # Arguments
    /// * `spi` - An SPI device implementing the embedded-hal traits
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Releases the underlying SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> RegisterTransport for SpiTransport<SPI>
where
    SPI: SpiDevice,
{
    type Error = SPI::Error;

    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8];
        self.read_burst(address, &mut value)?;
        Ok(value[0])
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        self.write_burst(address, &[value])
    }

    fn read_burst(&mut self, address: u8, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            Operation::Write(&[address & !WRITE_FLAG]),
            Operation::Read(bytes),
        ])
    }

    fn write_burst(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            Operation::Write(&[address | WRITE_FLAG]),
            Operation::Write(bytes),
        ])
    }

    fn read_fifo(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_burst(FIFO_ADDRESS, bytes)
    }

    fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write_burst(FIFO_ADDRESS, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
    use std::vec;

    #[test]
    fn read_clears_write_flag() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x42),
            SpiTransaction::read(0x12),
            SpiTransaction::transaction_end(),
        ];
        let mut transport = SpiTransport::new(SpiMock::new(&expectations));

        assert_eq!(transport.read_register(0x42).unwrap(), 0x12);

        transport.release().done();
    }

    #[test]
    fn write_sets_write_flag() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x81),
            SpiTransaction::write(0x81),
            SpiTransaction::transaction_end(),
        ];
        let mut transport = SpiTransport::new(SpiMock::new(&expectations));

        transport.write_register(0x01, 0x81).unwrap();

        transport.release().done();
    }

    #[test]
    fn set_bits_reads_then_writes() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x01),
            SpiTransaction::read(0x89),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x81),
            SpiTransaction::write(0x83),
            SpiTransaction::transaction_end(),
        ];
        let mut transport = SpiTransport::new(SpiMock::new(&expectations));

        transport.set_register_bits(0x01, 0x03, 0x07).unwrap();

        transport.release().done();
    }

    #[test]
    fn fifo_is_one_transaction() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x80),
            SpiTransaction::write_vec(vec![0x01, 0x02, 0x03]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write(0x00),
            SpiTransaction::read_vec(vec![0xAA, 0xBB]),
            SpiTransaction::transaction_end(),
        ];
        let mut transport = SpiTransport::new(SpiMock::new(&expectations));

        transport.write_fifo(&[0x01, 0x02, 0x03]).unwrap();
        let mut rx = [0u8; 2];
        transport.read_fifo(&mut rx).unwrap();
        assert_eq!(rx, [0xAA, 0xBB]);

        transport.release().done();
    }
}
