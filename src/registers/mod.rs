//! Register definitions for the SX127x radio
//! Generated from the SX1276/77/78/79 datasheet (rev. 7)
//!
//! Registers 0x00-0x0C and 0x40-0x4D are shared by both modems and live in [`common`].
//! The 0x0D-0x3F window is banked: its layout depends on the LongRangeMode bit of
//! [`OpMode`], so the LoRa and FSK/OOK views are kept in separate modules.

mod common;
pub mod fsk;
pub mod lora;

pub use common::*;

/// Declares a register holding a single unstructured byte.
macro_rules! byte_register {
    ($(#[$meta:meta])* $name:ident, $id:tt) => {
        $(#[$meta])*
        #[regiface::register($id)]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Default,
            regiface::ReadableRegister,
            regiface::WritableRegister,
        )]
        pub struct $name {
            /// Raw register value
            pub value: u8,
        }

        impl regiface::FromByteArray for $name {
            type Error = core::convert::Infallible;
            type Array = [u8; 1];

            fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
                Ok(Self { value: bytes[0] })
            }
        }

        impl regiface::ToByteArray for $name {
            type Error = core::convert::Infallible;
            type Array = [u8; 1];

            fn to_bytes(self) -> Result<Self::Array, Self::Error> {
                Ok([self.value])
            }
        }
    };
}

pub(crate) use byte_register;
