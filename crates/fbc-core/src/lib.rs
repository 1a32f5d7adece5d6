#![no_std]
#[cfg(feature = "std")]
extern crate std;

mod addr;
mod config;

pub use addr::{AddressTranslator, BlockLocation};
pub use config::{FlashConfig, VerifyPolicy};

/// Value of every byte in a freshly erased sector.
pub const ERASED_BYTE: u8 = 0xFF;

pub type FbcResult<T> = Result<T, FbcError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbcError {
    /// Geometry rejected by `FlashConfig::validate`.
    InvalidConfig,
    /// Block range runs past the end of the partition.
    OutOfRange,
    /// Caller buffer is shorter than `count * block_size`.
    BufferLength,
    /// The device did not accept an erase/program, or read-back disagreed.
    FlashWriteFailed { addr: u32 },
    /// Status register stayed busy past the configured poll limit.
    DeviceTimeout,
    HalError,
}

impl core::fmt::Display for FbcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FbcError {}
