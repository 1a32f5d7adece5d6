#![no_std]
#![forbid(unsafe_code)]

use fbc_core::{FbcError, FbcResult};

/// Status register 1 of a SPI NOR part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashStatus(pub u8);

impl FlashStatus {
    /// Erase or program in progress.
    pub const BUSY: u8 = 0x01;
    /// Write-enable latch. Set by `write_enable`, cleared when a command completes.
    pub const WEL: u8 = 0x02;

    pub fn is_busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    pub fn write_enabled(self) -> bool {
        self.0 & Self::WEL != 0
    }
}

/// Raw flash primitives (downward interface).
///
/// Every call blocks until the command has been issued. Erase and program
/// return as soon as the part has accepted the command; completion is
/// observed through `read_status` / `poll_idle`.
/// INVARIANT: `write_enable` must precede each erase and program.
pub trait RawFlashPort {
    fn read_status(&mut self) -> FbcResult<FlashStatus>;

    fn read_unique_id(&mut self) -> FbcResult<u64>;

    fn write_enable(&mut self) -> FbcResult<()>;

    /// Reset the sector containing `addr` to all-ones.
    fn erase_sector(&mut self, addr: u32) -> FbcResult<()>;

    /// Program one page. `addr` is page aligned, `page` is exactly one page long.
    fn program_page(&mut self, addr: u32, page: &[u8]) -> FbcResult<()>;

    /// Copy committed content out of the mapped window.
    fn read_at(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()>;

    /// Read the array itself, bypassing any cache in front of the mapped
    /// window. Ports without such a cache keep the default.
    fn read_device(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        self.read_at(addr, dest)
    }

    /// Force the mapped window to show `data` at `addr` after a program.
    /// Parts whose window is always coherent keep the default.
    fn patch_mapped(&mut self, _addr: u32, _data: &[u8]) -> FbcResult<()> {
        Ok(())
    }

    /// One status read. `WouldBlock` while the part is busy.
    fn poll_idle(&mut self) -> nb::Result<FlashStatus, FbcError> {
        let status = self.read_status().map_err(nb::Error::Other)?;
        if status.is_busy() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(status)
        }
    }
}

impl<P: RawFlashPort + ?Sized> RawFlashPort for &mut P {
    fn read_status(&mut self) -> FbcResult<FlashStatus> {
        (**self).read_status()
    }
    fn read_unique_id(&mut self) -> FbcResult<u64> {
        (**self).read_unique_id()
    }
    fn write_enable(&mut self) -> FbcResult<()> {
        (**self).write_enable()
    }
    fn erase_sector(&mut self, addr: u32) -> FbcResult<()> {
        (**self).erase_sector(addr)
    }
    fn program_page(&mut self, addr: u32, page: &[u8]) -> FbcResult<()> {
        (**self).program_page(addr, page)
    }
    fn read_at(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        (**self).read_at(addr, dest)
    }
    fn read_device(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        (**self).read_device(addr, dest)
    }
    fn patch_mapped(&mut self, addr: u32, data: &[u8]) -> FbcResult<()> {
        (**self).patch_mapped(addr, data)
    }
    fn poll_idle(&mut self) -> nb::Result<FlashStatus, FbcError> {
        (**self).poll_idle()
    }
}

/// What the filesystem client sees (upward interface).
///
/// Block numbers and counts are in units of `block_size()`; callers must
/// stay below `block_count()`.
/// PRECONDITION: one caller at a time. `&mut self` carries that contract.
pub trait BlockDevice {
    fn block_size(&self) -> u32;

    fn block_count(&self) -> u32;

    fn init(&mut self) -> FbcResult<()>;

    /// Fill `dest[..count * block_size]`, observing every earlier write.
    fn read_blocks(&mut self, dest: &mut [u8], start: u32, count: u32) -> FbcResult<()>;

    /// Accept `src[..count * block_size]`. Durable only after `flush`.
    fn write_blocks(&mut self, src: &[u8], start: u32, count: u32) -> FbcResult<()>;

    fn flush(&mut self) -> FbcResult<()>;

    fn release_cache(&mut self);
}
