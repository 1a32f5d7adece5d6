use log::warn;

use fbc_core::{FbcError, FbcResult, FlashConfig, VerifyPolicy};
use fbc_hal::{FlashStatus, RawFlashPort};

/// Spin on the status register, bounded by `limit` reads.
pub(crate) fn wait_idle<P: RawFlashPort>(port: &mut P, limit: u32) -> FbcResult<FlashStatus> {
    for _ in 0..limit {
        match port.poll_idle() {
            Ok(status) => return Ok(status),
            Err(nb::Error::WouldBlock) => continue,
            Err(nb::Error::Other(e)) => return Err(e),
        }
    }
    Err(FbcError::DeviceTimeout)
}

pub(crate) fn erase_sector<P: RawFlashPort>(
    port: &mut P,
    addr: u32,
    config: &FlashConfig,
) -> FbcResult<()> {
    port.write_enable()?;
    port.erase_sector(addr)?;
    settle(port, addr, config)
}

pub(crate) fn program_page<P: RawFlashPort>(
    port: &mut P,
    addr: u32,
    page: &[u8],
    config: &FlashConfig,
) -> FbcResult<()> {
    port.write_enable()?;
    port.program_page(addr, page)?;
    settle(port, addr, config)
}

// A part that refuses a command (protected range, bad state) leaves the
// write-enable latch set once it goes idle.
fn settle<P: RawFlashPort>(port: &mut P, addr: u32, config: &FlashConfig) -> FbcResult<()> {
    let status = wait_idle(port, config.busy_poll_limit)?;
    if config.verify != VerifyPolicy::None && status.write_enabled() {
        warn!("[FLASH] command at {:#x} rejected (status {:#04x})", addr, status.0);
        return Err(FbcError::FlashWriteFailed { addr });
    }
    Ok(())
}
