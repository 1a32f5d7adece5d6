use fbc_core::{FbcError, FbcResult};
use fbc_hal::{FlashStatus, RawFlashPort};

/// Reports busy for a fixed number of status reads.
struct SlowPart {
    busy_reads: u32,
    status_reads: u32,
}

impl RawFlashPort for SlowPart {
    fn read_status(&mut self) -> FbcResult<FlashStatus> {
        self.status_reads += 1;
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            Ok(FlashStatus(FlashStatus::BUSY | FlashStatus::WEL))
        } else {
            Ok(FlashStatus(0))
        }
    }
    fn read_unique_id(&mut self) -> FbcResult<u64> { Ok(0xDEAD_BEEF) }
    fn write_enable(&mut self) -> FbcResult<()> { Ok(()) }
    fn erase_sector(&mut self, _addr: u32) -> FbcResult<()> { Ok(()) }
    fn program_page(&mut self, _addr: u32, _page: &[u8]) -> FbcResult<()> { Ok(()) }
    fn read_at(&mut self, _addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        dest.fill(0xFF);
        Ok(())
    }
}

struct DeadPart;

impl RawFlashPort for DeadPart {
    fn read_status(&mut self) -> FbcResult<FlashStatus> { Err(FbcError::HalError) }
    fn read_unique_id(&mut self) -> FbcResult<u64> { Err(FbcError::HalError) }
    fn write_enable(&mut self) -> FbcResult<()> { Err(FbcError::HalError) }
    fn erase_sector(&mut self, _addr: u32) -> FbcResult<()> { Err(FbcError::HalError) }
    fn program_page(&mut self, _addr: u32, _page: &[u8]) -> FbcResult<()> { Err(FbcError::HalError) }
    fn read_at(&mut self, _addr: u32, _dest: &mut [u8]) -> FbcResult<()> { Err(FbcError::HalError) }
}

#[test]
fn test_trait_object_safety() {
    let mut part = SlowPart { busy_reads: 0, status_reads: 0 };
    let obj: &mut dyn RawFlashPort = &mut part;

    assert_eq!(obj.read_unique_id().unwrap(), 0xDEAD_BEEF);
    // Default fixup is a no-op
    assert!(obj.patch_mapped(0, &[0u8; 4]).is_ok());

    // Default uncached read goes through read_at
    let mut buf = [0u8; 8];
    obj.read_device(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 8]);
}

#[test]
fn test_poll_idle_would_block_while_busy() {
    let mut part = SlowPart { busy_reads: 2, status_reads: 0 };

    assert!(matches!(part.poll_idle(), Err(nb::Error::WouldBlock)));
    assert!(matches!(part.poll_idle(), Err(nb::Error::WouldBlock)));
    let status = nb::block!(part.poll_idle()).unwrap();

    assert!(!status.is_busy());
    assert!(!status.write_enabled());
    assert_eq!(part.status_reads, 3);
}

#[test]
fn test_poll_idle_surfaces_port_errors() {
    let mut part = DeadPart;
    assert!(matches!(part.poll_idle(), Err(nb::Error::Other(FbcError::HalError))));
}

#[test]
fn test_forwarding_through_mut_ref() {
    fn wait<P: RawFlashPort>(mut port: P) -> FlashStatus {
        nb::block!(port.poll_idle()).unwrap()
    }

    let mut part = SlowPart { busy_reads: 1, status_reads: 0 };
    wait(&mut part);
    assert_eq!(part.status_reads, 2);
}

#[test]
fn test_status_bits() {
    assert!(FlashStatus(0x03).is_busy());
    assert!(FlashStatus(0x03).write_enabled());
    assert!(!FlashStatus::default().is_busy());
}
