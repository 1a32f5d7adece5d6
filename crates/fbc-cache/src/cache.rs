use alloc::vec;
use alloc::vec::Vec;

use log::{debug, trace, warn};

use fbc_core::{AddressTranslator, FbcError, FbcResult, FlashConfig, VerifyPolicy};
use fbc_hal::RawFlashPort;

use crate::commit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub sector_loads: u32,
    /// Flushes that actually ran an erase/program cycle.
    pub flushes: u32,
    pub erases: u32,
    pub page_programs: u32,
    /// Blocks written with content identical to a clean buffer.
    pub skipped_blocks: u32,
}

/// Single-slot write-back cache over one erase sector.
///
/// Writes land in `buffer` and reach the part only when a different sector
/// is touched, on `flush`, or before a read. Reads always go to the mapped
/// view, never to `buffer`.
///
/// INVARIANTS (between calls):
/// * `dirty` implies `cached.is_some()`.
/// * With `cached == Some(s)`, `buffer` is sector `s` as committed, overlaid
///   with every write not yet flushed.
///
/// There is no lock inside. One caller at a time; `&mut self` on every
/// operation is the whole contract. See `SharedBlockDevice` for the locked
/// variant.
pub struct SectorCache<P> {
    port: P,
    config: FlashConfig,
    xlat: AddressTranslator,
    buffer: Vec<u8>,
    cached: Option<u32>,
    dirty: bool,
    stats: CacheStats,
}

impl<P: RawFlashPort> SectorCache<P> {
    /// Starts empty and clean.
    pub fn new(port: P, config: FlashConfig) -> FbcResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            port,
            xlat: AddressTranslator::new(&config),
            buffer: vec![0u8; config.sector_size as usize],
            config,
            cached: None,
            dirty: false,
            stats: CacheStats::default(),
        })
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Address of the resident sector, if any.
    pub fn cached_sector(&self) -> Option<u32> {
        self.cached
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Direct access to the part. Anything written this way is invisible to
    /// a resident sector and may be overwritten by the next flush.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Copy `count` blocks starting at `start` into `dest`.
    ///
    /// Pending writes are committed first because the copy comes from the
    /// mapped view, not from the buffer.
    pub fn read_blocks(&mut self, dest: &mut [u8], start: u32, count: u32) -> FbcResult<()> {
        let len = self.span(start, count, dest.len())?;

        self.flush()?;

        self.port.read_at(self.xlat.block_addr(start), &mut dest[..len])
    }

    /// Buffer `count` blocks from `src`. Nothing is durable until `flush`.
    ///
    /// On error, blocks before the failing one are already buffered.
    pub fn write_blocks(&mut self, src: &[u8], start: u32, count: u32) -> FbcResult<()> {
        let len = self.span(start, count, src.len())?;
        let block_size = self.config.block_size as usize;

        for (block, data) in (start..).zip(src[..len].chunks_exact(block_size)) {
            let loc = self.xlat.locate(block);

            if self.cached != Some(loc.sector_addr) {
                self.load(loc.sector_addr)?;
            }

            let slot = &mut self.buffer[loc.sector_offset..loc.sector_offset + block_size];
            if self.dirty || slot[..] != data[..] {
                slot.copy_from_slice(data);
                self.dirty = true;
            } else {
                trace!("[CACHE] block {} unchanged, skipped", block);
                self.stats.skipped_blocks += 1;
            }
        }
        Ok(())
    }

    /// Commit the resident sector if dirty. The sector stays resident.
    ///
    /// On error nothing in memory changes: still dirty, same sector, so the
    /// caller may retry.
    pub fn flush(&mut self) -> FbcResult<()> {
        let sector = match self.cached {
            Some(sector) if self.dirty => sector,
            _ => return Ok(()),
        };
        let page_size = self.config.page_size as usize;

        // 1. Erase
        commit::erase_sector(&mut self.port, sector, &self.config)?;
        self.stats.erases += 1;

        // 2. Program, ascending
        for (i, page) in self.buffer.chunks_exact(page_size).enumerate() {
            let addr = sector + (i * page_size) as u32;
            commit::program_page(&mut self.port, addr, page, &self.config)?;
            self.stats.page_programs += 1;
        }

        // 3. Compare against the array before the window is patched over it
        if self.config.verify == VerifyPolicy::ReadBack {
            self.verify(sector)?;
        }

        // 4. The mapped view may still be serving pre-erase lines
        self.port.patch_mapped(sector, &self.buffer)?;

        self.dirty = false;
        self.stats.flushes += 1;
        debug!("[CACHE] flushed sector {:#x}", sector);
        Ok(())
    }

    /// Byte length of the request, after range and buffer checks.
    fn span(&self, start: u32, count: u32, have: usize) -> FbcResult<usize> {
        match start.checked_add(count) {
            Some(end) if end <= self.config.block_count() => {}
            _ => return Err(FbcError::OutOfRange),
        }
        let len = count as usize * self.config.block_size as usize;
        if have < len {
            return Err(FbcError::BufferLength);
        }
        Ok(len)
    }

    // Read-modify-write bootstrap: the whole sector is erased on flush, so
    // bytes this cache never wrote have to be carried over.
    fn load(&mut self, sector: u32) -> FbcResult<()> {
        self.flush()?;

        self.cached = None;
        self.dirty = false;
        self.port.read_at(sector, &mut self.buffer)?;
        self.cached = Some(sector);

        self.stats.sector_loads += 1;
        debug!("[CACHE] loaded sector {:#x}", sector);
        Ok(())
    }

    fn verify(&mut self, sector: u32) -> FbcResult<()> {
        let page_size = self.config.page_size as usize;
        let mut readback = vec![0u8; page_size];

        for (i, page) in self.buffer.chunks_exact(page_size).enumerate() {
            let addr = sector + (i * page_size) as u32;
            self.port.read_device(addr, &mut readback)?;
            if readback[..] != page[..] {
                warn!("[CACHE] read-back mismatch in page {:#x}", addr);
                return Err(FbcError::FlashWriteFailed { addr });
            }
        }
        Ok(())
    }
}
