use log::info;

use fbc_core::{FbcResult, FlashConfig};
use fbc_hal::{BlockDevice, RawFlashPort};

use crate::cache::{CacheStats, SectorCache};

/// The block device the filesystem mounts. Thin shell over `SectorCache`.
pub struct FlashBlockDevice<P> {
    cache: SectorCache<P>,
}

impl<P: RawFlashPort> FlashBlockDevice<P> {
    pub fn new(port: P, config: FlashConfig) -> FbcResult<Self> {
        Ok(Self { cache: SectorCache::new(port, config)? })
    }

    pub fn unique_id(&mut self) -> FbcResult<u64> {
        self.cache.port_mut().read_unique_id()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &SectorCache<P> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SectorCache<P> {
        &mut self.cache
    }

    pub fn into_port(self) -> P {
        self.cache.into_port()
    }
}

impl<P: RawFlashPort> BlockDevice for FlashBlockDevice<P> {
    fn block_size(&self) -> u32 {
        self.cache.config().block_size
    }

    fn block_count(&self) -> u32 {
        self.cache.config().block_count()
    }

    // Nothing to do: the cache is born empty.
    fn init(&mut self) -> FbcResult<()> {
        let cfg = self.cache.config();
        info!(
            "[FLASH] {} blocks of {} bytes at {:#x} (sector {}, page {})",
            cfg.block_count(), cfg.block_size, cfg.partition_offset, cfg.sector_size, cfg.page_size
        );
        Ok(())
    }

    fn read_blocks(&mut self, dest: &mut [u8], start: u32, count: u32) -> FbcResult<()> {
        self.cache.read_blocks(dest, start, count)
    }

    fn write_blocks(&mut self, src: &[u8], start: u32, count: u32) -> FbcResult<()> {
        self.cache.write_blocks(src, start, count)
    }

    fn flush(&mut self) -> FbcResult<()> {
        self.cache.flush()
    }

    fn release_cache(&mut self) {}
}
