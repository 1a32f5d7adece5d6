use crate::FlashConfig;

/// Where a logical block lives on the part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocation {
    /// Absolute device address of the first byte.
    pub addr: u32,
    pub sector_addr: u32,
    /// Byte offset of `addr` inside its sector.
    pub sector_offset: usize,
}

/// Block number -> device address arithmetic.
///
/// Stateless apart from the constants it was built from. Range checking is
/// the caller's job; the translator assumes `block < block_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTranslator {
    block_size: u32,
    sector_mask: u32,
    partition_offset: u32,
}

impl AddressTranslator {
    pub fn new(config: &FlashConfig) -> Self {
        Self {
            block_size: config.block_size,
            sector_mask: config.sector_size - 1,
            partition_offset: config.partition_offset,
        }
    }

    /// Absolute address of `block`. This is also the address handed to
    /// `read_at` for zero-copy reads of the mapped window.
    pub fn block_addr(&self, block: u32) -> u32 {
        self.partition_offset + block * self.block_size
    }

    pub fn sector_addr(&self, addr: u32) -> u32 {
        addr & !self.sector_mask
    }

    pub fn sector_offset(&self, addr: u32) -> usize {
        (addr & self.sector_mask) as usize
    }

    pub fn locate(&self, block: u32) -> BlockLocation {
        let addr = self.block_addr(block);
        BlockLocation {
            addr,
            sector_addr: self.sector_addr(addr),
            sector_offset: self.sector_offset(addr),
        }
    }
}
