use crate::{FbcError, FbcResult};

/// How hard `flush` checks that the device actually took the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// Wait for the part to go idle, trust the result.
    None,
    /// Wait for idle, then treat a still-latched write-enable as a rejected command.
    Status,
    /// `Status` plus a byte compare of the whole sector after programming,
    /// read from the array rather than the mapped window.
    ReadBack,
}

/// Flash geometry and partition layout, built once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    pub flash_size: u32,
    /// Erase unit.
    pub sector_size: u32,
    /// Program unit.
    pub page_size: u32,
    /// Filesystem I/O unit.
    pub block_size: u32,
    pub partition_offset: u32,
    pub partition_size: u32,
    pub verify: VerifyPolicy,
    /// Status reads allowed per erase/program before giving up.
    pub busy_poll_limit: u32,
}

impl Default for FlashConfig {
    /// 16 MiB SPI NOR part, filesystem in 2 MiB starting at 1 MiB.
    fn default() -> Self {
        Self {
            flash_size: 16 * 1024 * 1024,
            sector_size: 4096,
            page_size: 256,
            block_size: 512,
            partition_offset: 0x0010_0000,
            partition_size: 2 * 1024 * 1024,
            verify: VerifyPolicy::Status,
            busy_poll_limit: 1_000_000,
        }
    }
}

impl FlashConfig {
    /// Checks the geometry and hands it back unchanged.
    ///
    /// Sizes must be powers of two with `page <= sector` and `block <= sector`,
    /// and the partition must be sector aligned and fit inside the part.
    pub fn validate(self) -> FbcResult<Self> {
        let pow2 = |v: u32| v != 0 && v.is_power_of_two();
        if !pow2(self.sector_size) || !pow2(self.page_size) || !pow2(self.block_size) {
            return Err(FbcError::InvalidConfig);
        }
        if self.page_size > self.sector_size || self.block_size > self.sector_size {
            return Err(FbcError::InvalidConfig);
        }
        if self.partition_size == 0
            || self.partition_offset % self.sector_size != 0
            || self.partition_size % self.sector_size != 0
        {
            return Err(FbcError::InvalidConfig);
        }
        match self.partition_offset.checked_add(self.partition_size) {
            Some(end) if end <= self.flash_size => {}
            _ => return Err(FbcError::InvalidConfig),
        }
        if self.busy_poll_limit == 0 {
            return Err(FbcError::InvalidConfig);
        }
        Ok(self)
    }

    pub fn block_count(&self) -> u32 {
        self.partition_size / self.block_size
    }

    pub fn pages_per_sector(&self) -> u32 {
        self.sector_size / self.page_size
    }

    pub fn blocks_per_sector(&self) -> u32 {
        self.sector_size / self.block_size
    }
}
