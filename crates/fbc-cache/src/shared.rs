use spin::Mutex;

use fbc_core::FbcResult;
use fbc_hal::BlockDevice;

/// A block device that may be reached from more than one context.
///
/// The lock covers the whole device, so an erase/program cycle triggered by
/// one caller completes before anyone else gets in.
pub struct SharedBlockDevice<D> {
    inner: Mutex<D>,
}

impl<D: BlockDevice> SharedBlockDevice<D> {
    pub fn new(device: D) -> Self {
        Self { inner: Mutex::new(device) }
    }

    pub fn block_size(&self) -> u32 {
        self.inner.lock().block_size()
    }

    pub fn block_count(&self) -> u32 {
        self.inner.lock().block_count()
    }

    pub fn init(&self) -> FbcResult<()> {
        self.inner.lock().init()
    }

    pub fn read_blocks(&self, dest: &mut [u8], start: u32, count: u32) -> FbcResult<()> {
        self.inner.lock().read_blocks(dest, start, count)
    }

    pub fn write_blocks(&self, src: &[u8], start: u32, count: u32) -> FbcResult<()> {
        self.inner.lock().write_blocks(src, start, count)
    }

    pub fn flush(&self) -> FbcResult<()> {
        self.inner.lock().flush()
    }

    pub fn release_cache(&self) {
        self.inner.lock().release_cache()
    }

    /// Run several operations under one lock hold.
    pub fn with<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    pub fn into_inner(self) -> D {
        self.inner.into_inner()
    }
}
