#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

mod cache;
mod commit;
mod device;
mod shared;

pub use cache::{CacheStats, SectorCache};
pub use device::FlashBlockDevice;
pub use shared::SharedBlockDevice;
