use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fbc_cache::{FlashBlockDevice, SharedBlockDevice};
use fbc_core::{FlashConfig, VerifyPolicy};
use fbc_hal::BlockDevice;
use fbc_sim::SimFlash;

fn geometry() -> FlashConfig {
    FlashConfig {
        flash_size: 128 * 1024,
        sector_size: 4096,
        page_size: 256,
        block_size: 512,
        partition_offset: 32 * 1024,
        partition_size: 64 * 1024,
        verify: VerifyPolicy::ReadBack,
        busy_poll_limit: 32,
    }
}

fn device() -> FlashBlockDevice<SimFlash> {
    let cfg = geometry();
    let sim = SimFlash::new(&cfg).with_unique_id(0xFEED_F00D);
    FlashBlockDevice::new(sim, cfg).unwrap()
}

#[test]
fn test_facade_reports_geometry() {
    let mut dev = device();
    let obj: &mut dyn BlockDevice = &mut dev;

    assert_eq!(obj.block_size(), 512);
    assert_eq!(obj.block_count(), 128);
    obj.init().unwrap();

    assert_eq!(dev.unique_id().unwrap(), 0xFEED_F00D);
}

#[test]
fn test_facade_forwards_and_release_is_noop() {
    let mut dev = device();
    dev.init().unwrap();

    dev.write_blocks(&[0x9E; 1024], 0, 2).unwrap();
    dev.release_cache();
    assert!(dev.cache().is_dirty(), "release must not flush or drop data");

    dev.flush().unwrap();
    let mut out = [0u8; 1024];
    dev.read_blocks(&mut out, 0, 2).unwrap();
    assert!(out.iter().all(|&b| b == 0x9E));

    // Block 0 sits at the partition offset on the part
    let sim = dev.into_port();
    assert_eq!(sim.cells()[32 * 1024], 0x9E);
    assert_eq!(sim.cells()[32 * 1024 - 1], 0xFF);
}

#[test]
fn test_random_workload_matches_model() {
    let mut dev = device();
    let block_size = dev.block_size() as usize;
    let blocks = dev.block_count();
    let mut model = vec![0xFFu8; blocks as usize * block_size];
    let mut rng = StdRng::seed_from_u64(0xB10C);

    for _ in 0..400 {
        let start = rng.gen_range(0..blocks);
        let count = rng.gen_range(1..=(blocks - start).min(12));
        let len = count as usize * block_size;
        let at = start as usize * block_size;

        if rng.gen_bool(0.7) {
            let mut data = vec![0u8; len];
            // Mostly fresh bytes, sometimes a rewrite of what is there
            if rng.gen_bool(0.8) {
                rng.fill(&mut data[..]);
            } else {
                data.copy_from_slice(&model[at..at + len]);
            }
            dev.write_blocks(&data, start, count).unwrap();
            model[at..at + len].copy_from_slice(&data);
        } else {
            let mut out = vec![0u8; len];
            dev.read_blocks(&mut out, start, count).unwrap();
            assert_eq!(out, &model[at..at + len], "blocks {}..{}", start, start + count);
        }
    }

    let mut all = vec![0u8; model.len()];
    dev.read_blocks(&mut all, 0, blocks).unwrap();
    assert_eq!(all, model);

    let stats = dev.stats();
    let sim = dev.into_port().counters();
    assert_eq!(stats.erases, sim.erases);
    assert_eq!(stats.page_programs, sim.programs);
}

#[test]
fn test_shared_device_across_threads() {
    let shared = Arc::new(SharedBlockDevice::new(device()));
    shared.init().unwrap();
    assert_eq!(shared.block_count(), 128);

    let mut handles = Vec::new();
    for t in 0..4u32 {
        let dev = shared.clone();
        handles.push(thread::spawn(move || {
            // Each thread owns 32 blocks, spread over four sectors
            for i in 0..32u32 {
                let block = t * 32 + i;
                let fill = (block as u8).wrapping_mul(7);
                dev.write_blocks(&[fill; 512], block, 1).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    shared.flush().unwrap();
    for block in 0..128u32 {
        let mut out = [0u8; 512];
        shared.read_blocks(&mut out, block, 1).unwrap();
        assert!(out.iter().all(|&b| b == (block as u8).wrapping_mul(7)), "block {}", block);
    }

    // Several operations under one hold
    let dirty = shared.with(|dev| {
        dev.write_blocks(&[0xEE; 512], 0, 1).unwrap();
        dev.cache().is_dirty()
    });
    assert!(dirty);
    shared.release_cache();

    let dev = Arc::try_unwrap(shared).ok().expect("threads joined").into_inner();
    assert_eq!(dev.block_size(), 512);
}
