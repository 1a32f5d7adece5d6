use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fbc_cache::FlashBlockDevice;
use fbc_core::FlashConfig;
use fbc_hal::BlockDevice;
use fbc_sim::SimFlash;

// Longest run of blocks touched by one request.
const MAX_RUN: u32 = 16;

/// Random block traffic against a pre-filled part, every read checked
/// against a plain byte model of the partition.
pub fn run(cfg: FlashConfig, seed: u64, iterations: u64) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut sim = SimFlash::new(&cfg);
    sim.fill_random(seed ^ 0x5A5A_5A5A);
    let base = cfg.partition_offset as usize;
    let mut model = sim.cells()[base..base + cfg.partition_size as usize].to_vec();

    let mut dev = FlashBlockDevice::new(sim, cfg)?;
    dev.init()?;

    let bs = dev.block_size() as usize;
    let blocks = dev.block_count();
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut reads, mut writes, mut flushes) = (0u64, 0u64, 0u64);

    info!("Soak: seed {}, {} iterations over {} blocks", seed, iterations, blocks);

    let mut done = 0;
    while done < iterations && running.load(Ordering::SeqCst) {
        let start = rng.gen_range(0..blocks);
        let count = rng.gen_range(1..=(blocks - start).min(MAX_RUN));
        let at = start as usize * bs;
        let len = count as usize * bs;

        match rng.gen_range(0..10) {
            0..=5 => {
                let mut data = vec![0u8; len];
                rng.fill(&mut data[..]);
                dev.write_blocks(&data, start, count)?;
                model[at..at + len].copy_from_slice(&data);
                writes += 1;
            }
            6..=8 => {
                let mut data = vec![0u8; len];
                dev.read_blocks(&mut data, start, count)?;
                if data[..] != model[at..at + len] {
                    println!("{} blocks {}..{} after {} ops", "DIVERGED".red().bold(), start, start + count, done);
                    anyhow::bail!("read disagreed with model");
                }
                reads += 1;
            }
            _ => {
                dev.flush()?;
                flushes += 1;
            }
        }
        done += 1;
    }

    // Final sweep over the whole partition
    let mut all = vec![0u8; model.len()];
    dev.read_blocks(&mut all, 0, blocks)?;
    anyhow::ensure!(all == model, "final sweep disagreed with model");

    let stats = dev.stats();
    println!("ops         {} ({} writes, {} reads, {} flushes)", done, writes, reads, flushes);
    println!("sectors     {} loaded, {} committed", stats.sector_loads, stats.flushes);
    println!("flash       {} erases, {} page programs", stats.erases, stats.page_programs);
    println!("skipped     {} identical blocks", stats.skipped_blocks);
    println!("{}", "PASS".green().bold());
    Ok(())
}
