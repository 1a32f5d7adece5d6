use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;

use fbc_cache::FlashBlockDevice;
use fbc_core::{FlashConfig, VerifyPolicy};
use fbc_hal::BlockDevice;
use fbc_sim::SimFlash;

mod soak;

#[derive(Parser)]
#[command(about = "Drive the sector write-back cache against a simulated NOR part")]
struct Cli {
    #[command(flatten)]
    geometry: Geometry,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct Geometry {
    #[arg(long, global = true, value_parser = parse_u32)] flash_size: Option<u32>,
    #[arg(long, global = true, value_parser = parse_u32)] sector_size: Option<u32>,
    #[arg(long, global = true, value_parser = parse_u32)] page_size: Option<u32>,
    #[arg(long, global = true, value_parser = parse_u32)] block_size: Option<u32>,
    #[arg(long, global = true, value_parser = parse_u32)] partition_offset: Option<u32>,
    #[arg(long, global = true, value_parser = parse_u32)] partition_size: Option<u32>,
    #[arg(long, global = true, value_enum)] verify: Option<Verify>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Verify {
    None,
    Status,
    ReadBack,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print geometry and the part's unique ID.
    Info,
    /// Two block writes into one sector, then read the sector back.
    Demo {
        #[arg(long, default_value_t = 1)] seed: u64,
    },
    /// Random writes and reads checked against an in-memory model.
    Soak {
        #[arg(long, default_value_t = 0)] seed: u64,
        #[arg(long, default_value_t = 10_000)] iterations: u64,
    },
    /// Fill blocks of an image file with one byte value.
    Write {
        #[arg(long)] image: PathBuf,
        #[arg(long)] block: u32,
        #[arg(long, default_value_t = 1)] count: u32,
        #[arg(long, value_parser = parse_u8)] pattern: u8,
    },
    /// Hex dump blocks of an image file.
    Read {
        #[arg(long)] image: PathBuf,
        #[arg(long)] block: u32,
        #[arg(long, default_value_t = 1)] count: u32,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{}: {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_u32(s)?;
    u8::try_from(v).map_err(|_| format!("{} does not fit in a byte", s))
}

impl Geometry {
    fn resolve(&self) -> anyhow::Result<FlashConfig> {
        let base = FlashConfig::default();
        let cfg = FlashConfig {
            flash_size: self.flash_size.unwrap_or(base.flash_size),
            sector_size: self.sector_size.unwrap_or(base.sector_size),
            page_size: self.page_size.unwrap_or(base.page_size),
            block_size: self.block_size.unwrap_or(base.block_size),
            partition_offset: self.partition_offset.unwrap_or(base.partition_offset),
            partition_size: self.partition_size.unwrap_or(base.partition_size),
            verify: match self.verify {
                Some(Verify::None) => VerifyPolicy::None,
                Some(Verify::Status) => VerifyPolicy::Status,
                Some(Verify::ReadBack) => VerifyPolicy::ReadBack,
                None => base.verify,
            },
            busy_poll_limit: base.busy_poll_limit,
        };
        Ok(cfg.validate()?)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = cli.geometry.resolve()?;

    match cli.cmd {
        Cmd::Info => info_cmd(cfg),
        Cmd::Demo { seed } => demo(cfg, seed),
        Cmd::Soak { seed, iterations } => soak::run(cfg, seed, iterations),
        Cmd::Write { image, block, count, pattern } => write_image(cfg, image, block, count, pattern),
        Cmd::Read { image, block, count } => read_image(cfg, image, block, count),
    }
}

fn info_cmd(cfg: FlashConfig) -> anyhow::Result<()> {
    let mut dev = FlashBlockDevice::new(SimFlash::new(&cfg), cfg)?;
    dev.init()?;

    println!("part        {} KiB, id {:016x}", cfg.flash_size / 1024, dev.unique_id()?);
    println!("sector      {} bytes ({} pages of {})", cfg.sector_size, cfg.pages_per_sector(), cfg.page_size);
    println!("partition   {:#x} + {:#x}", cfg.partition_offset, cfg.partition_size);
    println!("blocks      {} x {} bytes", dev.block_count(), dev.block_size());
    println!("verify      {:?}", cfg.verify);
    Ok(())
}

fn demo(cfg: FlashConfig, seed: u64) -> anyhow::Result<()> {
    let bs = cfg.block_size as usize;
    let per_sector = cfg.blocks_per_sector();
    anyhow::ensure!(per_sector >= 4, "demo needs at least four blocks per sector");

    let mut sim = SimFlash::new(&cfg);
    sim.fill_random(seed);
    let base = cfg.partition_offset as usize;
    let before = sim.cells()[base..base + cfg.sector_size as usize].to_vec();

    let mut dev = FlashBlockDevice::new(sim, cfg)?;
    dev.init()?;

    dev.write_blocks(&vec![0xAA; bs], 0, 1)?;
    dev.write_blocks(&vec![0xBB; bs], 3, 1)?;
    dev.flush()?;

    let mut sector = vec![0u8; cfg.sector_size as usize];
    dev.read_blocks(&mut sector, 0, per_sector)?;

    let mut expected = before;
    expected[..bs].fill(0xAA);
    expected[3 * bs..4 * bs].fill(0xBB);

    let mut ok = true;
    for (i, (got, want)) in sector.chunks(bs).zip(expected.chunks(bs)).enumerate() {
        let label = match i {
            0 => "0xAA",
            3 => "0xBB",
            _ => "preserved",
        };
        let matches = got == want;
        ok &= matches;
        let verdict = if matches { "ok".green() } else { "MISMATCH".red().bold() };
        println!("block {:>3}  {:<10} {}", i, label, verdict);
    }

    let counters = dev.into_port().counters();
    println!("erases {}, page programs {}", counters.erases, counters.programs);
    ok &= counters.erases == 1 && counters.programs == cfg.pages_per_sector();

    if ok {
        println!("{}", "PASS".green().bold());
        Ok(())
    } else {
        anyhow::bail!("demo failed")
    }
}

fn write_image(cfg: FlashConfig, image: PathBuf, block: u32, count: u32, pattern: u8) -> anyhow::Result<()> {
    let sim = SimFlash::open_image(&cfg, &image)?;
    let mut dev = FlashBlockDevice::new(sim, cfg)?;
    dev.init()?;

    let data = vec![pattern; count as usize * cfg.block_size as usize];
    dev.write_blocks(&data, block, count)?;
    dev.flush()?;

    let stats = dev.stats();
    dev.into_port().save_image(&image)?;
    info!("{} blocks written, {} erase(s), {} page program(s)", count, stats.erases, stats.page_programs);
    Ok(())
}

fn read_image(cfg: FlashConfig, image: PathBuf, block: u32, count: u32) -> anyhow::Result<()> {
    let sim = SimFlash::open_image(&cfg, &image)?;
    let mut dev = FlashBlockDevice::new(sim, cfg)?;
    dev.init()?;

    let bs = cfg.block_size as usize;
    let mut data = vec![0u8; count as usize * bs];
    dev.read_blocks(&mut data, block, count)?;

    for (i, row) in data.chunks(16).enumerate() {
        let offset = block as usize * bs + i * 16;
        let hex: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:08x}  {}", offset, hex.join(" "));
    }
    Ok(())
}
