//! Host-side stand-in for the board's SPI NOR part.
//!
//! Behaves like the real thing where it matters to the cache: programming
//! can only clear bits, erase works on whole sectors, every erase/program
//! consumes the write-enable latch, and the part stays busy for a while
//! after each command. Faults can be injected to exercise error paths.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use anyhow::{bail, Context};
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use fbc_core::{FbcError, FbcResult, FlashConfig, ERASED_BYTE};
use fbc_hal::{FlashStatus, RawFlashPort};

mod window;
use window::MappedWindow;

const DEFAULT_UNIQUE_ID: u64 = 0xE660_5830_3B4F_2A2F;

/// Per-command tallies, handy for asserting erase/program budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub write_enables: u32,
    pub erases: u32,
    pub programs: u32,
    pub mapped_reads: u32,
    /// Reads that bypassed the mapped-window cache.
    pub device_reads: u32,
    pub patches: u32,
    /// Erase/program commands the part refused.
    pub ignored: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protection {
    /// Command dropped, write-enable latch left set.
    Reported,
    /// Command dropped, latch cleared as if it had worked.
    Silent,
}

pub struct SimFlash {
    cells: Vec<u8>,
    sector_size: u32,
    page_size: u32,
    unique_id: u64,
    wel: bool,
    busy_cycles: u32,
    busy_left: u32,
    hung: bool,
    protected: Vec<(Range<u32>, Protection)>,
    window: Option<MappedWindow>,
    counters: SimCounters,
}

impl SimFlash {
    /// Fully erased part sized from `config`.
    pub fn new(config: &FlashConfig) -> Self {
        Self {
            cells: vec![ERASED_BYTE; config.flash_size as usize],
            sector_size: config.sector_size,
            page_size: config.page_size,
            unique_id: DEFAULT_UNIQUE_ID,
            wel: false,
            busy_cycles: 2,
            busy_left: 0,
            hung: false,
            protected: Vec::new(),
            window: None,
            counters: SimCounters::default(),
        }
    }

    pub fn from_image(config: &FlashConfig, image: Vec<u8>) -> anyhow::Result<Self> {
        if image.len() != config.flash_size as usize {
            bail!("image is {} bytes, part is {}", image.len(), config.flash_size);
        }
        let mut sim = Self::new(config);
        sim.cells = image;
        Ok(sim)
    }

    /// Load a saved image, or start erased if `path` does not exist yet.
    pub fn open_image(config: &FlashConfig, path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("[SIM] {} missing, starting from an erased part", path.display());
            return Ok(Self::new(config));
        }
        let image = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_image(config, image)
    }

    /// Write the raw cell array out: tmp file, fsync, rename.
    pub fn save_image(&self, path: &Path) -> anyhow::Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true).create(true).truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            file.write_all(&self.cells)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) { let _ = dir.sync_all(); }
        }
        Ok(())
    }

    /// Overwrite every cell with seeded noise, standing in for old content.
    pub fn fill_random(&mut self, seed: u64) {
        StdRng::seed_from_u64(seed).fill_bytes(&mut self.cells);
    }

    pub fn with_unique_id(mut self, id: u64) -> Self {
        self.unique_id = id;
        self
    }

    /// Put a read cache in front of the mapped window. Erase and program do
    /// not invalidate it; only `patch_mapped` updates resident lines.
    pub fn with_mapped_cache(mut self, line_size: u32) -> anyhow::Result<Self> {
        if !line_size.is_power_of_two() || line_size > self.sector_size {
            bail!("cache line {} must be a power of two no larger than a sector", line_size);
        }
        self.window = Some(MappedWindow::new(line_size));
        Ok(self)
    }

    /// Status reads that report busy after each accepted command.
    pub fn set_busy_cycles(&mut self, cycles: u32) {
        self.busy_cycles = cycles;
    }

    /// A hung part reports busy forever.
    pub fn set_hung(&mut self, hung: bool) {
        self.hung = hung;
    }

    pub fn protect(&mut self, range: Range<u32>) {
        self.protected.push((range, Protection::Reported));
    }

    pub fn protect_silently(&mut self, range: Range<u32>) {
        self.protected.push((range, Protection::Silent));
    }

    pub fn unprotect_all(&mut self) {
        self.protected.clear();
    }

    /// Raw cells, bypassing any mapped-window cache.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn counters(&self) -> SimCounters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = SimCounters::default();
    }

    fn check_span(&self, addr: u32, len: usize) -> FbcResult<Range<usize>> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.cells.len() => Ok(start..end),
            _ => Err(FbcError::HalError),
        }
    }

    fn protection(&self, span: &Range<usize>) -> Option<Protection> {
        self.protected
            .iter()
            .find(|(r, _)| (r.start as usize) < span.end && span.start < r.end as usize)
            .map(|(_, p)| *p)
    }

    /// Common gate for erase/program. `true` means go ahead.
    fn accept(&mut self, what: &str, span: &Range<usize>) -> bool {
        if !self.wel {
            warn!("[SIM] {} at {:#x} without write enable, ignored", what, span.start);
            self.counters.ignored += 1;
            return false;
        }
        if let Some(p) = self.protection(span) {
            warn!("[SIM] {} at {:#x} hits protected range, ignored", what, span.start);
            self.counters.ignored += 1;
            if p == Protection::Silent {
                self.wel = false;
            }
            self.busy_left = self.busy_cycles;
            return false;
        }
        true
    }

    fn complete(&mut self) {
        self.wel = false;
        self.busy_left = self.busy_cycles;
    }
}

impl RawFlashPort for SimFlash {
    fn read_status(&mut self) -> FbcResult<FlashStatus> {
        let mut bits = 0;
        if self.hung || self.busy_left > 0 {
            bits |= FlashStatus::BUSY;
            self.busy_left = self.busy_left.saturating_sub(1);
        }
        if self.wel {
            bits |= FlashStatus::WEL;
        }
        Ok(FlashStatus(bits))
    }

    fn read_unique_id(&mut self) -> FbcResult<u64> {
        Ok(self.unique_id)
    }

    fn write_enable(&mut self) -> FbcResult<()> {
        self.counters.write_enables += 1;
        self.wel = true;
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> FbcResult<()> {
        let base = addr & !(self.sector_size - 1);
        let span = self.check_span(base, self.sector_size as usize)?;
        if !self.accept("erase", &span) {
            return Ok(());
        }
        trace!("[SIM] erase {:#x}", base);
        self.cells[span].fill(ERASED_BYTE);
        self.counters.erases += 1;
        self.complete();
        Ok(())
    }

    fn program_page(&mut self, addr: u32, page: &[u8]) -> FbcResult<()> {
        if addr % self.page_size != 0 || page.len() != self.page_size as usize {
            return Err(FbcError::HalError);
        }
        let span = self.check_span(addr, page.len())?;
        if !self.accept("program", &span) {
            return Ok(());
        }
        trace!("[SIM] program {:#x}", addr);
        // NOR: programming can only pull bits low
        for (cell, byte) in self.cells[span].iter_mut().zip(page) {
            *cell &= *byte;
        }
        self.counters.programs += 1;
        self.complete();
        Ok(())
    }

    fn read_at(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        let span = self.check_span(addr, dest.len())?;
        self.counters.mapped_reads += 1;
        match self.window.as_mut() {
            Some(window) => window.read(&self.cells, span.start, dest),
            None => dest.copy_from_slice(&self.cells[span]),
        }
        Ok(())
    }

    fn read_device(&mut self, addr: u32, dest: &mut [u8]) -> FbcResult<()> {
        let span = self.check_span(addr, dest.len())?;
        self.counters.device_reads += 1;
        dest.copy_from_slice(&self.cells[span]);
        Ok(())
    }

    fn patch_mapped(&mut self, addr: u32, data: &[u8]) -> FbcResult<()> {
        let span = self.check_span(addr, data.len())?;
        self.counters.patches += 1;
        if let Some(window) = self.window.as_mut() {
            window.patch(span.start, data);
        }
        Ok(())
    }
}
