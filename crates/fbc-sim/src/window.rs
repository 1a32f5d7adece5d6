use std::collections::HashMap;

/// Read cache sitting in front of the memory-mapped view.
/// Lines are filled on first touch and never invalidated by the part.
/// Nothing is evicted either, so a long run holds a copy of every line it
/// has read.
pub(crate) struct MappedWindow {
    line_size: usize,
    lines: HashMap<usize, Vec<u8>>,
}

impl MappedWindow {
    pub(crate) fn new(line_size: u32) -> Self {
        Self { line_size: line_size as usize, lines: HashMap::new() }
    }

    pub(crate) fn read(&mut self, cells: &[u8], addr: usize, dest: &mut [u8]) {
        let line = self.line_size;
        let end = addr + dest.len();
        let mut pos = addr;

        while pos < end {
            let base = pos & !(line - 1);
            let bytes = self
                .lines
                .entry(base)
                .or_insert_with(|| cells[base..(base + line).min(cells.len())].to_vec());

            let from = pos - base;
            let n = (line - from).min(end - pos);
            let out = pos - addr;
            dest[out..out + n].copy_from_slice(&bytes[from..from + n]);
            pos += n;
        }
    }

    /// Write-through into resident lines only.
    pub(crate) fn patch(&mut self, addr: usize, data: &[u8]) {
        let line = self.line_size;
        let end = addr + data.len();

        for (&base, bytes) in self.lines.iter_mut() {
            let lo = base.max(addr);
            let hi = (base + line).min(end);
            if lo < hi {
                bytes[lo - base..hi - base].copy_from_slice(&data[lo - addr..hi - addr]);
            }
        }
    }
}
