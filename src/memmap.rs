use std::cmp::min;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::architecture::{DramAddr, DramLevel, PhysAddr, RowIndex};
use crate::engine::ResolutionEngine;
use crate::error::Result;
use crate::msys::MemorySystem;
use crate::translate::Translate;

/// A physically contiguous run of bytes that stays in one DRAM row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DramRange {
    pub start: DramAddr,
    pub phys: PhysAddr,
    pub bytes: usize,
}

/// Physical memory grouped by DRAM row.
#[derive(Clone, Debug, Default)]
pub struct MemMap {
    pub ranges: Vec<DramRange>,
    pub range_map: HashMap<RowIndex, Vec<DramRange>>,
}

impl MemMap {
    /// Resolves `[start, start + len)` at the facade's granularity. Addresses
    /// outside the mapping's geometry are skipped.
    pub fn scan<E: ResolutionEngine>(
        msys: &MemorySystem<E>,
        start: PhysAddr,
        len: usize,
        page_size: u64,
    ) -> Result<MemMap> {
        let mut map = MemMap::default();
        map.add_window(msys, start, len, page_size)?;
        map.index();
        Ok(map)
    }

    /// Like `scan`, but over the physical units backing a virtual buffer.
    /// Unmapped units are left out.
    pub fn from_translation<E: ResolutionEngine, T: Translate>(
        msys: &MemorySystem<E>,
        tr: &T,
        vaddr: usize,
        page_count: usize,
    ) -> Result<MemMap> {
        let unit = tr.granularity();
        let mut seen = HashSet::new();
        let mut map = MemMap::default();
        for base in tr.translate_range(vaddr, page_count)? {
            if seen.insert(base) {
                map.add_window(msys, base, unit, unit as u64)?;
            }
        }
        map.index();
        debug!(vaddr, page_count, frames = seen.len(), rows = map.range_map.len(), "memmap built");
        Ok(map)
    }

    fn add_window<E: ResolutionEngine>(
        &mut self,
        msys: &MemorySystem<E>,
        start: PhysAddr,
        len: usize,
        page_size: u64,
    ) -> Result<()> {
        let step = msys.granularity(page_size)?.max(1) as usize;
        let mut prev_valid = false;
        for off in (0..len).step_by(step) {
            let phys = start + off as PhysAddr;
            let addr = msys.resolve(phys)?;
            if !addr.is_valid() {
                prev_valid = false;
                continue;
            }
            let bytes = min(len - off, step);
            match self.ranges.last_mut() {
                Some(last)
                    if prev_valid
                        && last.phys + last.bytes as PhysAddr == phys
                        && last.start.row_index() == addr.row_index() =>
                {
                    last.bytes += bytes;
                }
                _ => self.ranges.push(DramRange { start: addr, phys, bytes }),
            }
            prev_valid = true;
        }
        Ok(())
    }

    fn index(&mut self) {
        self.range_map.clear();
        for r in &self.ranges {
            self.range_map
                .entry(r.start.row_index())
                .or_insert_with(Vec::new)
                .push(r.clone());
        }
    }

    pub fn same_row(&self, addr: &DramAddr) -> Option<&[DramRange]> {
        self.range_map.get(&addr.row_index()).map(Vec::as_slice)
    }

    /// Two addresses in the same bank but different rows, the first in
    /// scan order.
    pub fn row_conflict_pair(&self) -> Option<(DramAddr, DramAddr)> {
        self.ranges.iter().enumerate().find_map(|(i, a)| {
            self.ranges[i + 1..]
                .iter()
                .find(|b| a.start.same_bank(&b.start) && !a.start.same(DramLevel::Row, &b.start))
                .map(|b| (a.start, b.start))
        })
    }
}
