use tracing::trace;

use crate::architecture::PhysAddr;
use crate::error::Result;
use crate::translate::Translate;

/// Assumes the buffer sits in a physically contiguous `2^cont_bits` byte
/// window starting at `base` (a huge page, for instance), and projects
/// virtual addresses onto it arithmetically. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct Heuristic {
    pub cont_bits: u32,
    pub base: PhysAddr,
}

impl Heuristic {
    pub fn new(cont_bits: u32, base: PhysAddr) -> Heuristic {
        Heuristic { cont_bits, base }
    }

    fn mask(&self) -> usize {
        if self.cont_bits as usize >= usize::BITS as usize {
            usize::MAX
        } else {
            (1 << self.cont_bits) - 1
        }
    }
}

impl Translate for Heuristic {
    fn translate(&self, vaddr: usize) -> Result<PhysAddr> {
        Ok((vaddr & self.mask()) as PhysAddr + self.base)
    }

    // Every window projects onto the same base.
    fn translate_range(&self, vaddr: usize, page_count: usize) -> Result<Vec<PhysAddr>> {
        let unit = self.granularity();
        let start = vaddr & !self.mask();
        trace!(vaddr, page_count, "heuristic translate_range");
        (0..page_count)
            .map(|i| self.translate(start.wrapping_add(i.wrapping_mul(unit))))
            .collect()
    }

    fn granularity(&self) -> usize {
        self.mask().wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_offset_within_window() {
        let h = Heuristic::new(21, 0x4020_0000);
        assert_eq!(h.translate(0x7f00_0012_3456).unwrap(), 0x4020_0000 + 0x12_3456);
        assert_eq!(h.granularity(), 1 << 21);
    }

    #[test]
    fn range_always_has_page_count_entries() {
        let h = Heuristic::new(12, 0x1000);
        let r = h.translate_range(0x5000_0abc, 7).unwrap();
        assert_eq!(r, vec![0x1000; 7]);
        assert!(h.translate_range(0, 0).unwrap().is_empty());
    }
}
