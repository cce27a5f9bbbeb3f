//! Intel Sandy Bridge and Ivy Bridge/Haswell memory controller mappings.

use crate::architecture::{Architecture, DramAddr, MappingProps, PhysAddr, BAD_ADDR};
use crate::bits::{bit, least_set_bit, ls_bits, remove_bit};
use crate::pcihole::PciHole;

const MW_BITS: u32 = 3;
const COL_BITS: u32 = 10;
const ROW_BITS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelGen {
    Sandy,
    IvyHaswell,
}

#[derive(Clone)]
#[derive(Debug)]
pub struct Intel {
    pub generation: IntelGen,
    pub dual_channel: bool,
    pub dual_dimm: bool,
    pub dual_rank: bool,
    pub pci: Option<PciHole>,
}

impl Intel {
    fn fits(&self, a: &DramAddr) -> bool {
        a.chan <= self.dual_channel as u8
            && a.dimm <= self.dual_dimm as u8
            && a.rank <= self.dual_rank as u8
            && a.bank < 8
            && (a.col as u64) >> COL_BITS == 0
    }

    fn sandy_to_dram(&self, mut p: PhysAddr) -> DramAddr {
        let mut dram_addr = DramAddr::default();
        if self.dual_channel {
            dram_addr.chan = bit(p, 6) as u8;
            p = remove_bit(p, 6);
        }

        p >>= MW_BITS;

        dram_addr.col = ls_bits(p, COL_BITS) as u16;
        p >>= COL_BITS;

        if self.dual_dimm {
            dram_addr.dimm = bit(p, 3) as u8;
            p = remove_bit(p, 3);
        }

        if self.dual_rank {
            dram_addr.rank = bit(p, 3) as u8;
            p = remove_bit(p, 3);
        }
        for i in 0..3 {
            dram_addr.bank |= ((bit(p, 0) ^ bit(p, 3)) as u8) << i;
            p >>= 1;
        }

        dram_addr.row = ls_bits(p, ROW_BITS) as u16;
        if p >> ROW_BITS != 0 {
            return DramAddr::INVALID;
        }
        dram_addr
    }

    fn sandy_to_phys(&self, addr: &DramAddr) -> PhysAddr {
        let bank = addr.bank as u64;
        let row = addr.row as u64;
        let col = addr.col as u64;

        let mut p_addr = ls_bits(row, ROW_BITS);

        if self.dual_rank {
            p_addr <<= 1;
            p_addr |= bit(addr.rank as u64, 0);
        }

        if self.dual_dimm {
            p_addr <<= 1;
            p_addr |= bit(addr.dimm as u64, 0);
        }

        for i in (0..3).rev() {
            p_addr <<= 1;
            p_addr |= bit(bank, i) ^ bit(row, i);
        }

        if self.dual_channel {
            p_addr <<= 7;
            p_addr |= ls_bits(col >> 3, 7);
            p_addr <<= 1;
            p_addr |= bit(addr.chan as u64, 0);
            p_addr <<= 3;
            p_addr |= ls_bits(col, 3);
        } else {
            p_addr <<= COL_BITS;
            p_addr |= ls_bits(col, COL_BITS);
        }

        p_addr << MW_BITS
    }

    fn ivy_to_dram(&self, mut p: PhysAddr) -> DramAddr {
        let mut dram_addr = DramAddr::default();
        if self.dual_channel {
            dram_addr.chan = (bit(p, 7) ^ bit(p, 8) ^ bit(p, 9) ^ bit(p, 12)
                ^ bit(p, 13) ^ bit(p, 18) ^ bit(p, 19)) as u8;
            p = remove_bit(p, 7);
        }

        p >>= MW_BITS;

        dram_addr.col = ls_bits(p, COL_BITS) as u16;
        p >>= COL_BITS;

        if self.dual_dimm {
            dram_addr.dimm = bit(p, 2) as u8;
            p = remove_bit(p, 2);
        }

        if self.dual_rank {
            dram_addr.rank = (bit(p, 2) ^ bit(p, 6)) as u8;
            p = remove_bit(p, 2);
        }
        for i in 0..2 {
            dram_addr.bank |= ((bit(p, 0) ^ bit(p, 3)) as u8) << i;
            p >>= 1;
        }

        let hi = if self.dual_rank { 4 } else { 3 };
        dram_addr.bank |= ((bit(p, 0) ^ bit(p, hi)) as u8) << 2;
        p >>= 1;

        dram_addr.row = ls_bits(p, ROW_BITS) as u16;
        if p >> ROW_BITS != 0 {
            return DramAddr::INVALID;
        }
        dram_addr
    }

    fn ivy_to_phys(&self, addr: &DramAddr) -> PhysAddr {
        let bank = addr.bank as u64;
        let row = addr.row as u64;
        let rank = addr.rank as u64;
        let col = addr.col as u64;

        let mut p_addr = ls_bits(row, ROW_BITS);

        if self.dual_rank {
            p_addr <<= 1;
            p_addr |= bit(bank, 2) ^ bit(row, 3);
            p_addr <<= 1;
            p_addr |= bit(rank, 0) ^ bit(row, 2);
        } else {
            p_addr <<= 1;
            p_addr |= bit(bank, 2) ^ bit(row, 2);
        }

        if self.dual_dimm {
            p_addr <<= 1;
            p_addr |= bit(addr.dimm as u64, 0);
        }

        p_addr <<= 1;
        p_addr |= bit(bank, 1) ^ bit(row, 1);
        p_addr <<= 1;
        p_addr |= bit(bank, 0) ^ bit(row, 0);

        if self.dual_channel {
            p_addr <<= 6;
            p_addr |= ls_bits(col >> 4, 6);
            p_addr <<= 1;
            p_addr |= bit(addr.chan as u64, 0) ^ bit(p_addr, 1) ^ bit(p_addr, 2)
                ^ bit(p_addr, 5) ^ bit(p_addr, 6) ^ bit(p_addr, 11) ^ bit(p_addr, 12);
            p_addr <<= 4;
            p_addr |= ls_bits(col, 4);
        } else {
            p_addr <<= COL_BITS;
            p_addr |= ls_bits(col, COL_BITS);
        }

        p_addr << MW_BITS
    }

    fn sandy_twiddle(&self, mask: &DramAddr) -> u64 {
        let dchan = self.dual_channel as u32;
        let ddimm = self.dual_dimm as u32;
        let drank = self.dual_rank as u32;
        let mut base = 1u64 << MW_BITS;
        if let Some(g) = contiguous_twiddle(mask.col as u64, base, 3) {
            return g;
        }
        if self.dual_channel && mask.chan != 0 {
            return base << 3;
        }
        if let Some(g) = contiguous_twiddle(mask.col as u64, base << dchan, 0) {
            return g;
        }
        base <<= COL_BITS + dchan;
        if let Some(g) = contiguous_twiddle(mask.bank as u64, base, 0) {
            return g;
        }
        base <<= 3;
        if self.dual_dimm && mask.dimm != 0 {
            return base;
        }
        if self.dual_rank && mask.rank != 0 {
            return base << ddimm;
        }
        base <<= ddimm + drank;
        contiguous_twiddle(mask.row as u64, base, 0).unwrap_or(0)
    }

    fn ivy_twiddle(&self, mask: &DramAddr) -> u64 {
        let dchan = self.dual_channel as u32;
        let ddimm = self.dual_dimm as u32;
        let drank = self.dual_rank as u32;
        let mut base = 1u64 << MW_BITS;
        if let Some(g) = contiguous_twiddle(mask.col as u64, base, 4) {
            return g;
        }
        if self.dual_channel && mask.chan != 0 {
            return base << 4;
        }
        if let Some(g) = contiguous_twiddle(mask.col as u64, base << dchan, 0) {
            return g;
        }
        base <<= COL_BITS + dchan;
        if let Some(g) = contiguous_twiddle(mask.bank as u64, base, 2) {
            return g;
        }
        if self.dual_dimm && mask.dimm != 0 {
            return base << 2;
        }
        if self.dual_rank && mask.rank != 0 {
            return base << (2 + ddimm);
        }
        if bit(mask.bank as u64, 2) != 0 {
            return base << (2 + ddimm + drank);
        }
        base <<= 3 + ddimm + drank;
        contiguous_twiddle(mask.row as u64, base, 0).unwrap_or(0)
    }
}

// stride of the lowest set bit of `mask`, if it lies below `maxbits` (0: no limit)
fn contiguous_twiddle(mask: u64, base: u64, maxbits: u32) -> Option<u64> {
    let lsb = least_set_bit(mask)?;
    if maxbits == 0 || lsb < maxbits {
        Some(base << lsb)
    } else {
        None
    }
}

impl Architecture for Intel {
    fn phys_to_dram(&self, p: PhysAddr) -> DramAddr {
        let p = match self.pci {
            Some(hole) => hole.remap(p),
            None => p,
        };
        if p == BAD_ADDR {
            return DramAddr::INVALID;
        }
        match self.generation {
            IntelGen::Sandy => self.sandy_to_dram(p),
            IntelGen::IvyHaswell => self.ivy_to_dram(p),
        }
    }

    fn dram_to_phys(&self, a: &DramAddr) -> PhysAddr {
        if !self.fits(a) {
            return BAD_ADDR;
        }
        let p = match self.generation {
            IntelGen::Sandy => self.sandy_to_phys(a),
            IntelGen::IvyHaswell => self.ivy_to_phys(a),
        };
        match self.pci {
            Some(hole) => hole.remap_reverse(p),
            None => p,
        }
    }

    fn twiddle_gran(&self, mask: &DramAddr) -> u64 {
        match self.generation {
            IntelGen::Sandy => self.sandy_twiddle(mask),
            IntelGen::IvyHaswell => self.ivy_twiddle(mask),
        }
    }

    fn props(&self) -> MappingProps {
        let granularity = match (self.generation, self.dual_channel) {
            (IntelGen::Sandy, true) => 1 << 6,
            (IntelGen::IvyHaswell, true) => 1 << 7,
            (_, false) => 1 << 13,
        };
        MappingProps {
            granularity,
            bank_cnt: 8,
            col_cnt: 1 << COL_BITS,
            cell_size: 1 << MW_BITS,
        }
    }
}
