//! Naive single-channel mapping: column, then bank, then row bits, no hashing.

use crate::architecture::{Architecture, DramAddr, MappingProps, PhysAddr, BAD_ADDR};
use crate::bits::{least_set_bit, ls_bits};

const MW_BITS: u32 = 3;
const COL_BITS: u32 = 10;
const ROW_BITS: u32 = 16;
const BANK_OFF: u32 = MW_BITS + COL_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdrStandard {
    Ddr3,
    Ddr4,
}

impl DdrStandard {
    pub fn bank_bits(self) -> u32 {
        match self {
            DdrStandard::Ddr3 => 3,
            DdrStandard::Ddr4 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DdrStandard::Ddr3 => "ddr3",
            DdrStandard::Ddr4 => "ddr4",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Naive {
    pub ddr: DdrStandard,
}

impl Naive {
    fn row_off(&self) -> u32 {
        BANK_OFF + self.ddr.bank_bits()
    }
}

impl Architecture for Naive {
    fn phys_to_dram(&self, p: PhysAddr) -> DramAddr {
        let row_off = self.row_off();
        if p >> (row_off + ROW_BITS) != 0 {
            return DramAddr::INVALID;
        }
        DramAddr {
            chan: 0,
            dimm: 0,
            rank: 0,
            bank: ls_bits(p >> BANK_OFF, self.ddr.bank_bits()) as u8,
            row: ls_bits(p >> row_off, ROW_BITS) as u16,
            col: ls_bits(p >> MW_BITS, COL_BITS) as u16,
        }
    }

    fn dram_to_phys(&self, a: &DramAddr) -> PhysAddr {
        let bbits = self.ddr.bank_bits();
        if a.chan != 0 || a.dimm != 0 || a.rank != 0 || a.bank as u64 >> bbits != 0
            || a.col as u64 >> COL_BITS != 0
        {
            return BAD_ADDR;
        }
        ((a.row as u64) << self.row_off())
            + ((a.bank as u64) << BANK_OFF)
            + ((a.col as u64) << MW_BITS)
    }

    fn twiddle_gran(&self, mask: &DramAddr) -> u64 {
        let mut base = 1u64 << MW_BITS;
        if let Some(lsb) = least_set_bit(mask.col as u64) {
            return base << lsb;
        }
        base <<= COL_BITS;
        if let Some(lsb) = least_set_bit(mask.bank as u64) {
            return base << lsb;
        }
        base <<= self.ddr.bank_bits();
        match least_set_bit(mask.row as u64) {
            Some(lsb) => base << lsb,
            None => 0,
        }
    }

    fn props(&self) -> MappingProps {
        MappingProps {
            granularity: 1 << BANK_OFF,
            bank_cnt: 1 << self.ddr.bank_bits(),
            col_cnt: 1 << COL_BITS,
            cell_size: 1 << MW_BITS,
        }
    }
}
