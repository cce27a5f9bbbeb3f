//! Remap stages applied on top of a mapping's DRAM coordinates.

use std::fmt;

use crate::architecture::DramAddr;
use crate::bits::bit;
use crate::naive::DdrStandard;

pub trait Remapping: fmt::Debug + Send + Sync {
    fn remap(&self, a: DramAddr) -> DramAddr;
    fn remap_reverse(&self, a: DramAddr) -> DramAddr;
    /// Coordinate bits this stage reads or writes.
    fn gran(&self) -> DramAddr;
}

/// Address pin mirroring on the second rank of a DIMM.
#[derive(Debug, Clone, Copy)]
pub struct RankMirror {
    pub ddr: DdrStandard,
}

fn swap_bits(x: u16, pairs: &[(u32, u32)]) -> u16 {
    let mut ret = x;
    for &(a, b) in pairs {
        let (ba, bb) = (bit(x as u64, a) as u16, bit(x as u64, b) as u16);
        ret &= !((1 << a) | (1 << b));
        ret |= (ba << b) | (bb << a);
    }
    ret
}

const DDR3_PINS: &[(u32, u32)] = &[(3, 4), (5, 6), (7, 8)];
const DDR4_PINS: &[(u32, u32)] = &[(3, 4), (5, 6), (7, 8), (11, 13)];

impl Remapping for RankMirror {
    fn remap(&self, a: DramAddr) -> DramAddr {
        if a.rank == 0 {
            return a;
        }
        let mut ret = a;
        match self.ddr {
            DdrStandard::Ddr3 => {
                ret.row = swap_bits(a.row, DDR3_PINS);
                ret.col = swap_bits(a.col, DDR3_PINS);
                ret.bank = swap_bits(a.bank as u16, &[(0, 1)]) as u8;
            }
            DdrStandard::Ddr4 => {
                ret.row = swap_bits(a.row, DDR4_PINS);
                ret.col = swap_bits(a.col, DDR4_PINS);
                // BA0<->BA1, BG0<->BG1
                ret.bank = swap_bits(a.bank as u16, &[(0, 1), (2, 3)]) as u8;
            }
        }
        ret
    }

    fn remap_reverse(&self, a: DramAddr) -> DramAddr {
        self.remap(a)
    }

    fn gran(&self) -> DramAddr {
        match self.ddr {
            DdrStandard::Ddr3 => DramAddr::new(0, 0, 0, 0x3, 0x1f8, 0x1f8),
            DdrStandard::Ddr4 => DramAddr::new(0, 0, 0, 0xf, 0x29f8, 0x29f8),
        }
    }
}

/// Row address XOR: if row bit `bit` is set, XOR the row with `mask`.
///
/// `mask` never contains `bit`, which keeps the stage its own inverse.
#[derive(Debug, Clone, Copy)]
pub struct RasXor {
    bit: u32,
    mask: u16,
}

impl RasXor {
    pub fn new(bit: u32, mask: u16) -> Result<RasXor, String> {
        if bit >= 16 {
            return Err(format!("bit {} is not a row bit", bit));
        }
        if mask & (1 << bit) != 0 {
            return Err(format!("mask {:#x} includes selector bit {}", mask, bit));
        }
        Ok(RasXor { bit, mask })
    }
}

impl Remapping for RasXor {
    fn remap(&self, mut a: DramAddr) -> DramAddr {
        if bit(a.row as u64, self.bit) != 0 {
            a.row ^= self.mask;
        }
        a
    }

    fn remap_reverse(&self, a: DramAddr) -> DramAddr {
        self.remap(a)
    }

    fn gran(&self) -> DramAddr {
        DramAddr::new(0, 0, 0, 0, self.mask, 0)
    }
}

pub(crate) fn remap_chain(remaps: &[Box<dyn Remapping>], a: DramAddr) -> DramAddr {
    remaps.iter().fold(a, |a, r| r.remap(a))
}

pub(crate) fn remap_chain_reverse(remaps: &[Box<dyn Remapping>], a: DramAddr) -> DramAddr {
    remaps.iter().rev().fold(a, |a, r| r.remap_reverse(a))
}
