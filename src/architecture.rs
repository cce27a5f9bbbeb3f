//! DRAM coordinates and the mapping-stage contract.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Range, Sub};

/// Physical memory address, as seen by the CPU.
pub type PhysAddr = u64;

/// Reserved "no physical mapping" address; distinct from address zero.
pub const BAD_ADDR: PhysAddr = PhysAddr::MAX;

/// `(chan, dimm, rank, bank, row)`: every address sharing one DRAM row.
pub type RowIndex = (u8, u8, u8, u8, u16);

const NIBBLE: u8 = 0xf;

/// Location of a memory word on the DRAM bus.
///
/// `chan`, `dimm`, `rank` and `bank` are 4 bits wide even though they are
/// stored in a byte; `row` and `col` are 16 bits wide. [`DramAddr::new`] and
/// the arithmetic operators truncate the narrow fields to 4 bits. Fields
/// written directly are not truncated, and since equality, ordering and
/// hashing all go through [`DramAddr::numeric_value`], an out-of-range value
/// aliases into its neighbouring field (`dimm = 0x10` compares equal to
/// `chan = 1`).
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct DramAddr {
    pub chan: u8,
    pub dimm: u8,
    pub rank: u8,
    pub bank: u8,
    pub row: u16,
    pub col: u16,
}

/// DRAM organization level, from fine to coarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DramLevel {
    Row,
    Bank,
    Rank,
    Dimm,
    Chan,
}

impl DramAddr {
    /// Number of fields, in declaration order.
    pub const LEN: usize = 6;

    /// Coordinate returned for physical addresses that do not map to DRAM.
    pub const INVALID: DramAddr = DramAddr::new(0xff, 0xff, 0xff, 0xff, 0xffff, 0xffff);

    /// Builds a coordinate; bits above the low nibble of `chan`, `dimm`,
    /// `rank` and `bank` are silently dropped.
    pub const fn new(chan: u8, dimm: u8, rank: u8, bank: u8, row: u16, col: u16) -> DramAddr {
        DramAddr {
            chan: chan & NIBBLE,
            dimm: dimm & NIBBLE,
            rank: rank & NIBBLE,
            bank: bank & NIBBLE,
            row,
            col,
        }
    }

    pub fn numeric_value(&self) -> u64 {
        self.col as u64
            | (self.row as u64) << 16
            | (self.bank as u64) << 32
            | (self.rank as u64) << 40
            | (self.dimm as u64) << 48
            | (self.chan as u64) << 52
    }

    pub fn is_valid(&self) -> bool {
        *self != DramAddr::INVALID
    }

    /// True if both coordinates share channel, DIMM, rank and bank.
    pub fn same_bank(&self, other: &DramAddr) -> bool {
        self.same(DramLevel::Bank, other)
    }

    /// True if both coordinates agree on `lvl` and every coarser level.
    pub fn same(&self, lvl: DramLevel, other: &DramAddr) -> bool {
        let chan = self.chan == other.chan;
        let dimm = chan && self.dimm == other.dimm;
        let rank = dimm && self.rank == other.rank;
        let bank = rank && self.bank == other.bank;
        match lvl {
            DramLevel::Chan => chan,
            DramLevel::Dimm => dimm,
            DramLevel::Rank => rank,
            DramLevel::Bank => bank,
            DramLevel::Row => bank && self.row == other.row,
        }
    }

    pub fn row_index(&self) -> RowIndex {
        (self.chan, self.dimm, self.rank, self.bank, self.row)
    }

    /// Field `i` in the order (chan, dimm, rank, bank, row, col).
    pub fn get(&self, i: usize) -> Option<u16> {
        match i {
            0 => Some(self.chan as u16),
            1 => Some(self.dimm as u16),
            2 => Some(self.rank as u16),
            3 => Some(self.bank as u16),
            4 => Some(self.row),
            5 => Some(self.col),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [u16; DramAddr::LEN] {
        [
            self.chan as u16,
            self.dimm as u16,
            self.rank as u16,
            self.bank as u16,
            self.row,
            self.col,
        ]
    }

    /// Partial tuple extraction, e.g. `fields(0..4)` for the bank prefix.
    /// Out-of-range bounds are clamped.
    pub fn fields(&self, r: Range<usize>) -> Vec<u16> {
        let end = r.end.min(DramAddr::LEN);
        let start = r.start.min(end);
        self.to_array()[start..end].to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.to_array().into_iter()
    }
}

impl PartialEq for DramAddr {
    fn eq(&self, other: &Self) -> bool {
        self.numeric_value() == other.numeric_value()
    }
}

impl Eq for DramAddr {}

impl PartialOrd for DramAddr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DramAddr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_value().cmp(&other.numeric_value())
    }
}

impl Hash for DramAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.numeric_value())
    }
}

// Per-field wraparound: 4-bit fields mod 16, row and col mod 65536.
impl Add for DramAddr {
    type Output = DramAddr;

    fn add(self, o: DramAddr) -> DramAddr {
        DramAddr::new(
            self.chan.wrapping_add(o.chan),
            self.dimm.wrapping_add(o.dimm),
            self.rank.wrapping_add(o.rank),
            self.bank.wrapping_add(o.bank),
            self.row.wrapping_add(o.row),
            self.col.wrapping_add(o.col),
        )
    }
}

impl Sub for DramAddr {
    type Output = DramAddr;

    fn sub(self, o: DramAddr) -> DramAddr {
        DramAddr::new(
            self.chan.wrapping_sub(o.chan),
            self.dimm.wrapping_sub(o.dimm),
            self.rank.wrapping_sub(o.rank),
            self.bank.wrapping_sub(o.bank),
            self.row.wrapping_sub(o.row),
            self.col.wrapping_sub(o.col),
        )
    }
}

impl IntoIterator for DramAddr {
    type Item = u16;
    type IntoIter = std::array::IntoIter<u16, { DramAddr::LEN }>;

    fn into_iter(self) -> Self::IntoIter {
        self.to_array().into_iter()
    }
}

impl fmt::Display for DramAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:1x} {:1x} {:1x} {:1x} {:4x} {:3x})",
            self.chan, self.dimm, self.rank, self.bank, self.row, self.col
        )
    }
}

impl fmt::Debug for DramAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DramAddr({}, {}, {}, {}, {}, {})",
            self.chan, self.dimm, self.rank, self.bank, self.row, self.col
        )
    }
}

/// Static properties of a mapping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingProps {
    /// Largest physical stride after which the coordinate pattern repeats.
    pub granularity: u64,
    pub bank_cnt: u32,
    pub col_cnt: u32,
    /// Bytes per column (memory word).
    pub cell_size: u32,
}

/// A controller-specific physical <-> DRAM mapping.
///
/// `phys_to_dram` returns [`DramAddr::INVALID`] for addresses outside the
/// geometry; `dram_to_phys` returns [`BAD_ADDR`] for coordinates that no
/// physical address maps to.
pub trait Architecture: fmt::Debug + Send + Sync {
    fn phys_to_dram(&self, p: PhysAddr) -> DramAddr;
    fn dram_to_phys(&self, a: &DramAddr) -> PhysAddr;
    /// Smallest physical stride that changes any coordinate bit set in `mask`;
    /// 0 if no bit in `mask` is reachable.
    fn twiddle_gran(&self, mask: &DramAddr) -> u64;
    fn props(&self) -> MappingProps;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn dram_strategy() -> impl Strategy<Value = DramAddr> {
        (0u8..16, 0u8..16, 0u8..16, 0u8..16, any::<u16>(), any::<u16>())
            .prop_map(|(c, d, r, b, row, col)| DramAddr::new(c, d, r, b, row, col))
    }

    #[test]
    fn numeric_value_packs_fields() {
        let a = DramAddr::new(1, 2, 3, 4, 0x5678, 0x9abc);
        assert_eq!(a.numeric_value(), 0x0012_0304_5678_9abc);
    }

    #[test]
    fn new_truncates_narrow_fields() {
        let a = DramAddr::new(0x1f, 0x21, 0xf3, 0x14, 1, 1);
        assert_eq!((a.chan, a.dimm, a.rank, a.bank), (0xf, 1, 3, 4));
    }

    #[test]
    fn out_of_range_field_aliases_through_packed_value() {
        let mut wide = DramAddr::default();
        wide.dimm = 0x10;
        let chan = DramAddr::new(1, 0, 0, 0, 0, 0);
        assert_eq!(wide, chan);
        let mut set = HashSet::new();
        set.insert(wide);
        assert!(set.contains(&chan));
    }

    #[test]
    fn each_field_wraps_at_its_width() {
        let one = |i: usize| {
            let mut f = [0u16; 6];
            f[i] = 1;
            DramAddr::new(f[0] as u8, f[1] as u8, f[2] as u8, f[3] as u8, f[4], f[5])
        };
        let max = DramAddr::new(0xf, 0xf, 0xf, 0xf, 0xffff, 0xffff);
        for i in 0..DramAddr::LEN {
            let sum = max + one(i);
            assert_eq!(sum.get(i), Some(0), "field {} did not wrap", i);
            let diff = DramAddr::default() - one(i);
            assert_eq!(diff.get(i), max.get(i), "field {} did not wrap", i);
        }
        let chan = DramAddr::new(0xf, 0, 0, 0, 0, 0) + DramAddr::new(1, 0, 0, 0, 0, 0);
        assert_eq!(chan.chan, 0);
    }

    #[test]
    fn same_bank_ignores_row_and_col() {
        let a = DramAddr::new(1, 0, 1, 5, 10, 20);
        let b = DramAddr::new(1, 0, 1, 5, 11, 0);
        let c = DramAddr::new(1, 0, 0, 5, 10, 20);
        assert!(a.same_bank(&b));
        assert!(!a.same_bank(&c));
        assert!(!a.same(DramLevel::Row, &b));
        assert!(a.same(DramLevel::Dimm, &c));
    }

    #[test]
    fn indexing_follows_declaration_order() {
        let a = DramAddr::new(1, 2, 3, 4, 5, 6);
        assert_eq!(a.to_array(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(a.get(6), None);
        assert_eq!(a.fields(0..4), vec![1, 2, 3, 4]);
        assert_eq!(a.fields(4..10), vec![5, 6]);
        assert_eq!(a.into_iter().sum::<u16>(), 21);
        assert_eq!(a.iter().count(), DramAddr::LEN);
    }

    #[test]
    fn display_is_hex_tuple() {
        let a = DramAddr::new(1, 0, 1, 0xa, 0x1234, 0x3ff);
        assert_eq!(a.to_string(), "(1 0 1 a 1234 3ff)");
    }

    proptest! {
        #[test]
        fn equality_matches_numeric_value(a in dram_strategy(), b in dram_strategy()) {
            prop_assert_eq!(a == b, a.numeric_value() == b.numeric_value());
            prop_assert_eq!(a.cmp(&b), a.numeric_value().cmp(&b.numeric_value()));
        }

        #[test]
        fn add_then_sub_is_identity(a in dram_strategy(), b in dram_strategy()) {
            prop_assert_eq!((a + b) - b, a);
            prop_assert_eq!(a + b, b + a);
        }

        #[test]
        fn same_bank_is_equivalence(a in dram_strategy(), b in dram_strategy(), c in dram_strategy()) {
            prop_assert!(a.same_bank(&a));
            prop_assert_eq!(a.same_bank(&b), b.same_bank(&a));
            if a.same_bank(&b) && b.same_bank(&c) {
                prop_assert!(a.same_bank(&c));
            }
            let mut moved = a;
            moved.row = b.row;
            moved.col = b.col;
            prop_assert!(a.same_bank(&moved));
        }
    }
}
