pub(crate) fn bit(x: u64, i: u32) -> u64 {
    (x >> i) & 1
}

pub(crate) fn ls_bits(x: u64, i: u32) -> u64 {
    x & ((1 << i) - 1)
}

// drop bit i, shifting the higher bits down by one
pub(crate) fn remove_bit(x: u64, i: u32) -> u64 {
    ls_bits(x, i) + ((x >> (i + 1)) << i)
}

pub(crate) fn least_set_bit(x: u64) -> Option<u32> {
    if x == 0 {
        None
    } else {
        Some(x.trailing_zeros())
    }
}
