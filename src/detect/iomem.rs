//! PCI hole parameters from the firmware physical memory map.

use crate::pcihole::FOUR_GB;

const ONE_MB: u64 = 1 << 20;
const MEM_GRAN: u64 = 1 << 30;

/// One line of `/proc/iomem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IomemRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub name: String,
    /// Nesting level; top-level ranges are 0.
    pub depth: usize,
}

impl IomemRange {
    fn is_pci(&self) -> bool {
        self.name.contains("PCI")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapWindow {
    pub remap_enabled: bool,
    pub pci_base: u64,
    pub top_of_memory: u64,
}

/// Parses `/proc/iomem`. Malformed lines are skipped.
pub fn parse_iomem(text: &str) -> Vec<IomemRange> {
    text.lines()
        .filter_map(|line| {
            let body = line.trim_start();
            let depth = (line.len() - body.len()) / 2;
            let (span, name) = body.split_once(" : ")?;
            let (start, end) = span.split_once('-')?;
            Some(IomemRange {
                start: u64::from_str_radix(start, 16).ok()?,
                end: u64::from_str_radix(end, 16).ok()?,
                name: name.trim().to_string(),
                depth,
            })
        })
        .collect()
}

/// Derives the PCI hole window from the memory map.
///
/// The window starts at the first top-level PCI range between 1 MiB and
/// 4 GiB. Returns `None` when there is no such range (addresses are hidden
/// from unprivileged readers) or when system RAM lies between two of them,
/// since the hole is then not a single window.
pub fn infer_remap_window(ranges: &[IomemRange]) -> Option<RemapWindow> {
    let top: Vec<&IomemRange> = ranges.iter().filter(|r| r.depth == 0).collect();
    let pci: Vec<&IomemRange> = top
        .iter()
        .copied()
        .filter(|r| r.is_pci() && r.start > ONE_MB && r.start < FOUR_GB)
        .collect();
    let first = pci.first()?;
    let last = pci.last()?;
    let split = top
        .iter()
        .any(|r| r.name == "System RAM" && r.start > first.start && r.start < last.start);
    if split {
        return None;
    }

    let pci_base = first.start;
    let last_mem = top.iter().rev().find(|r| !r.is_pci())?;
    let top_of_memory = last_mem
        .end
        .saturating_add(1)
        .saturating_add(pci_base)
        .saturating_sub(FOUR_GB);
    Some(RemapWindow {
        remap_enabled: ranges.iter().any(|r| r.start >= FOUR_GB),
        pci_base,
        top_of_memory: top_of_memory.div_ceil(MEM_GRAN) * MEM_GRAN,
    })
}
