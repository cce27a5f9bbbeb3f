//! Memory geometry from SMBIOS memory device records.

/// One "Memory Device" record of `dmidecode -t memory`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    /// Module size in bytes, `None` for an empty slot.
    pub size: Option<u64>,
    pub rank: Option<u32>,
}

impl Slot {
    pub fn populated(&self) -> bool {
        self.size.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub channels: u32,
    pub dimms: u32,
    pub ranks: u32,
}

impl Geometry {
    pub fn new(channels: u32, dimms: u32, ranks: u32) -> Geometry {
        Geometry { channels, dimms, ranks }
    }
}

fn parse_size(v: &str) -> Option<u64> {
    let mut it = v.split_whitespace();
    let n: u64 = it.next()?.parse().ok()?;
    let shift = match it.next()? {
        "bytes" => 0,
        "kB" | "KB" => 10,
        "MB" => 20,
        "GB" => 30,
        "TB" => 40,
        _ => return None,
    };
    (n > 0).then_some(n << shift)
}

/// Parses `dmidecode -t memory` output into one slot per memory device, in
/// output order.
pub fn parse_dmidecode(text: &str) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut cur: Option<Slot> = None;
    for line in text.lines() {
        if !line.starts_with(char::is_whitespace) {
            if let Some(s) = cur.take() {
                slots.push(s);
            }
            if line.trim() == "Memory Device" {
                cur = Some(Slot::default());
            }
            continue;
        }
        let Some(slot) = cur.as_mut() else { continue };
        let Some((key, value)) = line.trim().split_once(':') else { continue };
        match key {
            "Size" => slot.size = parse_size(value),
            "Rank" => slot.rank = value.trim().parse().ok(),
            _ => {}
        }
    }
    slots.extend(cur);
    slots
}

/// Guesses channel and DIMM counts from slot population. `None` means the
/// layout is ambiguous and has to be asked for.
///
/// The rank count is taken from the first populated slot that reports one.
pub fn guess_geometry(slots: &[Slot]) -> Option<Geometry> {
    let used: Vec<bool> = slots.iter().map(Slot::populated).collect();
    let nused = used.iter().filter(|u| **u).count();
    if nused == 0 {
        return None;
    }
    let ranks = slots
        .iter()
        .filter(|s| s.populated())
        .find_map(|s| s.rank)
        .unwrap_or(1);
    let (channels, dimms) = match (used.len(), nused) {
        (1, _) => (1, 1),
        (2, 2) => (1, 2),
        (2, _) => (1, 1),
        (4, 1) => (1, 1),
        (4, 4) => (2, 2),
        (4, 2) => match used[..] {
            [true, true, false, false] | [false, false, true, true] => (1, 2),
            [true, false, true, false] | [false, true, false, true] => (2, 1),
            _ => return None,
        },
        _ => return None,
    };
    Some(Geometry { channels, dimms, ranks })
}
