use crate::architecture::{PhysAddr, BAD_ADDR};

pub const FOUR_GB: PhysAddr = 1 << 32;

/// PCI hole below 4 GiB: the controller shadows `[pci_base, 4G)` and remaps
/// the RAM behind it to start at `top_of_memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciHole {
    pub pci_base: PhysAddr,
    pub top_of_memory: PhysAddr,
}

impl PciHole {
    /// CPU-visible physical address to controller-linear address.
    pub fn remap(&self, addr: PhysAddr) -> PhysAddr {
        if addr < self.top_of_memory {
            if addr >= self.pci_base && addr < FOUR_GB {
                BAD_ADDR
            } else {
                addr
            }
        } else {
            self.pci_base
                .checked_add(addr - self.top_of_memory)
                .unwrap_or(BAD_ADDR)
        }
    }

    pub fn remap_reverse(&self, addr: PhysAddr) -> PhysAddr {
        if addr >= self.pci_base && addr < FOUR_GB {
            (addr - self.pci_base)
                .checked_add(self.top_of_memory)
                .unwrap_or(BAD_ADDR)
        } else {
            addr
        }
    }
}
