//! Virtual to physical address translation.

mod heuristic;
mod pagemap;

pub use heuristic::Heuristic;
pub use pagemap::Pagemap;

use nix::unistd::{sysconf, SysconfVar};

use crate::architecture::PhysAddr;
use crate::error::{Error, Result};

pub trait Translate {
    /// Physical address backing `vaddr`.
    fn translate(&self, vaddr: usize) -> Result<PhysAddr>;

    /// Physical base addresses of `page_count` translation units starting at
    /// the unit containing `vaddr`, in request order. Units with no backing
    /// memory are left out, so a short result means some were unmapped.
    fn translate_range(&self, vaddr: usize, page_count: usize) -> Result<Vec<PhysAddr>>;

    /// Size in bytes of one translation unit.
    fn granularity(&self) -> usize;
}

pub fn page_size() -> Result<usize> {
    match sysconf(SysconfVar::PAGE_SIZE)? {
        Some(sz) if sz > 0 => Ok(sz as usize),
        _ => Err(Error::Sys(nix::errno::Errno::EINVAL)),
    }
}
