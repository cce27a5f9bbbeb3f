use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::libc;
use nix::sys::uio::pread;
use tracing::{debug, trace};

use crate::architecture::PhysAddr;
use crate::error::{Error, Result};
use crate::translate::{page_size, Translate};

const ENTRY_SIZE: usize = 8;
const PRESENT: u64 = 1 << 63;
const PFN_MASK: u64 = (1 << 55) - 1;

/// Exact translation through a process's `/proc/<pid>/pagemap`.
///
/// The pagemap file is opened by [`Pagemap::open`] and closed when the value
/// is dropped, on every exit path. Each `Pagemap` owns its own handle.
#[derive(Debug)]
pub struct Pagemap {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl Pagemap {
    /// Opens the pagemap of `pid`, or of the calling process for `None`.
    pub fn open(pid: Option<u32>) -> Result<Pagemap> {
        let path = match pid {
            Some(pid) => PathBuf::from(format!("/proc/{}/pagemap", pid)),
            None => PathBuf::from("/proc/self/pagemap"),
        };
        Pagemap::from_path(path, page_size()?)
    }

    /// Reads pagemap-format entries from any file, e.g. a saved snapshot.
    pub fn from_path<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Pagemap> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        debug!(path = %path.display(), "pagemap opened");
        Ok(Pagemap { file, path, page_size })
    }

    fn read_entries(&self, first_page: usize, count: usize) -> Result<Vec<u64>> {
        let mut buf = vec![0u8; count * ENTRY_SIZE];
        let mut done = 0;
        while done < buf.len() {
            let off = (first_page * ENTRY_SIZE + done) as libc::off_t;
            let n = pread(self.file.as_raw_fd(), &mut buf[done..], off)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(buf[..done - done % ENTRY_SIZE]
            .chunks_exact(ENTRY_SIZE)
            .map(|c| u64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    // Unprivileged readers see present pages with a zeroed PFN.
    fn frame_base(&self, entry: u64) -> Option<PhysAddr> {
        let pfn = entry & PFN_MASK;
        if entry & PRESENT == 0 || pfn == 0 {
            return None;
        }
        Some(pfn * self.page_size as u64)
    }

    /// Like [`Translate::translate_range`], but pairs every mapped page's
    /// physical base with its virtual base.
    pub fn translate_range_entries(
        &self,
        vaddr: usize,
        page_count: usize,
    ) -> Result<Vec<(usize, PhysAddr)>> {
        let first = vaddr / self.page_size;
        let entries = self.read_entries(first, page_count)?;
        trace!(vaddr, page_count, read = entries.len(), "pagemap translate_range");
        Ok(entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, e)| {
                self.frame_base(e).map(|pa| ((first + i) * self.page_size, pa))
            })
            .collect())
    }
}

impl Translate for Pagemap {
    fn translate(&self, vaddr: usize) -> Result<PhysAddr> {
        let entry = self.read_entries(vaddr / self.page_size, 1)?;
        entry
            .first()
            .and_then(|&e| self.frame_base(e))
            .map(|base| base + (vaddr % self.page_size) as PhysAddr)
            .ok_or(Error::TranslationUnavailable { vaddr })
    }

    fn translate_range(&self, vaddr: usize, page_count: usize) -> Result<Vec<PhysAddr>> {
        Ok(self
            .translate_range_entries(vaddr, page_count)?
            .into_iter()
            .map(|(_, pa)| pa)
            .collect())
    }

    fn granularity(&self) -> usize {
        self.page_size
    }
}

impl Drop for Pagemap {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "pagemap closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn snapshot(name: &str, entries: &[u64]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("memsys-{}-{}.pagemap", name, std::process::id()));
        let mut f = File::create(&path).unwrap();
        for e in entries {
            f.write_all(&e.to_ne_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn unmapped_pages_are_omitted() {
        let path = snapshot("omit", &[PRESENT | 0x10, 0, PRESENT | 0x30, 0, PRESENT | 0x11]);
        let pm = Pagemap::from_path(&path, 4096).unwrap();
        let r = pm.translate_range(0, 5).unwrap();
        assert_eq!(r, vec![0x10 * 4096, 0x30 * 4096, 0x11 * 4096]);
        let e = pm.translate_range_entries(4096, 4).unwrap();
        assert_eq!(e, vec![(2 * 4096, 0x30 * 4096), (4 * 4096, 0x11 * 4096)]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn single_translation_keeps_page_offset() {
        let path = snapshot("single", &[0, PRESENT | 0x42]);
        let pm = Pagemap::from_path(&path, 4096).unwrap();
        assert_eq!(pm.translate(4096 + 0x123).unwrap(), 0x42 * 4096 + 0x123);
        assert!(matches!(pm.translate(0x10), Err(Error::TranslationUnavailable { vaddr: 0x10 })));
        // past the end of the table
        assert!(matches!(pm.translate(10 * 4096), Err(Error::TranslationUnavailable { .. })));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn hidden_frames_are_omitted() {
        let path = snapshot("hidden", &[PRESENT, PRESENT | 0x20]);
        let pm = Pagemap::from_path(&path, 4096).unwrap();
        assert!(matches!(pm.translate(0x123), Err(Error::TranslationUnavailable { vaddr: 0x123 })));
        assert_eq!(pm.translate_range(0, 2).unwrap(), vec![0x20 * 4096]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_pagemap_is_an_error() {
        assert!(matches!(
            Pagemap::from_path("/nonexistent/pagemap", 4096),
            Err(Error::Io(_))
        ));
    }
}
