//! C ABI for the memory system facade.
//!
//! A loaded system is handed out as an opaque pointer from
//! `ramses_msys_load` and must be released with `ramses_msys_free`.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use crate::architecture::{DramAddr, PhysAddr, BAD_ADDR};
use crate::error::{ConfigErrorKind, Error};
use crate::msys::MemorySystem;

const ERR_BADINPUT: c_int = 13;

static ERRMSGS: &[&[u8]] = &[
    b"Success\0",
    b"Unknown configuration type\0",
    b"Unknown configurator\0",
    b"Configurator not specified\0",
    b"Missing positional argument\0",
    b"Unknown positional argument value\0",
    b"Unknown argument\0",
    b"No value supplied to keyword argument\0",
    b"Bad format for numerical argument\0",
    b"Flag argument supplied with value\0",
    b"Mapping stage missing or not first\0",
    b"More than one mapping stage\0",
    b"Error initialising remap configuration\0",
    b"Configuration is not valid UTF-8 or a null pointer was passed\0",
];

static UNKNOWN_ERR: &[u8] = b"Unknown error\0";

fn error_code(kind: &ConfigErrorKind) -> c_int {
    match kind {
        ConfigErrorKind::BadType(_) => 1,
        ConfigErrorKind::BadConfigurator(_) => 2,
        ConfigErrorKind::NoConfigurator => 3,
        ConfigErrorKind::MissingPositional(_) => 4,
        ConfigErrorKind::BadPositional(_) => 5,
        ConfigErrorKind::BadArgument(_) => 6,
        ConfigErrorKind::NoValue(_) => 7,
        ConfigErrorKind::BadInt(_) => 8,
        ConfigErrorKind::FlagWithValue(_) => 9,
        ConfigErrorKind::NoMapping => 10,
        ConfigErrorKind::DuplicateMapping => 11,
        ConfigErrorKind::RemapInit(_) => 12,
    }
}

/// Parses `s` and stores a new memory system in `*out`.
///
/// Returns 0 on success. On failure returns an error code for
/// `ramses_msys_load_strerr`, leaves `*out` untouched and, if `erridx` is
/// not null, stores the byte offset where parsing stopped.
///
/// # Safety
///
/// `s` must be a valid NUL-terminated string. `out` must be valid for
/// writes; `erridx` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn ramses_msys_load(
    s: *const c_char,
    out: *mut *mut MemorySystem,
    erridx: *mut usize,
) -> c_int {
    if s.is_null() || out.is_null() {
        return ERR_BADINPUT;
    }
    let text = match CStr::from_ptr(s).to_str() {
        Ok(t) => t,
        Err(e) => {
            if !erridx.is_null() {
                *erridx = e.valid_up_to();
            }
            return ERR_BADINPUT;
        }
    };
    match MemorySystem::from_config(text) {
        Ok(m) => {
            *out = Box::into_raw(Box::new(m));
            0
        }
        Err(Error::Config(e)) => {
            if !erridx.is_null() {
                *erridx = e.offset;
            }
            error_code(&e.kind)
        }
        Err(_) => ERR_BADINPUT,
    }
}

/// Static, NUL-terminated description of a `ramses_msys_load` error code.
#[no_mangle]
pub extern "C" fn ramses_msys_load_strerr(err: c_int) -> *const c_char {
    let msg = usize::try_from(err)
        .ok()
        .and_then(|i| ERRMSGS.get(i))
        .copied()
        .unwrap_or(UNKNOWN_ERR);
    msg.as_ptr() as *const c_char
}

/// Returns `DramAddr::INVALID` for a null system.
///
/// # Safety
///
/// `m` must be null or a pointer obtained from `ramses_msys_load` that has
/// not been freed.
#[no_mangle]
pub unsafe extern "C" fn ramses_resolve(m: *const MemorySystem, addr: PhysAddr) -> DramAddr {
    match m.as_ref() {
        Some(m) => m.resolve(addr).unwrap_or(DramAddr::INVALID),
        None => DramAddr::INVALID,
    }
}

/// Returns `u64::MAX` for coordinates with no physical address.
///
/// # Safety
///
/// As for `ramses_resolve`.
#[no_mangle]
pub unsafe extern "C" fn ramses_resolve_reverse(m: *const MemorySystem, addr: DramAddr) -> PhysAddr {
    match m.as_ref() {
        Some(m) => m.resolve_reverse(addr).unwrap_or(BAD_ADDR),
        None => BAD_ADDR,
    }
}

/// # Safety
///
/// As for `ramses_resolve`.
#[no_mangle]
pub unsafe extern "C" fn ramses_msys_granularity(m: *const MemorySystem, pagesz: usize) -> usize {
    match m.as_ref() {
        Some(m) => m.granularity(pagesz as u64).map(|g| g as usize).unwrap_or(0),
        None => 0,
    }
}

/// Releases a memory system. Null is ignored.
///
/// # Safety
///
/// `m` must be null or a pointer obtained from `ramses_msys_load`, and must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ramses_msys_free(m: *mut MemorySystem) {
    if !m.is_null() {
        drop(Box::from_raw(m));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    fn load(text: &str) -> (c_int, *mut MemorySystem, usize) {
        let s = CString::new(text).unwrap();
        let mut m = ptr::null_mut();
        let mut idx = 0;
        let err = unsafe { ramses_msys_load(s.as_ptr(), &mut m, &mut idx) };
        (err, m, idx)
    }

    #[test]
    fn load_resolve_free() {
        let (err, m, _) = load("map:intel:sandy:2chan;remap:rasxor:bit=3:mask=6");
        assert_eq!(err, 0);
        assert!(!m.is_null());
        unsafe {
            assert_eq!(ramses_msys_granularity(m, 4096), 64);
            let a = ramses_resolve(m, 0x1234_5640);
            assert!(a.is_valid());
            assert_eq!(ramses_resolve_reverse(m, a), 0x1234_5640);
            ramses_msys_free(m);
            ramses_msys_free(ptr::null_mut());
        }
    }

    #[test]
    fn load_error_reports_offset() {
        let (err, m, idx) = load("map:naive:ddr3;remap:bogus");
        assert_eq!(err, 2);
        assert!(m.is_null());
        assert_eq!(idx, 15);
        let msg = unsafe { CStr::from_ptr(ramses_msys_load_strerr(err)) };
        assert_eq!(msg.to_str().unwrap(), "Unknown configurator");
    }

    #[test]
    fn strerr_out_of_range() {
        for err in [-1, 14, 1000] {
            let msg = unsafe { CStr::from_ptr(ramses_msys_load_strerr(err)) };
            assert_eq!(msg.to_str().unwrap(), "Unknown error");
        }
    }

    #[test]
    fn null_system() {
        unsafe {
            assert_eq!(ramses_resolve(ptr::null(), 0), DramAddr::INVALID);
            assert_eq!(ramses_resolve_reverse(ptr::null(), DramAddr::default()), BAD_ADDR);
            assert_eq!(ramses_msys_granularity(ptr::null(), 4096), 0);
            assert_eq!(ramses_msys_load(ptr::null(), ptr::null_mut(), ptr::null_mut()), ERR_BADINPUT);
        }
    }
}
