//! DRAM address modeling.
//!
//! A [`MemorySystem`] is loaded from a textual configuration naming a memory
//! controller mapping and optional remap stages, and converts physical
//! addresses to DRAM coordinates ([`DramAddr`]) and back. [`Translate`]
//! implementations turn virtual addresses into physical ones, and the
//! [`detect`] module guesses a configuration for the running machine.

pub mod architecture;
mod bits;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod intel;
pub mod memmap;
pub mod msys;
pub mod naive;
pub mod pcihole;
pub mod remap;
pub mod translate;

pub use architecture::{Architecture, DramAddr, DramLevel, PhysAddr, BAD_ADDR};
pub use config::{Density, MsysConfig};
pub use engine::{NativeEngine, ResolutionEngine};
pub use error::{ConfigError, ConfigErrorKind, Error, Result};
pub use memmap::{DramRange, MemMap};
pub use msys::MemorySystem;
pub use translate::{Heuristic, Pagemap, Translate};
