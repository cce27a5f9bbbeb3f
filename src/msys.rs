//! The memory system facade.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::architecture::{DramAddr, PhysAddr};
use crate::config::MsysConfig;
use crate::engine::{NativeEngine, ResolutionEngine, Resolver};
use crate::error::{Error, Result};

/// Owns the resolver state for one loaded configuration.
///
/// The state is immutable once loaded: `resolve`, `resolve_reverse` and
/// `granularity` take `&self` and may run from many threads at once.
/// `load` and `release` take `&mut self`, so a reload can only happen once
/// every reader has finished.
pub struct MemorySystem<E: ResolutionEngine = NativeEngine> {
    engine: E,
    state: Option<E::State>,
    source: Option<String>,
}

impl MemorySystem<NativeEngine> {
    pub fn new() -> Self {
        MemorySystem::with_engine(NativeEngine)
    }

    /// Shorthand for `new` followed by `load`.
    pub fn from_config(text: &str) -> Result<Self> {
        let mut m = MemorySystem::new();
        m.load(text)?;
        Ok(m)
    }

    /// The parsed configuration, for re-serialization.
    pub fn config(&self) -> Option<&MsysConfig> {
        self.state.as_ref().map(Resolver::config)
    }
}

impl Default for MemorySystem<NativeEngine> {
    fn default() -> Self {
        MemorySystem::new()
    }
}

impl<E: ResolutionEngine> MemorySystem<E> {
    pub fn with_engine(engine: E) -> Self {
        MemorySystem { engine, state: None, source: None }
    }

    /// Loads `text`, replacing any previous configuration. On error the
    /// previous configuration stays in place.
    pub fn load(&mut self, text: &str) -> Result<()> {
        let state = self.engine.load(text)?;
        if let Some(old) = self.state.replace(state) {
            debug!("replacing loaded memory system");
            self.engine.free(old);
        }
        self.source = Some(text.to_string());
        debug!(config = %text.trim(), "memory system loaded");
        Ok(())
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.load(&text)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Text of the currently loaded configuration.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn state(&self) -> Result<&E::State> {
        self.state.as_ref().ok_or(Error::NotLoaded)
    }

    pub fn resolve(&self, addr: PhysAddr) -> Result<DramAddr> {
        Ok(self.engine.resolve(self.state()?, addr))
    }

    /// Returns [`crate::BAD_ADDR`] for coordinates with no physical address.
    pub fn resolve_reverse(&self, addr: DramAddr) -> Result<PhysAddr> {
        Ok(self.engine.resolve_reverse(self.state()?, addr))
    }

    /// Byte stride after which the coordinate pattern repeats, no larger
    /// than `page_size`. Stepping through a range at this stride visits every
    /// distinct pattern.
    pub fn granularity(&self, page_size: u64) -> Result<u64> {
        Ok(self.engine.granularity(self.state()?, page_size))
    }

    /// Frees the resolver state. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(state) = self.state.take() {
            self.engine.free(state);
            self.source = None;
            debug!("memory system released");
        }
    }
}

impl<E: ResolutionEngine> Drop for MemorySystem<E> {
    fn drop(&mut self) {
        self.release();
    }
}
