//! Error types for memsys.

use thiserror::Error;

/// Result type alias using memsys's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid memory system configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("memory system not loaded")]
    NotLoaded,

    #[error("no physical page mapped at virtual address 0x{vaddr:x}")]
    TranslationUnavailable { vaddr: usize },

    #[error("system introspection unavailable: {0}")]
    IntrospectionUnavailable(String),

    #[error("interrupted by operator")]
    OperatorAbort,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}

/// Diagnostic for configuration text the resolution engine rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (at offset {offset})")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// Byte offset into the configuration text where parsing stopped.
    pub offset: usize,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, offset: usize) -> Self {
        ConfigError { kind, offset }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    #[error("unknown configuration type `{0}`")]
    BadType(String),

    #[error("unknown configurator `{0}`")]
    BadConfigurator(String),

    #[error("configurator not specified")]
    NoConfigurator,

    #[error("missing positional argument (one of `{0}`)")]
    MissingPositional(String),

    #[error("unknown positional argument value `{0}`")]
    BadPositional(String),

    #[error("unknown argument `{0}`")]
    BadArgument(String),

    #[error("no value supplied to keyword argument `{0}`")]
    NoValue(String),

    #[error("bad format for numerical argument `{0}`")]
    BadInt(String),

    #[error("flag argument `{0}` supplied with value")]
    FlagWithValue(String),

    #[error("no mapping stage; `map:` must come first")]
    NoMapping,

    #[error("more than one mapping stage")]
    DuplicateMapping,

    #[error("error initialising remap configuration: {0}")]
    RemapInit(String),
}
