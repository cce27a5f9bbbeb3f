//! The resolver contract and the native engine implementing it.

use crate::architecture::{Architecture, DramAddr, PhysAddr, BAD_ADDR};
use crate::config::{parse_int, Arg, MsysConfig, Stage};
use crate::error::{ConfigError, ConfigErrorKind};
use crate::intel::{Intel, IntelGen};
use crate::naive::{DdrStandard, Naive};
use crate::pcihole::{PciHole, FOUR_GB};
use crate::remap::{remap_chain, remap_chain_reverse, RankMirror, RasXor, Remapping};

/// Converts between physical addresses and DRAM coordinates for a loaded
/// configuration.
///
/// `load` produces an owned, immutable state; every query borrows it, so a
/// state may be shared between reader threads. Dropping the state (through
/// `free`) releases it.
pub trait ResolutionEngine {
    type State: Send + Sync;

    fn load(&self, text: &str) -> Result<Self::State, ConfigError>;
    fn resolve(&self, state: &Self::State, addr: PhysAddr) -> DramAddr;
    /// [`BAD_ADDR`] if no physical address maps to `addr`.
    fn resolve_reverse(&self, state: &Self::State, addr: DramAddr) -> PhysAddr;
    fn granularity(&self, state: &Self::State, page_size: u64) -> u64;

    fn free(&self, state: Self::State) {
        drop(state)
    }
}

/// Built-in engine knowing the `naive` and `intel` controllers and the
/// `rankmirror` and `rasxor` remaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl ResolutionEngine for NativeEngine {
    type State = Resolver;

    fn load(&self, text: &str) -> Result<Resolver, ConfigError> {
        Resolver::build(MsysConfig::parse(text)?)
    }

    fn resolve(&self, state: &Resolver, addr: PhysAddr) -> DramAddr {
        state.resolve(addr)
    }

    fn resolve_reverse(&self, state: &Resolver, addr: DramAddr) -> PhysAddr {
        state.resolve_reverse(addr)
    }

    fn granularity(&self, state: &Resolver, page_size: u64) -> u64 {
        state.granularity(page_size)
    }
}

/// A mapping stage followed by its remap chain.
#[derive(Debug)]
pub struct Resolver {
    config: MsysConfig,
    mapping: Box<dyn Architecture>,
    remaps: Vec<Box<dyn Remapping>>,
}

impl Resolver {
    pub fn build(config: MsysConfig) -> Result<Resolver, ConfigError> {
        let mapping = build_mapping(config.mapping())?;
        let remaps = config
            .remaps()
            .iter()
            .map(build_remap)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Resolver { config, mapping, remaps })
    }

    pub fn config(&self) -> &MsysConfig {
        &self.config
    }

    pub fn mapping(&self) -> &dyn Architecture {
        self.mapping.as_ref()
    }

    pub fn resolve(&self, addr: PhysAddr) -> DramAddr {
        let a = self.mapping.phys_to_dram(addr);
        if !a.is_valid() {
            return a;
        }
        remap_chain(&self.remaps, a)
    }

    pub fn resolve_reverse(&self, addr: DramAddr) -> PhysAddr {
        if !addr.is_valid() {
            return BAD_ADDR;
        }
        self.mapping.dram_to_phys(&remap_chain_reverse(&self.remaps, addr))
    }

    pub fn granularity(&self, page_size: u64) -> u64 {
        let mut gran = gcd(page_size, self.mapping.props().granularity);
        for r in &self.remaps {
            gran = gcd(gran, self.mapping.twiddle_gran(&r.gran()));
        }
        gran
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[derive(Debug, Clone, Copy)]
enum ParamKind {
    /// Required bare word, one of the `:`-separated choices.
    Positional(&'static str),
    Flag,
    Int,
}

struct Param {
    name: &'static str,
    kind: ParamKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Unset,
    Choice(usize),
    Set,
    Int(i64),
}

impl Value {
    fn choice(self) -> usize {
        match self {
            Value::Choice(c) => c,
            _ => 0,
        }
    }

    fn flag(self) -> bool {
        self == Value::Set
    }

    fn int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            _ => 0,
        }
    }
}

type MapBuilder = fn(&[Value]) -> Result<Box<dyn Architecture>, String>;
type RemapBuilder = fn(&[Value]) -> Result<Box<dyn Remapping>, String>;

struct Configurator<B> {
    name: &'static str,
    params: &'static [Param],
    build: B,
}

const DDR_CHOICES: &str = "ddr3:ddr4";

fn ddr(v: Value) -> DdrStandard {
    if v.choice() == 1 {
        DdrStandard::Ddr4
    } else {
        DdrStandard::Ddr3
    }
}

static MAP_CONFIGS: &[Configurator<MapBuilder>] = &[
    Configurator {
        name: "naive",
        params: &[Param { name: DDR_CHOICES, kind: ParamKind::Positional(DDR_CHOICES) }],
        build: |a| Ok(Box::new(Naive { ddr: ddr(a[0]) })),
    },
    Configurator {
        name: "intel",
        params: &[
            Param { name: "sandy:ivyhaswell", kind: ParamKind::Positional("sandy:ivyhaswell") },
            Param { name: "2chan", kind: ParamKind::Flag },
            Param { name: "2dimm", kind: ParamKind::Flag },
            Param { name: "2rank", kind: ParamKind::Flag },
            Param { name: "pcibase", kind: ParamKind::Int },
            Param { name: "tom", kind: ParamKind::Int },
        ],
        build: build_intel,
    },
];

static REMAP_CONFIGS: &[Configurator<RemapBuilder>] = &[
    Configurator {
        name: "rankmirror",
        params: &[Param { name: DDR_CHOICES, kind: ParamKind::Positional(DDR_CHOICES) }],
        build: |a| Ok(Box::new(RankMirror { ddr: ddr(a[0]) })),
    },
    Configurator {
        name: "rasxor",
        params: &[
            Param { name: "bit", kind: ParamKind::Int },
            Param { name: "mask", kind: ParamKind::Int },
        ],
        build: build_rasxor,
    },
];

fn build_intel(a: &[Value]) -> Result<Box<dyn Architecture>, String> {
    let (pci_base, tom) = (a[4].int(), a[5].int());
    if pci_base < 0 || tom < 0 {
        return Err("pcibase and tom must not be negative".into());
    }
    if pci_base != 0 && tom != 0 && (pci_base as u64 >= FOUR_GB || pci_base > tom) {
        return Err(format!("pcibase={:#x} must be below 4G and not above tom={:#x}", pci_base, tom));
    }
    let pci = (pci_base != 0 && tom != 0).then_some(PciHole {
        pci_base: pci_base as u64,
        top_of_memory: tom as u64,
    });
    Ok(Box::new(Intel {
        generation: if a[0].choice() == 1 { IntelGen::IvyHaswell } else { IntelGen::Sandy },
        dual_channel: a[1].flag(),
        dual_dimm: a[2].flag(),
        dual_rank: a[3].flag(),
        pci,
    }))
}

fn build_rasxor(a: &[Value]) -> Result<Box<dyn Remapping>, String> {
    let (bit, mask) = (a[0].int(), a[1].int());
    if !(0..16).contains(&bit) || !(0..=0xffff).contains(&mask) {
        return Err(format!("bit={} mask={} out of range", bit, mask));
    }
    Ok(Box::new(RasXor::new(bit as u32, mask as u16)?))
}

fn choice_index(choices: &str, word: &str) -> Option<usize> {
    choices.split(':').position(|c| c == word)
}

// Binds stage arguments to parameters: positional words first, then flags
// and integer options in any order.
fn bind(stage: &Stage, params: &[Param]) -> Result<Vec<Value>, ConfigError> {
    let mut values = vec![Value::Unset; params.len()];
    let mut next = 0;
    for arg in &stage.args {
        if let Some(Param { kind: ParamKind::Positional(choices), .. }) = params.get(next) {
            let bad = || ConfigError::new(ConfigErrorKind::BadPositional(arg.to_string()), arg.offset);
            if arg.value.is_some() {
                return Err(bad());
            }
            values[next] = Value::Choice(choice_index(choices, &arg.key).ok_or_else(bad)?);
            next += 1;
            continue;
        }
        let idx = params[next..]
            .iter()
            .position(|p| p.name == arg.key)
            .map(|i| i + next)
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::BadArgument(arg.key.clone()), arg.offset))?;
        values[idx] = bind_value(arg, params[idx].kind)?;
    }
    if let Some(Param { kind: ParamKind::Positional(choices), .. }) = params.get(next) {
        return Err(ConfigError::new(
            ConfigErrorKind::MissingPositional(choices.to_string()),
            stage.offset,
        ));
    }
    Ok(values)
}

fn bind_value(arg: &Arg, kind: ParamKind) -> Result<Value, ConfigError> {
    let err = |k| Err(ConfigError::new(k, arg.offset));
    match (kind, &arg.value) {
        (ParamKind::Flag, None) => Ok(Value::Set),
        (ParamKind::Flag, Some(_)) => err(ConfigErrorKind::FlagWithValue(arg.key.clone())),
        (ParamKind::Int, None) => err(ConfigErrorKind::NoValue(arg.key.clone())),
        (ParamKind::Int, Some(v)) => match parse_int(v) {
            Some(n) => Ok(Value::Int(n)),
            None => err(ConfigErrorKind::BadInt(v.clone())),
        },
        (ParamKind::Positional(_), _) => err(ConfigErrorKind::BadArgument(arg.key.clone())),
    }
}

fn build_mapping(stage: &Stage) -> Result<Box<dyn Architecture>, ConfigError> {
    let cfg = MAP_CONFIGS
        .iter()
        .find(|c| c.name == stage.name)
        .ok_or_else(|| ConfigError::new(ConfigErrorKind::BadConfigurator(stage.name.clone()), stage.offset))?;
    let values = bind(stage, cfg.params)?;
    (cfg.build)(&values).map_err(|e| {
        ConfigError::new(ConfigErrorKind::BadArgument(e), stage.offset)
    })
}

fn build_remap(stage: &Stage) -> Result<Box<dyn Remapping>, ConfigError> {
    let cfg = REMAP_CONFIGS
        .iter()
        .find(|c| c.name == stage.name)
        .ok_or_else(|| ConfigError::new(ConfigErrorKind::BadConfigurator(stage.name.clone()), stage.offset))?;
    let values = bind(stage, cfg.params)?;
    (cfg.build)(&values).map_err(|e| ConfigError::new(ConfigErrorKind::RemapInit(e), stage.offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Result<Resolver, ConfigError> {
        NativeEngine.load(text)
    }

    #[test]
    fn unknown_controller() {
        let e = load("map:amd:zen").unwrap_err();
        assert_eq!(e.kind, ConfigErrorKind::BadConfigurator("amd".into()));
        assert_eq!(e.offset, 0);
    }

    #[test]
    fn unknown_remap() {
        let e = load("map:naive:ddr3;remap:shuffle").unwrap_err();
        assert_eq!(e.kind, ConfigErrorKind::BadConfigurator("shuffle".into()));
        assert_eq!(e.offset, 15);
    }

    #[test]
    fn positional_arguments() {
        assert_eq!(
            load("map:naive").unwrap_err().kind,
            ConfigErrorKind::MissingPositional("ddr3:ddr4".into())
        );
        assert_eq!(
            load("map:naive:ddr5").unwrap_err().kind,
            ConfigErrorKind::BadPositional("ddr5".into())
        );
        assert_eq!(
            load("map:intel:2chan").unwrap_err().kind,
            ConfigErrorKind::BadPositional("2chan".into())
        );
    }

    #[test]
    fn option_errors() {
        assert_eq!(
            load("map:intel:sandy:3chan").unwrap_err().kind,
            ConfigErrorKind::BadArgument("3chan".into())
        );
        assert_eq!(
            load("map:intel:sandy:2chan=1").unwrap_err().kind,
            ConfigErrorKind::FlagWithValue("2chan".into())
        );
        assert_eq!(
            load("map:intel:sandy:tom").unwrap_err().kind,
            ConfigErrorKind::NoValue("tom".into())
        );
        assert_eq!(
            load("map:intel:sandy:tom=lots").unwrap_err().kind,
            ConfigErrorKind::BadInt("lots".into())
        );
        assert!(matches!(
            load("map:naive:ddr3;remap:rasxor:bit=16:mask=6").unwrap_err().kind,
            ConfigErrorKind::RemapInit(_)
        ));
    }

    #[test]
    fn pci_hole_must_sit_below_tom() {
        for cfg in [
            "map:intel:sandy:pcibase=0x200000000:tom=0x100000000",
            "map:intel:sandy:pcibase=0xc0000000:tom=0x80000000",
        ] {
            assert!(matches!(load(cfg).unwrap_err().kind, ConfigErrorKind::BadArgument(_)), "{}", cfg);
        }
        let r = load("map:intel:sandy:pcibase=0xc0000000:tom=0xc0000000").unwrap();
        assert_eq!(r.resolve(u64::MAX - 1), DramAddr::INVALID);
    }

    #[test]
    fn options_in_any_order() {
        let r = load("map:intel:ivyhaswell:tom=8G:2rank:pcibase=0x7f800000:2chan").unwrap();
        assert_eq!(r.mapping().props().granularity, 128);
        assert_eq!(r.config().mapping().args.len(), 5);
    }

    #[test]
    fn granularity_is_gcd_of_stages() {
        assert_eq!(load("map:naive:ddr3").unwrap().granularity(4096), 4096);
        assert_eq!(load("map:intel:sandy:2chan").unwrap().granularity(4096), 64);
        assert_eq!(
            load("map:intel:ivyhaswell:2rank;remap:rankmirror:ddr3").unwrap().granularity(4096),
            64
        );
        assert_eq!(load("map:naive:ddr3;remap:rasxor:bit=3:mask=6").unwrap().granularity(4096), 4096);
    }

    #[test]
    fn invalid_coordinates_reverse_to_bad_addr() {
        let r = load("map:naive:ddr3").unwrap();
        assert_eq!(r.resolve(1 << 40), DramAddr::INVALID);
        assert_eq!(r.resolve_reverse(DramAddr::INVALID), BAD_ADDR);
        assert_eq!(r.resolve_reverse(DramAddr::new(0, 1, 0, 0, 0, 0)), BAD_ADDR);
    }

    #[test]
    fn gcd_basics() {
        assert_eq!(gcd(4096, 8192), 4096);
        assert_eq!(gcd(4096, 0), 4096);
        assert_eq!(gcd(12, 18), 6);
    }
}
