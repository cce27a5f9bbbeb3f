//! Memory system autodetection.
//!
//! The guessing heuristics in [`dmi`] and [`iomem`] are pure functions over
//! already-collected system data; [`Session`] runs the operator dialogue
//! around them and produces a configuration.

mod dmi;
mod iomem;
mod prompt;

pub use dmi::{guess_geometry, parse_dmidecode, Geometry, Slot};
pub use iomem::{infer_remap_window, parse_iomem, IomemRange, RemapWindow};
pub use prompt::Prompter;

use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::process::Command;

use tracing::{debug, warn};

use crate::config::{MsysConfig, Stage, StageKind};
use crate::error::{Error, Result};
use crate::naive::DdrStandard;
use crate::remap::RasXor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controller {
    /// Mapping stage path, e.g. `intel:sandy`.
    pub path: &'static str,
    pub ddr: DdrStandard,
}

impl Controller {
    pub fn is_intel(&self) -> bool {
        self.path.starts_with("intel:")
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path)
    }
}

pub static CONTROLLERS: &[Controller] = &[
    Controller { path: "naive:ddr3", ddr: DdrStandard::Ddr3 },
    Controller { path: "naive:ddr4", ddr: DdrStandard::Ddr4 },
    Controller { path: "intel:sandy", ddr: DdrStandard::Ddr3 },
    Controller { path: "intel:ivyhaswell", ddr: DdrStandard::Ddr3 },
];

/// Row XOR presets offered for on-DIMM remapping; the last entry asks for
/// custom parameters.
const DIMM_REMAPS: &[&str] = &["none", "rasxor:bit=3:mask=6", "custom rasxor"];

/// Everything needed to write a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answers {
    pub controller: Controller,
    /// Only used by intel controllers.
    pub geometry: Option<Geometry>,
    pub window: Option<RemapWindow>,
    pub rank_mirror: bool,
    /// `(bit, mask)` of a row XOR remap.
    pub ras_xor: Option<(u32, u16)>,
}

pub fn build_config(a: &Answers) -> MsysConfig {
    let mut map = Stage::new(StageKind::Map, a.controller.path);
    if a.controller.is_intel() {
        if let Some(g) = a.geometry {
            for (count, flag) in [(g.channels, "2chan"), (g.dimms, "2dimm"), (g.ranks, "2rank")] {
                if count > 1 {
                    map = map.flag(flag);
                }
            }
        }
        if let Some(w) = a.window.filter(|w| w.remap_enabled) {
            map = map
                .option("pcibase", format!("{:#x}", w.pci_base))
                .option("tom", format!("{:#x}", w.top_of_memory));
        }
    }
    let mut cfg = MsysConfig::new(map);
    if a.rank_mirror {
        cfg = cfg.remap(Stage::new(StageKind::Remap, "rankmirror").flag(a.controller.ddr.name()));
    }
    if let Some((bit, mask)) = a.ras_xor {
        cfg = cfg.remap(
            Stage::new(StageKind::Remap, "rasxor")
                .option("bit", bit.to_string())
                .option("mask", mask.to_string()),
        );
    }
    cfg
}

/// Source of system memory information.
pub trait Introspect {
    fn memory_slots(&self) -> Result<Vec<Slot>>;
    fn iomem(&self) -> Result<Vec<IomemRange>>;
}

/// Reads the running system through `dmidecode` and `/proc/iomem`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIntrospect;

impl Introspect for SystemIntrospect {
    fn memory_slots(&self) -> Result<Vec<Slot>> {
        let out = Command::new("dmidecode")
            .args(["-t", "memory"])
            .output()
            .map_err(|e| Error::IntrospectionUnavailable(format!("dmidecode: {}", e)))?;
        if !out.status.success() {
            return Err(Error::IntrospectionUnavailable(format!(
                "dmidecode {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(parse_dmidecode(&String::from_utf8_lossy(&out.stdout)))
    }

    fn iomem(&self) -> Result<Vec<IomemRange>> {
        let text = fs::read_to_string("/proc/iomem")
            .map_err(|e| Error::IntrospectionUnavailable(format!("/proc/iomem: {}", e)))?;
        Ok(parse_iomem(&text))
    }
}

pub fn is_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Interactive detection run.
pub struct Session<'a, I, R, W> {
    introspect: &'a I,
    prompter: Prompter<R, W>,
    interactive_only: bool,
}

impl<'a, I: Introspect, R: BufRead, W: Write> Session<'a, I, R, W> {
    pub fn new(introspect: &'a I, prompter: Prompter<R, W>) -> Self {
        Session { introspect, prompter, interactive_only: false }
    }

    /// Skips introspection and asks for everything.
    pub fn interactive_only(mut self, yes: bool) -> Self {
        self.interactive_only = yes;
        self
    }

    pub fn prompter(&mut self) -> &mut Prompter<R, W> {
        &mut self.prompter
    }

    pub fn into_prompter(self) -> Prompter<R, W> {
        self.prompter
    }

    pub fn run(&mut self) -> Result<MsysConfig> {
        let idx = self.prompter.ask_choice("memory controller", CONTROLLERS, None)?;
        let controller = CONTROLLERS[idx];
        let (geometry, window) = if controller.is_intel() {
            (Some(self.confirm_geometry()?), Some(self.confirm_window()?))
        } else {
            (None, None)
        };
        let rank_mirror = self
            .prompter
            .ask_yn("Enable address pin mirroring for second rank?", false)?;
        let ras_xor = self.dimm_remap()?;
        let answers = Answers { controller, geometry, window, rank_mirror, ras_xor };
        debug!(?answers, "detection finished");
        Ok(build_config(&answers))
    }

    fn detected<T>(&self, what: &str, r: Result<T>) -> Result<T> {
        match r {
            Err(Error::IntrospectionUnavailable(msg)) => {
                warn!(what, %msg, "introspection unavailable");
                Err(Error::IntrospectionUnavailable(msg))
            }
            other => other,
        }
    }

    fn guess_geometry(&self) -> Result<Option<Geometry>> {
        if self.interactive_only {
            return Ok(None);
        }
        match self.detected("memory geometry", self.introspect.memory_slots()) {
            Ok(slots) => Ok(guess_geometry(&slots)),
            Err(Error::IntrospectionUnavailable(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn guess_window(&self) -> Result<Option<RemapWindow>> {
        if self.interactive_only {
            return Ok(None);
        }
        match self.detected("PCI hole", self.introspect.iomem()) {
            Ok(ranges) => Ok(infer_remap_window(&ranges)),
            Err(Error::IntrospectionUnavailable(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn confirm_geometry(&mut self) -> Result<Geometry> {
        let mut geometry = self.guess_geometry()?;
        self.prompter.say("Autodetected memory geometry")?;
        loop {
            if let Some(g) = geometry {
                self.prompter.say(&format!(
                    "\t{} active channels\n\t{} DIMMs per channel\n\t{} ranks per DIMM\n",
                    g.channels, g.dimms, g.ranks
                ))?;
                if self.prompter.ask_yn("Is this correct?", true)? {
                    return Ok(g);
                }
            } else {
                self.prompter.say("Unknown")?;
            }
            geometry = Some(Geometry {
                channels: self.ask_count("Number of active channels")?,
                dimms: self.ask_count("Number of DIMMs per channel")?,
                ranks: self.ask_count("Number of ranks per DIMM")?,
            });
        }
    }

    fn confirm_window(&mut self) -> Result<RemapWindow> {
        let mut window = self.guess_window()?;
        self.prompter.say("Autodetected routing options")?;
        loop {
            if let Some(w) = window {
                self.prompter.say(&format!(
                    "PCI IOMEM start: {:#x}; Total installed RAM: {:#x}",
                    w.pci_base, w.top_of_memory
                ))?;
                self.prompter.say(&format!(
                    "PCI memory hole remapping is [{}]",
                    if w.remap_enabled { "enabled" } else { "disabled" }
                ))?;
                if self.prompter.ask_yn("Is this correct?", true)? {
                    return Ok(w);
                }
            } else {
                self.prompter.say("Unknown")?;
            }
            window = Some(RemapWindow {
                remap_enabled: self.prompter.ask_yn("PCI hole remapping active?", true)?,
                pci_base: self.ask_address("PCI start address")?,
                top_of_memory: self.ask_address("Total memory size")?,
            });
        }
    }

    fn ask_count(&mut self, name: &str) -> Result<u32> {
        loop {
            let n = self.prompter.ask_int(name, None)?;
            match u32::try_from(n) {
                Ok(n) if n > 0 => return Ok(n),
                _ => {}
            }
        }
    }

    fn ask_address(&mut self, name: &str) -> Result<u64> {
        loop {
            if let Ok(v) = u64::try_from(self.prompter.ask_int(name, None)?) {
                return Ok(v);
            }
        }
    }

    fn dimm_remap(&mut self) -> Result<Option<(u32, u16)>> {
        let choice = self.prompter.ask_choice(
            "additional on-DIMM remap (if unsure, select 'none')",
            DIMM_REMAPS,
            Some(0),
        )?;
        match choice {
            0 => Ok(None),
            1 => Ok(Some((3, 6))),
            _ => loop {
                let bit = self.prompter.ask_int("RAS XOR bit", None)?;
                let mask = self.prompter.ask_int("RAS XOR mask", None)?;
                let (Ok(bit), Ok(mask)) = (u32::try_from(bit), u16::try_from(mask)) else {
                    self.prompter.say("Out of range")?;
                    continue;
                };
                match RasXor::new(bit, mask) {
                    Ok(_) => return Ok(Some((bit, mask))),
                    Err(e) => self.prompter.say(&e)?,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msys::MemorySystem;

    fn intel(path: &'static str) -> Controller {
        Controller { path, ddr: DdrStandard::Ddr3 }
    }

    #[test]
    fn controller_order() {
        let names: Vec<&str> = CONTROLLERS.iter().map(|c| c.path).collect();
        assert_eq!(names, ["naive:ddr3", "naive:ddr4", "intel:sandy", "intel:ivyhaswell"]);
        assert_eq!(CONTROLLERS[1].ddr, DdrStandard::Ddr4);
    }

    #[test]
    fn intel_options_in_order() {
        let a = Answers {
            controller: intel("intel:ivyhaswell"),
            geometry: Some(Geometry::new(2, 1, 2)),
            window: Some(RemapWindow { remap_enabled: true, pci_base: 0x7f80_0000, top_of_memory: 1 << 33 }),
            rank_mirror: true,
            ras_xor: Some((3, 6)),
        };
        let cfg = build_config(&a);
        assert_eq!(
            cfg.to_string(),
            "map:intel:ivyhaswell:2chan:2rank:pcibase=0x7f800000:tom=0x200000000;\
             remap:rankmirror:ddr3;remap:rasxor:bit=3:mask=6"
        );
        assert!(MemorySystem::from_config(&cfg.to_string_with(crate::Density::Pretty)).is_ok());
    }

    #[test]
    fn disabled_window_is_left_out() {
        let a = Answers {
            controller: intel("intel:sandy"),
            geometry: Some(Geometry::new(1, 1, 1)),
            window: Some(RemapWindow { remap_enabled: false, pci_base: 0xc000_0000, top_of_memory: 1 << 32 }),
            rank_mirror: false,
            ras_xor: None,
        };
        assert_eq!(build_config(&a).to_string(), "map:intel:sandy");
    }

    #[test]
    fn naive_ignores_geometry() {
        let a = Answers {
            controller: CONTROLLERS[1],
            geometry: Some(Geometry::new(2, 2, 2)),
            window: None,
            rank_mirror: true,
            ras_xor: None,
        };
        assert_eq!(build_config(&a).to_string(), "map:naive:ddr4;remap:rankmirror:ddr4");
    }
}
