use std::cell::Cell;

use memsys::detect::{IomemRange, Introspect, Prompter, Session, Slot};
use memsys::{Density, Error, MemorySystem, MsysConfig, Result};

const IOMEM: &str = "\
00000000-00000fff : Reserved
00001000-0009d7ff : System RAM
00100000-7f7fffff : System RAM
7f800000-febfffff : PCI Bus 0000:00
  e0000000-efffffff : 0000:00:02.0
fee00000-fee00fff : Local APIC
100000000-27fffffff : System RAM
";

#[derive(Default)]
struct FakeSystem {
    slots: Option<Vec<Slot>>,
    iomem: Option<&'static str>,
    calls: Cell<usize>,
}

impl FakeSystem {
    fn with_slots(used: &[bool], rank: u32) -> FakeSystem {
        let slots = used
            .iter()
            .map(|&u| Slot { size: u.then_some(8 << 30), rank: u.then_some(rank) })
            .collect();
        FakeSystem { slots: Some(slots), iomem: Some(IOMEM), calls: Cell::new(0) }
    }
}

impl Introspect for FakeSystem {
    fn memory_slots(&self) -> Result<Vec<Slot>> {
        self.calls.set(self.calls.get() + 1);
        self.slots
            .clone()
            .ok_or_else(|| Error::IntrospectionUnavailable("dmidecode: not found".into()))
    }

    fn iomem(&self) -> Result<Vec<IomemRange>> {
        self.calls.set(self.calls.get() + 1);
        self.iomem
            .map(memsys::detect::parse_iomem)
            .ok_or_else(|| Error::IntrospectionUnavailable("/proc/iomem: permission denied".into()))
    }
}

fn run(sys: &FakeSystem, input: &str, interactive_only: bool) -> (Result<MsysConfig>, String) {
    let mut session = Session::new(sys, Prompter::new(input.as_bytes(), Vec::new()))
        .interactive_only(interactive_only);
    let cfg = session.run();
    let out = String::from_utf8(session.into_prompter().into_output()).unwrap();
    (cfg, out)
}

#[test]
fn channel_pair_is_detected_without_asking() {
    let sys = FakeSystem::with_slots(&[true, true, false, false], 2);
    let (cfg, out) = run(&sys, "3\ny\ny\n\n\n", false);
    assert_eq!(
        cfg.unwrap().to_string(),
        "map:intel:ivyhaswell:2dimm:2rank:pcibase=0x7f800000:tom=0x200000000"
    );
    assert!(out.contains("\t1 active channels\n\t2 DIMMs per channel\n\t2 ranks per DIMM\n"));
    assert!(out.contains("PCI IOMEM start: 0x7f800000; Total installed RAM: 0x200000000"));
    assert!(out.contains("PCI memory hole remapping is [enabled]"));
    assert!(!out.contains("Number of active channels"));
    assert_eq!(sys.calls.get(), 2);
}

#[test]
fn ambiguous_system_is_asked_for() {
    let sys = FakeSystem {
        slots: Some(vec![
            Slot { size: Some(4 << 30), rank: Some(1) },
            Slot::default(),
            Slot::default(),
            Slot { size: Some(4 << 30), rank: Some(1) },
        ]),
        iomem: None,
        calls: Cell::new(0),
    };
    let input = "\
2
2
0
1
1
y
y
0x7f800000
8G
y
y
2
3
8
3
6
";
    let (cfg, out) = run(&sys, input, false);
    let cfg = cfg.unwrap();
    assert_eq!(
        cfg.to_string(),
        "map:intel:sandy:2chan:pcibase=0x7f800000:tom=0x200000000;\
         remap:rankmirror:ddr3;remap:rasxor:bit=3:mask=6"
    );
    assert_eq!(out.matches("Unknown\n").count(), 2);
    assert_eq!(out.matches("Number of DIMMs per channel: ").count(), 2);
    assert_eq!(out.matches("RAS XOR mask: ").count(), 2);
}

#[test]
fn rejected_guess_falls_back_to_questions() {
    let sys = FakeSystem::with_slots(&[true, false, true, false], 1);
    let input = "2\nn\n1\n1\n2\ny\ny\n\n0\n";
    let (cfg, _) = run(&sys, input, false);
    assert_eq!(
        cfg.unwrap().to_string(),
        "map:intel:sandy:2rank:pcibase=0x7f800000:tom=0x200000000"
    );
}

#[test]
fn interactive_only_skips_introspection() {
    let sys = FakeSystem::with_slots(&[true], 1);
    let input = "3\n1\n1\n1\ny\nn\n0xc0000000\n4G\ny\n\n\n";
    let (cfg, _) = run(&sys, input, true);
    assert_eq!(cfg.unwrap().to_string(), "map:intel:ivyhaswell");
    assert_eq!(sys.calls.get(), 0);
}

#[test]
fn naive_controller_asks_only_about_remaps() {
    let sys = FakeSystem::default();
    let (cfg, out) = run(&sys, "1\ny\n1\n", false);
    assert_eq!(
        cfg.unwrap().to_string(),
        "map:naive:ddr4;remap:rankmirror:ddr4;remap:rasxor:bit=3:mask=6"
    );
    assert!(out.starts_with("Select memory controller:\n\t0. naive:ddr3\n"));
    assert!(out.contains("Choice [0]: "));
    assert_eq!(sys.calls.get(), 0);
}

#[test]
fn end_of_input_aborts() {
    let sys = FakeSystem::with_slots(&[true, true], 1);
    let (cfg, out) = run(&sys, "2\ny\n", false);
    assert!(matches!(cfg, Err(Error::OperatorAbort)));
    assert!(out.contains("Autodetected routing options"));
    let (cfg, _) = run(&sys, "", false);
    assert!(matches!(cfg, Err(Error::OperatorAbort)));
}

#[test]
fn output_loads_at_every_density() {
    let sys = FakeSystem::with_slots(&[true; 4], 2);
    let (cfg, _) = run(&sys, "2\ny\ny\ny\n1\n", false);
    let cfg = cfg.unwrap();
    for density in [Density::Compact, Density::Normal, Density::Pretty] {
        let text = cfg.to_string_with(density);
        assert_eq!(MsysConfig::parse(&text).unwrap(), cfg);
        let m = MemorySystem::from_config(&text).unwrap();
        let a = m.resolve(0x1_2345_6780).unwrap();
        assert_eq!(m.resolve_reverse(a).unwrap(), 0x1_2345_6780);
    }
    assert_eq!(
        cfg.to_string_with(Density::Pretty),
        "map\n\t: intel\n\t: sandy\n\t: 2chan\n\t: 2dimm\n\t: 2rank\n\t: pcibase=0x7f800000\n\t: tom=0x200000000;\n\
         remap\n\t: rankmirror\n\t: ddr3;\n\
         remap\n\t: rasxor\n\t: bit=3\n\t: mask=6"
    );
}
