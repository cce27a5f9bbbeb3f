//! The memory system configuration grammar.
//!
//! ```text
//! config     := stage (';' stage)*
//! mapstage   := 'map:' path (':' option)*
//! remapstage := 'remap:' name (':' option)*
//! option     := key '=' value | flag
//! ```
//!
//! Whitespace inside fields is ignored, `#` comments out the rest of a line
//! and empty stages are skipped, so any [`Density`] re-parses to the same
//! configuration.

use std::fmt;

use crate::error::{ConfigError, ConfigErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Map,
    Remap,
}

impl StageKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StageKind::Map => "map",
            StageKind::Remap => "remap",
        }
    }
}

/// A `key=value` option, or a bare word (path component, positional
/// argument or flag) when `value` is `None`.
#[derive(Debug, Clone)]
pub struct Arg {
    pub key: String,
    pub value: Option<String>,
    pub offset: usize,
}

impl Arg {
    pub fn word(key: impl Into<String>) -> Arg {
        Arg { key: key.into(), value: None, offset: 0 }
    }

    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Arg {
        Arg { key: key.into(), value: Some(value.into()), offset: 0 }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl Eq for Arg {}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.key, v),
            None => f.write_str(&self.key),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub kind: StageKind,
    /// Configurator name: the first path component.
    pub name: String,
    pub args: Vec<Arg>,
    pub offset: usize,
}

impl Stage {
    /// Builds a stage from a `name[:word...]` path such as `intel:sandy`.
    pub fn new(kind: StageKind, path: &str) -> Stage {
        let mut parts = path.split(':');
        let name = parts.next().unwrap_or_default().to_string();
        Stage {
            kind,
            name,
            args: parts.map(Arg::word).collect(),
            offset: 0,
        }
    }

    pub fn flag(mut self, flag: &str) -> Stage {
        self.args.push(Arg::word(flag));
        self
    }

    pub fn option(mut self, key: &str, value: impl Into<String>) -> Stage {
        self.args.push(Arg::pair(key, value));
        self
    }

    pub fn push(&mut self, arg: Arg) {
        self.args.push(arg);
    }

    fn write(&self, f: &mut impl fmt::Write, osep: &str) -> fmt::Result {
        write!(f, "{}{}{}", self.kind.keyword(), osep, self.name)?;
        for a in &self.args {
            write!(f, "{}{}", osep, a)?;
        }
        Ok(())
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name && self.args == other.args
    }
}

impl Eq for Stage {}

/// Output formatting density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Density {
    Compact,
    #[default]
    Normal,
    Pretty,
}

impl Density {
    fn separators(self) -> (&'static str, &'static str) {
        match self {
            Density::Compact => (";", ":"),
            Density::Normal => (";\n", " : "),
            Density::Pretty => (";\n", "\n\t: "),
        }
    }
}

/// A parsed configuration: one mapping stage followed by remap stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsysConfig {
    pub stages: Vec<Stage>,
}

impl MsysConfig {
    pub fn new(mapping: Stage) -> MsysConfig {
        MsysConfig { stages: vec![mapping] }
    }

    pub fn remap(mut self, stage: Stage) -> MsysConfig {
        self.stages.push(stage);
        self
    }

    pub fn mapping(&self) -> &Stage {
        &self.stages[0]
    }

    pub fn remaps(&self) -> &[Stage] {
        &self.stages[1..]
    }

    pub fn parse(text: &str) -> Result<MsysConfig, ConfigError> {
        let mut stages = Vec::new();
        for fields in lex(text) {
            if let Some(stage) = parse_stage(fields)? {
                match (stage.kind, stages.is_empty()) {
                    (StageKind::Remap, true) => {
                        return Err(ConfigError::new(ConfigErrorKind::NoMapping, stage.offset))
                    }
                    (StageKind::Map, false) => {
                        return Err(ConfigError::new(
                            ConfigErrorKind::DuplicateMapping,
                            stage.offset,
                        ))
                    }
                    _ => stages.push(stage),
                }
            }
        }
        if stages.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::NoMapping, text.len()));
        }
        Ok(MsysConfig { stages })
    }

    pub fn to_string_with(&self, density: Density) -> String {
        let (csep, osep) = density.separators();
        let mut out = String::new();
        for (i, s) in self.stages.iter().enumerate() {
            if i > 0 {
                out.push_str(csep);
            }
            // writing into a String cannot fail
            let _ = s.write(&mut out, osep);
        }
        out
    }
}

impl fmt::Display for MsysConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(Density::Compact))
    }
}

impl std::str::FromStr for MsysConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MsysConfig::parse(s)
    }
}

struct Field {
    text: String,
    offset: usize,
}

// Splits text into stages of fields, dropping whitespace and comments.
fn lex(text: &str) -> Vec<Vec<Field>> {
    let mut stages = Vec::new();
    let mut fields = Vec::new();
    let mut cur = Field { text: String::new(), offset: 0 };
    let mut in_comment = false;
    let mut started = false;

    for (i, c) in text.char_indices() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        match c {
            '#' => in_comment = true,
            ':' | ';' => {
                let next = Field { text: String::new(), offset: i + 1 };
                fields.push(std::mem::replace(&mut cur, next));
                started = false;
                if c == ';' {
                    stages.push(std::mem::take(&mut fields));
                }
            }
            c if c.is_whitespace() => {}
            c => {
                if !started {
                    cur.offset = i;
                    started = true;
                }
                cur.text.push(c);
            }
        }
    }
    fields.push(cur);
    stages.push(fields);
    stages
}

fn parse_stage(fields: Vec<Field>) -> Result<Option<Stage>, ConfigError> {
    if fields.len() == 1 && fields[0].text.is_empty() {
        return Ok(None);
    }
    let mut it = fields.into_iter();
    let Some(head) = it.next() else {
        return Ok(None);
    };
    let kind = match head.text.as_str() {
        "map" => StageKind::Map,
        "remap" => StageKind::Remap,
        _ => return Err(ConfigError::new(ConfigErrorKind::BadType(head.text), head.offset)),
    };
    let name = match it.next() {
        Some(f) if !f.text.is_empty() => f.text,
        Some(f) => return Err(ConfigError::new(ConfigErrorKind::NoConfigurator, f.offset)),
        None => return Err(ConfigError::new(ConfigErrorKind::NoConfigurator, head.offset)),
    };

    let mut args = Vec::new();
    for f in it {
        let arg = match f.text.split_once('=') {
            Some((k, _)) if k.is_empty() => {
                return Err(ConfigError::new(ConfigErrorKind::BadArgument(f.text), f.offset))
            }
            Some((k, "")) => {
                return Err(ConfigError::new(ConfigErrorKind::NoValue(k.to_string()), f.offset))
            }
            Some((k, v)) => Arg { key: k.to_string(), value: Some(v.to_string()), offset: f.offset },
            None if f.text.is_empty() => {
                return Err(ConfigError::new(ConfigErrorKind::BadArgument(f.text), f.offset))
            }
            None => Arg { key: f.text, value: None, offset: f.offset },
        };
        args.push(arg);
    }
    Ok(Some(Stage { kind, name, args, offset: head.offset }))
}

/// Parses an integer the way configuration values are written: decimal,
/// `0x`/`0o`/`0b` prefixes or C-style leading-zero octal, with an optional
/// `k`/`M`/`G`/`T` binary multiplier.
pub fn parse_int(s: &str) -> Option<i64> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (digits, shift) = match s.chars().last()? {
        'k' | 'K' => (&s[..s.len() - 1], 10),
        'm' | 'M' => (&s[..s.len() - 1], 20),
        'g' | 'G' => (&s[..s.len() - 1], 30),
        't' | 'T' => (&s[..s.len() - 1], 40),
        _ => (s, 0),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(b) = lower.strip_prefix("0x") {
        (16, b)
    } else if let Some(b) = lower.strip_prefix("0o") {
        (8, b)
    } else if let Some(b) = lower.strip_prefix("0b") {
        (2, b)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    let v = i64::from_str_radix(body, radix).ok()?;
    let v = v.checked_mul(1i64.checked_shl(shift)?)?;
    Some(if neg { -v } else { v })
}
