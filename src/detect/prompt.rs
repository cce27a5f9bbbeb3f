use std::fmt::Display;
use std::io::{BufRead, Write};

use crate::config::parse_int;
use crate::error::{Error, Result};

/// Line-oriented operator dialogue. End of input aborts the session.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Prompter { input, output }
    }

    pub fn say(&mut self, msg: &str) -> Result<()> {
        writeln!(self.output, "{}", msg)?;
        Ok(())
    }

    /// Shows `prompt` and reads one answer with surrounding whitespace removed.
    pub fn ask_line(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::OperatorAbort);
        }
        Ok(line.trim().to_string())
    }

    /// Index of the chosen item. An empty answer picks `default`, if any.
    pub fn ask_choice<T: Display>(
        &mut self,
        name: &str,
        items: &[T],
        default: Option<usize>,
    ) -> Result<usize> {
        let prompt = match default {
            Some(d) => format!("Choice [{}]: ", d),
            None => "Choice: ".to_string(),
        };
        self.say(&format!("Select {}:", name))?;
        loop {
            for (i, item) in items.iter().enumerate() {
                writeln!(self.output, "\t{}. {}", i, item)?;
            }
            let ans = self.ask_line(&prompt)?;
            let idx = match (ans.as_str(), default) {
                ("", Some(d)) => Some(d),
                (s, _) => s.parse().ok(),
            };
            if let Some(i) = idx.filter(|i| *i < items.len()) {
                return Ok(i);
            }
        }
    }

    pub fn ask_yn(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let ans = self.ask_line(&format!("{} {}: ", question, hint))?;
            match ans.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" => return Ok(true),
                "n" => return Ok(false),
                _ => {}
            }
        }
    }

    /// Accepts the same integer syntax as configuration values.
    pub fn ask_int(&mut self, name: &str, default: Option<i64>) -> Result<i64> {
        let prompt = match default {
            Some(d) => format!("{} [{}]: ", name, d),
            None => format!("{}: ", name),
        };
        loop {
            let ans = self.ask_line(&prompt)?;
            let v = match (ans.as_str(), default) {
                ("", Some(d)) => Some(d),
                (s, _) => parse_int(s),
            };
            if let Some(v) = v {
                return Ok(v);
            }
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
