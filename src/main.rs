//! msys-detect
//!
//! Detects the running memory system and writes an msys configuration.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use memsys::detect::{is_superuser, Prompter, Session, SystemIntrospect};
use memsys::{Density, MemorySystem};

const DEFAULT_OUTPUT: &str = "./mem.msys";

#[derive(Debug, Default)]
struct Options {
    interactive_only: bool,
    output: Option<PathBuf>,
    stdout: bool,
    density: Density,
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        if let Some(memsys::Error::OperatorAbort) = e.downcast_ref::<memsys::Error>() {
            eprintln!("\nInterrupted. Exiting...");
            process::exit(130);
        }
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("msys-detect");
    let opts = match parse_args(&args[1.min(args.len())..])? {
        Some(opts) => opts,
        None => {
            print_usage(program);
            return Ok(());
        }
    };

    // Keep stdout clean for the configuration itself.
    let out: Box<dyn Write> = if opts.stdout {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut prompter = Prompter::new(io::stdin().lock(), out);

    if !opts.interactive_only && !is_superuser() {
        let rule = "-".repeat(80);
        prompter.say(&rule)?;
        prompter.say("*For best autodetection results it's recommended you run this tool as superuser*")?;
        prompter.say(&rule)?;
    }

    let introspect = SystemIntrospect;
    let mut session = Session::new(&introspect, prompter).interactive_only(opts.interactive_only);
    let config = session.run()?;
    let text = config.to_string_with(opts.density);
    MemorySystem::from_config(&text)?;

    if opts.stdout {
        println!("{}", text);
        return Ok(());
    }
    let path = match opts.output {
        Some(p) => p,
        None => {
            let ans = session
                .prompter()
                .ask_line(&format!("Path to write output to [{}]: ", DEFAULT_OUTPUT))?;
            PathBuf::from(if ans.is_empty() { DEFAULT_OUTPUT } else { ans.as_str() })
        }
    };
    fs::write(&path, text)?;
    info!(path = %path.display(), "configuration written");
    Ok(())
}

/// `Ok(None)` when usage was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, Box<dyn std::error::Error>> {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--interactive-only" | "-i" => {
                opts.interactive_only = true;
            }
            "--output" | "-o" => {
                i += 1;
                if i >= args.len() {
                    return Err("--output requires a path".into());
                }
                opts.output = Some(PathBuf::from(&args[i]));
            }
            "--stdout" | "-c" => {
                opts.stdout = true;
            }
            "--pretty" | "-p" => {
                opts.density = Density::Pretty;
            }
            "--ugly" | "-u" => {
                opts.density = Density::Compact;
            }
            "--help" | "-h" => return Ok(None),
            "--version" | "-V" => {
                print_version();
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown argument: {}", other).into());
            }
        }
        i += 1;
    }
    Ok(Some(opts))
}

fn print_usage(program: &str) {
    println!(
        r#"msys-detect - Detect memory system configuration

USAGE:
    {} [OPTIONS]

OPTIONS:
    -i, --interactive-only  Do not autodetect anything; configure everything interactively
    -o, --output <PATH>     Output file (default: {})
    -c, --stdout            Write the configuration to stdout
    -p, --pretty            Prettify output to make it more human-readable
    -u, --ugly              Make output more compact
    -h, --help              Show this help message
    -V, --version           Show version information

ENVIRONMENT:
    RUST_LOG                Log filter (default: warn)
"#,
        program, DEFAULT_OUTPUT
    );
}

fn print_version() {
    println!("msys-detect {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags() {
        let o = parse_args(&args(&["-i", "-o", "out.msys", "-p"])).unwrap().unwrap();
        assert!(o.interactive_only);
        assert_eq!(o.output, Some(PathBuf::from("out.msys")));
        assert_eq!(o.density, Density::Pretty);
        let o = parse_args(&args(&["--stdout", "--ugly"])).unwrap().unwrap();
        assert!(o.stdout);
        assert_eq!(o.density, Density::Compact);
        assert_eq!(parse_args(&[]).unwrap().unwrap().density, Density::Normal);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&["-o"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
        assert!(parse_args(&args(&["-h"])).unwrap().is_none());
    }
}
